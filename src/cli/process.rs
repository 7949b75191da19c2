use std::{path::Path, process::Stdio};

use anyhow::{anyhow, Result};
use sysinfo::{get_current_pid, Pid, Process, ProcessesToUpdate, Signal, System};
use tracing::{info, warn};

use super::daemon_path::current_daemon_path;

/// Running processes started from the executable at `name`, other than this one.
fn daemons<'a>(system: &'a System, name: &'a Path) -> Result<impl Iterator<Item = &'a Process>> {
    let current_id = get_current_pid().map_err(|e| anyhow!("Can't find own pid: {e}"))?;
    Ok(system
        .processes()
        .iter()
        .filter(move |(pid, process)| {
            **pid != current_id && !matches!(process.parent(), Some(p) if p == current_id)
        })
        .filter(move |(_, process)| process.exe().filter(|v| v.exists()).is_some_and(|v| name == v))
        .map(|(_, process)| process))
}

fn processes() -> System {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);
    system
}

pub fn kill_previous_servers(name: &Path) -> Result<usize> {
    let system = processes();
    let mut killed = 0;
    for process in daemons(&system, name)? {
        // This will forcefully terminate the process on Windows. Anything better will require a
        // lot more work.
        if process.kill_with(Signal::Term).is_none() {
            process.kill();
        }
        process.wait();
        killed += 1;
    }
    Ok(killed)
}

/// Sends `signal` to every running daemon. Returns the pids that accepted it.
pub fn signal_daemons(name: &Path, signal: Signal) -> Result<Vec<Pid>> {
    let system = processes();
    let mut signalled = Vec::new();
    for process in daemons(&system, name)? {
        match process.kill_with(signal) {
            Some(true) => signalled.push(process.pid()),
            Some(false) => warn!("Daemon {} did not accept {signal:?}", process.pid()),
            None => return Err(anyhow!("{signal:?} is not supported on this platform")),
        }
    }
    Ok(signalled)
}

pub fn daemon_running(name: &Path) -> Result<bool> {
    let system = processes();
    let running = daemons(&system, name)?.next().is_some();
    Ok(running)
}

/// Shuts down previous daemons and starts a new one. The daemon binary detaches itself.
pub fn restart_server(app_dir: &Path) -> Result<()> {
    let daemon = current_daemon_path()?;
    let killed = kill_previous_servers(&daemon)?;
    if killed > 0 {
        info!("Stopped {killed} previous daemon(s)");
    }
    let mut command = std::process::Command::new(&daemon);
    command.arg("--dir").arg(app_dir);

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    command.stdin(Stdio::null());
    command.stdout(Stdio::null());

    println!("Spawning {}", daemon.display());
    let status = command.status()?;
    if !status.success() {
        return Err(anyhow!("Daemon failed to start: {status}"));
    }
    println!("Success");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use anyhow::Result;

    use super::daemon_running;

    #[test]
    fn test_daemon_running_ignores_own_process() -> Result<()> {
        assert!(!daemon_running(&std::env::current_exe()?)?);
        assert!(!daemon_running(Path::new("/nonexistent/workchain-daemon"))?);
        Ok(())
    }
}
