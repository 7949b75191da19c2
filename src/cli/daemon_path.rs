use std::{env, path::PathBuf};

use anyhow::Result;

/// The daemon binary ships next to the CLI.
pub fn to_daemon_path(mut path: PathBuf) -> PathBuf {
    path.set_file_name("workchain-daemon");
    #[cfg(windows)]
    {
        path.set_extension("exe");
    }
    path
}

pub fn current_daemon_path() -> Result<PathBuf> {
    Ok(to_daemon_path(env::current_exe()?))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::to_daemon_path;

    #[test]
    fn test_daemon_sits_next_to_cli() {
        let daemon = to_daemon_path(PathBuf::from("/usr/local/bin/workchain"));
        #[cfg(not(windows))]
        assert_eq!(daemon, PathBuf::from("/usr/local/bin/workchain-daemon"));
        #[cfg(windows)]
        assert_eq!(daemon, PathBuf::from("/usr/local/bin/workchain-daemon.exe"));
    }
}
