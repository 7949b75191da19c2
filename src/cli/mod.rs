pub mod daemon_path;
pub mod output;
pub mod process;
pub mod query;

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use daemon_path::current_daemon_path;
use process::{kill_previous_servers, restart_server, signal_daemons};
use query::DayArgs;
use sysinfo::Signal;
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::{args::ConfigOverrides, config::TrackerConfig, start_daemon},
    utils::{
        dir::{create_application_default_path, ensure_dir},
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "WorkChain", version, long_about = None)]
#[command(about = "Encrypted, tamper-evident ledger of daily work activity", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Print results as JSON")]
    json: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts a daemon for the application")]
    Init {},
    #[command(
        about = "Run a daemon directly in current console. Used for debugging"
    )]
    Serve {
        #[command(flatten)]
        overrides: ConfigOverrides,
    },
    #[command(about = "Stop currently running daemon.")]
    Stop {},
    #[command(about = "Ask the running daemon to stop tracking without exiting")]
    Pause {},
    #[command(about = "Ask the running daemon to start tracking again")]
    Resume {},
    #[command(about = "Show today's activity and the state of the daemon")]
    Status {},
    #[command(about = "Show the most recent daily summaries")]
    History {
        #[arg(short, long, default_value_t = 7)]
        limit: usize,
    },
    #[command(about = "Show the summary of a single day")]
    Summary {
        #[command(flatten)]
        day: DayArgs,
    },
    #[command(about = "List the screenshot hashes recorded on a day")]
    Hashes {
        #[command(flatten)]
        day: DayArgs,
    },
    #[command(about = "Show the inputs a proof-of-work submission would use for a day")]
    Proof {
        #[command(flatten)]
        day: DayArgs,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();
    let app_dir = args
        .dir
        .map_or_else(create_application_default_path, ensure_dir)?;

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &app_dir.join("logs"), logging_level, args.log)?;

    match args.commands {
        Commands::Init {} => restart_server(&app_dir),
        Commands::Stop {} => {
            let killed = kill_previous_servers(&current_daemon_path()?)?;
            println!("Stopped {killed} daemon(s)");
            Ok(())
        }
        Commands::Pause {} => send_to_daemons(Signal::User1, "paused"),
        Commands::Resume {} => send_to_daemons(Signal::User2, "resumed"),
        Commands::Serve { overrides } => {
            let config = overrides.apply(TrackerConfig::load(&app_dir)?);
            start_daemon(app_dir, config).await
        }
        Commands::Status {} => query::status(&app_dir, args.json).await,
        Commands::History { limit } => query::history(&app_dir, limit, args.json).await,
        Commands::Summary { day } => query::summary(&app_dir, day.resolve()?, args.json).await,
        Commands::Hashes { day } => query::hashes(&app_dir, day.resolve()?, args.json).await,
        Commands::Proof { day } => query::proof(&app_dir, day.resolve()?, args.json).await,
    }
}

fn send_to_daemons(signal: Signal, verb: &str) -> Result<()> {
    let signalled = signal_daemons(&current_daemon_path()?, signal)?;
    if signalled.is_empty() {
        return Err(anyhow!("No running daemon found"));
    }
    println!("Tracking {verb} in {} daemon(s)", signalled.len());
    Ok(())
}
