use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;

use super::config::{ForwardPolicy, TrackerConfig};

#[derive(Parser, Debug, Default)]
pub struct DaemonArgs {
    /// Run in the current process instead of detaching.
    #[arg(long)]
    pub force: bool,
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// This option is for debugging purposes only.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
    #[command(flatten)]
    pub overrides: ConfigOverrides,
}

/// Flags that take precedence over `config.json`.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct ConfigOverrides {
    #[arg(
        long = "sample-interval",
        help = "Seconds between window samples",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub sample_interval: Option<u64>,
    #[arg(long = "idle-threshold", help = "Seconds without a window change before counting as idle")]
    pub idle_threshold: Option<u64>,
    #[arg(
        long = "screenshot-interval",
        help = "Seconds between screenshot hashes",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub screenshot_interval: Option<u64>,
    #[arg(long = "forward-policy")]
    pub forward_policy: Option<ForwardPolicy>,
    #[arg(long = "forward-interval", help = "Seconds between forwards under interval-or-day-close")]
    pub forward_interval: Option<u64>,
}

impl ConfigOverrides {
    pub fn apply(&self, mut config: TrackerConfig) -> TrackerConfig {
        let seconds = std::time::Duration::from_secs;
        if let Some(v) = self.sample_interval {
            config.sample_interval = seconds(v);
        }
        if let Some(v) = self.idle_threshold {
            config.idle_threshold = seconds(v);
        }
        if let Some(v) = self.screenshot_interval {
            config.screenshot_interval = seconds(v);
        }
        if let Some(v) = self.forward_policy {
            config.forward_policy = v;
        }
        if let Some(v) = self.forward_interval {
            config.forward_interval = seconds(v);
        }
        config
    }
}
