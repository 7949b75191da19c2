use std::{path::Path, time::Duration};

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const CONFIG_FILE: &str = "config.json";

/// When aggregates are handed to the blob sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ForwardPolicy {
    /// Every aggregate change is forwarded.
    EveryUpdate,
    /// At most once per `forward_interval`, plus once when a day is sealed.
    IntervalOrDayClose,
}

/// Process-wide settings. Built once at startup and handed to the components that need them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrackerConfig {
    #[serde(with = "seconds_ser")]
    pub sample_interval: Duration,
    #[serde(with = "seconds_ser")]
    pub idle_threshold: Duration,
    #[serde(with = "seconds_ser")]
    pub screenshot_interval: Duration,
    pub forward_policy: ForwardPolicy,
    #[serde(with = "seconds_ser")]
    pub forward_interval: Duration,
    pub ledger_file: String,
    pub blob_dir: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(30),
            idle_threshold: Duration::from_secs(5 * 60),
            screenshot_interval: Duration::from_secs(5 * 60),
            forward_policy: ForwardPolicy::EveryUpdate,
            forward_interval: Duration::from_secs(5 * 60),
            ledger_file: "workchain.db".into(),
            blob_dir: "blobs".into(),
        }
    }
}

impl TrackerConfig {
    /// Reads `<app_dir>/config.json` on top of the defaults. A missing file is not an error.
    pub fn load(app_dir: &Path) -> Result<Self> {
        let path = app_dir.join(CONFIG_FILE);
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let config: Self = serde_json::from_str(&content)
                    .with_context(|| format!("Invalid configuration in {path:?}"))?;
                config
                    .validate()
                    .with_context(|| format!("Invalid configuration in {path:?}"))?;
                info!("Loaded configuration from {:?}", path);
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {path:?}")),
        }
    }

    /// Both samplers tick on their interval, so neither may be zero.
    fn validate(&self) -> Result<()> {
        if self.sample_interval.is_zero() {
            bail!("sampleInterval must be at least one second");
        }
        if self.screenshot_interval.is_zero() {
            bail!("screenshotInterval must be at least one second");
        }
        Ok(())
    }
}

mod seconds_ser {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(s))
    }
}
