use std::path::Path;

use anyhow::{anyhow, Context, Result};
use fs4::tokio::AsyncFileExt;
use tokio::fs::{File, OpenOptions};
use tracing::info;

pub const LOCK_FILE: &str = "workchain.lock";

/// Exclusive advisory lock on the application directory, held for the daemon's lifetime.
/// Released when dropped.
#[derive(Debug)]
pub struct InstanceLock {
    _file: File,
}

impl InstanceLock {
    pub async fn acquire(app_dir: &Path) -> Result<Self> {
        let path = app_dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open lock file {path:?}"))?;
        file.try_lock_exclusive().map_err(|e| {
            anyhow!("Another daemon is already running on {app_dir:?} ({e})")
        })?;
        info!("Acquired instance lock {:?}", path);
        Ok(Self { _file: file })
    }
}
