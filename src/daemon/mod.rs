use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use config::TrackerConfig;
use forward::DirectoryBlobSink;
use instance::InstanceLock;
use storage::ledger::SqliteLedger;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracker::{Capabilities, Tracker};

use crate::{
    utils::clock::{Clock, DefaultClock},
    window_api::{GenericScreenCapturer, GenericWindowManager},
};

use codec::{Codec, DeviceKey};

pub mod aggregation;
pub mod args;
pub mod codec;
pub mod collection;
pub mod config;
pub mod error;
pub mod forward;
pub mod instance;
pub mod processing;
pub mod proof;
pub mod shutdown;
pub mod status;
pub mod storage;
pub mod tracker;

/// Represents the starting point for the daemon
pub async fn start_daemon(dir: PathBuf, config: TrackerConfig) -> Result<()> {
    let dir = std::path::absolute(dir)?;
    std::env::set_current_dir("/")?;

    let capabilities = Capabilities {
        window_manager: Box::new(GenericWindowManager::new()?),
        screen_capturer: Box::new(GenericScreenCapturer::new()?),
    };
    run_tracker(dir, config, capabilities, Arc::new(DefaultClock), CancellationToken::new()).await
}

async fn run_tracker(
    dir: PathBuf,
    config: TrackerConfig,
    capabilities: Capabilities,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
) -> Result<()> {
    let _lock = InstanceLock::acquire(&dir).await?;
    info!("Starting daemon in {:?} with {:?}", dir, config);

    let codec = Arc::new(Codec::new(&DeviceKey::derive_off_runtime().await));
    let store = Arc::new(SqliteLedger::open(dir.join(&config.ledger_file))?);
    let sink = Arc::new(DirectoryBlobSink::new(dir.join(&config.blob_dir)));

    let (tracker, processor) =
        Tracker::new(config, store, codec, sink, capabilities, clock, shutdown.clone());
    tracker.start();

    let (signal_result, _, processing_result) = tokio::join!(
        shutdown::handle_signals(&tracker, shutdown.clone()),
        report_status(&tracker, shutdown.clone()),
        processor.run(),
    );
    tracker.stop();

    if let Err(signal_result) = signal_result {
        error!("Signal handling got an error {:?}", signal_result);
    }

    if let Err(processing_result) = processing_result {
        error!("Processing module got an error {:?}", processing_result);
    }

    info!("Daemon stopped");
    Ok(())
}

/// Logs every status push until shutdown.
async fn report_status(tracker: &Tracker, shutdown: CancellationToken) {
    let mut updates = tracker.subscribe();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            changed = updates.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
        let today = updates.borrow_and_update().today.clone();
        if let Some(today) = today {
            debug!(
                "{}: {:.1} active minutes ({:.1} coding)",
                today.date,
                today.total_active_minutes,
                today.coding_minutes
            );
        }
    }
}

#[cfg(test)]
mod daemon_tests {
    use std::{sync::Arc, time::Duration};

    use anyhow::Result;
    use tempfile::tempdir;
    use tokio_util::sync::CancellationToken;

    use crate::{
        daemon::{
            config::TrackerConfig,
            run_tracker,
            storage::ledger::{LedgerStore, SqliteLedger},
            tracker::Capabilities,
        },
        utils::{clock::DefaultClock, logging::TEST_LOGGING},
        window_api::{ActiveWindowData, MockScreenCapturer, MockWindowManager},
    };

    fn test_windows() -> Vec<Option<ActiveWindowData>> {
        vec![
            Some(ActiveWindowData {
                window_title: "lib.rs - workchain".into(),
                app_name: "code".into(),
            }),
            None,
            Some(ActiveWindowData {
                window_title: "Standup - Zoom".into(),
                app_name: "zoom.us".into(),
            }),
        ]
    }

    /// Runs the whole daemon against mocked capabilities for a short while and checks that the
    /// ledger ends up with samples, hashes and a consistent aggregate.
    #[tokio::test]
    async fn smoke_test_daemon() -> Result<()> {
        *TEST_LOGGING;
        let mut window_manager = MockWindowManager::new();
        let mut windows = test_windows().into_iter().cycle();
        window_manager
            .expect_get_active_window_data()
            .returning(move || Ok(windows.next().flatten()));
        let mut screen_capturer = MockScreenCapturer::new();
        screen_capturer
            .expect_capture_screen()
            .returning(|| Ok(vec![0; 256]));

        let dir = tempdir()?;
        let config = TrackerConfig {
            sample_interval: Duration::from_millis(50),
            screenshot_interval: Duration::from_millis(200),
            ..TrackerConfig::default()
        };
        let shutdown = CancellationToken::new();

        let (daemon_result, _) = tokio::join!(
            run_tracker(
                dir.path().to_path_buf(),
                config,
                Capabilities {
                    window_manager: Box::new(window_manager),
                    screen_capturer: Box::new(screen_capturer),
                },
                Arc::new(DefaultClock),
                shutdown.clone(),
            ),
            async {
                let blobs = dir.path().join("blobs");
                let _ = tokio::time::timeout(Duration::from_secs(30), async {
                    while !blobs.read_dir().is_ok_and(|mut entries| entries.next().is_some()) {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                })
                .await;
                // A few more ticks so the screenshot sampler has reported too.
                tokio::time::sleep(Duration::from_millis(500)).await;
                shutdown.cancel();
            }
        );
        daemon_result?;

        let ledger = SqliteLedger::open(dir.path().join("workchain.db"))?;
        let recent = ledger.recent_daily(5).await?;
        assert!(!recent.is_empty());
        let today = &recent[0];
        assert!(today.total_active_minutes > 0.);
        assert_eq!(today.total_active_minutes, today.category_sum());
        assert!(ledger.sample_count_for(today.date).await? > 0);
        assert!(ledger.last_screenshot_hash().await?.is_some());
        assert!(dir.path().join("blobs").read_dir()?.next().is_some());
        Ok(())
    }
}
