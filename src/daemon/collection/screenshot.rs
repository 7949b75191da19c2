use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use crate::{
    daemon::storage::{entities::ScreenshotHashRecord, record_event::RecordEvent},
    utils::{
        clock::Clock,
        hash::{sha256_hex, short},
    },
    window_api::ScreenCapturer,
};

use super::run_blocking;

/// Captures the screen on a fixed cadence and emits only its digest. The pixel buffer is
/// dropped inside the blocking task that captured it.
pub struct ScreenshotModule {
    next: mpsc::Sender<RecordEvent>,
    capturer: Arc<Mutex<Box<dyn ScreenCapturer>>>,
    shutdown: CancellationToken,
    capture_frequency: Duration,
    time_provider: Arc<dyn Clock>,
}

impl ScreenshotModule {
    pub fn new(
        next: mpsc::Sender<RecordEvent>,
        capturer: Arc<Mutex<Box<dyn ScreenCapturer>>>,
        shutdown: CancellationToken,
        capture_frequency: Duration,
        time_provider: Arc<dyn Clock>,
    ) -> Self {
        Self {
            next,
            capturer,
            shutdown,
            capture_frequency,
            time_provider,
        }
    }

    async fn capture_hash(&self) -> Result<ScreenshotHashRecord> {
        let hash = run_blocking(&self.capturer, |capturer| {
            let pixels = capturer.capture_screen()?;
            Ok(sha256_hex(pixels))
        })
        .await?;

        Ok(ScreenshotHashRecord {
            timestamp: self.time_provider.time(),
            hash: hash.into(),
        })
    }

    /// Captures once right away and then every `capture_frequency`.
    pub async fn run(self) -> Result<()> {
        let mut capture_point = self.time_provider.instant();
        loop {
            match self.capture_hash().await {
                Ok(record) => {
                    let span = info_span!("Sending screenshot hash");
                    info!("Screenshot hash generated {}", short(&record.hash));
                    self.next
                        .send(RecordEvent::Screenshot(record))
                        .instrument(span)
                        .await
                        .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;
                }
                Err(e) => {
                    error!("Screenshot capture failed {:?}", e)
                }
            }

            capture_point += self.capture_frequency;
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.time_provider.sleep_until(capture_point) => ()
            }
        }
    }
}
