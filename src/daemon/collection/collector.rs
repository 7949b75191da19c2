use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info_span, Instrument};

use crate::{
    daemon::storage::{entities::ActivitySample, record_event::RecordEvent},
    utils::{clock::Clock, hash::sha256_hex},
    window_api::WindowManager,
};

use super::{
    classify::classify_app,
    idle::{ActivityState, IdleEvaluator},
    run_blocking,
};

/// Polls the foreground window on a fixed cadence and emits one [ActivitySample] per tick.
pub struct DataCollectionModule {
    next: mpsc::Sender<RecordEvent>,
    producer: Arc<Mutex<Box<dyn WindowManager>>>,
    shutdown: CancellationToken,
    idle_evaluator: IdleEvaluator,
    collection_frequency: Duration,
    time_provider: Arc<dyn Clock>,
}

impl DataCollectionModule {
    pub fn new(
        next: mpsc::Sender<RecordEvent>,
        producer: Arc<Mutex<Box<dyn WindowManager>>>,
        shutdown: CancellationToken,
        idle_evaluator: IdleEvaluator,
        collection_frequency: Duration,
        time_provider: Arc<dyn Clock>,
    ) -> Self {
        Self {
            next,
            producer,
            collection_frequency,
            idle_evaluator,
            time_provider,
            shutdown,
        }
    }

    /// `Ok(None)` means there was no foreground window and the tick is skipped.
    async fn collect_data(&mut self) -> Result<Option<ActivitySample>> {
        let Some(window_data) =
            run_blocking(&self.producer, |producer| producer.get_active_window_data()).await?
        else {
            return Ok(None);
        };

        let timestamp = self.time_provider.time();
        let window_fingerprint: Arc<str> = sha256_hex(window_data.window_title.as_bytes()).into();
        let is_active = self.idle_evaluator.observe(&window_fingerprint, timestamp)
            == ActivityState::Active;

        Ok(Some(ActivitySample {
            timestamp,
            window_fingerprint,
            category: classify_app(&window_data.app_name),
            app_name: window_data.app_name,
            is_active,
        }))
    }

    /// Executes the collector event loop. The first sample is taken one interval after start.
    pub async fn run(mut self) -> Result<()> {
        let mut collection_point = self.time_provider.instant();
        loop {
            collection_point += self.collection_frequency;

            tokio::select! {
                // Cancelation only stops future ticks, anything already sent is still processed.
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.time_provider.sleep_until(collection_point) => ()
            }

            match self.collect_data().await {
                Ok(Some(sample)) => {
                    let span = info_span!("Sending activity sample");
                    debug!(
                        "{} ({}) active: {}",
                        sample.app_name,
                        sample.category.as_str(),
                        sample.is_active
                    );
                    self.next
                        .send(RecordEvent::Activity(sample))
                        .instrument(span)
                        .await
                        .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;
                }
                Ok(None) => {
                    debug!("No active window detected")
                }
                Err(e) => {
                    error!("Encountered an error during collection {:?}", e)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use anyhow::{anyhow, Result};
    use chrono::Utc;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::{
        daemon::{
            collection::idle::IdleEvaluator,
            storage::{entities::AppCategory, record_event::RecordEvent},
        },
        utils::{clock::DefaultClock, hash::sha256_hex},
        window_api::{ActiveWindowData, MockWindowManager, WindowManager},
    };

    use super::DataCollectionModule;

    #[tokio::test]
    async fn test_errors_and_missing_windows_do_not_stop_sampling() -> Result<()> {
        let mut manager = MockWindowManager::new();
        let mut tick = 0;
        manager.expect_get_active_window_data().returning(move || {
            tick += 1;
            match tick {
                1 => Err(anyhow!("X server went away")),
                2 => Ok(None),
                _ => Ok(Some(ActiveWindowData {
                    window_title: "main.rs - workchain".into(),
                    app_name: "Code".into(),
                })),
            }
        });
        let manager: Box<dyn WindowManager> = Box::new(manager);

        let (sender, mut receiver) = mpsc::channel(10);
        let shutdown = CancellationToken::new();
        let collector = DataCollectionModule::new(
            sender,
            Arc::new(Mutex::new(manager)),
            shutdown.clone(),
            IdleEvaluator::new(chrono::Duration::minutes(5), Utc::now()),
            Duration::from_millis(20),
            Arc::new(DefaultClock),
        );
        let handle = tokio::spawn(collector.run());

        let Some(RecordEvent::Activity(sample)) = receiver.recv().await else {
            panic!("Expected an activity sample");
        };
        shutdown.cancel();
        handle.await??;

        assert_eq!(sample.category, AppCategory::Coding);
        assert_eq!(&*sample.app_name, "Code");
        assert_eq!(&*sample.window_fingerprint, sha256_hex("main.rs - workchain"));
        assert!(sample.is_active);
        Ok(())
    }
}
