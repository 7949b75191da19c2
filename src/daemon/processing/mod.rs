use anyhow::Result;
use module::EventProcessor;
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::storage::record_event::RecordEvent;

pub mod ledger_writer;
pub mod module;

/// Single owner of everything the samplers produce. Events are applied strictly one at a time,
/// so two updates of the same day's aggregate never interleave.
pub struct ProcessingModule<Processor> {
    receiver: Receiver<RecordEvent>,
    processor: Processor,
    shutdown: CancellationToken,
}

impl<P: EventProcessor> ProcessingModule<P> {
    pub fn new(receiver: Receiver<RecordEvent>, processor: P, shutdown: CancellationToken) -> Self {
        Self {
            receiver,
            processor,
            shutdown,
        }
    }

    async fn process(&mut self, record: RecordEvent) {
        debug!("Processing event {:?}", record);
        match self.processor.process_next(record).await {
            Ok(_) => {
                debug!("Processed event")
            }
            Err(e) => {
                error!("Error processing event: {e:?}")
            }
        }
    }

    /// Runs until shutdown. Events already queued at that point are still applied.
    pub async fn run(mut self) -> Result<()> {
        loop {
            let record = tokio::select! {
                biased;
                record = self.receiver.recv() => match record {
                    Some(record) => record,
                    None => break,
                },
                _ = self.shutdown.cancelled() => break,
            };
            self.process(record).await;
        }

        self.receiver.close();
        while let Ok(record) = self.receiver.try_recv() {
            self.process(record).await;
        }
        info!("Processing finished, finalizing");
        self.processor.finalize().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::{anyhow, Result};
    use chrono::Utc;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::daemon::storage::{entities::ScreenshotHashRecord, record_event::RecordEvent};

    use super::{module::EventProcessor, ProcessingModule};

    #[derive(Default, Clone)]
    struct Recording {
        seen: Arc<Mutex<Vec<String>>>,
        finalized: Arc<Mutex<bool>>,
    }

    impl EventProcessor for Recording {
        async fn process_next(&mut self, message: RecordEvent) -> Result<()> {
            let RecordEvent::Screenshot(record) = message else {
                return Err(anyhow!("Unexpected event"));
            };
            self.seen.lock().unwrap().push(record.hash.to_string());
            if &*record.hash == "bad" {
                return Err(anyhow!("Rejected"));
            }
            Ok(())
        }

        async fn finalize(&mut self) -> Result<()> {
            *self.finalized.lock().unwrap() = true;
            Ok(())
        }
    }

    fn screenshot(hash: &str) -> RecordEvent {
        RecordEvent::Screenshot(ScreenshotHashRecord {
            timestamp: Utc::now(),
            hash: hash.into(),
        })
    }

    #[tokio::test]
    async fn test_errors_do_not_stop_processing() -> Result<()> {
        let (sender, receiver) = mpsc::channel(10);
        let recording = Recording::default();
        let module =
            ProcessingModule::new(receiver, recording.clone(), CancellationToken::new());

        sender.send(screenshot("a")).await?;
        sender.send(screenshot("bad")).await?;
        sender.send(screenshot("b")).await?;
        drop(sender);
        module.run().await?;

        assert_eq!(*recording.seen.lock().unwrap(), vec!["a", "bad", "b"]);
        assert!(*recording.finalized.lock().unwrap());
        Ok(())
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_events() -> Result<()> {
        let (sender, receiver) = mpsc::channel(10);
        let shutdown = CancellationToken::new();
        let recording = Recording::default();
        let module = ProcessingModule::new(receiver, recording.clone(), shutdown.clone());

        sender.send(screenshot("a")).await?;
        sender.send(screenshot("b")).await?;
        shutdown.cancel();
        // The sender stays alive, only the token ends the loop.
        module.run().await?;

        assert_eq!(recording.seen.lock().unwrap().len(), 2);
        assert!(*recording.finalized.lock().unwrap());
        assert!(sender.send(screenshot("late")).await.is_err());
        Ok(())
    }
}
