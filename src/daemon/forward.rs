//! Hand-off of daily aggregates to off-device storage. Forwarding runs on its own task and
//! reports back through the record channel, so a slow or failing sink never delays sampling.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::{fs, io::AsyncWriteExt, sync::mpsc, task::JoinHandle};
use tracing::{error, info, warn};

use crate::utils::hash::sha256_hex;

use super::{
    codec::Codec,
    config::ForwardPolicy,
    error::TrackerError,
    storage::{entities::DailyAggregate, record_event::RecordEvent},
};

/// Blob storage collaborator. Accepts an encrypted payload and returns an opaque identifier.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobSink: Send + Sync {
    async fn put_blob(&self, payload: Vec<u8>) -> Result<String, TrackerError>;
}

/// Stores every blob as a file named after its identifier.
pub struct DirectoryBlobSink {
    dir: PathBuf,
}

impl DirectoryBlobSink {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn blob_id(payload: &[u8]) -> String {
        let digest = sha256_hex(payload);
        format!("blob_{}", &digest[..32])
    }
}

#[async_trait]
impl BlobSink for DirectoryBlobSink {
    async fn put_blob(&self, payload: Vec<u8>) -> Result<String, TrackerError> {
        let id = Self::blob_id(&payload);
        let write = async {
            fs::create_dir_all(&self.dir).await?;
            let mut file = fs::File::create(self.dir.join(&id)).await?;
            file.write_all(&payload).await?;
            file.sync_all().await
        };
        write
            .await
            .map_err(|e| TrackerError::ForwardFailure(e.to_string()))?;
        Ok(id)
    }
}

/// Serializes, encrypts and submits aggregates.
#[derive(Clone)]
pub struct Forwarder {
    codec: Arc<Codec>,
    sink: Arc<dyn BlobSink>,
}

impl Forwarder {
    pub fn new(codec: Arc<Codec>, sink: Arc<dyn BlobSink>) -> Self {
        Self { codec, sink }
    }

    pub async fn forward(&self, aggregate: &DailyAggregate) -> Result<String, TrackerError> {
        let plaintext = serde_json::to_vec(aggregate)?;
        let envelope = self.codec.encrypt(&plaintext)?;
        let payload = serde_json::to_vec(&envelope)?;
        self.sink.put_blob(payload).await
    }

    /// Forwards on a separate task. A successful forward is reported as
    /// [RecordEvent::Forwarded] so the owner of the aggregate attaches the identifier.
    pub fn dispatch(
        &self,
        aggregate: DailyAggregate,
        completions: mpsc::Sender<RecordEvent>,
    ) -> JoinHandle<()> {
        let forwarder = self.clone();
        tokio::spawn(async move {
            match forwarder.forward(&aggregate).await {
                Ok(blob_id) => {
                    info!("Forwarded aggregate for {} as {}", aggregate.date, blob_id);
                    let event = RecordEvent::Forwarded {
                        date: aggregate.date,
                        blob_id,
                    };
                    if completions.send(event).await.is_err() {
                        warn!("Forward of {} completed after processing ended", aggregate.date);
                    }
                }
                Err(e) => {
                    error!("Failed to forward aggregate for {}: {e}", aggregate.date);
                }
            }
        })
    }
}

/// Decides which aggregate updates are forwarded under a [ForwardPolicy].
#[derive(Debug)]
pub struct ForwardSchedule {
    policy: ForwardPolicy,
    interval: TimeDelta,
    last_forward: Option<DateTime<Utc>>,
    pending: bool,
}

impl ForwardSchedule {
    pub fn new(policy: ForwardPolicy, interval: std::time::Duration) -> Self {
        Self {
            policy,
            interval: TimeDelta::from_std(interval).unwrap_or(TimeDelta::MAX),
            last_forward: None,
            pending: false,
        }
    }

    /// Called after every aggregate change.
    pub fn on_update(&mut self, now: DateTime<Utc>) -> bool {
        let due = match self.policy {
            ForwardPolicy::EveryUpdate => true,
            ForwardPolicy::IntervalOrDayClose => self
                .last_forward
                .map_or(true, |last| now - last >= self.interval),
        };
        if due {
            self.mark_forwarded(now);
        } else {
            self.pending = true;
        }
        due
    }

    /// Called when a day is sealed. Sealed days are always forwarded.
    pub fn on_seal(&mut self, now: DateTime<Utc>) -> bool {
        self.mark_forwarded(now);
        true
    }

    /// Whether an update was held back since the last forward. Clears the flag.
    pub fn take_pending(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }

    fn mark_forwarded(&mut self, now: DateTime<Utc>) {
        self.last_forward = Some(now);
        self.pending = false;
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use anyhow::Result;
    use chrono::{NaiveDate, TimeDelta, TimeZone, Utc};
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    use crate::daemon::{
        codec::{Codec, DeviceKey},
        config::ForwardPolicy,
        error::TrackerError,
        storage::{
            entities::{DailyAggregate, EncryptedEnvelope},
            record_event::RecordEvent,
        },
    };

    use super::{DirectoryBlobSink, ForwardSchedule, Forwarder, MockBlobSink};

    fn aggregate() -> DailyAggregate {
        let mut aggregate = DailyAggregate::empty(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        aggregate.coding_minutes = 2.5;
        aggregate.total_active_minutes = 2.5;
        aggregate
    }

    #[tokio::test]
    async fn test_directory_sink_stores_encrypted_aggregate() -> Result<()> {
        let dir = tempdir()?;
        let codec = Arc::new(Codec::new(&DeviceKey::session()));
        let forwarder = Forwarder::new(
            codec.clone(),
            Arc::new(DirectoryBlobSink::new(dir.path().join("blobs"))),
        );

        let blob_id = forwarder.forward(&aggregate()).await?;
        assert!(blob_id.starts_with("blob_"));
        assert_eq!(blob_id.len(), "blob_".len() + 32);

        let payload = std::fs::read(dir.path().join("blobs").join(&blob_id))?;
        assert_eq!(DirectoryBlobSink::blob_id(&payload), blob_id);
        let envelope: EncryptedEnvelope = serde_json::from_slice(&payload)?;
        let decoded: DailyAggregate = serde_json::from_slice(&codec.decrypt(&envelope)?)?;
        assert_eq!(decoded, aggregate());
        Ok(())
    }

    #[tokio::test]
    async fn test_sink_failure_is_reported() {
        let mut sink = MockBlobSink::new();
        sink.expect_put_blob()
            .returning(|_| Err(TrackerError::ForwardFailure("offline".into())));
        let forwarder = Forwarder::new(Arc::new(Codec::new(&DeviceKey::session())), Arc::new(sink));

        let result = forwarder.forward(&aggregate()).await;
        assert!(matches!(result, Err(TrackerError::ForwardFailure(_))));
    }

    #[tokio::test]
    async fn test_dispatch_reports_completion() -> Result<()> {
        let mut sink = MockBlobSink::new();
        sink.expect_put_blob()
            .times(1)
            .returning(|_| Ok("blob_remote".into()));
        let forwarder = Forwarder::new(Arc::new(Codec::new(&DeviceKey::session())), Arc::new(sink));
        let (sender, mut receiver) = mpsc::channel(1);

        forwarder.dispatch(aggregate(), sender).await?;

        match receiver.recv().await {
            Some(RecordEvent::Forwarded { date, blob_id }) => {
                assert_eq!(date, aggregate().date);
                assert_eq!(blob_id, "blob_remote");
            }
            other => panic!("Unexpected event {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_dispatch_reports_nothing() -> Result<()> {
        let mut sink = MockBlobSink::new();
        sink.expect_put_blob()
            .returning(|_| Err(TrackerError::ForwardFailure("offline".into())));
        let forwarder = Forwarder::new(Arc::new(Codec::new(&DeviceKey::session())), Arc::new(sink));
        let (sender, mut receiver) = mpsc::channel(1);

        forwarder.dispatch(aggregate(), sender).await?;

        assert!(receiver.recv().await.is_none());
        Ok(())
    }

    #[test]
    fn test_every_update_policy_forwards_everything() {
        let mut schedule = ForwardSchedule::new(ForwardPolicy::EveryUpdate, Duration::from_secs(300));
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        assert!(schedule.on_update(now));
        assert!(schedule.on_update(now));
        assert!(!schedule.take_pending());
    }

    #[test]
    fn test_interval_policy_holds_updates_back() {
        let mut schedule =
            ForwardSchedule::new(ForwardPolicy::IntervalOrDayClose, Duration::from_secs(300));
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();

        assert!(schedule.on_update(start));
        assert!(!schedule.on_update(start + TimeDelta::seconds(30)));
        assert!(!schedule.on_update(start + TimeDelta::seconds(299)));
        assert!(schedule.on_update(start + TimeDelta::seconds(300)));
        assert!(!schedule.take_pending());

        assert!(!schedule.on_update(start + TimeDelta::seconds(330)));
        assert!(schedule.take_pending());
        assert!(!schedule.take_pending());
    }

    #[test]
    fn test_seal_always_forwards() {
        let mut schedule =
            ForwardSchedule::new(ForwardPolicy::IntervalOrDayClose, Duration::from_secs(300));
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 23, 59, 30).unwrap();
        assert!(schedule.on_update(start));
        assert!(!schedule.on_update(start + TimeDelta::seconds(10)));
        assert!(schedule.on_seal(start + TimeDelta::seconds(30)));
        assert!(!schedule.take_pending());
    }
}
