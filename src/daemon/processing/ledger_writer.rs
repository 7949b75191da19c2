use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::{
    daemon::{
        aggregation::Aggregator,
        codec::Codec,
        error::TrackerError,
        forward::{ForwardSchedule, Forwarder},
        status::StatusUpdate,
        storage::{
            entities::{ActivitySample, DailyAggregate, ScreenshotHashRecord},
            ledger::LedgerStore,
            merkle::day_root,
            record_event::RecordEvent,
        },
    },
    utils::{clock::Clock, hash::short},
};

use super::module::EventProcessor;

/// Bridges the samplers and the [LedgerStore]. Owns the running aggregate of the current day:
/// every sample is encrypted and appended, folded, upserted and then handed to the forwarder.
pub struct LedgerWriter {
    store: Arc<dyn LedgerStore>,
    codec: Arc<Codec>,
    aggregator: Aggregator,
    forwarder: Forwarder,
    schedule: ForwardSchedule,
    completions: mpsc::Sender<RecordEvent>,
    status: watch::Sender<StatusUpdate>,
    clock: Arc<dyn Clock>,
    current_date: Option<NaiveDate>,
    /// Latest aggregate of `current_date`. May be ahead of the ledger after a failed upsert.
    today: Option<DailyAggregate>,
}

impl LedgerWriter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn LedgerStore>,
        codec: Arc<Codec>,
        aggregator: Aggregator,
        forwarder: Forwarder,
        schedule: ForwardSchedule,
        completions: mpsc::Sender<RecordEvent>,
        status: watch::Sender<StatusUpdate>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            codec,
            aggregator,
            forwarder,
            schedule,
            completions,
            status,
            clock,
            current_date: None,
            today: None,
        }
    }

    async fn record_activity(&mut self, sample: ActivitySample) -> Result<()> {
        let date = sample.date();
        self.seal_if_new_day(date).await;

        if let Err(e) = self.append_encrypted(&sample, date).await {
            error!("Failed to append sample of {date}: {e}");
        }
        self.status
            .send_modify(|status| status.last_activity_time = Some(sample.timestamp));

        if !sample.is_active {
            return Ok(());
        }

        let current = self.aggregate_for(date).await?;
        let Some(updated) = self.aggregator.fold(&sample, current) else {
            return Ok(());
        };
        self.remember(updated.clone());

        let persisted = self.store.upsert_daily(updated.clone()).await;
        if self.schedule.on_update(self.clock.time()) {
            self.forwarder.dispatch(updated, self.completions.clone());
        }
        Ok(persisted?)
    }

    async fn append_encrypted(
        &self,
        sample: &ActivitySample,
        date: NaiveDate,
    ) -> Result<(), TrackerError> {
        let plaintext = serde_json::to_vec(sample)?;
        let envelope = self.codec.encrypt(&plaintext)?;
        self.store
            .append_sample(sample.timestamp, date, envelope)
            .await
    }

    /// Seals the previously seen date once a sample of a later date arrives. After a restart the
    /// newest unsealed day in the ledger is treated as the previous date.
    async fn seal_if_new_day(&mut self, date: NaiveDate) {
        let previous = match self.current_date {
            Some(previous) => Some(previous),
            None => match self.store.recent_daily(1).await {
                Ok(recent) => recent
                    .into_iter()
                    .next()
                    .filter(|aggregate| aggregate.merkle_root.is_none())
                    .map(|aggregate| aggregate.date),
                Err(e) => {
                    error!("Failed to look up the last recorded day: {e}");
                    None
                }
            },
        };
        self.current_date = Some(date);

        let Some(previous) = previous.filter(|previous| *previous < date) else {
            return;
        };
        if let Err(e) = self.seal_day(previous).await {
            error!("Failed to seal {previous}: {e}");
        }
    }

    async fn seal_day(&mut self, date: NaiveDate) -> Result<(), TrackerError> {
        let Some(mut aggregate) = self.aggregate_for(date).await? else {
            debug!("Nothing to seal for {date}");
            return Ok(());
        };
        let envelopes = self.store.sample_envelopes_for(date).await?;
        aggregate.merkle_root = day_root(&envelopes);
        if self.today.as_ref().is_some_and(|today| today.date == date) {
            self.today = None;
        }

        self.store.upsert_daily(aggregate.clone()).await?;
        info!(
            "Sealed {} over {} samples, root {}",
            date,
            envelopes.len(),
            aggregate.merkle_root.as_deref().map(short).unwrap_or("none")
        );
        if self.schedule.on_seal(self.clock.time()) {
            self.forwarder.dispatch(aggregate, self.completions.clone());
        }
        Ok(())
    }

    async fn attach_blob_id(&mut self, date: NaiveDate, blob_id: String) -> Result<()> {
        let Some(mut aggregate) = self.aggregate_for(date).await? else {
            warn!("Forwarded {} but no aggregate exists for {}", blob_id, date);
            return Ok(());
        };
        aggregate.blob_id = Some(blob_id);
        self.remember(aggregate.clone());
        self.store.upsert_daily(aggregate).await?;
        Ok(())
    }

    async fn record_screenshot(&mut self, record: ScreenshotHashRecord) -> Result<()> {
        let hash = record.hash.clone();
        self.store.append_screenshot_hash(record).await?;
        self.status
            .send_modify(|status| status.last_screenshot_hash = Some(hash));
        Ok(())
    }

    async fn aggregate_for(
        &self,
        date: NaiveDate,
    ) -> Result<Option<DailyAggregate>, TrackerError> {
        if let Some(today) = self.today.as_ref().filter(|today| today.date == date) {
            return Ok(Some(today.clone()));
        }
        self.store.get_daily(date).await
    }

    fn remember(&mut self, aggregate: DailyAggregate) {
        if self.current_date != Some(aggregate.date) {
            return;
        }
        self.today = Some(aggregate.clone());
        self.status
            .send_modify(|status| status.today = Some(aggregate));
    }
}

impl EventProcessor for LedgerWriter {
    async fn process_next(&mut self, message: RecordEvent) -> Result<()> {
        match message {
            RecordEvent::Activity(sample) => self.record_activity(sample).await,
            RecordEvent::Screenshot(record) => self.record_screenshot(record).await,
            RecordEvent::Forwarded { date, blob_id } => self.attach_blob_id(date, blob_id).await,
        }
    }

    /// Forwards the latest aggregate inline if the schedule held an update back.
    async fn finalize(&mut self) -> Result<()> {
        if !self.schedule.take_pending() {
            return Ok(());
        }
        let Some(aggregate) = self.today.clone() else {
            return Ok(());
        };
        match self.forwarder.forward(&aggregate).await {
            Ok(blob_id) => self.attach_blob_id(aggregate.date, blob_id).await?,
            Err(e) => error!("Final forward of {} failed: {e}", aggregate.date),
        }
        Ok(())
    }
}
