//! Lifecycle of the tracking pipeline and the query surface handed to the outside world.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{NaiveDate, TimeDelta};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    utils::clock::Clock,
    window_api::{ScreenCapturer, WindowManager},
};

use super::{
    aggregation::Aggregator,
    codec::{Codec, KeyOrigin},
    collection::{collector::DataCollectionModule, idle::IdleEvaluator, screenshot::ScreenshotModule},
    config::TrackerConfig,
    error::TrackerError,
    forward::{BlobSink, ForwardSchedule, Forwarder},
    processing::{ledger_writer::LedgerWriter, ProcessingModule},
    proof::{self, ProofInputs},
    status::{StatusUpdate, TrackerStatus, TrackingState},
    storage::{entities::DailyAggregate, ledger::LedgerStore, record_event::RecordEvent},
};

const EVENT_BUFFER: usize = 64;

/// OS capabilities the samplers poll.
pub struct Capabilities {
    pub window_manager: Box<dyn WindowManager>,
    pub screen_capturer: Box<dyn ScreenCapturer>,
}

/// Starts and stops the samplers and answers status queries. Everything the samplers produce
/// goes to the [ProcessingModule] returned next to the tracker, which must be run by the caller.
pub struct Tracker {
    config: TrackerConfig,
    store: Arc<dyn LedgerStore>,
    window_manager: Arc<Mutex<Box<dyn WindowManager>>>,
    screen_capturer: Arc<Mutex<Box<dyn ScreenCapturer>>>,
    events: mpsc::Sender<RecordEvent>,
    status: watch::Receiver<StatusUpdate>,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
    /// Present while tracking. Cancelling it stops both samplers.
    samplers: Mutex<Option<CancellationToken>>,
    codec_self_test_passed: bool,
    key_origin: KeyOrigin,
}

impl Tracker {
    pub fn new(
        config: TrackerConfig,
        store: Arc<dyn LedgerStore>,
        codec: Arc<Codec>,
        sink: Arc<dyn BlobSink>,
        capabilities: Capabilities,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
    ) -> (Self, ProcessingModule<LedgerWriter>) {
        let codec_self_test_passed = codec.self_test();
        if codec_self_test_passed {
            info!("Codec self-test passed");
        } else {
            error!("Codec self-test failed, samples may not be recoverable");
        }
        let key_origin = codec.key_origin();
        if key_origin == KeyOrigin::Session {
            warn!("Running with a session-only key, the ledger will not be readable after restart");
        }

        let (events, receiver) = mpsc::channel(EVENT_BUFFER);
        let (status_sender, status) = watch::channel(StatusUpdate::default());

        let writer = LedgerWriter::new(
            store.clone(),
            codec.clone(),
            Aggregator::from_interval(config.sample_interval),
            Forwarder::new(codec, sink),
            ForwardSchedule::new(config.forward_policy, config.forward_interval),
            events.clone(),
            status_sender,
            clock.clone(),
        );
        let processor = ProcessingModule::new(receiver, writer, shutdown.clone());

        let tracker = Self {
            config,
            store,
            window_manager: Arc::new(Mutex::new(capabilities.window_manager)),
            screen_capturer: Arc::new(Mutex::new(capabilities.screen_capturer)),
            events,
            status,
            clock,
            shutdown,
            samplers: Mutex::new(None),
            codec_self_test_passed,
            key_origin,
        };
        (tracker, processor)
    }

    /// Starts both samplers. Returns `false` if tracking was already running.
    pub fn start(&self) -> bool {
        let mut samplers = self.samplers.lock().unwrap_or_else(PoisonError::into_inner);
        if samplers.is_some() {
            debug!("Start requested while already tracking");
            return false;
        }
        let token = self.shutdown.child_token();

        let idle_threshold = TimeDelta::from_std(self.config.idle_threshold).unwrap_or(TimeDelta::MAX);
        let collector = DataCollectionModule::new(
            self.events.clone(),
            self.window_manager.clone(),
            token.clone(),
            IdleEvaluator::new(idle_threshold, self.clock.time()),
            self.config.sample_interval,
            self.clock.clone(),
        );
        let screenshots = ScreenshotModule::new(
            self.events.clone(),
            self.screen_capturer.clone(),
            token.clone(),
            self.config.screenshot_interval,
            self.clock.clone(),
        );

        tokio::spawn(async move {
            if let Err(e) = collector.run().await {
                error!("Activity sampler stopped with an error {e:?}");
            }
        });
        tokio::spawn(async move {
            if let Err(e) = screenshots.run().await {
                error!("Screenshot sampler stopped with an error {e:?}");
            }
        });

        *samplers = Some(token);
        info!("Tracking started");
        true
    }

    /// Stops future sampler ticks. In-flight captures and forwards still complete. Returns
    /// `false` if tracking was already stopped.
    pub fn stop(&self) -> bool {
        let token = self
            .samplers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match token {
            Some(token) => {
                token.cancel();
                info!("Tracking stopped");
                true
            }
            None => {
                debug!("Stop requested while already stopped");
                false
            }
        }
    }

    pub fn state(&self) -> TrackingState {
        let samplers = self.samplers.lock().unwrap_or_else(PoisonError::into_inner);
        match samplers.as_ref() {
            Some(token) if !token.is_cancelled() => TrackingState::Tracking,
            _ => TrackingState::Stopped,
        }
    }

    pub async fn status(&self) -> Result<TrackerStatus, TrackerError> {
        let update = self.status.borrow().clone();
        let today_date = self.clock.today();

        let today = match update.today.filter(|today| today.date == today_date) {
            Some(today) => Some(today),
            None => self.store.get_daily(today_date).await?,
        };
        let last_screenshot_hash = match update.last_screenshot_hash {
            Some(hash) => Some(hash),
            None => self
                .store
                .last_screenshot_hash()
                .await?
                .map(|record| record.hash),
        };

        Ok(TrackerStatus {
            state: self.state(),
            today,
            last_screenshot_hash,
            last_activity_time: update.last_activity_time,
            codec_self_test_passed: self.codec_self_test_passed,
            key_origin: self.key_origin,
        })
    }

    /// The `limit` most recent aggregates, newest first.
    pub async fn history(&self, limit: usize) -> Result<Vec<DailyAggregate>, TrackerError> {
        self.store.recent_daily(limit).await
    }

    pub async fn proof_inputs(&self, date: NaiveDate) -> Result<Option<ProofInputs>, TrackerError> {
        proof::proof_inputs(&*self.store, date, self.clock.time()).await
    }

    /// Notified after every aggregate update and every recorded hash.
    pub fn subscribe(&self) -> watch::Receiver<StatusUpdate> {
        self.status.clone()
    }
}
