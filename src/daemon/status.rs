use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{codec::KeyOrigin, storage::entities::DailyAggregate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingState {
    Stopped,
    Tracking,
}

/// Pushed after every change the processing loop applies. Consumers refresh from it instead of
/// polling the ledger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    pub today: Option<DailyAggregate>,
    pub last_activity_time: Option<DateTime<Utc>>,
    pub last_screenshot_hash: Option<Arc<str>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerStatus {
    pub state: TrackingState,
    pub today: Option<DailyAggregate>,
    pub last_screenshot_hash: Option<Arc<str>>,
    pub last_activity_time: Option<DateTime<Utc>>,
    pub codec_self_test_passed: bool,
    /// `Session` means ciphertexts written by this run cannot be read after a restart.
    pub key_origin: KeyOrigin,
}
