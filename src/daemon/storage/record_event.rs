use chrono::NaiveDate;

use super::entities::{ActivitySample, ScreenshotHashRecord};

/// Everything the tracker's processing loop reacts to. Both samplers and the forwarder's
/// completions travel through the same channel so a single owner applies them in order.
#[derive(Debug, Clone)]
pub enum RecordEvent {
    Activity(ActivitySample),
    Screenshot(ScreenshotHashRecord),
    /// The blob sink accepted the aggregate of `date` under `blob_id`.
    Forwarded { date: NaiveDate, blob_id: String },
}
