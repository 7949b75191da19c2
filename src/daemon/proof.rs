use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::{
    error::TrackerError,
    storage::{ledger::LedgerStore, merkle::day_root},
};

/// Everything the chain submission needs for one day. Submitting is up to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofInputs {
    pub duration_seconds: u64,
    pub timestamp: DateTime<Utc>,
    pub activity_hash: String,
}

/// `None` when `date` has no aggregate, or neither a screenshot hash nor any stored sample to
/// derive the activity hash from.
pub async fn proof_inputs(
    store: &dyn LedgerStore,
    date: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Option<ProofInputs>, TrackerError> {
    let Some(aggregate) = store.get_daily(date).await? else {
        return Ok(None);
    };

    let activity_hash = match store.screenshot_hashes_for(date).await?.pop() {
        Some(record) => Some(record.hash.to_string()),
        None => match aggregate.merkle_root {
            Some(root) => Some(root),
            None => day_root(&store.sample_envelopes_for(date).await?),
        },
    };

    Ok(activity_hash.map(|activity_hash| ProofInputs {
        duration_seconds: (aggregate.total_active_minutes * 60.).round() as u64,
        timestamp: now,
        activity_hash,
    }))
}
