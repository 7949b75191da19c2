use anyhow::Result;

use crate::daemon::storage::record_event::RecordEvent;

/// Applies events coming out of the samplers. The ledger is the only implementation today; a
/// remote sink would be another one.
pub trait EventProcessor {
    fn process_next(&mut self, message: RecordEvent) -> impl std::future::Future<Output = Result<()>>;

    /// Called once after the last event, before the loop exits.
    fn finalize(&mut self) -> impl std::future::Future<Output = Result<()>>;
}
