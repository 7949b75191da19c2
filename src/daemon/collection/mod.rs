//! Periodic samplers. Each one owns its own timer and pushes [RecordEvent]s to the tracker,
//! so a slow OS call only delays the sampler that made it.
//!
//! [RecordEvent]: crate::daemon::storage::record_event::RecordEvent

pub mod classify;
pub mod collector;
pub mod idle;
pub mod screenshot;

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

/// Runs a blocking OS query off the async runtime. The capability is shared with later
/// sampler instances, hence the mutex.
pub(crate) async fn run_blocking<C, T, F>(capability: &Arc<Mutex<C>>, query: F) -> Result<T>
where
    C: ?Sized + Send + 'static,
    T: Send + 'static,
    F: FnOnce(&mut C) -> Result<T> + Send + 'static,
{
    let capability = capability.clone();
    tokio::task::spawn_blocking(move || {
        let mut guard = capability
            .lock()
            .map_err(|_| anyhow!("Capability lock was poisoned"))?;
        query(&mut *guard)
    })
    .await?
}
