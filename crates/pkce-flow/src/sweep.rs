//! Background eviction of expired flow state and revocation records
//!
//! Spawns a periodic task that purges expired correlation bindings and
//! revocation records whose credential has expired. Correctness never depends
//! on it; it only bounds memory between lazy evictions.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::revocation::RevocationRegistry;
use crate::store::CorrelationStore;

/// Spawn a background task that sweeps every `interval`.
///
/// Returns a `JoinHandle` for the spawned task; abort it on shutdown.
pub fn spawn_sweep_task(
    store: Arc<CorrelationStore>,
    registry: Arc<RevocationRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip the immediate first tick, nothing has expired yet
        ticker.tick().await;

        loop {
            ticker.tick().await;
            sweep_cycle(&store, &registry).await;
        }
    })
}

/// Run one sweep. Returns (flow states evicted, revocation records purged).
async fn sweep_cycle(store: &CorrelationStore, registry: &RevocationRegistry) -> (usize, usize) {
    let states = store.purge_expired().await;
    let records = registry.purge_expired().await;
    if states > 0 || records > 0 {
        debug!(states, records, "sweep evicted expired entries");
    }
    (states, records)
}
