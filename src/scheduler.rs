use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, info, instrument};

use crate::state::DeviceStateStore;

/// Periodically drops device snapshots older than the staleness TTL.
///
/// Reads already filter stale entries, so this pass only reclaims memory
/// held by devices that stopped reporting altogether.
#[instrument(skip(device_store), fields(interval_secs = %interval_secs))]
pub async fn start_prune_scheduler(device_store: Arc<DeviceStateStore>, interval_secs: u64) {
    let mut interval = time::interval(Duration::from_secs(interval_secs));

    info!("Prune scheduler started with {} second interval", interval_secs);

    loop {
        interval.tick().await;
        debug!("Scheduler tick - pruning expired device state");

        let removed = device_store.prune_expired().await;
        if removed > 0 {
            info!("Pruned {} expired device snapshots", removed);
        } else {
            debug!("No expired device snapshots to prune");
        }
    }
}
