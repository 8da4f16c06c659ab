//! Periodic eviction of stale filtered views.
//!
//! The cache is cleared on every snapshot swap, so this only bounds
//! memory between swaps when many distinct filters are read once.

use std::sync::Arc;
use std::time::Duration;

use fissure_core::FissureService;
use fissure_fetcher::wait_for_shutdown;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Evict stale cache entries every `every` until shutdown.
pub async fn run(
    service: Arc<FissureService>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = wait_for_shutdown(&mut shutdown) => break,
            _ = ticker.tick() => {
                let evicted = service.evict_stale_views();
                if evicted > 0 {
                    debug!(evicted, "evicted stale filtered views");
                }
            }
        }
    }

    info!("cache housekeeping stopped");
}
