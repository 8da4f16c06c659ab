//! Scheduled snapshot refresh.
//!
//! [`SnapshotUpdater`] fetches the upstream list on a fixed interval
//! (first fetch immediately), retries transient failures with
//! exponential backoff, and hands each successful list to
//! [`FissureService::apply_new_snapshot`]. A fetch that still fails
//! after its retries is logged and skipped; the previous snapshot and
//! every suspended client stay in place.

use std::sync::Arc;
use std::time::Duration;

use fissure_core::config::UpstreamConfig;
use fissure_core::{DispatchReport, FissureService};
use fissure_types::Fissure;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::backoff::RetryPolicy;
use crate::client::SnapshotSource;
use crate::error::FetchError;

/// Periodic fetch-and-apply loop.
#[derive(Debug)]
pub struct SnapshotUpdater<S> {
    source: S,
    service: Arc<FissureService>,
    policy: RetryPolicy,
    interval: Duration,
}

impl<S: SnapshotSource + 'static> SnapshotUpdater<S> {
    /// Create an updater using the schedule from `config`.
    pub fn new(source: S, service: Arc<FissureService>, config: &UpstreamConfig) -> Self {
        Self::with_schedule(
            source,
            service,
            RetryPolicy::from(&config.retry),
            config.refresh_interval(),
        )
    }

    /// Create an updater with an explicit retry policy and interval.
    pub const fn with_schedule(
        source: S,
        service: Arc<FissureService>,
        policy: RetryPolicy,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            service,
            policy,
            interval,
        }
    }

    /// Fetch once, retrying transient failures per the policy.
    ///
    /// # Errors
    ///
    /// Returns the last error if every attempt failed, or the first
    /// non-retryable error.
    pub async fn fetch_with_retry(&self) -> Result<Vec<Fissure>, FetchError> {
        let mut attempt: u32 = 1;
        loop {
            let delay = self.policy.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self.source.fetch().await {
                Ok(records) => {
                    if attempt > 1 {
                        info!(source = self.source.describe(), attempt, "upstream fetch recovered");
                    }
                    return Ok(records);
                }
                Err(e) if e.is_retryable() && attempt < self.policy.max_attempts() => {
                    warn!(
                        source = self.source.describe(),
                        attempt,
                        max_attempts = self.policy.max_attempts(),
                        error = %e,
                        "upstream fetch failed; retrying"
                    );
                    attempt = attempt.saturating_add(1);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Fetch (with retries) and apply the result as the new snapshot.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; the live snapshot is left untouched.
    pub async fn refresh_once(&self) -> Result<DispatchReport, FetchError> {
        let records = self.fetch_with_retry().await?;
        Ok(self.service.apply_new_snapshot(records))
    }

    /// Run the refresh loop until `shutdown` turns `true` or its sender
    /// is dropped. An in-flight fetch is abandoned on shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            source = self.source.describe(),
            interval_secs = self.interval.as_secs(),
            max_attempts = self.policy.max_attempts(),
            "snapshot updater started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = wait_for_shutdown(&mut shutdown) => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                () = wait_for_shutdown(&mut shutdown) => break,
                result = self.refresh_once() => match result {
                    Ok(report) => debug!(?report, "scheduled refresh complete"),
                    Err(e) => warn!(
                        error = %e,
                        kept_records = self.service.current_record_count(),
                        "upstream fetch failed; keeping previous snapshot"
                    ),
                },
            }
        }

        info!("snapshot updater stopped");
    }

    /// Spawn [`run`](Self::run) on a background task.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

/// Resolve once the shutdown flag is `true` or the sender is gone.
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
