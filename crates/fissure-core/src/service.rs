//! The fissure service: live snapshot, view cache, and waiter registry.
//!
//! [`FissureService`] is constructed once at startup, wrapped in an
//! [`Arc`], and shared by the HTTP handlers and the snapshot updater.
//!
//! # Long-poll flow
//!
//! 1. [`FissureService::resolve_or_suspend`] answers immediately when the
//!    client has no known IDs or its IDs differ from the current view.
//! 2. Otherwise it returns a [`PendingPoll`]. Awaiting
//!    [`PendingPoll::wait`] yields either the new view after a data change
//!    or a freshly recomputed view when the timeout fires.
//! 3. Dropping a [`PendingPoll`] before it resolves cancels it. This is
//!    what happens when an HTTP client disconnects mid-poll.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use fissure_types::{Fissure, FissureIdSet};
use serde::Serialize;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::cache::FilteredViewCache;
use crate::criteria::{FilterCriteria, FilteredView};
use crate::registry::{Admission, DispatchReport, Suspension, WaiterRegistry, WaiterState};
use crate::snapshot::Snapshot;

/// Result of the admission step of a long-poll request.
#[derive(Debug)]
pub enum Decision {
    /// Answer now with this view.
    Immediate(FilteredView),
    /// The client is up to date; wait on the returned handle.
    Suspended(PendingPoll),
}

/// How a long-poll request was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Answered without suspending.
    Immediate(FilteredView),
    /// Suspended, then resolved by a snapshot that changed the result.
    Changed(FilteredView),
    /// Suspended until the timeout; carries a freshly computed view.
    TimedOut(FilteredView),
}

impl PollOutcome {
    /// The view delivered to the client.
    pub const fn view(&self) -> &FilteredView {
        match self {
            Self::Immediate(view) | Self::Changed(view) | Self::TimedOut(view) => view,
        }
    }

    /// Short label used in responses and logs.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Immediate(_) => "immediate",
            Self::Changed(_) => "changed",
            Self::TimedOut(_) => "timeout",
        }
    }
}

/// Read-only counters for the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    /// Epoch of the live snapshot (0 before the first fetch).
    pub snapshot_epoch: u64,
    /// Records in the live snapshot.
    pub records: usize,
    /// When the live snapshot was applied.
    pub last_updated: Option<DateTime<Utc>>,
    /// Suspended long-poll requests.
    pub active_waiters: usize,
    /// Distinct filters with suspended requests.
    pub active_filters: usize,
    /// Canonical keys of those filters, sorted.
    pub filter_keys: Vec<String>,
    /// Filtered views currently cached.
    pub cached_views: usize,
}

/// Owner of the live snapshot and everything derived from it.
#[derive(Debug)]
pub struct FissureService {
    snapshot: RwLock<Arc<Snapshot>>,
    cache: FilteredViewCache,
    registry: WaiterRegistry,
}

impl FissureService {
    /// Create a service with an empty snapshot and the given cache
    /// freshness window.
    pub fn new(cache_freshness: Duration) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Snapshot::empty())),
            cache: FilteredViewCache::new(cache_freshness),
            registry: WaiterRegistry::new(),
        }
    }

    fn live(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// View for `criteria` against the live snapshot, from the cache when
    /// a fresh entry for the live epoch exists.
    fn view_for(&self, criteria: &FilterCriteria) -> FilteredView {
        let snapshot = self.live();
        if let Some(cached) = self.cache.get(criteria.key(), snapshot.epoch()) {
            return cached.into_view();
        }
        self.compute_and_store(criteria, &snapshot)
    }

    /// View for `criteria` recomputed from the live snapshot, bypassing
    /// cache reads.
    fn fresh_view_for(&self, criteria: &FilterCriteria) -> FilteredView {
        let snapshot = self.live();
        self.compute_and_store(criteria, &snapshot)
    }

    fn compute_and_store(&self, criteria: &FilterCriteria, snapshot: &Snapshot) -> FilteredView {
        let view = criteria.apply(snapshot.records());
        self.cache
            .put(criteria.key().clone(), snapshot.epoch(), view.clone());
        view
    }

    /// Filtered read of the live snapshot. Never suspends.
    pub fn get_immediate(&self, criteria: &FilterCriteria) -> FilteredView {
        self.view_for(criteria)
    }

    /// Admit a long-poll request.
    ///
    /// `known_ids` is `None` on a client's first request, which is always
    /// answered immediately.
    pub fn resolve_or_suspend(
        self: &Arc<Self>,
        criteria: FilterCriteria,
        known_ids: Option<FissureIdSet>,
    ) -> Decision {
        let Some(known) = known_ids else {
            return Decision::Immediate(self.view_for(&criteria));
        };

        match self
            .registry
            .suspend_unless_changed(&criteria, known, || self.view_for(&criteria))
        {
            Admission::Immediate(view) => Decision::Immediate(view),
            Admission::Suspended(suspension) => {
                debug!(key = %criteria.key(), waiter = %suspension.id, "long-poll suspended");
                Decision::Suspended(PendingPoll {
                    service: Arc::clone(self),
                    criteria,
                    suspension,
                })
            }
        }
    }

    /// Admit a long-poll request and, if suspended, wait up to `timeout`.
    ///
    /// Dropping the returned future cancels the request.
    pub async fn long_poll(
        self: &Arc<Self>,
        criteria: FilterCriteria,
        known_ids: Option<FissureIdSet>,
        timeout: Duration,
    ) -> PollOutcome {
        match self.resolve_or_suspend(criteria, known_ids) {
            Decision::Immediate(view) => PollOutcome::Immediate(view),
            Decision::Suspended(pending) => pending.wait(timeout).await,
        }
    }

    /// Replace the live snapshot and resolve every waiter whose filtered
    /// result changed.
    ///
    /// An empty list is a valid snapshot. The cache is cleared under the
    /// same write lock as the swap, so no reader sees the new epoch with
    /// views from the old one.
    pub fn apply_new_snapshot(&self, records: Vec<Fissure>) -> DispatchReport {
        let (epoch, count, dropped) = {
            let mut live = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
            let (next, dropped) = live.succeed(records);
            let summary = (next.epoch(), next.len(), dropped);
            *live = Arc::new(next);
            self.cache.invalidate_all();
            summary
        };

        if dropped > 0 {
            warn!(
                epoch,
                dropped,
                "snapshot contained duplicate fissure ids; kept first occurrence"
            );
        }

        let report = self.registry.notify_changed(|criteria| self.view_for(criteria));
        info!(
            epoch,
            records = count,
            keys_evaluated = report.keys_evaluated,
            waiters_resolved = report.waiters_resolved,
            waiters_retained = report.waiters_retained,
            "snapshot applied"
        );
        report
    }

    /// Drop cached views older than the freshness window.
    pub fn evict_stale_views(&self) -> usize {
        let Some(cutoff) = Instant::now().checked_sub(self.cache.freshness()) else {
            return 0;
        };
        let evicted = self.cache.evict_older_than(cutoff);
        if evicted > 0 {
            debug!(evicted, remaining = self.cache.len(), "evicted stale filtered views");
        }
        evicted
    }

    /// Suspended long-poll requests.
    pub fn active_waiter_count(&self) -> usize {
        self.registry.waiter_count()
    }

    /// Records in the live snapshot.
    pub fn current_record_count(&self) -> usize {
        self.live().len()
    }

    /// Counters for the status endpoint.
    pub fn status(&self) -> ServiceStatus {
        let snapshot = self.live();
        ServiceStatus {
            snapshot_epoch: snapshot.epoch(),
            records: snapshot.len(),
            last_updated: snapshot.applied_at(),
            active_waiters: self.registry.waiter_count(),
            active_filters: self.registry.key_count(),
            filter_keys: self
                .registry
                .active_keys()
                .iter()
                .map(|key| key.as_str().to_owned())
                .collect(),
            cached_views: self.cache.len(),
        }
    }
}

/// A suspended long-poll request.
///
/// Resolved exactly once: by a data change, by [`wait`](Self::wait)'s
/// timeout, or by being dropped (client cancellation).
#[derive(Debug)]
pub struct PendingPoll {
    service: Arc<FissureService>,
    criteria: FilterCriteria,
    suspension: Suspension,
}

impl PendingPoll {
    /// Wait for a data change, or fall back to a fresh view after `timeout`.
    pub async fn wait(mut self, timeout: Duration) -> PollOutcome {
        match tokio::time::timeout(timeout, &mut self.suspension.receiver).await {
            Ok(Ok(view)) => PollOutcome::Changed(view),
            // The receiver has completed and must not be polled again.
            Ok(Err(_)) => self.fall_back(),
            Err(_) => self.expire().await,
        }
    }

    /// Cancel the request explicitly. Equivalent to dropping it.
    pub fn cancel(self) {
        drop(self);
    }

    /// Called once the timeout elapsed with the receiver still open.
    async fn expire(&mut self) -> PollOutcome {
        if self.suspension.slot.claim(WaiterState::TimedOut) {
            self.service
                .registry
                .remove(self.criteria.key(), self.suspension.id);
            debug!(key = %self.criteria.key(), waiter = %self.suspension.id, "long-poll timed out");
            return PollOutcome::TimedOut(self.service.fresh_view_for(&self.criteria));
        }

        // A data change claimed the waiter first; its view is on the way.
        match (&mut self.suspension.receiver).await {
            Ok(view) => PollOutcome::Changed(view),
            Err(_) => self.fall_back(),
        }
    }

    /// Answer with the current view when no change view will arrive.
    fn fall_back(&self) -> PollOutcome {
        // Fails if a data change already claimed the slot; either way the
        // waiter is finished.
        self.suspension.slot.claim(WaiterState::TimedOut);
        self.service
            .registry
            .remove(self.criteria.key(), self.suspension.id);
        debug!(
            key = %self.criteria.key(),
            waiter = %self.suspension.id,
            "long-poll sender closed without a view; answering with current view"
        );
        PollOutcome::TimedOut(self.service.fresh_view_for(&self.criteria))
    }
}

impl Drop for PendingPoll {
    fn drop(&mut self) {
        if self.suspension.slot.claim(WaiterState::Cancelled) {
            self.service
                .registry
                .remove(self.criteria.key(), self.suspension.id);
            debug!(
                key = %self.criteria.key(),
                waiter = %self.suspension.id,
                "long-poll client went away; waiter cancelled"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use fissure_types::FissureId;

    use super::*;

    fn service() -> Arc<FissureService> {
        Arc::new(FissureService::new(Duration::from_secs(1)))
    }

    fn id_set(ids: &[&str]) -> FissureIdSet {
        ids.iter().map(|id| FissureId::from(*id)).collect()
    }

    fn survival(id: &str) -> Fissure {
        Fissure::new(id, "Survival", false)
    }

    fn suspended(decision: Decision) -> PendingPoll {
        match decision {
            Decision::Suspended(pending) => pending,
            Decision::Immediate(view) => panic!("expected suspension, got {} records", view.len()),
        }
    }

    #[tokio::test]
    async fn survival_long_poll_scenario() {
        let service = service();
        service.apply_new_snapshot(vec![survival("a")]);
        let criteria = FilterCriteria::new(["survival"], None);

        // First request: no known IDs, answered at once.
        let first = service.resolve_or_suspend(criteria.clone(), None);
        assert!(matches!(&first, Decision::Immediate(v) if v.ids() == &id_set(&["a"])));

        // Second request already has {a}: suspends.
        let pending =
            suspended(service.resolve_or_suspend(criteria.clone(), Some(id_set(&["a"]))));
        assert_eq!(service.active_waiter_count(), 1);

        let waiting = tokio::spawn(pending.wait(Duration::from_secs(30)));
        let report = service.apply_new_snapshot(vec![survival("a"), survival("b")]);
        assert_eq!(report.waiters_resolved, 1);

        let outcome = waiting.await.unwrap();
        assert_eq!(outcome.label(), "changed");
        assert_eq!(outcome.view().ids(), &id_set(&["a", "b"]));
        assert_eq!(service.active_waiter_count(), 0);

        // A different mission type resolves immediately with nothing.
        let other = service.resolve_or_suspend(FilterCriteria::new(["Exterminate"], None), None);
        assert!(matches!(other, Decision::Immediate(v) if v.is_empty()));
    }

    #[tokio::test]
    async fn known_ids_that_differ_answer_immediately() {
        let service = service();
        service.apply_new_snapshot(vec![survival("a"), survival("b")]);
        let outcome = service
            .long_poll(
                FilterCriteria::match_all(),
                Some(id_set(&["a"])),
                Duration::from_secs(30),
            )
            .await;
        assert_eq!(outcome.label(), "immediate");
        assert_eq!(outcome.view().len(), 2);
        assert_eq!(service.active_waiter_count(), 0);
    }

    #[tokio::test]
    async fn empty_known_set_on_empty_snapshot_suspends() {
        let service = service();
        let pending = suspended(
            service.resolve_or_suspend(FilterCriteria::match_all(), Some(FissureIdSet::new())),
        );
        assert_eq!(service.active_waiter_count(), 1);
        drop(pending);
        assert_eq!(service.active_waiter_count(), 0);
    }

    #[tokio::test]
    async fn unchanged_snapshot_keeps_waiter_suspended() {
        let service = service();
        service.apply_new_snapshot(vec![survival("a"), Fissure::new("x", "Capture", false)]);
        let criteria = FilterCriteria::new(["survival"], None);
        let pending = suspended(service.resolve_or_suspend(criteria, Some(id_set(&["a"]))));

        // Capture records change but the survival subset does not.
        let report =
            service.apply_new_snapshot(vec![Fissure::new("y", "Capture", false), survival("a")]);
        assert_eq!(report.waiters_resolved, 0);
        assert_eq!(report.waiters_retained, 1);
        assert_eq!(pending.suspension.slot.state(), WaiterState::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_returns_fresh_view() {
        let service = service();
        service.apply_new_snapshot(vec![survival("a")]);
        let criteria = FilterCriteria::new(["survival"], None);
        let pending = suspended(service.resolve_or_suspend(criteria, Some(id_set(&["a"]))));

        let outcome = pending.wait(Duration::from_secs(30)).await;
        assert_eq!(outcome.label(), "timeout");
        assert_eq!(outcome.view().ids(), &id_set(&["a"]));
        assert_eq!(service.active_waiter_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_reads_latest_snapshot() {
        let service = service();
        service.apply_new_snapshot(vec![survival("a")]);
        let criteria = FilterCriteria::new(["survival"], None);
        let pending =
            suspended(service.resolve_or_suspend(criteria.clone(), Some(id_set(&["a"]))));

        // Swap the snapshot without dispatching: the timeout must still
        // answer from the newest records, not the suspended expectation.
        {
            let mut live = service.snapshot.write().unwrap();
            let (next, _) = live.succeed(vec![survival("a"), survival("c")]);
            *live = Arc::new(next);
        }

        let outcome = pending.wait(Duration::from_millis(100)).await;
        assert_eq!(outcome.label(), "timeout");
        assert_eq!(outcome.view().ids(), &id_set(&["a", "c"]));
    }

    #[tokio::test]
    async fn hard_flag_scenario() {
        let service = service();
        service.apply_new_snapshot(vec![
            Fissure::new("n", "Survival", false),
            Fissure::new("h", "Survival", true),
        ]);
        let hard = service.get_immediate(&FilterCriteria::new(["survival"], Some(true)));
        assert_eq!(hard.ids(), &id_set(&["h"]));
        let either = service.get_immediate(&FilterCriteria::new(["survival"], None));
        assert_eq!(either.ids(), &id_set(&["h", "n"]));
    }

    #[tokio::test]
    async fn get_immediate_is_idempotent() {
        let service = service();
        service.apply_new_snapshot(vec![survival("a"), survival("b")]);
        let criteria = FilterCriteria::new(["survival"], None);
        let first = service.get_immediate(&criteria);
        let second = service.get_immediate(&criteria);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn snapshot_swap_invalidates_cache() {
        let service = service();
        service.apply_new_snapshot(vec![survival("a")]);
        let criteria = FilterCriteria::new(["survival"], None);
        assert_eq!(service.get_immediate(&criteria).len(), 1);
        assert_eq!(service.status().cached_views, 1);

        service.apply_new_snapshot(vec![survival("a"), survival("b")]);
        assert_eq!(service.get_immediate(&criteria).len(), 2);
    }

    #[tokio::test]
    async fn empty_snapshot_resolves_waiters() {
        let service = service();
        service.apply_new_snapshot(vec![survival("a")]);
        let pending = suspended(
            service.resolve_or_suspend(FilterCriteria::match_all(), Some(id_set(&["a"]))),
        );
        let waiting = tokio::spawn(pending.wait(Duration::from_secs(30)));

        service.apply_new_snapshot(Vec::new());
        let outcome = waiting.await.unwrap();
        assert_eq!(outcome.label(), "changed");
        assert!(outcome.view().is_empty());
        assert_eq!(service.current_record_count(), 0);
    }

    #[tokio::test]
    async fn cancel_removes_waiter_without_resolving() {
        let service = service();
        service.apply_new_snapshot(vec![survival("a")]);
        let pending = suspended(
            service.resolve_or_suspend(FilterCriteria::match_all(), Some(id_set(&["a"]))),
        );
        let slot = Arc::clone(&pending.suspension.slot);

        pending.cancel();
        assert_eq!(slot.state(), WaiterState::Cancelled);
        assert_eq!(service.active_waiter_count(), 0);
        assert_eq!(service.status().active_filters, 0);

        let report = service.apply_new_snapshot(vec![survival("b")]);
        assert_eq!(report.keys_evaluated, 0);
    }

    #[tokio::test]
    async fn dropped_long_poll_future_cancels() {
        let service = service();
        service.apply_new_snapshot(vec![survival("a")]);
        let task = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .long_poll(
                        FilterCriteria::match_all(),
                        Some(id_set(&["a"])),
                        Duration::from_mins(1),
                    )
                    .await
            })
        };
        while service.active_waiter_count() == 0 {
            tokio::task::yield_now().await;
        }
        task.abort();
        let _ = task.await;
        assert_eq!(service.active_waiter_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn evict_stale_views_drops_old_entries() {
        let service = service();
        service.apply_new_snapshot(vec![survival("a")]);
        let _ = service.get_immediate(&FilterCriteria::match_all());
        assert_eq!(service.status().cached_views, 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(service.evict_stale_views(), 1);
        assert_eq!(service.status().cached_views, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_polls_all_resolve_on_change() {
        let service = service();
        service.apply_new_snapshot(vec![survival("a")]);

        let mut tasks = Vec::new();
        for i in 0..32 {
            let service = Arc::clone(&service);
            let criteria = if i < 16 {
                FilterCriteria::new(["survival"], None)
            } else {
                FilterCriteria::match_all()
            };
            tasks.push(tokio::spawn(async move {
                service
                    .long_poll(criteria, Some(id_set(&["a"])), Duration::from_secs(30))
                    .await
            }));
        }
        while service.active_waiter_count() < 32 {
            tokio::task::yield_now().await;
        }
        assert_eq!(service.status().active_filters, 2);

        service.apply_new_snapshot(vec![survival("a"), survival("b")]);
        for task in tasks {
            let outcome = task.await.unwrap();
            assert_eq!(outcome.label(), "changed");
            assert_eq!(outcome.view().ids(), &id_set(&["a", "b"]));
        }
        assert_eq!(service.active_waiter_count(), 0);
    }

    #[tokio::test]
    async fn closed_sender_after_claim_answers_with_current_view() {
        let service = service();
        service.apply_new_snapshot(vec![survival("a")]);
        let pending = suspended(
            service.resolve_or_suspend(FilterCriteria::match_all(), Some(id_set(&["a"]))),
        );

        // Claimed for a change, but the view never arrives.
        assert!(pending.suspension.slot.claim(WaiterState::Changed));
        pending.suspension.slot.close();

        let outcome = pending.wait(Duration::from_mins(1)).await;
        assert_eq!(outcome.label(), "timeout");
        assert_eq!(outcome.view().ids(), &id_set(&["a"]));
        assert_eq!(service.active_waiter_count(), 0);
    }

    #[tokio::test]
    async fn closed_sender_while_pending_removes_waiter() {
        let service = service();
        service.apply_new_snapshot(vec![survival("a")]);
        let pending = suspended(
            service.resolve_or_suspend(FilterCriteria::match_all(), Some(id_set(&["a"]))),
        );
        pending.suspension.slot.close();

        let outcome = pending.wait(Duration::from_mins(1)).await;
        assert_eq!(outcome.label(), "timeout");
        assert_eq!(service.active_waiter_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn waiters_admitted_during_dispatch_are_never_stale() {
        let service = service();
        service.apply_new_snapshot(vec![survival("s0")]);

        let mut admitters = Vec::new();
        for i in 0..8 {
            let service = Arc::clone(&service);
            let criteria = if i < 4 {
                FilterCriteria::new(["survival"], None)
            } else {
                FilterCriteria::match_all()
            };
            admitters.push(tokio::spawn(async move {
                let mut held = Vec::new();
                for _ in 0..200 {
                    let known = service.get_immediate(&criteria).ids().clone();
                    if let Decision::Suspended(pending) =
                        service.resolve_or_suspend(criteria.clone(), Some(known.clone()))
                    {
                        held.push((known, pending));
                    }
                    tokio::task::yield_now().await;
                }
                held
            }));
        }

        let applier = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                for round in 0..50 {
                    for hard in [false, true] {
                        service.apply_new_snapshot(vec![
                            survival(&format!("s{round}")),
                            Fissure::new(format!("e{round}-{hard}"), "Exterminate", hard),
                        ]);
                        tokio::task::yield_now().await;
                    }
                }
            })
        };

        let mut held = Vec::new();
        for admitter in admitters {
            held.extend(admitter.await.unwrap());
        }
        applier.await.unwrap();

        let mut still_pending = 0_usize;
        for (known, pending) in &held {
            if pending.suspension.slot.state() == WaiterState::Pending {
                let current = service.get_immediate(&pending.criteria);
                assert_eq!(
                    known,
                    current.ids(),
                    "waiter {} kept a stale known set",
                    pending.suspension.id
                );
                still_pending = still_pending.saturating_add(1);
            }
        }
        assert_eq!(service.active_waiter_count(), still_pending);

        drop(held);
        assert_eq!(service.active_waiter_count(), 0);
    }
}
