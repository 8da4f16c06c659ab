//! Registry of suspended long-poll requests.
//!
//! Waiters are grouped into buckets by [`FilterKey`]. Each waiter holds
//! the ID set its client already has and a one-shot [`ResolutionSlot`].
//! A waiter is resolved at most once, by whichever of data change,
//! timeout, or cancellation claims its slot first; the other paths see
//! the claim fail and back off.
//!
//! # Locking
//!
//! Buckets live in a sharded [`DashMap`]. Both admission
//! ([`WaiterRegistry::suspend_unless_changed`]) and dispatch
//! ([`WaiterRegistry::notify_changed`]) hold the bucket's entry lock
//! while they read the current view and act on it. A request deciding
//! to suspend therefore either completes before the dispatcher visits
//! its key (and is diffed against the new snapshot) or starts after it
//! (and reads the new snapshot itself). No waiter is skipped.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use fissure_types::FissureIdSet;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::criteria::{FilterCriteria, FilterKey, FilteredView};

/// Identifier of a suspended request, unique for the registry's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WaiterId(u64);

impl core::fmt::Display for WaiterId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// Lifecycle of a waiter. Only `Pending` can transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WaiterState {
    /// Suspended, awaiting a resolution source.
    Pending = 0,
    /// Resolved by a data change.
    Changed = 1,
    /// Resolved by its timeout firing.
    TimedOut = 2,
    /// Removed because the client went away.
    Cancelled = 3,
}

impl From<u8> for WaiterState {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::Changed,
            2 => Self::TimedOut,
            3 => Self::Cancelled,
            _ => Self::Pending,
        }
    }
}

/// Set-once resolution handle shared by the registry and the request.
#[derive(Debug)]
pub struct ResolutionSlot {
    state: AtomicU8,
    sender: Mutex<Option<oneshot::Sender<FilteredView>>>,
}

impl ResolutionSlot {
    fn new() -> (Arc<Self>, oneshot::Receiver<FilteredView>) {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Self {
            state: AtomicU8::new(WaiterState::Pending as u8),
            sender: Mutex::new(Some(tx)),
        });
        (slot, rx)
    }

    /// Current state.
    pub fn state(&self) -> WaiterState {
        WaiterState::from(self.state.load(Ordering::Acquire))
    }

    /// Move from `Pending` to `to`. Returns `false` if another path
    /// already claimed the slot.
    pub fn claim(&self, to: WaiterState) -> bool {
        self.state
            .compare_exchange(
                WaiterState::Pending as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Claim the slot for a data change and hand `view` to the request.
    ///
    /// Returns `false` without side effects if the slot was already
    /// claimed. A receiver that has gone away is not an error.
    fn deliver(&self, view: FilteredView) -> bool {
        if !self.claim(WaiterState::Changed) {
            return false;
        }
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = sender {
            // The request may have been dropped between the claim and now.
            let _ = tx.send(view);
        }
        true
    }

    /// Drop the sender without delivering a view.
    #[cfg(test)]
    pub(crate) fn close(&self) {
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
    }
}

/// Registration returned to a request that was suspended.
#[derive(Debug)]
pub struct Suspension {
    /// The waiter's identifier, needed to remove it later.
    pub id: WaiterId,
    /// Shared resolution state.
    pub slot: Arc<ResolutionSlot>,
    /// Receives the new view if a data change resolves the waiter.
    pub receiver: oneshot::Receiver<FilteredView>,
}

/// Outcome of trying to suspend a request.
#[derive(Debug)]
pub enum Admission {
    /// The client's IDs are already out of date; answer now.
    Immediate(FilteredView),
    /// The client is up to date; it now waits in the registry.
    Suspended(Suspension),
}

/// Totals from one dispatcher pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DispatchReport {
    /// Filter keys that had waiters and were recomputed.
    pub keys_evaluated: usize,
    /// Waiters resolved because their filtered IDs changed.
    pub waiters_resolved: usize,
    /// Waiters left suspended because nothing changed for them.
    pub waiters_retained: usize,
}

#[derive(Debug)]
struct Waiter {
    id: WaiterId,
    expected: FissureIdSet,
    slot: Arc<ResolutionSlot>,
    created_at: Instant,
}

#[derive(Debug)]
struct Bucket {
    criteria: FilterCriteria,
    waiters: Vec<Waiter>,
}

/// Suspended long-poll requests grouped by filter key.
#[derive(Debug, Default)]
pub struct WaiterRegistry {
    buckets: DashMap<FilterKey, Bucket>,
    next_id: AtomicU64,
}

impl WaiterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide between answering now and suspending, atomically with
    /// respect to dispatch for the same key.
    ///
    /// `current` is evaluated while the key's bucket is locked and must
    /// produce the view for the live snapshot. If its IDs equal `known`,
    /// a waiter is registered with `known` as its expectation; otherwise
    /// the view is returned for an immediate answer.
    pub fn suspend_unless_changed<F>(
        &self,
        criteria: &FilterCriteria,
        known: FissureIdSet,
        current: F,
    ) -> Admission
    where
        F: FnOnce() -> FilteredView,
    {
        let entry = self.buckets.entry(criteria.key().clone());
        let view = current();
        if view.differs_from(&known) {
            return Admission::Immediate(view);
        }

        let id = WaiterId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (slot, receiver) = ResolutionSlot::new();
        let waiter = Waiter {
            id,
            expected: known,
            slot: Arc::clone(&slot),
            created_at: Instant::now(),
        };
        entry
            .or_insert_with(|| Bucket {
                criteria: criteria.clone(),
                waiters: Vec::new(),
            })
            .waiters
            .push(waiter);

        Admission::Suspended(Suspension { id, slot, receiver })
    }

    /// Remove a waiter. Drops the bucket if it becomes empty.
    ///
    /// Returns whether the waiter was still registered. Removing a waiter
    /// twice is harmless.
    pub fn remove(&self, key: &FilterKey, id: WaiterId) -> bool {
        let Entry::Occupied(mut occupied) = self.buckets.entry(key.clone()) else {
            return false;
        };
        let waiters = &mut occupied.get_mut().waiters;
        let before = waiters.len();
        waiters.retain(|w| w.id != id);
        let removed = waiters.len() != before;
        if waiters.is_empty() {
            occupied.remove();
        }
        removed
    }

    /// Recompute each active key's view and resolve every waiter whose
    /// expectation no longer matches.
    ///
    /// `current` is called once per key, with that key's bucket locked.
    /// Waiters already claimed by a timeout or cancellation are pruned.
    pub fn notify_changed<F>(&self, mut current: F) -> DispatchReport
    where
        F: FnMut(&FilterCriteria) -> FilteredView,
    {
        let keys: Vec<FilterKey> = self.buckets.iter().map(|b| b.key().clone()).collect();
        let mut report = DispatchReport::default();

        for key in keys {
            // The bucket may have emptied since the key list was taken.
            let Entry::Occupied(mut occupied) = self.buckets.entry(key) else {
                continue;
            };
            let bucket = occupied.get_mut();
            let view = current(&bucket.criteria);
            report.keys_evaluated = report.keys_evaluated.saturating_add(1);

            bucket.waiters.retain(|waiter| {
                if waiter.slot.state() != WaiterState::Pending {
                    return false;
                }
                if !view.differs_from(&waiter.expected) {
                    return true;
                }
                if waiter.slot.deliver(view.clone()) {
                    report.waiters_resolved = report.waiters_resolved.saturating_add(1);
                    debug!(
                        key = %bucket.criteria.key(),
                        waiter = %waiter.id,
                        waited = ?waiter.created_at.elapsed(),
                        records = view.len(),
                        "waiter resolved by data change"
                    );
                }
                false
            });

            report.waiters_retained = report
                .waiters_retained
                .saturating_add(bucket.waiters.len());
            if bucket.waiters.is_empty() {
                occupied.remove();
            }
        }

        report
    }

    /// Number of suspended waiters across all keys.
    pub fn waiter_count(&self) -> usize {
        self.buckets
            .iter()
            .fold(0_usize, |acc, b| acc.saturating_add(b.waiters.len()))
    }

    /// Number of filter keys with at least one waiter.
    pub fn key_count(&self) -> usize {
        self.buckets.len()
    }

    /// Filter keys that currently have waiters, sorted.
    pub fn active_keys(&self) -> Vec<FilterKey> {
        let mut keys: Vec<FilterKey> = self.buckets.iter().map(|b| b.key().clone()).collect();
        keys.sort();
        keys
    }
}
