//! Short-lived cache of filtered views.
//!
//! Many clients share the same filter, so the filtered subset of the
//! live snapshot is memoized per [`FilterKey`]. Entries expire after a
//! fixed freshness window and are tagged with the snapshot epoch they
//! were computed from; a lookup for a different epoch is a miss even if
//! the entry is young. The whole cache is cleared on every snapshot swap.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::{Duration, Instant};

use crate::criteria::{FilterKey, FilteredView};

/// A cached view plus the bookkeeping needed to judge its freshness.
#[derive(Debug, Clone)]
pub struct CachedView {
    view: FilteredView,
    epoch: u64,
    computed_at: Instant,
}

impl CachedView {
    /// The cached view.
    pub const fn view(&self) -> &FilteredView {
        &self.view
    }

    /// Take the view out of the entry.
    pub fn into_view(self) -> FilteredView {
        self.view
    }

    /// Snapshot epoch the view was computed from.
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Time since the view was computed.
    pub fn age(&self) -> Duration {
        self.computed_at.elapsed()
    }
}

/// Per-filter cache of filtered views.
///
/// Backed by a sharded [`DashMap`], so lookups for unrelated keys do not
/// contend on a single lock.
#[derive(Debug)]
pub struct FilteredViewCache {
    entries: DashMap<FilterKey, CachedView>,
    freshness: Duration,
}

impl FilteredViewCache {
    /// Create an empty cache whose entries stay valid for `freshness`.
    pub fn new(freshness: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            freshness,
        }
    }

    /// The freshness window.
    pub const fn freshness(&self) -> Duration {
        self.freshness
    }

    /// Look up a view computed from snapshot `epoch` within the freshness
    /// window. Anything else is a miss.
    pub fn get(&self, key: &FilterKey, epoch: u64) -> Option<CachedView> {
        let entry = self.entries.get(key)?;
        if entry.epoch == epoch && entry.age() < self.freshness {
            Some(entry.value().clone())
        } else {
            None
        }
    }

    /// Store a view computed from snapshot `epoch`, stamped with the
    /// current time.
    ///
    /// A view from an older epoch never replaces one from a newer epoch.
    pub fn put(&self, key: FilterKey, epoch: u64, view: FilteredView) {
        let fresh = CachedView {
            view,
            epoch,
            computed_at: Instant::now(),
        };
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().epoch <= epoch {
                    occupied.insert(fresh);
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
            }
        }
    }

    /// Drop every entry. Called once per snapshot swap.
    pub fn invalidate_all(&self) {
        self.entries.clear();
    }

    /// Drop entries computed before `cutoff`. Returns how many were removed.
    ///
    /// Best effort: may race a concurrent `put`, in which case the new
    /// entry simply survives until the next pass.
    pub fn evict_older_than(&self, cutoff: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, cached| cached.computed_at >= cutoff);
        before.saturating_sub(self.entries.len())
    }

    /// Number of cached views.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
