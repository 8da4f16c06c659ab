//! The live record snapshot.
//!
//! A [`Snapshot`] is the whole world as of one upstream fetch. It is
//! never mutated: the service swaps in a new one per fetch, bumping the
//! epoch so cached views computed from an older snapshot are never
//! served against a newer one.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fissure_types::Fissure;

/// An immutable, epoch-numbered list of records.
#[derive(Debug, Clone)]
pub struct Snapshot {
    epoch: u64,
    records: Arc<[Fissure]>,
    applied_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// The initial snapshot before the first fetch completes.
    pub fn empty() -> Self {
        Self {
            epoch: 0,
            records: Arc::from(Vec::new()),
            applied_at: None,
        }
    }

    /// Build the snapshot that replaces `self`.
    ///
    /// Identifiers must be unique within a snapshot, so only the first
    /// record for each ID is kept. Returns the new snapshot and the number
    /// of duplicates dropped.
    pub fn succeed(&self, mut records: Vec<Fissure>) -> (Self, usize) {
        let before = records.len();
        let mut seen = HashSet::with_capacity(before);
        records.retain(|f| seen.insert(f.id.clone()));
        let dropped = before.saturating_sub(records.len());

        let next = Self {
            epoch: self.epoch.saturating_add(1),
            records: Arc::from(records),
            applied_at: Some(Utc::now()),
        };
        (next, dropped)
    }

    /// Monotonic snapshot number; 0 before the first fetch.
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// All records in upstream order.
    pub fn records(&self) -> &[Fissure] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the snapshot holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// When this snapshot was applied, if ever.
    pub const fn applied_at(&self) -> Option<DateTime<Utc>> {
        self.applied_at
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn succeed_bumps_epoch() {
        let first = Snapshot::empty();
        assert_eq!(first.epoch(), 0);
        assert!(first.applied_at().is_none());

        let (second, dropped) = first.succeed(vec![Fissure::new("a", "Survival", false)]);
        assert_eq!(second.epoch(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(dropped, 0);
        assert!(second.applied_at().is_some());
    }

    #[test]
    fn duplicate_ids_keep_first() {
        let (snap, dropped) = Snapshot::empty().succeed(vec![
            Fissure::new("a", "Survival", false),
            Fissure::new("a", "Capture", true),
            Fissure::new("b", "Capture", false),
        ]);
        assert_eq!(dropped, 1);
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.records().first().map(|f| f.mission_type.as_str()), Some("Survival"));
    }

    #[test]
    fn empty_list_is_a_valid_snapshot() {
        let (full, _) = Snapshot::empty().succeed(vec![Fissure::new("a", "Survival", false)]);
        let (empty, dropped) = full.succeed(Vec::new());
        assert!(empty.is_empty());
        assert_eq!(empty.epoch(), 2);
        assert_eq!(dropped, 0);
    }
}
