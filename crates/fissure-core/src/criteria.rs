//! Filter criteria and the filtered views they produce.
//!
//! A [`FilterCriteria`] is the normalized form of a client subscription:
//! a set of mission types (trimmed, lower-cased) and an optional Steel
//! Path flag. Every criteria value carries its canonical [`FilterKey`],
//! which groups cache entries and suspended waiters. Two criteria are
//! equal exactly when their keys are equal.

use std::collections::BTreeSet;
use std::sync::Arc;

use fissure_types::{Fissure, FissureIdSet};

/// Canonical key derived from normalized filter criteria.
///
/// Cheap to clone; used as the map key in both the filtered-view cache
/// and the waiter registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FilterKey(Arc<str>);

impl FilterKey {
    /// Derive the key from already-normalized parts.
    ///
    /// Mission types are rendered with `Debug` formatting so quotes and
    /// separators inside a type name are escaped and the mapping stays
    /// injective.
    fn derive(mission_types: &BTreeSet<String>, is_hard: Option<bool>) -> Self {
        let types = if mission_types.is_empty() {
            String::from("*")
        } else {
            format!("{mission_types:?}")
        };
        let hard = is_hard.map_or("*", |flag| if flag { "true" } else { "false" });
        Self(Arc::from(format!("types={types};hard={hard}")))
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for FilterKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized description of a client subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterCriteria {
    mission_types: BTreeSet<String>,
    is_hard: Option<bool>,
    key: FilterKey,
}

impl FilterCriteria {
    /// Build criteria from raw mission types and an optional Steel Path flag.
    ///
    /// Mission types are trimmed and lower-cased; blank entries are
    /// dropped. An empty list matches every mission type and `None`
    /// matches both normal and Steel Path fissures. Never fails.
    pub fn new<I, S>(mission_types: I, is_hard: Option<bool>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mission_types: BTreeSet<String> = mission_types
            .into_iter()
            .map(|t| normalize_mission_type(t.as_ref()))
            .filter(|t| !t.is_empty())
            .collect();
        let key = FilterKey::derive(&mission_types, is_hard);
        Self {
            mission_types,
            is_hard,
            key,
        }
    }

    /// Criteria that match every record.
    pub fn match_all() -> Self {
        Self::new(std::iter::empty::<&str>(), None)
    }

    /// The canonical key for this criteria.
    pub const fn key(&self) -> &FilterKey {
        &self.key
    }

    /// Normalized mission types, in sorted order.
    pub fn mission_types(&self) -> impl Iterator<Item = &str> {
        self.mission_types.iter().map(String::as_str)
    }

    /// The Steel Path flag, if the criteria restrict on it.
    pub const fn is_hard(&self) -> Option<bool> {
        self.is_hard
    }

    /// Whether a record satisfies these criteria.
    pub fn matches(&self, fissure: &Fissure) -> bool {
        let type_ok = self.mission_types.is_empty()
            || self
                .mission_types
                .contains(&normalize_mission_type(&fissure.mission_type));
        let hard_ok = self.is_hard.is_none_or(|flag| fissure.is_hard == flag);
        type_ok && hard_ok
    }

    /// Filter a snapshot's records down to the matching subset.
    ///
    /// Preserves snapshot order. The resulting ID set does not depend on
    /// that order.
    pub fn apply(&self, records: &[Fissure]) -> FilteredView {
        let matching: Vec<Fissure> = records
            .iter()
            .filter(|f| self.matches(f))
            .cloned()
            .collect();
        FilteredView::from_records(matching)
    }
}

fn normalize_mission_type(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// The records matching one filter, plus their ID set.
///
/// Both parts are reference counted so a view can be handed to many
/// waiters and cached without copying records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteredView {
    records: Arc<[Fissure]>,
    ids: Arc<FissureIdSet>,
}

impl FilteredView {
    /// Build a view from an already-filtered list of records.
    pub fn from_records(records: Vec<Fissure>) -> Self {
        let ids: FissureIdSet = records.iter().map(|f| f.id.clone()).collect();
        Self {
            records: Arc::from(records),
            ids: Arc::new(ids),
        }
    }

    /// The matching records, in snapshot order.
    pub fn records(&self) -> &[Fissure] {
        &self.records
    }

    /// Identifiers of the matching records.
    pub fn ids(&self) -> &FissureIdSet {
        &self.ids
    }

    /// Number of matching records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no record matched.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether this view's ID set differs from what a client already holds.
    pub fn differs_from(&self, known: &FissureIdSet) -> bool {
        self.ids.as_ref() != known
    }
}
