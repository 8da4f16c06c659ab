//! Identifier types for fissure records.
//!
//! Upstream identifiers are opaque strings. They are wrapped in
//! [`FissureId`] so a record ID cannot be confused with a mission type
//! or node name at compile time.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Unique identifier of a fissure within a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FissureId(pub String);

/// Set of fissure identifiers.
///
/// Ordered so that serialization is deterministic. Comparisons between
/// two sets are set equality; record insertion order never matters.
pub type FissureIdSet = BTreeSet<FissureId>;

impl FissureId {
    /// Create an identifier from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for FissureId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FissureId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for FissureId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_set_ignores_insertion_order() {
        let a: FissureIdSet = ["b", "a", "c"].into_iter().map(FissureId::from).collect();
        let b: FissureIdSet = ["c", "b", "a"].into_iter().map(FissureId::from).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn id_serializes_as_plain_string() {
        let json = serde_json::to_string(&FissureId::new("abc123")).unwrap_or_default();
        assert_eq!(json, "\"abc123\"");
    }
}
