//! The fissure record served to clients.
//!
//! Field names follow the upstream `warframestat.us` JSON (camelCase).
//! Records are immutable once received: a new fetch replaces the whole
//! snapshot rather than mutating records in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::FissureId;

/// A single void fissure as reported by the upstream API.
///
/// Unknown upstream fields are ignored and missing ones fall back to
/// their defaults, so schema drift upstream never fails a whole fetch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
#[ts(export, export_to = "bindings/")]
#[allow(clippy::struct_excessive_bools)]
pub struct Fissure {
    /// Upstream identifier, unique within a snapshot.
    pub id: FissureId,
    /// When the fissure opened.
    pub activation: Option<DateTime<Utc>>,
    /// Human-readable time since activation (e.g. `-12m 3s`).
    pub start_string: String,
    /// When the fissure closes.
    pub expiry: Option<DateTime<Utc>>,
    /// Whether the fissure is currently open.
    pub active: bool,
    /// Star-chart node, e.g. `Hepit (Void)`.
    pub node: String,
    /// Mission type display name, e.g. `Capture`.
    pub mission_type: String,
    /// Mission type key as used by the game.
    pub mission_key: String,
    /// Enemy faction display name.
    pub enemy: String,
    /// Enemy faction key.
    pub enemy_key: String,
    /// Star-chart node key.
    pub node_key: String,
    /// Relic tier, e.g. `Lith`.
    pub tier: String,
    /// Relic tier as a number (1 = Lith).
    pub tier_num: u32,
    /// Whether the fissure has already expired.
    pub expired: bool,
    /// Human-readable time until expiry.
    pub eta: String,
    /// Void storm (Railjack) fissure.
    pub is_storm: bool,
    /// Steel Path fissure.
    pub is_hard: bool,
}

impl Fissure {
    /// Build a minimal record with only the fields used for filtering set.
    ///
    /// Intended for tests and fixtures; real records come from the
    /// upstream API with every field populated.
    pub fn new(id: impl Into<FissureId>, mission_type: impl Into<String>, is_hard: bool) -> Self {
        Self {
            id: id.into(),
            mission_type: mission_type.into(),
            is_hard,
            active: true,
            ..Self::default()
        }
    }
}
