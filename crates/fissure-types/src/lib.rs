//! Shared type definitions for the fissure long-poll service.
//!
//! Record types defined here are deserialized from the upstream
//! `warframestat.us` API and served unchanged to HTTP clients. Types
//! flow downstream to `TypeScript` via `ts-rs` for the web frontend.
//!
//! # Modules
//!
//! - [`ids`] -- Identifier newtype and the ID set used for diffing
//! - [`fissure`] -- The fissure record itself

pub mod fissure;
pub mod ids;

// Re-export all public types at crate root for convenience.
pub use fissure::Fissure;
pub use ids::{FissureId, FissureIdSet};
