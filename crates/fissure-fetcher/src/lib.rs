//! Upstream fetcher for the fissure service.
//!
//! Polls the `warframestat.us` fissure endpoint on a timer and feeds each
//! complete list into [`fissure_core::FissureService`]. Fetch failures
//! are retried with bounded exponential backoff and otherwise absorbed
//! here: the core only ever sees concrete snapshots.

pub mod backoff;
pub mod client;
pub mod error;
pub mod updater;

pub use backoff::RetryPolicy;
pub use client::{SnapshotSource, WarframeStatClient};
pub use error::FetchError;
pub use updater::{SnapshotUpdater, wait_for_shutdown};
