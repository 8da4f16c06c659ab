//! Core of the fissure long-poll service.
//!
//! Holds the live fissure snapshot in memory and decides, per request,
//! whether a client's view is out of date. Up-to-date clients are parked
//! in a waiter registry keyed by their canonical filter and released
//! when a new snapshot changes their filtered result, when their timeout
//! fires, or when they disconnect.
//!
//! # Modules
//!
//! - [`criteria`] -- Filter normalization, canonical keys, filtered views
//! - [`snapshot`] -- Epoch-numbered immutable record snapshot
//! - [`cache`] -- Short-lived per-filter view cache
//! - [`registry`] -- Waiter registry and the change dispatcher
//! - [`service`] -- The service object tying the above together
//! - [`config`] -- YAML configuration shared by every crate

pub mod cache;
pub mod config;
pub mod criteria;
pub mod registry;
pub mod service;
pub mod snapshot;

// Re-export primary types for convenience.
pub use config::{ConfigError, FissureConfig};
pub use criteria::{FilterCriteria, FilterKey, FilteredView};
pub use registry::{DispatchReport, WaiterId, WaiterState};
pub use service::{Decision, FissureService, PendingPoll, PollOutcome, ServiceStatus};
pub use snapshot::Snapshot;
