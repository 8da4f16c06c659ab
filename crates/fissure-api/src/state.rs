//! Shared application state for the HTTP gateway.

use std::sync::Arc;

use fissure_core::FissureService;
use fissure_core::config::LongPollConfig;

/// State shared by every handler.
#[derive(Debug)]
pub struct AppState {
    /// The fissure service. The snapshot updater holds another handle.
    pub service: Arc<FissureService>,
    /// Request limits and timeout bounds for long-poll queries.
    pub limits: LongPollConfig,
}

impl AppState {
    /// Create state around an existing service.
    pub const fn new(service: Arc<FissureService>, limits: LongPollConfig) -> Self {
        Self { service, limits }
    }
}
