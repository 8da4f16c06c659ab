//! Gateway startup helper for embedding in the checker binary.
//!
//! [`spawn_gateway`] binds eagerly, so an unusable address fails startup,
//! then runs the server on a background Tokio task.
//!
//! # Usage
//!
//! ```rust,ignore
//! use fissure_api::startup::spawn_gateway;
//! use fissure_api::state::AppState;
//! use std::sync::Arc;
//!
//! let state = Arc::new(AppState::new(service, config.long_poll.clone()));
//! let handle = spawn_gateway(&config.server, state, shutdown_signal).await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use fissure_core::config::HttpConfig;
use tokio::task::JoinHandle;

use crate::server::{self, ServerError};
use crate::state::AppState;

/// Bind the gateway and serve it on a background task.
///
/// The task ends when `shutdown` completes and in-flight requests drain.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the listener cannot be bound.
pub async fn spawn_gateway<F>(
    config: &HttpConfig,
    state: Arc<AppState>,
    shutdown: F,
) -> Result<JoinHandle<()>, ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = server::bind(config).await?;

    let handle = tokio::spawn(async move {
        if let Err(e) = server::serve(listener, state, shutdown).await {
            tracing::error!(error = %e, "fissure gateway exited with error");
        }
    });

    tracing::info!(
        host = %config.host,
        port = config.port,
        "fissure gateway spawned on background task"
    );

    Ok(handle)
}
