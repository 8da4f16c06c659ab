//! Axum router construction for the fissure gateway.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::Method;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// How long browsers may cache a CORS preflight answer.
const CORS_MAX_AGE: Duration = Duration::from_hours(1);

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /fissures` -- long-poll for a filtered list
/// - `GET /fissures/current` -- filtered list, never waits
/// - `GET /status` -- snapshot and waiter counters
///
/// CORS allows any origin and header without credentials, so browser
/// dashboards on other hosts can poll directly.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .expose_headers(Any)
        .max_age(CORS_MAX_AGE);

    Router::new()
        .route("/fissures", get(handlers::poll_fissures))
        .route("/fissures/current", get(handlers::current_fissures))
        .route("/status", get(handlers::status))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
