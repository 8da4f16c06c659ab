//! Long-poll HTTP gateway for the fissure service.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **`GET /fissures`**: long-poll for the fissures matching a mission
//!   type and Steel Path filter. A client sends the IDs it already holds
//!   and is answered as soon as the filtered result differs from them, or
//!   with the current result after a timeout.
//! - **`GET /fissures/current`**: the same filtered read without waiting.
//! - **`GET /status`**: snapshot epoch, record count, waiter and cache
//!   counters.
//!
//! All filtering, caching and waiter bookkeeping lives in
//! [`fissure_core::FissureService`]; handlers only validate query
//! parameters and shape JSON responses.

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;

// Re-export primary types for convenience.
pub use error::ApiError;
pub use router::build_router;
pub use server::{ServerError, bind, serve};
pub use startup::spawn_gateway;
pub use state::AppState;
