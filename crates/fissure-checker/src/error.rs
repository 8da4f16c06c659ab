//! Error types for the checker binary.

/// Top-level error for the checker binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum CheckerError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: fissure_core::ConfigError,
    },

    /// The upstream client could not be built or the fetch failed.
    #[error("fetch error: {source}")]
    Fetch {
        /// The underlying fetch error.
        #[from]
        source: fissure_fetcher::FetchError,
    },

    /// The HTTP gateway failed to bind.
    #[error("gateway error: {source}")]
    Gateway {
        /// The underlying server error.
        #[from]
        source: fissure_api::ServerError,
    },

    /// Writing `fetch-once` output failed.
    #[error("output error: {source}")]
    Output {
        /// The underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// Installing the Ctrl-C handler failed.
    #[error("signal error: {message}")]
    Signal {
        /// Description of the failure.
        message: String,
    },

    /// A background task panicked.
    #[error("task error: {message}")]
    Task {
        /// Description of the failure.
        message: String,
    },
}
