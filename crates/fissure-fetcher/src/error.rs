//! Error types for upstream fetches.
//!
//! Errors never reach the core service: the updater logs them and keeps
//! serving the last good snapshot.

/// Errors that can occur while fetching the fissure list.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The request could not be sent or the connection failed mid-way.
    #[error("upstream request failed: {0}")]
    Request(String),

    /// The upstream answered with a non-success status.
    #[error("upstream returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The response body was not a fissure list.
    #[error("upstream response decode failed: {0}")]
    Decode(String),

    /// The HTTP client could not be built.
    #[error("http client setup failed: {0}")]
    Client(String),
}

impl FetchError {
    /// Whether trying again may succeed.
    ///
    /// Connection failures, timeouts, rate limiting, and server errors are
    /// transient. Client errors and malformed bodies are not.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Request(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) | Self::Client(_) => false,
        }
    }
}
