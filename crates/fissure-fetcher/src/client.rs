//! HTTP client for the `warframestat.us` world-state API.
//!
//! The updater only depends on the [`SnapshotSource`] trait, so tests
//! and alternative backends can stand in for the real API.

use std::future::Future;
use std::sync::Arc;

use fissure_core::config::UpstreamConfig;
use fissure_types::Fissure;

use crate::error::FetchError;

/// Something that can produce a complete fissure list on demand.
pub trait SnapshotSource: Send + Sync {
    /// Fetch the full current list.
    fn fetch(&self) -> impl Future<Output = Result<Vec<Fissure>, FetchError>> + Send;

    /// Human-readable name for logging.
    fn describe(&self) -> &str;
}

impl<T: SnapshotSource> SnapshotSource for Arc<T> {
    fn fetch(&self) -> impl Future<Output = Result<Vec<Fissure>, FetchError>> + Send {
        T::fetch(self)
    }

    fn describe(&self) -> &str {
        T::describe(self)
    }
}

/// Client for `GET {base_url}{fissures_path}`.
#[derive(Debug, Clone)]
pub struct WarframeStatClient {
    client: reqwest::Client,
    url: String,
}

impl WarframeStatClient {
    /// Create a client from the upstream configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the TLS backend cannot be set up.
    pub fn new(config: &UpstreamConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("fissure-watch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self {
            client,
            url: fissures_url(&config.base_url, &config.fissures_path),
        })
    }

    /// The full URL that is polled.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch and decode the fissure list once.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Request`] on transport failure,
    /// [`FetchError::Status`] on a non-success status, or
    /// [`FetchError::Decode`] if the body is not a fissure array.
    pub async fn fetch_fissures(&self) -> Result<Vec<Fissure>, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

impl SnapshotSource for WarframeStatClient {
    fn fetch(&self) -> impl Future<Output = Result<Vec<Fissure>, FetchError>> + Send {
        self.fetch_fissures()
    }

    fn describe(&self) -> &str {
        &self.url
    }
}

/// Join base URL and path with exactly one slash between them.
fn fissures_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_join_handles_slashes() {
        let expected = "https://api.warframestat.us/pc/fissures";
        assert_eq!(fissures_url("https://api.warframestat.us/pc", "/fissures"), expected);
        assert_eq!(fissures_url("https://api.warframestat.us/pc/", "fissures"), expected);
        assert_eq!(fissures_url("https://api.warframestat.us/pc/", "/fissures"), expected);
    }

    #[test]
    fn client_uses_configured_url() {
        let config = UpstreamConfig::default();
        let client = WarframeStatClient::new(&config);
        assert!(client.is_ok_and(|c| c.url() == "https://api.warframestat.us/pc/fissures"));
    }
}
