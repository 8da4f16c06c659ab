//! Configuration loading and typed config structures for the fissure service.
//!
//! The configuration lives in `fissure-config.yaml` at the project root.
//! Every field has a default, so a partial file (or no file at all) yields
//! a working configuration. A few values can be overridden from the
//! environment for container deployments.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is not usable.
    #[error("invalid config value: {0}")]
    Invalid(String),
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level service configuration.
///
/// Mirrors the structure of `fissure-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FissureConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: HttpConfig,

    /// Upstream API and refresh schedule.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Long-poll limits and defaults.
    #[serde(default)]
    pub long_poll: LongPollConfig,

    /// Filtered-view cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl FissureConfig {
    /// Load configuration from a YAML file, apply environment overrides,
    /// and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, apply environment
    /// overrides, and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] or [`ConfigError::Invalid`].
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise start from defaults.
    ///
    /// Environment overrides and validation apply in both cases.
    ///
    /// # Errors
    ///
    /// Same as [`from_file`](Self::from_file).
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::from_file(path);
        }
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// - `FISSURE_HOST` overrides `server.host`
    /// - `FISSURE_PORT` overrides `server.port`
    /// - `FISSURE_UPSTREAM_URL` overrides `upstream.base_url`
    /// - `FISSURE_REFRESH_SECS` overrides `upstream.refresh_interval_secs`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a numeric override does not parse.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var("FISSURE_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("FISSURE_PORT") {
            self.server.port = val
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("FISSURE_PORT={val}: {e}")))?;
        }
        if let Ok(val) = std::env::var("FISSURE_UPSTREAM_URL") {
            self.upstream.base_url = val;
        }
        if let Ok(val) = std::env::var("FISSURE_REFRESH_SECS") {
            self.upstream.refresh_interval_secs = val
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("FISSURE_REFRESH_SECS={val}: {e}")))?;
        }
        Ok(())
    }

    /// Reject values that would stall or spin the service.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (
                self.upstream.refresh_interval_secs == 0,
                "upstream.refresh_interval_secs must be > 0",
            ),
            (self.upstream.request_timeout_secs == 0, "upstream.request_timeout_secs must be > 0"),
            (self.upstream.retry.max_attempts == 0, "upstream.retry.max_attempts must be > 0"),
            (self.upstream.retry.multiplier == 0, "upstream.retry.multiplier must be > 0"),
            (self.long_poll.max_timeout_secs == 0, "long_poll.max_timeout_secs must be > 0"),
            (
                self.long_poll.default_timeout_secs > self.long_poll.max_timeout_secs,
                "long_poll.default_timeout_secs must not exceed max_timeout_secs",
            ),
            (self.cache.freshness_ms == 0, "cache.freshness_ms must be > 0"),
            (
                self.cache.eviction_interval_secs == 0,
                "cache.eviction_interval_secs must be > 0",
            ),
        ];
        match checks.iter().find(|(bad, _)| *bad) {
            Some((_, message)) => Err(ConfigError::Invalid((*message).to_owned())),
            None => Ok(()),
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HttpConfig {
    /// Address to bind (e.g. `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Upstream API configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpstreamConfig {
    /// Platform base URL of the world-state API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the fissure list below `base_url`.
    #[serde(default = "default_fissures_path")]
    pub fissures_path: String,

    /// Seconds between scheduled fetches.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Retry behaviour for a single scheduled fetch.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl UpstreamConfig {
    /// Interval between scheduled fetches.
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Per-request timeout.
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            fissures_path: default_fissures_path(),
            refresh_interval_secs: default_refresh_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

/// Exponential backoff settings for upstream fetches.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetryConfig {
    /// Attempts per scheduled fetch, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound on any single delay, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Factor applied to the delay after each failed attempt.
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

/// Long-poll request limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LongPollConfig {
    /// Timeout used when the client does not ask for one, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// Largest timeout a client may ask for, in seconds.
    #[serde(default = "default_max_timeout_secs")]
    pub max_timeout_secs: u64,

    /// Most mission types accepted in one filter.
    #[serde(default = "default_max_mission_types")]
    pub max_mission_types: usize,

    /// Most known IDs accepted in one request.
    #[serde(default = "default_max_known_ids")]
    pub max_known_ids: usize,
}

impl LongPollConfig {
    /// Resolve a client-requested timeout: default when absent, clamped to
    /// `1..=max_timeout_secs` otherwise.
    pub fn timeout_for(&self, requested_secs: Option<u64>) -> Duration {
        let secs = requested_secs
            .unwrap_or(self.default_timeout_secs)
            .clamp(1, self.max_timeout_secs.max(1));
        Duration::from_secs(secs)
    }
}

impl Default for LongPollConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
            max_timeout_secs: default_max_timeout_secs(),
            max_mission_types: default_max_mission_types(),
            max_known_ids: default_max_known_ids(),
        }
    }
}

/// Filtered-view cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    /// How long a computed view may be served, in milliseconds.
    #[serde(default = "default_freshness_ms")]
    pub freshness_ms: u64,

    /// Seconds between housekeeping passes that drop stale views.
    #[serde(default = "default_eviction_interval_secs")]
    pub eviction_interval_secs: u64,
}

impl CacheConfig {
    /// The freshness window.
    pub const fn freshness(&self) -> Duration {
        Duration::from_millis(self.freshness_ms)
    }

    /// Interval between housekeeping passes.
    pub const fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness_ms: default_freshness_ms(),
            eviction_interval_secs: default_eviction_interval_secs(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter (trace, debug, info, warn, error) when `RUST_LOG`
    /// is not set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_host() -> String {
    String::from("0.0.0.0")
}

const fn default_port() -> u16 {
    8080
}

fn default_base_url() -> String {
    String::from("https://api.warframestat.us/pc")
}

fn default_fissures_path() -> String {
    String::from("/fissures")
}

const fn default_refresh_interval_secs() -> u64 {
    600
}

const fn default_request_timeout_secs() -> u64 {
    15
}

const fn default_max_attempts() -> u32 {
    4
}

const fn default_initial_backoff_ms() -> u64 {
    500
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

const fn default_multiplier() -> u32 {
    2
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_max_timeout_secs() -> u64 {
    120
}

const fn default_max_mission_types() -> usize {
    32
}

const fn default_max_known_ids() -> usize {
    1024
}

const fn default_freshness_ms() -> u64 {
    1000
}

const fn default_eviction_interval_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    String::from("info")
}
