//! Bounded exponential backoff for one scheduled fetch.
//!
//! Attempt 1: immediate.
//! Attempt n >= 2: `initial * multiplier^(n-2)`, capped at `max`.
//! The caller stops after `max_attempts`.

use std::time::Duration;

use fissure_core::config::RetryConfig;

/// Retry schedule derived from [`RetryConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial: Duration,
    max: Duration,
    multiplier: u32,
}

impl RetryPolicy {
    /// Build a policy. `max_attempts` and `multiplier` are raised to 1.
    pub fn new(max_attempts: u32, initial: Duration, max: Duration, multiplier: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial,
            max,
            multiplier: multiplier.max(1),
        }
    }

    /// Attempts allowed per fetch, including the first.
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait before `attempt` (1-based).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(2);
        let factor = self.multiplier.checked_pow(exponent).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
            config.multiplier,
        )
    }
}
