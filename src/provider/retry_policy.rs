//! Retry policy for provider requests.
//!
//! Implements exponential backoff with configurable parameters.

use crate::config::ProviderSettings;
use crate::error::TelemetryError;
use rand::Rng;
use std::time::Duration;

/// Retry policy implementing exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first one.
    pub max_attempts: u32,
    /// Base delay before the first retry, in seconds.
    pub initial_backoff_secs: f64,
    /// Lower bound for any delay.
    pub min_backoff_secs: f64,
    /// Upper bound for any delay.
    pub max_backoff_secs: f64,
    /// Multiplier applied to backoff after each retry.
    pub backoff_multiplier: f64,
    /// Add up to 10% random jitter on top of each delay.
    pub jitter: bool,
}

impl RetryPolicy {
    /// Create a new RetryPolicy from configuration settings.
    pub fn new(config: &ProviderSettings) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            initial_backoff_secs: config.min_backoff_secs as f64,
            min_backoff_secs: config.min_backoff_secs as f64,
            max_backoff_secs: config.max_backoff_secs as f64,
            backoff_multiplier: config.retry_backoff,
            jitter: false,
        }
    }

    /// Check if an error should be retried after `attempts_made` attempts.
    ///
    /// Returns true if:
    /// - The error is transient (timeouts, refused connections)
    /// - Fewer than `max_attempts` attempts have been made
    pub fn should_retry(&self, error: &TelemetryError, attempts_made: u32) -> bool {
        error.is_retryable() && attempts_made < self.max_attempts
    }

    /// Backoff in seconds before retry number `retry_index` (0-based).
    ///
    /// `initial * multiplier^retry_index`, clamped to `[min_backoff, max_backoff]`.
    pub fn backoff_secs(&self, retry_index: u32) -> f64 {
        let backoff = self.initial_backoff_secs * self.backoff_multiplier.powi(retry_index as i32);
        backoff.max(self.min_backoff_secs).min(self.max_backoff_secs)
    }

    /// Delay to sleep before retry number `retry_index`, jitter included.
    pub fn delay(&self, retry_index: u32) -> Duration {
        let mut secs = self.backoff_secs(retry_index);
        if self.jitter && secs > 0.0 {
            secs = (secs + rand::rng().random_range(0.0..secs * 0.1)).min(self.max_backoff_secs);
        }
        Duration::from_secs_f64(secs)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_secs: 1.0,
            min_backoff_secs: 1.0,
            max_backoff_secs: 30.0,
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }
}
