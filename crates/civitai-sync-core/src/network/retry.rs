//! Retry configuration with exponential backoff and jitter.
//!
//! The wait before retry `n` (0-indexed) is `base_delay * 2^n`, capped at
//! `max_delay`. Optional jitter adds up to 10% on top, still within the cap.

use rand::Rng;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Whether to add random jitter to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: crate::config::NetworkConfig::MAX_RETRIES,
            base_delay: crate::config::NetworkConfig::RETRY_BASE_DELAY,
            max_delay: crate::config::NetworkConfig::RETRY_MAX_DELAY,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of retries.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the maximum delay cap.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enable or disable jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay for a backoff multiplier (1, 2, 4, ...).
    pub fn delay_for_multiplier(&self, multiplier: u32) -> Duration {
        let delay_secs = self.base_delay.as_secs_f64() * f64::from(multiplier.max(1));
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());

        let final_secs = if self.jitter {
            let mut rng = rand::rng();
            let jitter_factor = rng.random_range(0.0..0.1);
            (capped_secs * (1.0 + jitter_factor)).min(self.max_delay.as_secs_f64())
        } else {
            capped_secs
        };

        Duration::from_secs_f64(final_secs)
    }
}

/// Statistics about retries performed by a client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryStats {
    /// Requests sent, including retries.
    pub requests: u32,
    /// Requests that were retries of an earlier failure.
    pub retries: u32,
    /// Every backoff wait, in order.
    pub delays: Vec<Duration>,
    /// Total delay accumulated.
    pub total_delay: Duration,
}

impl RetryStats {
    pub(crate) fn record_delay(&mut self, delay: Duration) {
        self.retries += 1;
        self.delays.push(delay);
        self.total_delay += delay;
    }
}
