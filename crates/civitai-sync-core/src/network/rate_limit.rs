//! Single-flight rate gate for remote requests.
//!
//! Every request holds a [`GatePermit`] from the moment it is issued until its
//! response has been consumed. Acquiring a permit waits until `min_interval`
//! has passed since the previous request started, so requests are serialized
//! and spaced no matter how many callers share the client.

use crate::network::retry::{RetryConfig, RetryStats};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::debug;

/// Rate limiter state for one synchronization run.
#[derive(Debug)]
pub struct RateLimiterState {
    /// When the previous request began.
    pub last_request: Option<Instant>,
    /// Minimum spacing between request starts.
    pub min_interval: Duration,
    /// Current backoff multiplier; 1 after any non-retryable outcome.
    pub backoff_multiplier: u32,
    /// Request and retry counters.
    pub stats: RetryStats,
}

impl RateLimiterState {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: None,
            min_interval,
            backoff_multiplier: 1,
            stats: RetryStats::default(),
        }
    }
}

/// Serializing gate in front of the transport.
#[derive(Debug)]
pub struct RateGate {
    state: Mutex<RateLimiterState>,
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            state: Mutex::new(RateLimiterState::new(min_interval)),
        }
    }

    /// Wait for the gate and the minimum interval, then mark a request start.
    pub async fn acquire(&self) -> GatePermit<'_> {
        let mut state = self.state.lock().await;

        if let Some(last) = state.last_request {
            let ready_at = last + state.min_interval;
            let now = Instant::now();
            if ready_at > now {
                debug!("Rate limiting: sleeping for {:?}", ready_at - now);
                tokio::time::sleep_until(ready_at).await;
            }
        }

        state.last_request = Some(Instant::now());
        state.stats.requests += 1;
        GatePermit { state }
    }

    /// Snapshot of the request counters.
    pub async fn stats(&self) -> RetryStats {
        self.state.lock().await.stats.clone()
    }
}

/// Exclusive right to have one request in flight.
#[derive(Debug)]
pub struct GatePermit<'a> {
    state: MutexGuard<'a, RateLimiterState>,
}

impl GatePermit<'_> {
    /// Compute the next backoff wait and double the multiplier.
    ///
    /// A server-requested wait raises the delay, still within `max_delay`,
    /// and moves the multiplier past it so later waits keep growing.
    pub fn next_backoff(&mut self, retry: &RetryConfig, requested: Option<Duration>) -> Duration {
        let mut delay = retry.delay_for_multiplier(self.state.backoff_multiplier);
        if let Some(requested) = requested.map(|r| r.min(retry.max_delay)) {
            if requested > delay {
                delay = requested;
                while self.state.backoff_multiplier < u32::MAX
                    && retry.base_delay.saturating_mul(self.state.backoff_multiplier) < requested
                {
                    self.state.backoff_multiplier = self.state.backoff_multiplier.saturating_mul(2);
                }
            }
        }

        self.state.backoff_multiplier = self.state.backoff_multiplier.saturating_mul(2);
        self.state.stats.record_delay(delay);
        delay
    }

    /// Reset backoff after a successful or terminal outcome.
    pub fn reset_backoff(&mut self) {
        self.state.backoff_multiplier = 1;
    }

    pub fn backoff_multiplier(&self) -> u32 {
        self.state.backoff_multiplier
    }
}
