//! Bounded exponential-backoff retry policy for downstream calls.
//!
//! The policy is pure arithmetic; the executor owns the actual loop and the
//! sleeping. Attempts are 1-based: attempt 1 is the first call, and
//! [`RetryPolicy::backoff`] gives the pause taken *after* a failed attempt.

use std::time::Duration;

use rand::Rng;

/// Tunable parameters for retrying transient failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. At least 1.
    pub max_attempts: u32,
    /// Pause after the first failed attempt.
    pub base_delay: Duration,
    /// Upper bound on any single pause (before jitter).
    pub max_delay: Duration,
    /// Factor by which the pause grows after each failure.
    pub multiplier: f64,
    /// Extra random pause, as a fraction of the computed delay (0.0 disables).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Whether another attempt is allowed after `attempt` failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts.max(1)
    }

    /// Deterministic pause after failed `attempt`, clamped to `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let millis = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// [`backoff`](Self::backoff) plus a random jitter of up to
    /// `jitter * backoff`.
    pub fn backoff_with_jitter(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        let spread_ms = (delay.as_millis() as f64 * self.jitter.clamp(0.0, 1.0)) as u64;
        if spread_ms == 0 {
            return delay;
        }
        let extra = rand::rng().random_range(0..=spread_ms);
        delay + Duration::from_millis(extra)
    }
}
