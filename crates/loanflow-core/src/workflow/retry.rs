//! Bounded retry policy for workflow steps.
//!
//! A step is re-invoked only while it has not produced a checkpoint, so
//! retries never duplicate a completed side effect.

use std::time::Duration;

/// How many times a failing step is attempted and how long to wait between
/// attempts.
///
/// The default policy makes exactly one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Values below 1 act as 1.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Factor applied to the delay after every further failure.
    pub backoff_multiplier: f64,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(200),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Determine whether a retry should be attempted.
    ///
    /// `attempt` is 1-based (first execution is attempt 1).
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts.max(1)
    }

    /// Delay to wait after the failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);
        let millis = self.initial_backoff.as_millis() as f64 * factor;
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}
