//! Retry timing for failed dispatch attempts.

use chrono::Duration;

/// Exponential backoff for failed cast jobs.
///
/// A job that fails on attempt `n` is re-queued `delay(n)` into the future
/// until `max_attempts` is reached, at which point it becomes terminally
/// `failed`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay applied after the first failed attempt.
    pub base_delay: Duration,
    /// Growth factor per subsequent attempt.
    pub multiplier: u32,
    /// Claim attempts after which a failing job is given up on.
    pub max_attempts: i32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::minutes(5),
            multiplier: 2,
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next retry after `attempt_count` claim attempts.
    ///
    /// `base_delay * multiplier^(min(attempt_count, max_attempts) - 1)`.
    pub fn delay(&self, attempt_count: i32) -> Duration {
        let capped = attempt_count.clamp(1, self.max_attempts);
        let factor = self.multiplier.saturating_pow((capped - 1) as u32);
        self.base_delay * factor as i32
    }

    /// Whether a job that has used `attempt_count` attempts is out of retries.
    pub fn is_exhausted(&self, attempt_count: i32) -> bool {
        attempt_count >= self.max_attempts
    }
}
