//! Retry policy for search jobs.

use std::time::Duration;

use fynelo_queue::{SearchJob, DEFAULT_MAX_RETRIES};

/// Exponential backoff between attempts of the same job.
///
/// Attempts are 1-indexed; the wait after attempt `n` is
/// `min(base_delay * 2^(n-1), max_delay)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempt budget for records stored without one
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Attempt budget for `job`: its own `max_retries`, or the policy default.
    pub fn attempts_for(&self, job: &SearchJob) -> u32 {
        match job.max_retries {
            0 => self.max_attempts.max(1),
            n => n,
        }
    }

    /// Calculate delay after a given failed attempt (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        // 2^31 already dwarfs any sane cap; clamp the exponent.
        let factor = 1u32 << (attempt - 1).min(31);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Check if another attempt is allowed after `attempt` attempts.
    pub fn should_retry(&self, attempt: u32, budget: u32) -> bool {
        attempt < budget
    }
}
