//! Bounded fixed-delay retry policy for page fetches.

use std::time::Duration;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep this long, then try again.
    RetryAfter(Duration),
    /// The attempt budget is spent.
    GiveUp,
}

/// Retry budget applied around one page fetch: `max_retries` additional
/// attempts beyond the first, with a fixed pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_delay: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// Decide whether a further attempt is allowed after `failed_attempts`
    /// attempts have failed. Pure; the caller owns the sleeping.
    #[must_use]
    pub fn decide(&self, failed_attempts: u32) -> RetryDecision {
        if failed_attempts <= self.max_retries {
            RetryDecision::RetryAfter(self.retry_delay)
        } else {
            RetryDecision::GiveUp
        }
    }

    /// Total attempts this policy permits: the first try plus the retries.
    #[must_use]
    pub fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}
