//! Retry policy shared by listing and detail fetches
//!
//! The policy is stateless: callers pass the number of attempts already made and
//! the kind of failure, and get back either a delay or a verdict to give up. The
//! coordinator keeps the crawl-wide failure streak and asks the policy when it
//! warrants the long global cooldown.

use crate::config::RetryConfig;
use std::time::Duration;

/// Failure categories the policy distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Network error, timeout, or 5xx status
    Transient,

    /// 403/429 style refusal; waits for the longer cooldown
    RateLimited,

    /// Document shape the parser could not classify; never retried
    Parse,
}

/// What the caller should do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given duration, then try again
    Retry(Duration),

    /// Give up on this page or item
    Abort,
}

/// Bounded backoff policy
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    rate_limit_cooldown: Duration,
    max_consecutive_failures: u32,
    global_cooldown: Duration,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            rate_limit_cooldown: Duration::from_millis(config.rate_limit_cooldown_ms),
            max_consecutive_failures: config.max_consecutive_failures,
            global_cooldown: Duration::from_millis(config.global_cooldown_ms),
        }
    }

    /// Decides how long to wait before the next attempt
    ///
    /// # Arguments
    ///
    /// * `attempt` - Number of attempts already made (1 after the first failure)
    /// * `kind` - Category of the failure that just happened
    ///
    /// # Policy
    ///
    /// | Condition | Decision |
    /// |-----------|----------|
    /// | `attempt >= max_attempts` | Abort |
    /// | Parse | Abort |
    /// | Transient | `base_delay * attempt` |
    /// | RateLimited | `rate_limit_cooldown` |
    pub fn next_delay(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::Abort;
        }

        match kind {
            ErrorKind::Parse => RetryDecision::Abort,
            ErrorKind::Transient => RetryDecision::Retry(self.base_delay * attempt.max(1)),
            ErrorKind::RateLimited => RetryDecision::Retry(self.rate_limit_cooldown),
        }
    }

    /// Returns the global cooldown once the failure streak reaches the threshold
    pub fn global_cooldown(&self, consecutive_failures: u32) -> Option<Duration> {
        if consecutive_failures >= self.max_consecutive_failures {
            Some(self.global_cooldown)
        } else {
            None
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}
