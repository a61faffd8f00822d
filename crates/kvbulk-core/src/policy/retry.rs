//! Exponential backoff retry policy with uniform jitter.
//!
//! The delay before retrying after attempt `a` (0-based) is
//! `min(base_delay * 2^a, max_backoff) + jitter`, with `jitter` drawn
//! uniformly from `[0, max_jitter)`.

use std::time::Duration;

use rand::Rng;

/// Configuration for the retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not counting the first try).
    pub max_retries: u32,
    /// Backoff before the first retry; doubled on each further retry.
    pub base_delay: Duration,
    /// Exclusive upper bound of the random jitter added to each delay.
    pub max_jitter: Duration,
    /// Maximum backoff delay before jitter (caps exponential growth).
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 8,
            base_delay: Duration::from_millis(50),
            max_jitter: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Stateless retry policy — computes the next delay given the attempt number.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Exponential part of the delay after attempt `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = 1u32
            .checked_shl(attempt)
            .and_then(|factor| self.config.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX);
        exp.min(self.config.max_backoff)
    }

    /// Delay for `attempt` with an explicit jitter value.
    pub fn delay_for(&self, attempt: u32, jitter: Duration) -> Duration {
        self.backoff(attempt).saturating_add(jitter)
    }

    /// Draw a jitter value uniformly from `[0, max_jitter)`.
    pub fn sample_jitter(&self) -> Duration {
        let bound = u64::try_from(self.config.max_jitter.as_nanos()).unwrap_or(u64::MAX);
        if bound == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(rand::thread_rng().gen_range(0..bound))
    }

    /// Returns the delay before retrying after attempt `attempt` (0-based).
    /// Returns `None` once the retry budget is spent.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if !self.should_retry(attempt) {
            return None;
        }
        Some(self.delay_for(attempt, self.sample_jitter()))
    }

    /// Returns `true` if a failed attempt `attempt` (0-based) may be retried.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.config.max_retries
    }

    /// Upper bound on write attempts per lineage.
    pub fn max_attempts(&self) -> u32 {
        self.config.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
