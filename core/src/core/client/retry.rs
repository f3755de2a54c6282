//! Backoff for re-posting a version after a no-fork conflict.
//!
//! The backend allows a single head per version ladder. When two editors post
//! concurrently, one of them gets a "No fork allowed" rejection and has to
//! re-base onto the new head. [`RetryState`] decides whether another attempt
//! is allowed and how long to wait before it.

use crate::core::client::ClientConfig;
use rand::Rng;
use std::time::Duration;

/// Configuration for no-fork retry behavior.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Total number of post attempts, the first one included.
    pub max_attempts: u32,
    /// Wait before the first retry. Doubles for each further retry.
    pub initial_backoff: Duration,
    /// Relative jitter applied to every wait, `0.25` meaning ±25%.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(250),
            jitter: 0.25,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_client_config(config: &ClientConfig) -> Self {
        Self {
            max_attempts: config.no_fork_max_attempts,
            initial_backoff: Duration::from_millis(config.no_fork_backoff_ms),
            jitter: config.no_fork_jitter,
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    #[must_use]
    pub fn with_initial_backoff(mut self, duration: Duration) -> Self {
        self.initial_backoff = duration;
        self
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    Retry(Duration),
    DontRetry,
}

#[derive(Debug, Clone)]
pub struct RetryState {
    /// Attempts made so far.
    pub attempts: u32,
    pub current_backoff: Duration,
    config: RetryConfig,
}

impl RetryState {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            attempts: 0,
            current_backoff: config.initial_backoff,
            config,
        }
    }

    /// Record one attempt. Call before each post.
    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Decide what to do after the current attempt hit a conflict.
    ///
    /// No wait is scheduled once the attempt budget is spent.
    pub fn on_conflict(&mut self) -> RetryDecision {
        if self.attempts >= self.config.max_attempts {
            return RetryDecision::DontRetry;
        }
        let wait = jittered(self.current_backoff, self.config.jitter);
        self.current_backoff = self.current_backoff.saturating_mul(2);
        RetryDecision::Retry(wait)
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.current_backoff = self.config.initial_backoff;
    }
}

fn jittered(base: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return base;
    }
    let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
    base.mul_f64(factor.max(0.0))
}
