//! HTTP retry policy.
//!
//! Retries are a transport concern: the executor itself never retries, it
//! hands the policy to [`crate::HttpTransport`].

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::DclistError;

/// Retry decision result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after a delay.
    RetryAfter(Duration),
    /// Do not retry.
    DoNotRetry,
}

/// Which operations may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Never retry.
    Never,
    /// Retry queries, never mutations.
    #[default]
    IdempotentOnly,
    /// Retry regardless of idempotency.
    Always,
}

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: usize,
    /// Base delay for exponential backoff, in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay between retries, in milliseconds.
    pub max_delay_ms: u64,
    /// Maximum jitter added to each delay, in milliseconds.
    pub max_jitter_ms: u64,
    /// Retry strategy.
    pub strategy: RetryStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            max_jitter_ms: 150,
            strategy: RetryStrategy::IdempotentOnly,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn never() -> Self {
        Self {
            strategy: RetryStrategy::Never,
            ..Self::default()
        }
    }

    /// Decide whether attempt number `attempt` (1-based) should be followed
    /// by another.
    #[must_use]
    pub fn decide(&self, error: &DclistError, attempt: usize, idempotent: bool) -> RetryDecision {
        if attempt >= self.max_attempts || !error.is_retryable() {
            return RetryDecision::DoNotRetry;
        }

        match self.strategy {
            RetryStrategy::Never => RetryDecision::DoNotRetry,
            RetryStrategy::IdempotentOnly if !idempotent => RetryDecision::DoNotRetry,
            _ => {
                let exp = 2_u64
                    .saturating_pow(u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX));
                let delay_ms = self.base_delay_ms.saturating_mul(exp).min(self.max_delay_ms);
                let jitter_ms = if self.max_jitter_ms > 0 {
                    rand::thread_rng().gen_range(0..=self.max_jitter_ms)
                } else {
                    0
                };
                RetryDecision::RetryAfter(Duration::from_millis(delay_ms + jitter_ms))
            }
        }
    }
}
