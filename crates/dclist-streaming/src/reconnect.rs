//! Reconnection policy.
//!
//! The policy is fixed when a connection is opened. [`ReconnectHandler`]
//! counts consecutive failures and sleeps with exponential backoff between
//! attempts; a successful connect resets the count.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::debug;

use crate::{DEFAULT_RECONNECT_DELAY, MAX_RECONNECT_DELAY, StreamError, StreamResult};

/// Reconnection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Maximum consecutive attempts; `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Cap on the delay between retries, in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
    /// Scale each delay by a random factor in `[0.5, 1.5)`.
    pub jitter: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(20),
            initial_delay_ms: u64::try_from(DEFAULT_RECONNECT_DELAY.as_millis()).unwrap_or(1000),
            max_delay_ms: u64::try_from(MAX_RECONNECT_DELAY.as_millis()).unwrap_or(60_000),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ReconnectConfig {
    /// Create the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Set initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Delay before retry number `attempt` (zero based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let initial = Duration::from_millis(self.initial_delay_ms).as_secs_f64();
        let cap = Duration::from_millis(self.max_delay_ms).as_secs_f64();
        let capped = (initial * self.backoff_multiplier.powi(exponent)).min(cap);

        let delay = if self.jitter {
            capped * (0.5 + rand::random::<f64>())
        } else {
            capped
        };
        Duration::from_secs_f64(delay)
    }
}

/// Tracks consecutive reconnection attempts.
#[derive(Debug)]
pub struct ReconnectHandler {
    config: ReconnectConfig,
    attempts: u32,
}

impl ReconnectHandler {
    /// Create a handler.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Forget previous failures.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Consecutive attempts so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether another attempt is allowed.
    #[must_use]
    pub fn can_reconnect(&self) -> bool {
        self.config
            .max_attempts
            .is_none_or(|max| self.attempts < max)
    }

    /// Sleep for the next backoff delay.
    ///
    /// # Errors
    /// Returns [`StreamError::ReconnectLimitExceeded`] once the cap is hit.
    pub async fn wait_for_reconnect(&mut self) -> StreamResult<()> {
        if !self.can_reconnect() {
            return Err(StreamError::ReconnectLimitExceeded {
                attempts: self.attempts,
            });
        }

        let delay = self.config.delay_for_attempt(self.attempts);
        debug!(
            attempt = self.attempts + 1,
            delay_ms = delay.as_millis(),
            "Waiting before reconnection"
        );
        sleep(delay).await;
        self.attempts += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_allows_twenty_attempts() {
        let config = ReconnectConfig::default();
        assert_eq!(config.max_attempts, Some(20));
        assert_eq!(config.initial_delay_ms, 1000);
        assert!(config.jitter);
    }

    #[test]
    fn delay_doubles_until_capped() {
        let config = ReconnectConfig {
            max_delay_ms: 8_000,
            jitter: false,
            ..ReconnectConfig::default()
        };

        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(8));
        assert_eq!(config.delay_for_attempt(9), Duration::from_secs(8));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let config = ReconnectConfig::default();
        for _ in 0..32 {
            let delay = config.delay_for_attempt(0);
            assert!(delay >= Duration::from_millis(500));
            assert!(delay < Duration::from_millis(1500));
        }
    }

    #[test]
    fn handler_respects_cap() {
        let mut handler = ReconnectHandler::new(ReconnectConfig::new().with_max_attempts(3));
        assert!(handler.can_reconnect());
        handler.attempts = 3;
        assert!(!handler.can_reconnect());
        handler.reset();
        assert_eq!(handler.attempts(), 0);
    }

    #[test]
    fn unlimited_attempts() {
        let mut handler = ReconnectHandler::new(ReconnectConfig {
            max_attempts: None,
            ..ReconnectConfig::default()
        });
        handler.attempts = 10_000;
        assert!(handler.can_reconnect());
    }

    #[tokio::test]
    async fn wait_counts_attempts_then_gives_up() {
        let mut handler = ReconnectHandler::new(
            ReconnectConfig::new()
                .with_max_attempts(2)
                .with_initial_delay(Duration::from_millis(1)),
        );

        assert!(handler.wait_for_reconnect().await.is_ok());
        assert!(handler.wait_for_reconnect().await.is_ok());
        assert_eq!(handler.attempts(), 2);
        assert!(matches!(
            handler.wait_for_reconnect().await,
            Err(StreamError::ReconnectLimitExceeded { attempts: 2 })
        ));

        handler.reset();
        assert!(handler.wait_for_reconnect().await.is_ok());
    }

    #[test]
    fn oversized_initial_delay_saturates() {
        let config = ReconnectConfig::new().with_initial_delay(Duration::MAX);
        assert_eq!(config.initial_delay_ms, u64::MAX);
    }
}
