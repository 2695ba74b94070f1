//! Client configuration.

use std::time::Duration;

use dclist_streaming::ReconnectConfig;
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Environment variable consulted when no token is passed explicitly.
pub const TOKEN_ENV_VAR: &str = "DCLIST_TOKEN";

/// Sentinel token that keeps validation but disables network activity.
pub const TEST_TOKEN: &str = "test";

/// Endpoints and transport tuning for [`crate::GatewayClient`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DclistConfig {
    /// GraphQL HTTP endpoint (default: https://api.dclist.net/graphql)
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Subscription WebSocket endpoint (default: wss://api.dclist.net/subscribe)
    #[serde(default = "default_subscription_url")]
    pub subscription_url: String,

    /// Request timeout
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,

    /// HTTP retry policy
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Subscription reconnect policy
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Time allowed for `connection_ack`
    #[serde(default = "default_ack_timeout", with = "duration_secs")]
    pub ack_timeout: Duration,

    /// Stats posting interval
    #[serde(default = "default_poster_interval", with = "duration_secs")]
    pub poster_interval: Duration,
}

fn default_api_url() -> String {
    "https://api.dclist.net/graphql".into()
}

fn default_subscription_url() -> String {
    "wss://api.dclist.net/subscribe".into()
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_ack_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_poster_interval() -> Duration {
    // 35 minutes
    Duration::from_secs(35 * 60)
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl Default for DclistConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            subscription_url: default_subscription_url(),
            timeout: default_timeout(),
            retry: RetryPolicy::default(),
            reconnect: ReconnectConfig::default(),
            ack_timeout: default_ack_timeout(),
            poster_interval: default_poster_interval(),
        }
    }
}

impl DclistConfig {
    /// Override the HTTP endpoint.
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Override the subscription endpoint.
    #[must_use]
    pub fn with_subscription_url(mut self, url: impl Into<String>) -> Self {
        self.subscription_url = url.into();
        self
    }

    /// Override the HTTP retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override the reconnect policy.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Override the stats posting interval.
    #[must_use]
    pub const fn with_poster_interval(mut self, interval: Duration) -> Self {
        self.poster_interval = interval;
        self
    }
}

/// Pick the explicit token, else the environment one. Empty strings count as
/// missing.
pub(crate) fn resolve_token(explicit: Option<String>, env: Option<String>) -> Option<String> {
    explicit
        .filter(|token| !token.is_empty())
        .or_else(|| env.filter(|token| !token.is_empty()))
}
