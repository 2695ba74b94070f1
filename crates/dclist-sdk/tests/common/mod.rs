//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Once;
use std::time::Duration;

use dclist::{DclistConfig, GatewayEvent, RetryPolicy, RetryStrategy};
use tokio::sync::broadcast;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Initialize tracing for tests. Uses `RUST_LOG` when set.
pub fn init_test_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,dclist=debug,dclist_streaming=debug"));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_test_writer().compact())
            .init();
    });
}

/// Config with fast retries and no reconnects, pointed at local servers.
pub fn local_config(api_url: Option<String>, subscription_url: Option<String>) -> DclistConfig {
    let mut config = DclistConfig::default()
        .with_retry(RetryPolicy {
            max_attempts: 2,
            base_delay_ms: 5,
            max_delay_ms: 10,
            max_jitter_ms: 0,
            strategy: RetryStrategy::IdempotentOnly,
        })
        .with_reconnect(dclist::ReconnectConfig::default().with_max_attempts(0));
    if let Some(url) = api_url {
        config = config.with_api_url(url);
    }
    if let Some(url) = subscription_url {
        config = config.with_subscription_url(url);
    }
    config.ack_timeout = Duration::from_secs(2);
    config
}

/// Next event, failing the test after a few seconds.
pub async fn next_event(events: &mut broadcast::Receiver<GatewayEvent>) -> GatewayEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event timeout")
        .expect("event channel open")
}
