//! Periodic bot stats posting.

pub mod adapter;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::{DclistError, DclistResult};
use crate::executor::RequestExecutor;
use crate::queries::{Operation, QueryTemplate};
use crate::types::BotStats;

use self::adapter::{ExternalClient, StatsAdapter, adapt};

/// Destination for collected stats.
#[async_trait]
pub trait StatsPoster: Send + Sync {
    /// Publish `stats`; `Ok(false)` if the API did not confirm.
    async fn post_stats(&self, stats: BotStats) -> DclistResult<bool>;
}

#[async_trait]
impl StatsPoster for RequestExecutor {
    async fn post_stats(&self, stats: BotStats) -> DclistResult<bool> {
        let posted = self
            .execute::<bool>(
                QueryTemplate::get(Operation::PostBotStats),
                None,
                Some(json!({ "stats": stats })),
            )
            .await?;
        Ok(posted.unwrap_or(false))
    }
}

/// Posts stats once the host client is ready, then on every interval tick.
/// The schedule stops when the poster is dropped.
pub struct AutoPoster {
    adapter: Arc<dyn StatsAdapter>,
    watcher: JoinHandle<()>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for AutoPoster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoPoster")
            .field("ready", &self.adapter.is_ready())
            .finish_non_exhaustive()
    }
}

impl AutoPoster {
    /// Probe `client` and schedule posting through `poster`.
    ///
    /// # Errors
    /// Returns [`DclistError::InvalidArgument`] if `interval` is zero, or if
    /// `client` is missing or of an unsupported shape.
    pub fn start(
        client: Option<Arc<dyn ExternalClient>>,
        poster: Arc<dyn StatsPoster>,
        interval: Duration,
    ) -> DclistResult<Self> {
        if interval.is_zero() {
            return Err(DclistError::invalid_argument(
                "Invalid option \"poster_interval\". Must be greater than zero",
            ));
        }
        let client = client.ok_or_else(|| {
            DclistError::invalid_argument(
                "Invalid option \"client\". Required field cannot be undefined/null",
            )
        })?;

        let (ready_tx, ready_rx) = oneshot::channel();
        let (adapter, watcher) = adapt(client, move || {
            // Receiver gone means the poster was dropped first.
            let _ = ready_tx.send(());
        })?;

        let source = Arc::clone(&adapter);
        let task = tokio::spawn(async move {
            if ready_rx.await.is_err() {
                return;
            }
            debug!(interval_secs = interval.as_secs(), "Client ready, posting stats");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                post_once(source.as_ref(), poster.as_ref()).await;
            }
        });

        Ok(Self {
            adapter,
            watcher,
            task,
        })
    }

    /// Whether the host client has reported readiness.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.adapter.is_ready()
    }
}

impl Drop for AutoPoster {
    fn drop(&mut self) {
        self.watcher.abort();
        self.task.abort();
    }
}

async fn post_once(adapter: &dyn StatsAdapter, poster: &dyn StatsPoster) {
    let stats = match adapter.get_stats().await {
        Ok(stats) => stats,
        Err(err) => {
            warn!(code = err.code().unwrap_or_default(), error = %err, "Couldn't collect bot stats");
            return;
        }
    };
    match poster.post_stats(stats).await {
        Ok(_) => info!(
            guild_count = stats.guild_count,
            user_count = stats.user_count,
            shard_count = stats.shard_count,
            "Bot stats successfully posted"
        ),
        Err(err) => {
            warn!(code = err.code().unwrap_or_default(), error = %err, "Couldn't post bot stats");
        }
    }
}
