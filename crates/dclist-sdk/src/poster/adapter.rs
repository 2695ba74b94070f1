//! Stats extraction from the host bot's chat client.
//!
//! The host passes its client as an [`ExternalClient`]; [`adapt`] probes it
//! for the shapes it knows (single process first, then sharded) and wraps
//! the first match in a [`StatsAdapter`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{DclistError, DclistResult};
use crate::types::BotStats;

/// A chat client running in this process.
#[async_trait]
pub trait SingleProcessClient: Send + Sync {
    /// Guilds the client is in.
    fn guild_count(&self) -> u64;

    /// Users the client can see.
    fn user_count(&self) -> u64;

    /// Time since the client became ready, `None` if it is not ready yet.
    fn uptime(&self) -> Option<Duration>;

    /// Resolve once the client emits its ready signal.
    async fn wait_until_ready(&self);
}

/// A shard manager driving several client processes.
#[async_trait]
pub trait ShardedClient: Send + Sync {
    /// Guild count reported by each shard.
    async fn shard_guild_counts(&self) -> DclistResult<Vec<u64>>;

    /// User count reported by each shard.
    async fn shard_user_counts(&self) -> DclistResult<Vec<u64>>;

    /// Uptime reported by each shard; `None` for shards not ready yet.
    async fn shard_uptimes(&self) -> DclistResult<Vec<Option<Duration>>>;

    /// Shards currently spawned.
    fn active_shards(&self) -> u64;

    /// Resolve once the last spawned shard becomes ready.
    async fn wait_for_last_shard(&self);
}

/// Handle to the host's chat client. Implement the probe matching the
/// client's shape; the other keeps its `None` default.
pub trait ExternalClient: Send + Sync {
    /// View as a single-process client.
    fn as_single(self: Arc<Self>) -> Option<Arc<dyn SingleProcessClient>> {
        None
    }

    /// View as a shard manager.
    fn as_sharded(self: Arc<Self>) -> Option<Arc<dyn ShardedClient>> {
        None
    }
}

/// Uniform view over supported client shapes.
#[async_trait]
pub trait StatsAdapter: Send + Sync {
    /// Whether the client has reported readiness.
    fn is_ready(&self) -> bool;

    /// Current counts.
    async fn get_stats(&self) -> DclistResult<BotStats>;
}

/// Probe `client` and start watching for readiness. `on_ready` runs once,
/// when the client is (or becomes) ready. Aborting the returned handle stops
/// the watch and releases the client.
///
/// # Errors
/// Returns [`DclistError::InvalidArgument`] if the client matches no known
/// shape, or [`DclistError::Api`] with `CLIENT_ERROR` outside a Tokio
/// runtime.
pub fn adapt<F>(
    client: Arc<dyn ExternalClient>,
    on_ready: F,
) -> DclistResult<(Arc<dyn StatsAdapter>, JoinHandle<()>)>
where
    F: FnOnce() + Send + 'static,
{
    let runtime = Handle::try_current().map_err(|_| {
        DclistError::api(crate::CLIENT_ERROR, "Stats posting requires a Tokio runtime")
    })?;
    let ready = Arc::new(Readiness::default());

    if let Some(single) = Arc::clone(&client).as_single() {
        debug!("Stats source: single-process client");
        let watched = Arc::clone(&single);
        let flag = Arc::clone(&ready);
        let watcher = runtime.spawn(async move {
            if !watched.uptime().is_some_and(|uptime| !uptime.is_zero()) {
                watched.wait_until_ready().await;
            }
            flag.mark(on_ready);
        });
        let adapter = Arc::new(SingleProcessAdapter {
            client: single,
            ready,
        });
        return Ok((adapter, watcher));
    }

    if let Some(sharded) = client.as_sharded() {
        debug!("Stats source: shard manager");
        let watched = Arc::clone(&sharded);
        let flag = Arc::clone(&ready);
        let watcher = runtime.spawn(async move {
            let all_up = watched.shard_uptimes().await.is_ok_and(|uptimes| {
                !uptimes.is_empty()
                    && uptimes
                        .iter()
                        .all(|uptime| uptime.is_some_and(|uptime| !uptime.is_zero()))
            });
            if !all_up {
                watched.wait_for_last_shard().await;
            }
            flag.mark(on_ready);
        });
        let adapter = Arc::new(ShardedAdapter {
            client: sharded,
            ready,
        });
        return Ok((adapter, watcher));
    }

    Err(DclistError::invalid_argument(
        "Invalid option \"client\". Unsupported library",
    ))
}

#[derive(Debug, Default)]
struct Readiness(AtomicBool);

impl Readiness {
    fn mark<F: FnOnce()>(&self, on_ready: F) {
        if !self.0.swap(true, Ordering::AcqRel) {
            on_ready();
        }
    }

    fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

struct SingleProcessAdapter {
    client: Arc<dyn SingleProcessClient>,
    ready: Arc<Readiness>,
}

#[async_trait]
impl StatsAdapter for SingleProcessAdapter {
    fn is_ready(&self) -> bool {
        self.ready.get()
    }

    async fn get_stats(&self) -> DclistResult<BotStats> {
        Ok(BotStats {
            guild_count: self.client.guild_count(),
            user_count: self.client.user_count(),
            shard_count: 1,
        })
    }
}

struct ShardedAdapter {
    client: Arc<dyn ShardedClient>,
    ready: Arc<Readiness>,
}

#[async_trait]
impl StatsAdapter for ShardedAdapter {
    fn is_ready(&self) -> bool {
        self.ready.get()
    }

    async fn get_stats(&self) -> DclistResult<BotStats> {
        let guild_count = self.client.shard_guild_counts().await?.into_iter().sum();
        let user_count = self.client.shard_user_counts().await?.into_iter().sum();
        Ok(BotStats {
            guild_count,
            user_count,
            shard_count: self.client.active_shards().max(1),
        })
    }
}
