//! Public entry point.

use std::fmt;
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, instrument};

use crate::config::{DclistConfig, TOKEN_ENV_VAR, resolve_token};
use crate::error::{DclistError, DclistResult};
use crate::events::GatewayEvent;
use crate::executor::RequestExecutor;
use crate::gateway::{ConnectionState, GatewaySettings};
use crate::poster::adapter::ExternalClient;
use crate::poster::{AutoPoster, StatsPoster};
use crate::queries::{Operation, QueryTemplate};
use crate::selector::FieldSelector;
use crate::subscription::{SubscriptionManager, TopicSelectors};
use crate::transport::{HttpTransport, HttpTransportConfig};
use crate::types::{Bot, BotStats, Comment, Topic, User};
use crate::validate::validate_snowflake;

/// Buffered events per receiver before it starts lagging.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Options for [`GatewayClient::new`].
#[derive(Clone, Default)]
pub struct GatewayClientOptions {
    /// API token; falls back to `DCLIST_TOKEN`.
    pub token: Option<String>,
    /// Host chat client, required when `enable_poster` is set.
    pub client: Option<Arc<dyn ExternalClient>>,
    /// Post bot stats periodically.
    pub enable_poster: bool,
    /// Endpoints and tuning.
    pub config: DclistConfig,
}

impl fmt::Debug for GatewayClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayClientOptions")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("client", &self.client.is_some())
            .field("enable_poster", &self.enable_poster)
            .field("config", &self.config)
            .finish()
    }
}

impl GatewayClientOptions {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the API token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the host chat client.
    #[must_use]
    pub fn with_client(mut self, client: Arc<dyn ExternalClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Enable or disable periodic stats posting.
    #[must_use]
    pub const fn with_poster(mut self, enabled: bool) -> Self {
        self.enable_poster = enabled;
        self
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: DclistConfig) -> Self {
        self.config = config;
        self
    }
}

/// dclist API client: queries, stats posting and push subscriptions.
///
/// Dropping the client closes the subscription connection and stops the
/// stats poster.
#[derive(Debug)]
pub struct GatewayClient {
    executor: RequestExecutor,
    subscriptions: SubscriptionManager,
    events: broadcast::Sender<GatewayEvent>,
    poster: Option<AutoPoster>,
}

impl GatewayClient {
    /// Create a client.
    ///
    /// # Errors
    /// Returns [`DclistError::InvalidToken`] when neither `options.token` nor
    /// `DCLIST_TOKEN` is set, and [`DclistError::InvalidArgument`] when the
    /// poster is enabled without a supported client.
    pub fn new(options: GatewayClientOptions) -> DclistResult<Self> {
        Self::with_env_token(options, std::env::var(TOKEN_ENV_VAR).ok())
    }

    pub(crate) fn with_env_token(
        options: GatewayClientOptions,
        env_token: Option<String>,
    ) -> DclistResult<Self> {
        let token = resolve_token(options.token, env_token).ok_or(DclistError::InvalidToken)?;
        let config = options.config;

        let transport = HttpTransport::new(
            config.api_url.clone(),
            &token,
            HttpTransportConfig {
                timeout: config.timeout,
                retry: config.retry.clone(),
            },
        )?;
        let executor = RequestExecutor::new(Arc::new(transport));

        let poster = if options.enable_poster {
            let sink: Arc<dyn StatsPoster> = Arc::new(executor.clone());
            Some(AutoPoster::start(options.client, sink, config.poster_interval)?)
        } else {
            None
        };

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let subscriptions = SubscriptionManager::new(
            GatewaySettings {
                url: config.subscription_url,
                token,
                ack_timeout: config.ack_timeout,
                reconnect: config.reconnect,
            },
            events.clone(),
        );

        debug!(api_url = %config.api_url, poster = poster.is_some(), "dclist client created");
        Ok(Self {
            executor,
            subscriptions,
            events,
            poster,
        })
    }

    /// Fetch a bot by snowflake id.
    ///
    /// # Errors
    /// Returns [`DclistError::InvalidArgument`] for a malformed id, or the
    /// API/transport error.
    #[instrument(skip(self, fields))]
    pub async fn get_bot_by_id(
        &self,
        bot_id: &str,
        fields: Option<&FieldSelector>,
    ) -> DclistResult<Option<Bot>> {
        validate_snowflake(bot_id)?;
        self.executor
            .execute(
                QueryTemplate::get(Operation::GetBotById),
                fields,
                Some(json!({ "botId": bot_id })),
            )
            .await
    }

    /// Fetch a user by snowflake id.
    ///
    /// # Errors
    /// Returns [`DclistError::InvalidArgument`] for a malformed id, or the
    /// API/transport error.
    #[instrument(skip(self, fields))]
    pub async fn get_user_by_id(
        &self,
        user_id: &str,
        fields: Option<&FieldSelector>,
    ) -> DclistResult<Option<User>> {
        validate_snowflake(user_id)?;
        self.executor
            .execute(
                QueryTemplate::get(Operation::GetUserById),
                fields,
                Some(json!({ "userId": user_id })),
            )
            .await
    }

    /// The comment `user_id` left on this bot, if any.
    ///
    /// # Errors
    /// Returns [`DclistError::InvalidArgument`] for a malformed id, or the
    /// API/transport error.
    #[instrument(skip(self, fields))]
    pub async fn get_user_comment(
        &self,
        user_id: &str,
        fields: Option<&FieldSelector>,
    ) -> DclistResult<Option<Comment>> {
        validate_snowflake(user_id)?;
        self.executor
            .execute(
                QueryTemplate::get(Operation::GetUserComment),
                fields,
                Some(json!({ "userId": user_id })),
            )
            .await
    }

    /// Whether `user_id` voted for this bot recently. A missing answer counts
    /// as `false`.
    ///
    /// # Errors
    /// Returns [`DclistError::InvalidArgument`] for a malformed id, or the
    /// API/transport error.
    #[instrument(skip(self))]
    pub async fn is_user_voted(&self, user_id: &str) -> DclistResult<bool> {
        validate_snowflake(user_id)?;
        let voted = self
            .executor
            .execute::<bool>(
                QueryTemplate::get(Operation::IsUserVoted),
                None,
                Some(json!({ "userId": user_id })),
            )
            .await?;
        Ok(voted.unwrap_or(false))
    }

    /// Report bot stats. Never retried.
    ///
    /// # Errors
    /// Returns the API/transport error.
    #[instrument(skip(self))]
    pub async fn post_stats(&self, stats: BotStats) -> DclistResult<bool> {
        self.executor.post_stats(stats).await
    }

    /// Subscribe to push topics. See [`SubscriptionManager::subscribe_to`].
    ///
    /// # Errors
    /// Returns [`DclistError::InvalidArgument`] for unknown topics or
    /// selector keys.
    pub fn subscribe_to(
        &self,
        topics: &[&str],
        selectors: &TopicSelectors,
    ) -> DclistResult<Vec<String>> {
        self.subscriptions.subscribe_to(topics, selectors)
    }

    /// Subscribe from untyped input. See
    /// [`SubscriptionManager::subscribe_to_value`].
    ///
    /// # Errors
    /// Returns [`DclistError::InvalidArgument`] for malformed input.
    pub fn subscribe_to_value(
        &self,
        topics: &Value,
        selectors: Option<&Value>,
    ) -> DclistResult<Vec<String>> {
        self.subscriptions.subscribe_to_value(topics, selectors)
    }

    /// Topics subscribed so far.
    #[must_use]
    pub fn subscribed_topics(&self) -> Vec<Topic> {
        self.subscriptions.topics()
    }

    /// New receiver for push events.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events.subscribe()
    }

    /// Push events as a `Stream`. Lagged receivers yield an error item.
    #[must_use]
    pub fn event_stream(&self) -> BroadcastStream<GatewayEvent> {
        BroadcastStream::new(self.events.subscribe())
    }

    /// Watch the subscription connection lifecycle.
    #[must_use]
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.subscriptions.connection_state()
    }

    /// `Some(ready)` when stats posting is enabled.
    #[must_use]
    pub fn poster_ready(&self) -> Option<bool> {
        self.poster.as_ref().map(AutoPoster::is_ready)
    }
}
