//! dclist SDK - client for the dclist.net bot listing API.
//!
//! This crate provides:
//! - Field selectors that render GraphQL selection sets.
//! - A fixed catalog of query, mutation and subscription documents.
//! - A request executor over a retrying `reqwest` transport.
//! - Push subscriptions over `graphql-transport-ws` with reconnection.
//! - Periodic bot stats posting driven by the host's chat client.
//!
//! ```no_run
//! use dclist::{GatewayClient, GatewayClientOptions, GatewayEvent, TopicSelectors};
//!
//! # async fn run() -> dclist::DclistResult<()> {
//! let client = GatewayClient::new(GatewayClientOptions::new().with_token("token"))?;
//! let mut events = client.events();
//! client.subscribe_to(&["SDK_NEW_VOTE"], &TopicSelectors::new())?;
//! while let Ok(event) = events.recv().await {
//!     if let GatewayEvent::NewVote(vote) = event {
//!         println!("vote from {:?}", vote.user.username);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]

mod client;
mod config;
mod error;
mod events;
mod executor;
mod gateway;
mod operation;
pub mod poster;
mod queries;
mod retry;
mod selector;
mod subscription;
mod transport;
mod types;
mod validate;

pub use client::{EVENT_CHANNEL_CAPACITY, GatewayClient, GatewayClientOptions};
pub use config::{DclistConfig, TEST_TOKEN, TOKEN_ENV_VAR};
pub use error::{
    CLIENT_ERROR, DclistError, DclistResult, GraphqlError, GraphqlErrorExtensions, HttpErrorInfo,
    UNKNOWN_ERROR, WEBSOCKET_ERROR,
};
pub use events::GatewayEvent;
pub use executor::{RequestExecutor, build_request};
pub use gateway::{ConnectionState, SUBPROTOCOL};
pub use operation::{GraphqlRequest, GraphqlResponse};
pub use poster::adapter::{ExternalClient, ShardedClient, SingleProcessClient, StatsAdapter};
pub use poster::{AutoPoster, StatsPoster};
pub use queries::{
    COMMENT_PLACEHOLDER, FIELDS_PLACEHOLDER, Operation, QueryTemplate, VOTE_USER_PLACEHOLDER,
    default_topic_selector,
};
pub use retry::{RetryDecision, RetryPolicy, RetryStrategy};
pub use selector::{FieldSelector, FieldSelectorBuilder, Selection};
pub use subscription::{SubscriptionManager, TopicSelectors, build_document, decode_update};
pub use transport::{HttpTransport, HttpTransportConfig, QueryTransport, TransportReply};
pub use types::{
    Bot, BotStats, Comment, CommentType, NewCommentPayload, NewVotePayload, PrefixType, Role,
    SdkUpdate, Snowflake, Stats, Topic, User,
};
pub use validate::validate_snowflake;

pub use dclist_streaming::ReconnectConfig;
