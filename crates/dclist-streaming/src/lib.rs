//! dclist Streaming - WebSocket transport for the dclist SDK.
//!
//! This crate owns the raw socket side of push subscriptions:
//!
//! - **WebSocket**: connect with handshake headers and subprotocols, typed
//!   message frames, JSON helpers, close-frame reporting
//! - **Reconnection**: attempt-capped exponential backoff with jitter
//!
//! Protocol logic (`graphql-transport-ws`) lives in `dclist-sdk`; this crate
//! only moves frames.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod error;
mod reconnect;
mod websocket;

pub use error::*;
pub use reconnect::*;
pub use websocket::*;

use std::time::Duration;

/// Default delay before the first reconnection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Upper bound for the backoff delay.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);
