//! Streaming error types.

use std::time::Duration;

/// Errors raised by the WebSocket transport.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The URL or handshake request could not be built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The TCP/TLS/WebSocket handshake failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The peer closed the connection.
    #[error("Connection closed: {reason}")]
    ConnectionClosed {
        /// Close reason sent by the peer, or a local description.
        reason: String,
        /// WebSocket close code, when one was received.
        code: Option<u16>,
    },

    /// A frame could not be encoded or decoded.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// An operation did not finish in time.
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// The reconnect policy gave up.
    #[error("Reconnection limit exceeded after {attempts} attempts")]
    ReconnectLimitExceeded {
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// Operation on a connection in the wrong state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Error reported by the WebSocket library while the socket was open.
    #[error("WebSocket error: {0}")]
    WebSocketError(String),
}

impl StreamError {
    /// Human readable reason suitable for reporting a dropped connection.
    #[must_use]
    pub fn close_reason(&self) -> String {
        match self {
            Self::ConnectionClosed { reason, .. } => reason.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type for streaming operations.
pub type StreamResult<T> = Result<T, StreamError>;
