//! WebSocket client.
//!
//! [`WsClient`] performs the handshake (custom headers and subprotocols
//! included) and hands back a [`WsConnection`] that sends and receives
//! [`WsMessage`] frames. Reconnection is driven by the caller through
//! [`crate::ReconnectHandler`]; a connection object never revives itself.

use std::collections::BTreeMap;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;
use url::Url;

use crate::{StreamError, StreamResult};

/// WebSocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    /// Text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
    /// Ping control frame.
    Ping(Vec<u8>),
    /// Pong control frame.
    Pong(Vec<u8>),
    /// Close control frame.
    Close(Option<WsCloseFrame>),
}

impl WsMessage {
    /// Create a text frame.
    #[must_use]
    pub fn text(data: impl Into<String>) -> Self {
        Self::Text(data.into())
    }

    /// Check if this is a close frame.
    #[must_use]
    pub const fn is_close(&self) -> bool {
        matches!(self, Self::Close(_))
    }

    /// Decode a data frame as JSON.
    ///
    /// # Errors
    /// Returns a JSON error for control frames or malformed payloads.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match self {
            Self::Text(s) => serde_json::from_str(s),
            Self::Binary(b) => serde_json::from_slice(b),
            _ => Err(serde::de::Error::custom("not a data frame")),
        }
    }
}

impl From<Message> for WsMessage {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(s) => Self::Text(s.as_str().to_owned()),
            Message::Binary(b) => Self::Binary(b.to_vec()),
            Message::Ping(b) => Self::Ping(b.to_vec()),
            Message::Pong(b) => Self::Pong(b.to_vec()),
            Message::Close(frame) => Self::Close(frame.map(|f| WsCloseFrame {
                code: f.code.into(),
                reason: f.reason.as_str().to_owned(),
            })),
            Message::Frame(_) => Self::Binary(Vec::new()),
        }
    }
}

impl From<WsMessage> for Message {
    fn from(msg: WsMessage) -> Self {
        use tokio_tungstenite::tungstenite::protocol::CloseFrame;
        use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

        match msg {
            WsMessage::Text(s) => Self::Text(s.into()),
            WsMessage::Binary(b) => Self::Binary(b.into()),
            WsMessage::Ping(b) => Self::Ping(b.into()),
            WsMessage::Pong(b) => Self::Pong(b.into()),
            WsMessage::Close(frame) => Self::Close(frame.map(|f| CloseFrame {
                code: CloseCode::from(f.code),
                reason: f.reason.into(),
            })),
        }
    }
}

/// WebSocket close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsCloseFrame {
    /// Close code.
    pub code: u16,
    /// Close reason.
    pub reason: String,
}

impl WsCloseFrame {
    /// Create a new close frame.
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Normal closure.
    #[must_use]
    pub fn normal() -> Self {
        Self::new(1000, "Normal closure")
    }
}

/// WebSocket configuration.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Handshake timeout.
    pub connect_timeout: Duration,
    /// Extra handshake headers (e.g. `Authorization`).
    pub headers: BTreeMap<String, String>,
    /// Requested `Sec-WebSocket-Protocol` values.
    pub subprotocols: Vec<String>,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            headers: BTreeMap::new(),
            subprotocols: Vec::new(),
        }
    }
}

impl WsConfig {
    /// Create new configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handshake header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Request a subprotocol.
    #[must_use]
    pub fn with_subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.subprotocols.push(protocol.into());
        self
    }
}

/// WebSocket client.
#[derive(Debug, Clone)]
pub struct WsClient {
    url: String,
    config: WsConfig,
}

impl WsClient {
    /// Create a client with configuration.
    #[must_use]
    pub fn with_config(url: impl Into<String>, config: WsConfig) -> Self {
        Self {
            url: url.into(),
            config,
        }
    }

    /// Perform the handshake.
    ///
    /// # Errors
    /// Returns an error if the request cannot be built, the handshake fails,
    /// or it exceeds the configured timeout.
    pub async fn connect(&self) -> StreamResult<WsConnection> {
        let url = Url::parse(&self.url).map_err(|e| StreamError::InvalidRequest(e.to_string()))?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| StreamError::InvalidRequest(e.to_string()))?;

        let headers = request.headers_mut();
        for (key, value) in &self.config.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| StreamError::InvalidRequest(e.to_string()))?;
            let value =
                HeaderValue::from_str(value).map_err(|e| StreamError::InvalidRequest(e.to_string()))?;
            headers.insert(name, value);
        }
        if !self.config.subprotocols.is_empty() {
            let protocols = self.config.subprotocols.join(", ");
            let value = HeaderValue::from_str(&protocols)
                .map_err(|e| StreamError::InvalidRequest(e.to_string()))?;
            headers.insert("Sec-WebSocket-Protocol", value);
        }

        debug!(url = %url, "Opening WebSocket");
        let Ok(result) = tokio::time::timeout(self.config.connect_timeout, connect_async(request)).await
        else {
            return Err(StreamError::Timeout(self.config.connect_timeout));
        };
        let (stream, _response) = result.map_err(|e| StreamError::ConnectionFailed(e.to_string()))?;

        Ok(WsConnection::new(stream))
    }

    /// Get the URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Open WebSocket connection.
pub struct WsConnection {
    inner: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    closed: bool,
}

impl std::fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnection")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl WsConnection {
    const fn new(stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>) -> Self {
        Self {
            inner: stream,
            closed: false,
        }
    }

    /// Send a frame.
    ///
    /// # Errors
    /// Returns an error if the connection is closed or the write fails.
    pub async fn send(&mut self, message: WsMessage) -> StreamResult<()> {
        if self.closed {
            return Err(StreamError::InvalidState("Connection is closed".into()));
        }
        self.inner
            .send(message.into())
            .await
            .map_err(|e| StreamError::WebSocketError(e.to_string()))
    }

    /// Serialize `data` and send it as a text frame.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub async fn send_json<T: serde::Serialize + Sync>(&mut self, data: &T) -> StreamResult<()> {
        let json = serde_json::to_string(data).map_err(|e| StreamError::ParseError(e.to_string()))?;
        self.send(WsMessage::text(json)).await
    }

    /// Receive the next frame. `Ok(None)` means the stream ended.
    ///
    /// # Errors
    /// Returns an error if the socket fails.
    pub async fn recv(&mut self) -> StreamResult<Option<WsMessage>> {
        if self.closed {
            return Ok(None);
        }
        match self.inner.next().await {
            Some(Ok(msg)) => {
                let msg = WsMessage::from(msg);
                if msg.is_close() {
                    self.closed = true;
                }
                Ok(Some(msg))
            }
            Some(Err(e)) => Err(StreamError::WebSocketError(e.to_string())),
            None => {
                self.closed = true;
                Ok(None)
            }
        }
    }

    /// Close the connection with a normal close frame.
    ///
    /// # Errors
    /// Returns an error if the close frame fails to send.
    pub async fn close(&mut self) -> StreamResult<()> {
        if self.closed {
            return Ok(());
        }
        self.send(WsMessage::Close(Some(WsCloseFrame::normal()))).await?;
        self.closed = true;
        Ok(())
    }
}
