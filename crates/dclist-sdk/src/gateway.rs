//! Subscription connection task.
//!
//! One task per client owns the WebSocket and speaks `graphql-transport-ws`:
//! `connection_init` with the bearer token, wait for `connection_ack`, then
//! `subscribe` with the current document. New documents arrive over an
//! `mpsc` channel and replace the running subscription (`complete` for the
//! old id, `subscribe` with a fresh one). When the socket drops the task
//! reports a [`WEBSOCKET_ERROR`](crate::WEBSOCKET_ERROR) event and reconnects
//! under the configured [`ReconnectConfig`], re-sending the current document.
//! Dropping the last command sender ends the task.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use dclist_streaming::{
    ReconnectConfig, ReconnectHandler, StreamError, WsClient, WsCloseFrame, WsConfig, WsConnection,
    WsMessage,
};

use crate::error::{DclistError, DclistResult, GraphqlError};
use crate::events::GatewayEvent;
use crate::operation::{GraphqlRequest, GraphqlResponse};
use crate::subscription::decode_update;

/// WebSocket subprotocol.
pub const SUBPROTOCOL: &str = "graphql-transport-ws";

/// Lifecycle of the subscription connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Nothing subscribed yet.
    Idle,
    /// Subscribed with the sentinel test token; no connection is opened.
    TestMode,
    /// First connection attempt in progress.
    Connecting,
    /// Handshake done and subscription issued.
    Connected,
    /// Waiting to retry after a failure.
    Reconnecting {
        /// Consecutive failed attempts.
        attempt: u32,
    },
    /// Reconnect attempts exhausted.
    Failed,
}

/// `graphql-transport-ws` frame.
#[derive(Debug, Serialize, Deserialize)]
struct ProtocolMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
}

impl ProtocolMessage {
    fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            id: None,
            payload: None,
        }
    }

    fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Connection parameters fixed at open time.
#[derive(Debug, Clone)]
pub(crate) struct GatewaySettings {
    pub url: String,
    pub token: String,
    pub ack_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

/// Owner side of a running connection task.
#[derive(Debug)]
pub(crate) struct GatewayHandle {
    commands: mpsc::UnboundedSender<GraphqlRequest>,
}

impl GatewayHandle {
    /// Start a connection task that subscribes with `request`.
    pub(crate) fn spawn(
        settings: &GatewaySettings,
        request: GraphqlRequest,
        events: broadcast::Sender<GatewayEvent>,
        state: Arc<watch::Sender<ConnectionState>>,
    ) -> DclistResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|_| DclistError::websocket("Subscriptions require a Tokio runtime"))?;
        let (commands, receiver) = mpsc::unbounded_channel();

        let ws_config = WsConfig::new()
            .with_header("Authorization", format!("Bearer {}", settings.token))
            .with_subprotocol(SUBPROTOCOL);
        let task = GatewayTask {
            client: WsClient::with_config(settings.url.clone(), ws_config),
            init_payload: json!({
                "headers": { "Authorization": format!("Bearer {}", settings.token) }
            }),
            ack_timeout: settings.ack_timeout,
            reconnect: ReconnectHandler::new(settings.reconnect.clone()),
            commands: receiver,
            events,
            state,
            current: request,
            active_id: None,
            next_id: 1,
        };
        runtime.spawn(task.run());
        Ok(Self { commands })
    }

    /// Replace the running subscription. Returns `false` if the task has
    /// already stopped.
    pub(crate) fn send(&self, request: GraphqlRequest) -> bool {
        self.commands.send(request).is_ok()
    }
}

enum Exit {
    /// The client went away.
    Dropped,
    /// The socket failed.
    Lost(DclistError),
}

enum Backoff {
    Retry,
    Stop,
    GaveUp(StreamError),
}

struct GatewayTask {
    client: WsClient,
    init_payload: Value,
    ack_timeout: Duration,
    reconnect: ReconnectHandler,
    commands: mpsc::UnboundedReceiver<GraphqlRequest>,
    events: broadcast::Sender<GatewayEvent>,
    state: Arc<watch::Sender<ConnectionState>>,
    current: GraphqlRequest,
    active_id: Option<String>,
    next_id: u64,
}

impl GatewayTask {
    async fn run(mut self) {
        self.state.send_replace(ConnectionState::Connecting);
        loop {
            match self.open().await {
                Ok(mut conn) => {
                    self.reconnect.reset();
                    self.state.send_replace(ConnectionState::Connected);
                    info!(url = self.client.url(), "Subscription connected");
                    match self.serve(&mut conn).await {
                        Exit::Dropped => {
                            if let Err(err) = conn.close().await {
                                debug!(error = %err, "Close on shutdown failed");
                            }
                            debug!("Subscription task stopped");
                            return;
                        }
                        Exit::Lost(err) => {
                            warn!(error = %err, "Subscription connection lost");
                            self.emit(GatewayEvent::Error(err));
                        }
                    }
                }
                Err(err) => {
                    warn!(error = %err, attempt = self.reconnect.attempts(), "Subscription connect failed");
                    self.emit(GatewayEvent::Error(err));
                }
            }

            self.state.send_replace(ConnectionState::Reconnecting {
                attempt: self.reconnect.attempts() + 1,
            });
            match self.backoff().await {
                Backoff::Retry => {}
                Backoff::Stop => return,
                Backoff::GaveUp(err) => {
                    warn!(error = %err, "Subscription reconnect attempts exhausted");
                    self.state.send_replace(ConnectionState::Failed);
                    self.emit(GatewayEvent::Error(err.into()));
                    return;
                }
            }
        }
    }

    async fn open(&mut self) -> DclistResult<WsConnection> {
        self.active_id = None;
        let mut conn = self.client.connect().await?;
        self.handshake(&mut conn).await?;
        self.subscribe(&mut conn).await?;
        Ok(conn)
    }

    async fn handshake(&self, conn: &mut WsConnection) -> DclistResult<()> {
        let init = ProtocolMessage::new("connection_init").with_payload(self.init_payload.clone());
        conn.send_json(&init).await?;

        let deadline = Instant::now() + self.ack_timeout;
        loop {
            let frame = tokio::time::timeout_at(deadline, conn.recv())
                .await
                .map_err(|_| DclistError::websocket("connection_ack timeout"))??;
            match frame {
                None => return Err(DclistError::websocket("Connection closed before ack")),
                Some(WsMessage::Ping(payload)) => conn.send(WsMessage::Pong(payload)).await?,
                Some(WsMessage::Pong(_)) => {}
                Some(WsMessage::Close(frame)) => {
                    return Err(DclistError::websocket(close_reason(frame.as_ref())));
                }
                Some(frame) => {
                    let message: ProtocolMessage = frame.json()?;
                    match message.kind.as_str() {
                        "connection_ack" => return Ok(()),
                        "ping" => conn.send_json(&ProtocolMessage::new("pong")).await?,
                        other => {
                            return Err(DclistError::Protocol {
                                message: format!("expected connection_ack, got {other}"),
                            });
                        }
                    }
                }
            }
        }
    }

    async fn subscribe(&mut self, conn: &mut WsConnection) -> DclistResult<()> {
        let id = self.next_id.to_string();
        self.next_id += 1;
        let message = ProtocolMessage::new("subscribe")
            .with_id(id.clone())
            .with_payload(serde_json::to_value(&self.current)?);
        conn.send_json(&message).await?;
        debug!(id = %id, "Subscription issued");
        self.active_id = Some(id);
        self.emit(GatewayEvent::Subscribed);
        Ok(())
    }

    async fn resubscribe(&mut self, conn: &mut WsConnection) -> DclistResult<()> {
        if let Some(id) = self.active_id.take() {
            conn.send_json(&ProtocolMessage::new("complete").with_id(id))
                .await?;
        }
        self.subscribe(conn).await
    }

    async fn serve(&mut self, conn: &mut WsConnection) -> Exit {
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(request) = command else {
                        return Exit::Dropped;
                    };
                    self.current = request;
                    if let Err(err) = self.resubscribe(conn).await {
                        return Exit::Lost(err);
                    }
                }
                frame = conn.recv() => match frame {
                    Ok(Some(frame)) => {
                        if let Err(err) = self.on_frame(conn, frame).await {
                            return Exit::Lost(err);
                        }
                    }
                    Ok(None) => return Exit::Lost(DclistError::websocket("Connection closed")),
                    Err(err) => return Exit::Lost(err.into()),
                },
            }
        }
    }

    /// Handle one inbound frame. An error means the connection is unusable.
    async fn on_frame(&mut self, conn: &mut WsConnection, frame: WsMessage) -> DclistResult<()> {
        match frame {
            WsMessage::Ping(payload) => conn.send(WsMessage::Pong(payload)).await?,
            WsMessage::Pong(_) => {}
            WsMessage::Close(frame) => {
                return Err(DclistError::websocket(close_reason(frame.as_ref())));
            }
            WsMessage::Text(_) | WsMessage::Binary(_) => match frame.json::<ProtocolMessage>() {
                Ok(message) => self.on_message(conn, message).await?,
                Err(err) => self.emit(GatewayEvent::Error(DclistError::Protocol {
                    message: format!("Undecodable frame: {err}"),
                })),
            },
        }
        Ok(())
    }

    async fn on_message(
        &mut self,
        conn: &mut WsConnection,
        message: ProtocolMessage,
    ) -> DclistResult<()> {
        match message.kind.as_str() {
            "next" => {
                if message.id != self.active_id {
                    trace!(id = ?message.id, "Dropping message for replaced subscription");
                    return Ok(());
                }
                let event = message
                    .payload
                    .ok_or_else(DclistError::cannot_receive_data)
                    .and_then(|payload| {
                        serde_json::from_value::<GraphqlResponse>(payload).map_err(DclistError::from)
                    })
                    .and_then(decode_update)
                    .map_or_else(GatewayEvent::Error, GatewayEvent::from);
                self.emit(event);
            }
            "error" => {
                let errors: Vec<GraphqlError> = message
                    .payload
                    .and_then(|payload| serde_json::from_value(payload).ok())
                    .unwrap_or_default();
                let err = errors.into_iter().next().map_or_else(
                    || DclistError::Protocol {
                        message: "Subscription rejected without details".to_string(),
                    },
                    DclistError::from,
                );
                warn!(error = %err, "Subscription rejected");
                self.emit(GatewayEvent::Error(err));
            }
            "complete" => {
                if message.id == self.active_id {
                    debug!(id = ?message.id, "Server completed subscription");
                    self.active_id = None;
                }
            }
            "ping" => conn.send_json(&ProtocolMessage::new("pong")).await?,
            "pong" | "connection_ack" => {}
            other => self.emit(GatewayEvent::Error(DclistError::Protocol {
                message: format!("Unexpected message type: {other}"),
            })),
        }
        Ok(())
    }

    /// Wait out the reconnect delay, keeping the newest document if the
    /// client re-subscribes meanwhile.
    async fn backoff(&mut self) -> Backoff {
        let Self {
            reconnect,
            commands,
            current,
            ..
        } = self;
        let wait = reconnect.wait_for_reconnect();
        tokio::pin!(wait);
        loop {
            tokio::select! {
                result = &mut wait => {
                    return match result {
                        Ok(()) => Backoff::Retry,
                        Err(err) => Backoff::GaveUp(err),
                    };
                }
                command = commands.recv() => match command {
                    Some(request) => *current = request,
                    None => return Backoff::Stop,
                },
            }
        }
    }

    fn emit(&self, event: GatewayEvent) {
        if self.events.send(event).is_err() {
            trace!("No event listeners");
        }
    }
}

fn close_reason(frame: Option<&WsCloseFrame>) -> String {
    match frame {
        Some(frame) if !frame.reason.is_empty() => frame.reason.clone(),
        Some(frame) => format!("Connection closed with code {}", frame.code),
        None => "Connection closed".to_string(),
    }
}

impl From<StreamError> for DclistError {
    fn from(err: StreamError) -> Self {
        Self::websocket(err.close_reason())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_message_omits_empty_fields() {
        let value = serde_json::to_value(ProtocolMessage::new("pong")).unwrap();
        assert_eq!(value, json!({ "type": "pong" }));

        let value = serde_json::to_value(ProtocolMessage::new("complete").with_id("3")).unwrap();
        assert_eq!(value, json!({ "type": "complete", "id": "3" }));
    }

    #[test]
    fn close_reason_prefers_peer_text() {
        assert_eq!(
            close_reason(Some(&WsCloseFrame::new(4403, "Forbidden"))),
            "Forbidden"
        );
        assert_eq!(
            close_reason(Some(&WsCloseFrame::new(1011, ""))),
            "Connection closed with code 1011"
        );
        assert_eq!(close_reason(None), "Connection closed");
    }

    #[test]
    fn stream_errors_map_to_websocket_code() {
        let err = DclistError::from(StreamError::ConnectionClosed {
            reason: "going away".into(),
            code: Some(1001),
        });
        assert_eq!(err, DclistError::websocket("going away"));
        assert_eq!(err.code(), Some(crate::WEBSOCKET_ERROR));
    }

    #[test]
    fn spawn_outside_runtime_fails() {
        let (events, _) = broadcast::channel(4);
        let (state, _) = watch::channel(ConnectionState::Idle);
        let settings = GatewaySettings {
            url: "ws://127.0.0.1:9".into(),
            token: "token".into(),
            ack_timeout: Duration::from_secs(1),
            reconnect: ReconnectConfig::default(),
        };
        let err = GatewayHandle::spawn(
            &settings,
            GraphqlRequest::new("subscription { x }"),
            events,
            Arc::new(state),
        )
        .unwrap_err();
        assert_eq!(err.code(), Some(crate::WEBSOCKET_ERROR));
    }
}
