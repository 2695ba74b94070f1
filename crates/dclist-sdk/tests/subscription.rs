mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use dclist::{
    CLIENT_ERROR, ConnectionState, DclistError, FieldSelector, GatewayClient, GatewayClientOptions,
    GatewayEvent, SUBPROTOCOL, TEST_TOKEN, Topic, TopicSelectors, WEBSOCKET_ERROR,
};

use common::{init_test_tracing, local_config, next_event};

type ServerSocket = WebSocketStream<TcpStream>;

/// Accept one connection, echoing the subprotocol and recording the
/// `Authorization` header.
async fn accept(listener: &TcpListener, auth: Arc<Mutex<Option<String>>>) -> ServerSocket {
    let (stream, _) = listener.accept().await.expect("accept");
    accept_hdr_async(stream, move |request: &Request, mut response: Response| {
        let header = request
            .headers()
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        *auth.lock().expect("auth lock") = header;
        response
            .headers_mut()
            .insert("sec-websocket-protocol", HeaderValue::from_static(SUBPROTOCOL));
        Ok::<_, ErrorResponse>(response)
    })
    .await
    .expect("accept ws")
}

async fn recv_json(ws: &mut ServerSocket) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("frame timeout")
            .expect("frame")
            .expect("frame ok");
        if message.is_text() {
            return serde_json::from_str(message.to_text().expect("text")).expect("json frame");
        }
    }
}

async fn send_json(ws: &mut ServerSocket, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("send frame");
}

/// Read `connection_init`, acknowledge it and return the init payload.
async fn handshake(ws: &mut ServerSocket) -> Value {
    let init = recv_json(ws).await;
    assert_eq!(init["type"], "connection_init");
    send_json(ws, json!({ "type": "connection_ack" })).await;
    init["payload"].clone()
}

fn live_client(url: String) -> GatewayClient {
    GatewayClient::new(
        GatewayClientOptions::new()
            .with_token("secret")
            .with_config(local_config(None, Some(url))),
    )
    .expect("client")
}

fn test_client() -> GatewayClient {
    GatewayClient::new(GatewayClientOptions::new().with_token(TEST_TOKEN)).expect("client")
}

#[tokio::test]
async fn test_token_dedupes_without_network() {
    init_test_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    let client = GatewayClient::new(
        GatewayClientOptions::new()
            .with_token(TEST_TOKEN)
            .with_config(local_config(None, Some(format!("ws://{addr}")))),
    )
    .expect("client");

    let topics = client
        .subscribe_to(
            &["sdk_new_vote", "SDK_NEW_VOTE", "Sdk_New_Comment"],
            &TopicSelectors::new(),
        )
        .expect("subscribe");
    assert_eq!(topics, vec!["sdk_new_vote", "Sdk_New_Comment"]);
    assert_eq!(client.subscribed_topics(), vec![Topic::NewVote, Topic::NewComment]);
    assert_eq!(*client.connection_state().borrow(), ConnectionState::TestMode);

    let accepted = tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
    assert!(accepted.is_err(), "test token must not connect");
}

#[tokio::test]
async fn third_topic_is_rejected() {
    let err = test_client()
        .subscribe_to(&["SDK_NEW_VOTE", "SDK_NEW_FOLLOW"], &TopicSelectors::new())
        .expect_err("unknown topic");
    assert_eq!(
        err,
        DclistError::invalid_argument("Topic \"SDK_NEW_FOLLOW\" is invalid")
    );
}

#[tokio::test]
async fn invalid_selector_key_is_rejected_with_empty_topics() {
    let selectors =
        TopicSelectors::new().with("INVALID_KEY", FieldSelector::builder().field("id").build());
    let err = test_client()
        .subscribe_to(&[], &selectors)
        .expect_err("unknown selector key");
    assert_eq!(
        err,
        DclistError::invalid_argument("Invalid topic \"INVALID_KEY\" for custom field selector")
    );
}

#[tokio::test]
async fn non_selector_value_is_rejected() {
    let err = test_client()
        .subscribe_to_value(
            &json!(["SDK_NEW_VOTE"]),
            Some(&json!({ "SDK_NEW_VOTE": "not a selector" })),
        )
        .expect_err("string is not a selector");
    assert_eq!(
        err,
        DclistError::invalid_argument("Invalid field selector for \"SDK_NEW_VOTE\" topic")
    );
}

#[tokio::test]
async fn subscription_delivers_events_and_reports_close() {
    init_test_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let auth = Arc::new(Mutex::new(None));

    let server_auth = Arc::clone(&auth);
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener, server_auth).await;
        let init_payload = handshake(&mut ws).await;
        assert_eq!(
            init_payload,
            json!({ "headers": { "Authorization": "Bearer secret" } })
        );

        let subscribe = recv_json(&mut ws).await;
        assert_eq!(subscribe["type"], "subscribe");
        assert_eq!(subscribe["id"], "1");
        assert_eq!(subscribe["payload"]["operationName"], "SDKUpdateSubcription");
        assert_eq!(
            subscribe["payload"]["variables"],
            json!({ "topics": ["SDK_NEW_VOTE"] })
        );
        let query = subscribe["payload"]["query"].as_str().expect("query");
        assert!(query.contains("user { id username }"), "{query}");
        assert!(query.contains("comment { _id }"), "{query}");

        send_json(
            &mut ws,
            json!({
                "type": "next",
                "id": "1",
                "payload": { "data": { "sdkUpdates": {
                    "type": "SDK_NEW_VOTE",
                    "payload": { "user": { "id": "876543210987654321", "username": "voter" } }
                } } }
            }),
        )
        .await;
        send_json(
            &mut ws,
            json!({ "type": "next", "id": "1", "payload": { "data": null } }),
        )
        .await;
        ws.close(Some(CloseFrame {
            code: CloseCode::Again,
            reason: "server restarting".into(),
        }))
        .await
        .expect("close");
    });

    let client = live_client(format!("ws://{addr}"));
    let mut events = client.events();
    let selectors = TopicSelectors::new().with(
        "sdk_new_vote",
        FieldSelector::builder().fields(["id", "username"]).build(),
    );
    let topics = client
        .subscribe_to(&["sdk_new_vote"], &selectors)
        .expect("subscribe");
    assert_eq!(topics, vec!["sdk_new_vote"]);

    assert_eq!(next_event(&mut events).await, GatewayEvent::Subscribed);

    let GatewayEvent::NewVote(vote) = next_event(&mut events).await else {
        panic!("expected a vote event");
    };
    assert_eq!(vote.user.username.as_deref(), Some("voter"));

    let GatewayEvent::Error(err) = next_event(&mut events).await else {
        panic!("expected an error event");
    };
    assert_eq!(err, DclistError::cannot_receive_data());
    assert_eq!(err.code(), Some(CLIENT_ERROR));

    let GatewayEvent::Error(err) = next_event(&mut events).await else {
        panic!("expected a close error");
    };
    assert_eq!(err, DclistError::websocket("server restarting"));
    assert_eq!(err.code(), Some(WEBSOCKET_ERROR));

    server.await.expect("server task");
    assert_eq!(
        auth.lock().expect("auth lock").as_deref(),
        Some("Bearer secret")
    );
}

#[tokio::test]
async fn resubscribe_reuses_connection() {
    init_test_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener, Arc::new(Mutex::new(None))).await;
        handshake(&mut ws).await;
        let first = recv_json(&mut ws).await;
        assert_eq!(first["id"], "1");

        send_json(&mut ws, json!({ "type": "ping" })).await;

        let mut seen = Vec::new();
        loop {
            let frame = recv_json(&mut ws).await;
            let kind = frame["type"].as_str().expect("type").to_string();
            seen.push(kind.clone());
            if kind == "subscribe" {
                assert_eq!(frame["id"], "2");
                assert_eq!(
                    frame["payload"]["variables"],
                    json!({ "topics": ["SDK_NEW_VOTE", "SDK_NEW_COMMENT"] })
                );
                break;
            }
            if kind == "complete" {
                assert_eq!(frame["id"], "1");
            }
        }
        assert!(seen.contains(&"pong".to_string()), "{seen:?}");
        assert!(seen.contains(&"complete".to_string()), "{seen:?}");

        // Late message for the replaced subscription is dropped.
        send_json(
            &mut ws,
            json!({ "type": "next", "id": "1", "payload": { "data": { "sdkUpdates": {
                "type": "SDK_NEW_VOTE", "payload": { "user": { "id": "1" } }
            } } } }),
        )
        .await;
        send_json(
            &mut ws,
            json!({ "type": "next", "id": "2", "payload": { "data": { "sdkUpdates": {
                "type": "SDK_NEW_COMMENT", "payload": { "comment": { "_id": "c1" } }
            } } } }),
        )
        .await;

        let second = tokio::time::timeout(Duration::from_millis(300), listener.accept()).await;
        assert!(second.is_err(), "no second connection expected");
        ws
    });

    let client = live_client(format!("ws://{addr}"));
    let mut events = client.events();
    client
        .subscribe_to(&["SDK_NEW_VOTE"], &TopicSelectors::new())
        .expect("first subscribe");
    assert_eq!(next_event(&mut events).await, GatewayEvent::Subscribed);

    client
        .subscribe_to(&["SDK_NEW_COMMENT"], &TopicSelectors::new())
        .expect("second subscribe");
    assert_eq!(next_event(&mut events).await, GatewayEvent::Subscribed);

    let GatewayEvent::NewComment(comment) = next_event(&mut events).await else {
        panic!("expected a comment event");
    };
    assert_eq!(comment.comment.object_id.as_deref(), Some("c1"));
    assert_eq!(
        client.subscribed_topics(),
        vec![Topic::NewVote, Topic::NewComment]
    );

    drop(server.await.expect("server task"));
}

#[tokio::test]
async fn pushed_graphql_error_becomes_error_event() {
    init_test_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener, Arc::new(Mutex::new(None))).await;
        handshake(&mut ws).await;
        recv_json(&mut ws).await;
        send_json(
            &mut ws,
            json!({ "type": "next", "id": "1", "payload": { "errors": [
                { "message": "Not allowed", "extensions": { "code": "FORBIDDEN" } },
                { "message": "Ignored", "extensions": { "code": "OTHER" } }
            ] } }),
        )
        .await;
        ws
    });

    let client = live_client(format!("ws://{addr}"));
    let mut events = client.events();
    client
        .subscribe_to(&["SDK_NEW_COMMENT"], &TopicSelectors::new())
        .expect("subscribe");
    assert_eq!(next_event(&mut events).await, GatewayEvent::Subscribed);
    assert_eq!(
        next_event(&mut events).await,
        GatewayEvent::Error(DclistError::api("FORBIDDEN", "Not allowed"))
    );

    drop(server.await.expect("server task"));
}

#[tokio::test]
async fn missing_ack_times_out() {
    init_test_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener, Arc::new(Mutex::new(None))).await;
        let init = recv_json(&mut ws).await;
        assert_eq!(init["type"], "connection_init");
        ws
    });

    let mut config = local_config(None, Some(format!("ws://{addr}")));
    config.ack_timeout = Duration::from_millis(200);
    let client = GatewayClient::new(
        GatewayClientOptions::new()
            .with_token("secret")
            .with_config(config),
    )
    .expect("client");
    let mut events = client.events();
    client
        .subscribe_to(&["SDK_NEW_VOTE"], &TopicSelectors::new())
        .expect("subscribe");

    assert_eq!(
        next_event(&mut events).await,
        GatewayEvent::Error(DclistError::websocket("connection_ack timeout"))
    );
    let _ws = server.await.expect("server task");
}
