//! Integration tests for the Cowatch server: real WebSocket clients on one
//! side, `reqwest` against the diagnostic routes on the other.

use std::sync::Arc;
use std::time::Duration;

use cowatch::prelude::*;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

struct TestServer {
    ws_addr: String,
    http_base: String,
    coordinator: Arc<SessionCoordinator>,
}

/// Starts a server on random ports.
async fn start_server() -> TestServer {
    let server = CowatchServer::builder()
        .bind("127.0.0.1:0")
        .diagnostics("127.0.0.1:0")
        .build()
        .await
        .expect("server should build");

    let ws_addr = server.local_addr().expect("ws addr").to_string();
    let http_addr = server
        .diagnostics_addr()
        .expect("diagnostics configured")
        .expect("http addr");
    let coordinator = server.coordinator();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    TestServer {
        ws_addr,
        http_base: format!("http://{http_addr}"),
        coordinator,
    }
}

/// A connected viewer, past its `userId` greeting.
struct Client {
    ws: ClientWs,
    user_id: UserId,
}

impl Client {
    async fn connect(addr: &str) -> Self {
        let (mut ws, _) =
            tokio_tungstenite::connect_async(format!("ws://{addr}"))
                .await
                .expect("should connect");
        let user_id = match next_frame(&mut ws).await {
            ServerFrame::Event(ServerEvent::UserId(id)) => id,
            other => panic!("expected userId, got {other:?}"),
        };
        Self { ws, user_id }
    }

    async fn send(&mut self, event: &str, ack: u64, data: Value) {
        let frame = json!({ "event": event, "ack": ack, "data": data });
        self.ws
            .send(Message::text(frame.to_string()))
            .await
            .expect("send frame");
    }

    /// Sends a request and collects everything up to its ack.
    async fn request(
        &mut self,
        event: &str,
        ack: u64,
        data: Value,
    ) -> (Vec<ServerEvent>, AckPayload) {
        self.send(event, ack, data).await;
        let mut events = Vec::new();
        loop {
            match next_frame(&mut self.ws).await {
                ServerFrame::Ack { ack: id, data } if id == ack => {
                    return (events, data);
                }
                ServerFrame::Ack { ack: id, .. } => {
                    panic!("unexpected ack {id} while waiting for {ack}")
                }
                ServerFrame::Event(event) => events.push(event),
            }
        }
    }

    async fn next_event(&mut self) -> ServerEvent {
        match next_frame(&mut self.ws).await {
            ServerFrame::Event(event) => event,
            other => panic!("expected an event, got {other:?}"),
        }
    }

    /// Asserts nothing arrives for a short while.
    async fn expect_silence(&mut self) {
        let result =
            tokio::time::timeout(Duration::from_millis(100), self.ws.next()).await;
        assert!(result.is_err(), "unexpected frame: {result:?}");
    }
}

async fn next_frame(ws: &mut ClientWs) -> ServerFrame {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("decode frame");
        }
    }
}

fn body_of(event: &ServerEvent) -> &str {
    match event {
        ServerEvent::SendMessage(m) => &m.body,
        other => panic!("expected sendMessage, got {other:?}"),
    }
}

async fn get_text(server: &TestServer, path: &str) -> String {
    let resp = reqwest::get(format!("{}{path}", server.http_base))
        .await
        .expect("http request");
    assert!(resp.status().is_success(), "{path}: {}", resp.status());
    resp.text().await.expect("body")
}

/// Waits until the coordinator has processed pending disconnects.
async fn wait_for_users(server: &TestServer, expected: usize) {
    for _ in 0..100 {
        if server.coordinator.user_count().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("user count never reached {expected}");
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_connect_receives_user_id() {
    let server = start_server().await;

    let client = Client::connect(&server.ws_addr).await;

    assert_eq!(client.user_id.as_str().len(), 16);
    assert!(client.user_id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    wait_for_users(&server, 1).await;
}

#[tokio::test]
async fn test_join_chat_and_leave_over_websocket() {
    let server = start_server().await;
    let mut a = Client::connect(&server.ws_addr).await;
    let mut b = Client::connect(&server.ws_addr).await;

    // A creates the session: its own notice arrives before the ack.
    let (events, ack) = a.request("join", 1, json!("video-1")).await;
    assert_eq!(events.len(), 1);
    assert_eq!(body_of(&events[0]), "joined");
    let AckPayload::Joined(joined) = ack else {
        panic!("expected a join ack");
    };
    assert!(joined.messages.is_empty());
    assert_eq!(joined.state, PlaybackState::Paused);
    assert_eq!(joined.session_id, SessionId::new("video-1"));

    // B joins the existing session and sees both notices in its ack.
    let (_, ack) = b.request("join", 1, json!("video-1")).await;
    let AckPayload::Joined(joined) = ack else {
        panic!("expected a join ack");
    };
    assert_eq!(joined.messages.len(), 2);
    assert_eq!(joined.owner_id, Some(a.user_id.clone()));
    assert_eq!(body_of(&a.next_event().await), "joined");

    // Chat reaches both members, sender included.
    let (events, ack) = b
        .request("sendMessage", 2, json!({ "body": "hello" }))
        .await;
    assert_eq!(ack, AckPayload::done());
    assert_eq!(body_of(&events[0]), "hello");
    match a.next_event().await {
        ServerEvent::SendMessage(m) => {
            assert_eq!(m.body, "hello");
            assert_eq!(m.user_id, b.user_id);
            assert!(!m.is_system_message);
        }
        other => panic!("expected sendMessage, got {other:?}"),
    }

    // B leaves: A sees the notice and a presence refresh.
    let (events, ack) = b.request("leaveSession", 3, Value::Null).await;
    assert_eq!(ack, AckPayload::done());
    assert_eq!(body_of(&events[0]), "left");
    assert_eq!(body_of(&a.next_event().await), "left");
    assert_eq!(
        a.next_event().await,
        ServerEvent::SetPresence(Presence { anyone_typing: false })
    );
}

#[tokio::test]
async fn test_typing_presence_skips_originator() {
    let server = start_server().await;
    let mut a = Client::connect(&server.ws_addr).await;
    let mut b = Client::connect(&server.ws_addr).await;
    a.request("join", 1, json!("s")).await;
    b.request("join", 1, json!("s")).await;
    a.next_event().await; // b's "joined"

    let (events, ack) = a.request("typing", 2, json!({ "typing": true })).await;

    assert!(events.is_empty());
    assert_eq!(ack, AckPayload::done());
    assert_eq!(
        b.next_event().await,
        ServerEvent::SetPresence(Presence { anyone_typing: true })
    );
    a.expect_silence().await;
}

#[tokio::test]
async fn test_rejections_are_acked_with_error_messages() {
    let server = start_server().await;
    let mut a = Client::connect(&server.ws_addr).await;

    let (_, ack) = a.request("leaveSession", 1, Value::Null).await;
    assert_eq!(ack.error_message(), Some("Not in a session."));

    a.request("join", 2, json!("s")).await;
    let (_, ack) = a.request("join", 3, json!("s")).await;
    assert_eq!(ack.error_message(), Some("Already in a session."));

    let (events, ack) = a.request("sendMessage", 4, json!({ "body": " " })).await;
    assert!(events.is_empty());
    assert_eq!(ack.error_message(), Some("Invalid message body."));

    let (_, ack) = a.request("typing", 5, json!({})).await;
    assert_eq!(ack.error_message(), Some("Invalid typing."));

    let (_, ack) = a.request("seek", 6, json!(42)).await;
    assert_eq!(ack.error_message(), Some("Unknown event."));
}

#[tokio::test]
async fn test_malformed_frame_is_skipped() {
    let server = start_server().await;
    let mut a = Client::connect(&server.ws_addr).await;

    a.ws.send(Message::text("not json")).await.unwrap();
    a.ws.send(Message::text("[1, 2, 3]")).await.unwrap();

    let (_, ack) = a.request("leaveSession", 7, Value::Null).await;
    assert_eq!(ack.error_message(), Some("Not in a session."));
}

#[tokio::test]
async fn test_disconnect_leaves_session_and_deletes_it_when_empty() {
    let server = start_server().await;
    let mut a = Client::connect(&server.ws_addr).await;
    let mut b = Client::connect(&server.ws_addr).await;
    a.request("join", 1, json!("s1")).await;
    b.request("join", 1, json!("s1")).await;
    a.next_event().await;

    a.ws.close(None).await.unwrap();

    let left = b.next_event().await;
    assert_eq!(body_of(&left), "left");
    match left {
        ServerEvent::SendMessage(m) => assert_eq!(m.user_id, a.user_id),
        _ => unreachable!(),
    }
    assert_eq!(get_text(&server, "/number-of-sessions").await, "1");

    b.ws.close(None).await.unwrap();
    wait_for_users(&server, 0).await;
    assert_eq!(get_text(&server, "/number-of-sessions").await, "0");

    // The id is free again and starts with an empty log.
    let mut c = Client::connect(&server.ws_addr).await;
    let (_, ack) = c.request("join", 1, json!("s1")).await;
    let AckPayload::Joined(joined) = ack else {
        panic!("expected a join ack");
    };
    assert!(joined.messages.is_empty());
}

#[tokio::test]
async fn test_diagnostic_routes() {
    let server = start_server().await;
    let mut a = Client::connect(&server.ws_addr).await;
    let _idle = Client::connect(&server.ws_addr).await;
    a.request("join", 1, json!("https://example.com/watch?v=1")).await;
    a.request("sendMessage", 2, json!({ "body": "hi" })).await;
    wait_for_users(&server, 2).await;

    assert_eq!(get_text(&server, "/").await, "OK");
    assert_eq!(get_text(&server, "/number-of-users").await, "2");
    assert_eq!(get_text(&server, "/number-of-sessions").await, "1");

    let details: Value =
        serde_json::from_str(&get_text(&server, "/session-details").await).unwrap();
    let session = &details["https://example.com/watch?v=1"];
    assert_eq!(session["id"], "https://example.com/watch?v=1");
    assert_eq!(session["ownerId"], a.user_id.as_str());
    assert_eq!(session["state"], "paused");
    assert_eq!(session["userIds"], json!([a.user_id.as_str()]));
    assert_eq!(session["messages"][1]["body"], "hi");
    assert_eq!(session["messages"][1]["isSystemMessage"], false);
}

#[tokio::test]
async fn test_reset_disconnects_everyone_logically() {
    let server = start_server().await;
    let mut a = Client::connect(&server.ws_addr).await;
    a.request("join", 1, json!("s1")).await;

    assert_eq!(get_text(&server, "/reset").await, "OK");
    assert_eq!(get_text(&server, "/number-of-sessions").await, "0");
    assert_eq!(get_text(&server, "/number-of-users").await, "0");

    // Still connected, but unknown to the coordinator, whatever the
    // payload looks like.
    let (_, ack) = a.request("sendMessage", 2, json!({ "body": "hi" })).await;
    assert_eq!(ack.error_message(), Some("Disconnected."));
    let (_, ack) = a.request("join", 3, json!("s1")).await;
    assert_eq!(ack.error_message(), Some("Disconnected."));
    let (_, ack) = a.request("typing", 4, json!({ "typing": "yes" })).await;
    assert_eq!(ack.error_message(), Some("Disconnected."));
    let (_, ack) = a.request("join", 5, json!(7)).await;
    assert_eq!(ack.error_message(), Some("Disconnected."));

    a.ws.close(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.coordinator.user_count().await, 0);
}

#[tokio::test]
async fn test_idle_tcp_peer_does_not_block_new_viewers() {
    let server = start_server().await;

    // Connected, but never sends the upgrade request.
    let _idle = tokio::net::TcpStream::connect(&server.ws_addr)
        .await
        .expect("tcp connect");

    let client = tokio::time::timeout(
        Duration::from_secs(3),
        Client::connect(&server.ws_addr),
    )
    .await
    .expect("a silent peer held up the accept loop");
    assert_eq!(client.user_id.as_str().len(), 16);
    wait_for_users(&server, 1).await;
}

#[tokio::test]
async fn test_stalled_handshake_is_dropped_after_timeout() {
    use tokio::io::AsyncReadExt;

    let server = CowatchServer::builder()
        .bind("127.0.0.1:0")
        .handshake_timeout(Duration::from_millis(100))
        .build()
        .await
        .expect("server should build");
    let addr = server.local_addr().expect("ws addr");
    let coordinator = server.coordinator();
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    let mut idle = tokio::net::TcpStream::connect(addr).await.expect("tcp connect");
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(2), idle.read(&mut buf))
        .await
        .expect("server should hang up on a silent peer");
    assert!(matches!(read, Ok(0) | Err(_)));
    assert_eq!(coordinator.user_count().await, 0);
}
