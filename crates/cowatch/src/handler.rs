//! Per-connection handler: registration, request dispatch, and cleanup.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Register with the coordinator → the `userId` event is queued
//!   2. Spawn a writer task that drains the connection's outbound queue
//!   3. Loop: receive frames → validate → call the coordinator → queue ack
//!   4. On close, close the socket and disconnect the user (which leaves
//!      its session)
//!
//! A request is checked in a fixed order: event name, then registration
//! and affiliation, then payload shape. A viewer outside any session who
//! sends a malformed `typing` therefore hears "Not in a session.", and a
//! viewer forgotten by a reset hears "Disconnected." whatever it sends.
//!
//! Acks and broadcasts share one outbound queue, so a viewer sees them in
//! the order the coordinator produced them.

use std::sync::Arc;

use cowatch_protocol::{
    AckPayload, ClientEvent, ClientFrame, Codec, ProtocolError, ServerFrame,
    UserId,
};
use cowatch_session::{CoordinatorError, SessionCoordinator};
use cowatch_transport::{Connection, WebSocketConnection};
use cowatch_users::UserSender;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::CowatchError;
use crate::server::ServerState;

/// Ack text for an event name the server does not handle.
const UNKNOWN_EVENT: &str = "Unknown event.";

/// Drop guard that disconnects the user when the handler exits.
///
/// Cleanup happens even if the handler returns early or panics. `Drop`
/// is synchronous, so the disconnect runs in a spawned task.
struct DisconnectGuard {
    user_id: UserId,
    coordinator: Arc<SessionCoordinator>,
    writer: JoinHandle<()>,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.writer.abort();
        let user_id = self.user_id.clone();
        let coordinator = Arc::clone(&self.coordinator);
        tokio::spawn(async move {
            coordinator.disconnect(&user_id).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: WebSocketConnection,
    state: Arc<ServerState>,
) -> Result<(), CowatchError> {
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    let peer = conn.peer_addr();

    let (tx, rx) = mpsc::unbounded_channel();
    let user_id = state.coordinator.connect(tx.clone()).await;
    tracing::debug!(%conn_id, %peer, %user_id, "connection registered");

    let writer = tokio::spawn(write_frames(
        Arc::clone(&conn),
        rx,
        state.codec,
        user_id.clone(),
    ));
    let _guard = DisconnectGuard {
        user_id: user_id.clone(),
        coordinator: Arc::clone(&state.coordinator),
        writer,
    };

    let result: Result<(), CowatchError> = loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::debug!(%user_id, "connection closed cleanly");
                break Ok(());
            }
            Err(e) => {
                tracing::debug!(%user_id, error = %e, "recv error");
                break Err(e.into());
            }
        };

        let frame: ClientFrame = match state.codec.decode(&data) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(%user_id, error = %e, "failed to decode frame");
                continue;
            }
        };

        handle_frame(&state.coordinator, &user_id, &tx, frame).await;
    };

    if let Err(e) = conn.close().await {
        tracing::trace!(%user_id, error = %e, "close after hangup failed");
    }

    // _guard drops here → writer stops, disconnect fires.
    result
}

/// Runs one request and queues its ack, if the client asked for one.
async fn handle_frame(
    coordinator: &SessionCoordinator,
    user_id: &UserId,
    tx: &UserSender,
    frame: ClientFrame,
) {
    let payload = dispatch(coordinator, user_id, &frame).await;

    if let Some(message) = payload.error_message() {
        tracing::debug!(%user_id, event = %frame.event, reason = message, "request rejected");
    }

    match frame.ack {
        Some(ack) => {
            let _ = tx.send(ServerFrame::Ack { ack, data: payload });
        }
        None => {
            tracing::trace!(%user_id, event = %frame.event, "no ack requested");
        }
    }
}

/// Validates the frame and routes it to the coordinator.
async fn dispatch(
    coordinator: &SessionCoordinator,
    user_id: &UserId,
    frame: &ClientFrame,
) -> AckPayload {
    let kind = match frame.kind() {
        Ok(kind) => kind,
        Err(e) => {
            tracing::debug!(%user_id, error = %e, "unknown event");
            return AckPayload::error(UNKNOWN_EVENT);
        }
    };

    if let Err(e) = coordinator.check(user_id, kind).await {
        return AckPayload::error(e.to_string());
    }

    let event = match frame.to_event() {
        Ok(event) => event,
        Err(e) => return AckPayload::error(rejection(e).to_string()),
    };

    let result = match event {
        ClientEvent::Join { session_id } => coordinator
            .join(user_id, session_id)
            .await
            .map(AckPayload::Joined),
        ClientEvent::LeaveSession => {
            coordinator.leave(user_id).await.map(|()| AckPayload::done())
        }
        ClientEvent::Typing { typing } => coordinator
            .set_typing(user_id, typing)
            .await
            .map(|()| AckPayload::done()),
        ClientEvent::SendMessage { body } => coordinator
            .send_message(user_id, body)
            .await
            .map(|()| AckPayload::done()),
    };

    result.unwrap_or_else(|e| AckPayload::error(client_error(e).to_string()))
}

/// A session stopped mid-request only by a reset, which also forgot the
/// user, so clients hear the same thing as for any other forgotten user.
fn client_error(err: CoordinatorError) -> CoordinatorError {
    match err {
        CoordinatorError::Unavailable(session_id) => {
            tracing::debug!(%session_id, "session stopped mid-request");
            CoordinatorError::Disconnected
        }
        other => other,
    }
}

/// Maps a payload-shape error onto the rejection clients know.
fn rejection(err: ProtocolError) -> CoordinatorError {
    match err {
        ProtocolError::InvalidMessageBody => CoordinatorError::InvalidMessageBody,
        ProtocolError::InvalidPayload { event: "join", .. } => {
            CoordinatorError::InvalidPayload("session id")
        }
        ProtocolError::InvalidPayload { event, .. } => {
            CoordinatorError::InvalidPayload(event)
        }
        other => {
            tracing::debug!(error = %other, "unexpected protocol error");
            CoordinatorError::InvalidPayload("request")
        }
    }
}

/// Drains the outbound queue into the socket until either side closes.
async fn write_frames(
    conn: Arc<WebSocketConnection>,
    mut rx: mpsc::UnboundedReceiver<ServerFrame>,
    codec: impl Codec,
    user_id: UserId,
) {
    while let Some(frame) = rx.recv().await {
        let bytes = match codec.encode(&frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "failed to encode frame");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(%user_id, error = %e, "send failed, stopping writer");
            break;
        }
    }
}
