//! Core protocol types for Cowatch's wire format.
//!
//! Every frame is a JSON object. Clients send named events that may carry
//! an acknowledgement id; the server answers each acknowledged request
//! exactly once and pushes its own named events to session members.
//!
//! ```text
//! client → server   { "event": "join", "ack": 1, "data": "<session id>" }
//! server → client   { "ack": 1, "data": { "messages": [...], ... } }
//! server → client   { "event": "sendMessage", "data": { "body": ... } }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Identifier of one live connection.
///
/// Opaque to every layer except the id generator that produced it. Unique
/// among connected users at any instant; may be reused once the previous
/// holder has disconnected.
///
/// `#[serde(transparent)]` keeps it a bare JSON string on the wire.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wraps a raw id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a viewing session.
///
/// Chosen by the client (usually derived from the page URL) and treated
/// as an opaque string. Two clients that send the same id end up in the
/// same session.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps a raw session key.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Session payloads
// ---------------------------------------------------------------------------

/// Whether the shared video is playing.
///
/// Reserved for playback sync: nothing in the coordinator changes it, but
/// it is echoed to joiners so clients can keep the field in their model.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    #[default]
    Paused,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Playing => write!(f, "playing"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// One entry in a session's chat log.
///
/// The same shape is stored in the log, replayed in join acks, and pushed
/// in `sendMessage` events, so clients render history and live traffic
/// with one code path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message text, stored exactly as sent.
    pub body: String,
    /// `true` for coordinator notices ("joined", "left").
    pub is_system_message: bool,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Author; for system messages, the user the notice is about.
    pub user_id: UserId,
}

/// Aggregate typing indicator for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    /// `true` if at least one member is currently typing.
    pub anyone_typing: bool,
}

/// Successful answer to a `join` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinAck {
    /// Chat history the joiner should render.
    pub messages: Vec<ChatMessage>,
    /// The session's first joiner. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<UserId>,
    pub state: PlaybackState,
    pub session_id: SessionId,
}

/// The `data` of an acknowledgement frame.
///
/// `#[serde(untagged)]` means the variant is chosen by shape, not by a
/// tag field: an object with `errorMessage` is an error, one with
/// `messages` and `state` is a join answer, anything else is plain
/// success. Variant order matters for decoding: most specific first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AckPayload {
    /// The request was rejected. Nothing was changed.
    Error {
        #[serde(rename = "errorMessage")]
        error_message: String,
    },

    /// The requester joined a session.
    Joined(JoinAck),

    /// Plain success, serialized as `{}`.
    Done {},
}

impl AckPayload {
    /// Builds an error acknowledgement.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error_message: message.into(),
        }
    }

    /// Builds an empty success acknowledgement.
    pub fn done() -> Self {
        Self::Done {}
    }

    /// Returns the error text if this is an error acknowledgement.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { error_message } => Some(error_message),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Events the server pushes without being asked.
///
/// `#[serde(tag = "event", content = "data")]` produces adjacently tagged
/// JSON: `{ "event": "setPresence", "data": { "anyoneTyping": true } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Sent once, right after the connection is registered.
    UserId(UserId),

    /// A chat or system message appended to the member's session.
    SendMessage(ChatMessage),

    /// The session's typing indicator changed.
    SetPresence(Presence),
}

/// Everything the server writes to a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    /// Answer to the client request carrying the same `ack` id.
    Ack { ack: u64, data: AckPayload },

    /// A server-initiated event.
    Event(ServerEvent),
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// A raw inbound frame, before its payload is validated.
///
/// `data` stays an untyped JSON value here so that a bad payload can be
/// reported back through the ack instead of failing the whole frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFrame {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
    #[serde(default)]
    pub data: Value,
}

/// Which operation a frame asks for, known before its payload is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Join,
    LeaveSession,
    Typing,
    SendMessage,
}

impl EventKind {
    /// Whether the sender must occupy a session for the request to make
    /// sense. Only `join` expects the opposite.
    pub fn requires_session(self) -> bool {
        !matches!(self, Self::Join)
    }
}

/// A validated inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Join { session_id: SessionId },
    LeaveSession,
    Typing { typing: bool },
    SendMessage { body: String },
}

impl ClientFrame {
    /// Builds a frame. Mostly useful for clients and tests.
    pub fn new(event: impl Into<String>, ack: Option<u64>, data: Value) -> Self {
        Self {
            event: event.into(),
            ack,
            data,
        }
    }

    /// Validates the payload against the event's expected shape.
    ///
    /// Only shape is checked here. Whether the body is blank or the user
    /// may join is the coordinator's call.
    pub fn to_event(&self) -> Result<ClientEvent, ProtocolError> {
        match self.kind()? {
            EventKind::Join => match &self.data {
                Value::String(id) => Ok(ClientEvent::Join {
                    session_id: SessionId::new(id.clone()),
                }),
                other => Err(ProtocolError::InvalidPayload {
                    event: "join",
                    reason: format!("expected a session id string, got {other}"),
                }),
            },
            EventKind::LeaveSession => Ok(ClientEvent::LeaveSession),
            EventKind::Typing => self
                .data
                .get("typing")
                .and_then(Value::as_bool)
                .map(|typing| ClientEvent::Typing { typing })
                .ok_or_else(|| ProtocolError::InvalidPayload {
                    event: "typing",
                    reason: format!("expected {{\"typing\": bool}}, got {}", self.data),
                }),
            EventKind::SendMessage => self
                .data
                .get("body")
                .and_then(Value::as_str)
                .map(|body| ClientEvent::SendMessage {
                    body: body.to_string(),
                })
                .ok_or(ProtocolError::InvalidMessageBody),
        }
    }

    /// Names the requested operation without looking at `data`.
    ///
    /// # Errors
    /// [`ProtocolError::UnknownEvent`] for any other event name.
    pub fn kind(&self) -> Result<EventKind, ProtocolError> {
        match self.event.as_str() {
            "join" => Ok(EventKind::Join),
            "leaveSession" => Ok(EventKind::LeaveSession),
            "typing" => Ok(EventKind::Typing),
            "sendMessage" => Ok(EventKind::SendMessage),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }
}
