//! Error types for the protocol layer.
//!
//! Each crate in Cowatch defines its own error enum. A `ProtocolError`
//! always means the bytes or the payload shape were wrong, never that a
//! session or user was in the wrong state.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a frame into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a frame).
    ///
    /// Common causes: malformed JSON, a frame without an `event` field,
    /// or a non-object at the top level.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame named an event the server does not handle.
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// The frame's `data` does not have the shape its event requires,
    /// e.g. a `typing` event whose `typing` field is not a boolean.
    #[error("invalid payload for {event}: {reason}")]
    InvalidPayload {
        event: &'static str,
        reason: String,
    },

    /// A `sendMessage` event without a string `body`.
    #[error("invalid message body")]
    InvalidMessageBody,
}
