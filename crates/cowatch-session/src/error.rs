//! Error types for the session layer.
//!
//! The `Display` text of each variant is what clients receive in the
//! `errorMessage` field of a rejected request, so it is written for the
//! browser extension rather than for logs.

use cowatch_protocol::SessionId;
use cowatch_users::UserError;

/// Why a request was rejected. Every variant is detected before any state
/// is changed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    /// The user is no longer registered: the request raced with its own
    /// disconnect, or the registry was reset.
    #[error("Disconnected.")]
    Disconnected,

    /// A join from a user who already occupies a session.
    #[error("Already in a session.")]
    AlreadyInSession,

    /// Leave, typing, or send from a user outside any session.
    #[error("Not in a session.")]
    NotInSession,

    /// The payload had the wrong shape. Carries the name of the field
    /// that was wrong.
    #[error("Invalid {0}.")]
    InvalidPayload(&'static str),

    /// A chat message that is empty once whitespace is trimmed.
    #[error("Invalid message body.")]
    InvalidMessageBody,

    /// The session's actor stopped answering (it was shut down by a
    /// reset while the request was in flight). The connection handler
    /// reports it to clients as [`Self::Disconnected`].
    #[error("Session {0} is unavailable.")]
    Unavailable(SessionId),
}

impl From<UserError> for CoordinatorError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::NotFound(_) => Self::Disconnected,
            UserError::AlreadyInSession(..) => Self::AlreadyInSession,
        }
    }
}
