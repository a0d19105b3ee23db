//! Error types for the user layer.

use cowatch_protocol::{SessionId, UserId};

/// Errors returned by [`UserRegistry`](crate::UserRegistry) operations.
#[derive(Debug, thiserror::Error)]
pub enum UserError {
    /// No user is registered under this id. Either it never connected or
    /// it has already disconnected.
    #[error("user {0} is not connected")]
    NotFound(UserId),

    /// The user already occupies a session and must leave it first.
    #[error("user {0} is already in session {1}")]
    AlreadyInSession(UserId, SessionId),
}
