//! The record kept for every live connection.

use cowatch_protocol::{ServerFrame, SessionId, UserId};
use tokio::sync::mpsc;

/// Outbound queue of one connection.
///
/// Unbounded so that a broadcast never waits on a slow peer: the session
/// actor pushes and moves on, and the connection's writer task drains at
/// whatever pace the socket allows. Acks and events share the queue, so
/// a client sees them in the order they were produced.
pub type UserSender = mpsc::UnboundedSender<ServerFrame>;

/// A connected user.
///
/// Created when a connection is accepted, removed when it closes. The
/// record owns the only registry-side handle to the connection's
/// outbound queue.
#[derive(Debug, Clone)]
pub struct User {
    /// Registry-unique id, also sent to the client as its `userId`.
    pub id: UserId,

    /// The session this user occupies, if any. At most one at a time.
    pub session_id: Option<SessionId>,

    /// Where frames for this user go.
    pub sender: UserSender,
}

impl User {
    /// Returns `true` if the user is currently in a session.
    pub fn is_affiliated(&self) -> bool {
        self.session_id.is_some()
    }
}
