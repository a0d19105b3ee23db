//! Viewing-session coordination for Cowatch.
//!
//! Each session runs as an isolated Tokio task (actor model) that owns its
//! member list, chat log, and playback state. The [`SessionCoordinator`]
//! routes users into sessions, keeps the user registry's affiliations in
//! step with session membership, and deletes a session the moment its
//! last member leaves.
//!
//! # Key types
//!
//! - [`SessionCoordinator`]: the operation set: connect, join, leave,
//!   typing, send message, disconnect, plus diagnostic accessors
//! - [`SessionHandle`]: send commands to a running session actor
//! - [`SessionInfo`]: a serializable snapshot of one session
//! - [`CoordinatorConfig`]: id length and channel sizing
//! - [`CoordinatorError`]: the rejection reasons clients can see

mod config;
mod coordinator;
mod error;
mod session;

pub use config::CoordinatorConfig;
pub use coordinator::SessionCoordinator;
pub use error::CoordinatorError;
pub use session::{LeaveOutcome, SessionHandle, SessionInfo};
