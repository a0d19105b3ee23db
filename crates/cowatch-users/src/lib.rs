//! Connected-user registry for Cowatch.
//!
//! One [`User`] exists per live connection. This crate owns:
//!
//! 1. **Id allocation**: random fixed-length tokens ([`IdGenerator`]),
//!    re-rolled until they don't collide with a live user
//! 2. **The registry**: who is connected and which session, if any,
//!    they currently occupy ([`UserRegistry`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Session layer (above)  ← reads affiliations, hands senders to session actors
//!     ↕
//! User layer (this crate)  ← connection identity and affiliation
//!     ↕
//! Protocol layer (below)  ← UserId, SessionId, ServerFrame
//! ```

mod error;
mod ids;
mod registry;
mod user;

pub use error::UserError;
pub use ids::{DEFAULT_ID_LENGTH, IdGenerator, RandomIdGenerator};
pub use registry::UserRegistry;
pub use user::{User, UserSender};
