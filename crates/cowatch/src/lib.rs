//! # Cowatch
//!
//! Session and presence coordination for watch parties.
//!
//! Viewers connect over WebSocket, join a session by a shared id (usually
//! the page URL of the video), and exchange chat messages and typing
//! presence. The server keeps the authoritative registry of sessions and
//! users and fans every change out to the members it concerns.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cowatch::prelude::*;
//!
//! # async fn run() -> Result<(), CowatchError> {
//! let server = CowatchServer::builder()
//!     .bind("0.0.0.0:5000")
//!     .diagnostics("0.0.0.0:5001")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod http;
pub mod logging;
mod server;

pub use error::CowatchError;
pub use http::router;
pub use server::{CowatchServer, CowatchServerBuilder};

/// Everything needed to embed a server, in one import.
pub mod prelude {
    pub use crate::{CowatchError, CowatchServer, CowatchServerBuilder};
    pub use cowatch_protocol::{
        AckPayload, ChatMessage, ClientFrame, PlaybackState, Presence,
        ServerEvent, ServerFrame, SessionId, UserId,
    };
    pub use cowatch_session::{
        CoordinatorConfig, CoordinatorError, SessionCoordinator, SessionInfo,
    };
}
