//! Wire protocol for Cowatch.
//!
//! This crate defines what travels between a viewer's browser and the
//! coordination server:
//!
//! - **Identifiers** ([`UserId`], [`SessionId`]) shared by every layer.
//! - **Frames** ([`ClientFrame`], [`ServerFrame`]): the JSON objects
//!   carried one per WebSocket text frame.
//! - **Payloads** ([`ChatMessage`], [`Presence`], [`JoinAck`],
//!   [`AckPayload`]): what events and acknowledgements carry.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): bytes in, frames out.
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (frames) → Coordinator (sessions, users)
//! ```
//!
//! The protocol layer knows nothing about sessions or connections. It
//! only knows the shape of the messages and how to validate an inbound
//! event's payload before the coordinator sees it.

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    AckPayload, ChatMessage, ClientEvent, ClientFrame, EventKind, JoinAck,
    PlaybackState, Presence, ServerEvent, ServerFrame, SessionId, UserId,
};
