//! Unified error type for Cowatch.

use cowatch_transport::TransportError;

/// Top-level error for building and running a server.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum CowatchError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The diagnostic HTTP listener failed.
    #[error("diagnostics server: {0}")]
    Io(#[from] std::io::Error),
}
