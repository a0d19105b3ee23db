//! `CowatchServer` builder and server loop.
//!
//! This is the entry point for running a Cowatch server. It ties the
//! layers together: transport → protocol → coordinator, plus the optional
//! diagnostic HTTP listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use cowatch_protocol::JsonCodec;
use cowatch_session::{CoordinatorConfig, SessionCoordinator};
use cowatch_transport::{Handshake, Transport, WebSocketTransport};
use tokio::net::TcpListener;

use crate::CowatchError;
use crate::handler::handle_connection;

/// How long a peer gets to finish the WebSocket upgrade.
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState {
    pub(crate) coordinator: Arc<SessionCoordinator>,
    pub(crate) codec: JsonCodec,
}

/// Builder for configuring and starting a Cowatch server.
///
/// # Example
///
/// ```rust,ignore
/// let server = CowatchServer::builder()
///     .bind("0.0.0.0:5000")
///     .diagnostics("0.0.0.0:5001")
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct CowatchServerBuilder {
    bind_addr: String,
    diagnostics_addr: Option<String>,
    config: CoordinatorConfig,
    handshake_timeout: Duration,
}

impl CowatchServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".to_string(),
            diagnostics_addr: None,
            config: CoordinatorConfig::default(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Sets the address of the WebSocket listener.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Serves the diagnostic HTTP routes on `addr`. Without this call no
    /// HTTP listener is started.
    pub fn diagnostics(mut self, addr: &str) -> Self {
        self.diagnostics_addr = Some(addr.to_string());
        self
    }

    /// Sets the coordinator configuration.
    pub fn coordinator_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets how long a new peer may take to finish the WebSocket upgrade
    /// before it is dropped.
    pub fn handshake_timeout(mut self, limit: Duration) -> Self {
        self.handshake_timeout = limit;
        self
    }

    /// Binds every listener. Nothing is served until
    /// [`CowatchServer::run`].
    pub async fn build(self) -> Result<CowatchServer, CowatchError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let diagnostics = match &self.diagnostics_addr {
            Some(addr) => {
                let listener = TcpListener::bind(addr).await?;
                tracing::info!(addr = %listener.local_addr()?, "diagnostics listening");
                Some(listener)
            }
            None => None,
        };

        let state = Arc::new(ServerState {
            coordinator: Arc::new(SessionCoordinator::new(self.config)),
            codec: JsonCodec,
        });

        Ok(CowatchServer {
            transport,
            diagnostics,
            state,
            handshake_timeout: self.handshake_timeout,
        })
    }
}

impl Default for CowatchServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Cowatch server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct CowatchServer {
    transport: WebSocketTransport,
    diagnostics: Option<TcpListener>,
    state: Arc<ServerState>,
    handshake_timeout: Duration,
}

impl CowatchServer {
    /// Creates a new builder.
    pub fn builder() -> CowatchServerBuilder {
        CowatchServerBuilder::new()
    }

    /// Returns the address of the WebSocket listener.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Returns the address of the diagnostic listener, if one was
    /// configured.
    pub fn diagnostics_addr(&self) -> Option<std::io::Result<SocketAddr>> {
        self.diagnostics.as_ref().map(TcpListener::local_addr)
    }

    /// Returns the coordinator shared by every connection.
    pub fn coordinator(&self) -> Arc<SessionCoordinator> {
        Arc::clone(&self.state.coordinator)
    }

    /// Runs the server.
    ///
    /// The diagnostic routes are served from their own task. The accept
    /// loop spawns one task per peer, which finishes the WebSocket upgrade
    /// and then runs the viewer's handler. Runs until the process is
    /// terminated.
    pub async fn run(mut self) -> Result<(), CowatchError> {
        if let Some(listener) = self.diagnostics.take() {
            let app = crate::http::router(Arc::clone(&self.state.coordinator));
            tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::error!(error = %e, "diagnostics server failed");
                }
            });
        }

        tracing::info!(addr = ?self.transport.local_addr().ok(), "Cowatch server running");

        loop {
            match self.transport.accept().await {
                Ok(pending) => {
                    let state = Arc::clone(&self.state);
                    let limit = self.handshake_timeout;
                    tokio::spawn(async move {
                        let conn = match pending.complete(limit).await {
                            Ok(conn) => conn,
                            Err(e) => {
                                tracing::debug!(error = %e, "handshake failed");
                                return;
                            }
                        };
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                }
            }
        }
    }
}
