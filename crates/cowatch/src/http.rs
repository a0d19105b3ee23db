//! Diagnostic HTTP endpoints.
//!
//! Plain read accessors over the coordinator, plus a destructive reset.
//! They are served on their own listener, never on the WebSocket port.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use cowatch_protocol::SessionId;
use cowatch_session::{SessionCoordinator, SessionInfo};
use tower_http::trace::TraceLayer;

type AppState = Arc<SessionCoordinator>;

/// Builds the diagnostic router over `coordinator`.
pub fn router(coordinator: Arc<SessionCoordinator>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/number-of-sessions", get(number_of_sessions))
        .route("/number-of-users", get(number_of_users))
        .route("/session-details", get(session_details))
        .route("/reset", get(reset))
        .layer(TraceLayer::new_for_http())
        .with_state(coordinator)
}

/// Liveness check
async fn health_check() -> &'static str {
    "OK"
}

async fn number_of_sessions(State(coordinator): State<AppState>) -> String {
    coordinator.session_count().await.to_string()
}

async fn number_of_users(State(coordinator): State<AppState>) -> String {
    coordinator.user_count().await.to_string()
}

/// Every live session, keyed by id.
async fn session_details(
    State(coordinator): State<AppState>,
) -> Json<BTreeMap<SessionId, SessionInfo>> {
    Json(coordinator.session_details().await)
}

/// Drops all sessions and users. Connections stay open.
async fn reset(State(coordinator): State<AppState>) -> &'static str {
    coordinator.reset().await;
    "OK"
}
