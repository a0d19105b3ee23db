//! Logging setup for the server binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs a `tracing` subscriber that writes formatted events to stdout.
///
/// `RUST_LOG` wins when it is set. Otherwise the library crates, the
/// binary, and `tower_http` all log at `default_level`.
///
/// # Examples
///
/// ```no_run
/// cowatch::logging::init_tracing("cowatch_server", "info");
/// ```
pub fn init_tracing(binary_name: &str, default_level: &str) {
    let fallback = [
        "cowatch",
        "cowatch_session",
        "cowatch_users",
        "cowatch_transport",
        "tower_http",
        binary_name,
    ]
    .iter()
    .map(|target| format!("{target}={default_level}"))
    .collect::<Vec<_>>()
    .join(",");

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
