//! Cowatch coordination server.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin cowatch-server
//! cargo run --bin cowatch-server -- --port 5000 --http-port 5001
//! PORT=8080 cargo run --bin cowatch-server
//! ```

use clap::Parser;
use cowatch::logging::init_tracing;
use cowatch::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "cowatch-server")]
#[command(about = "Session and presence coordination server for watch parties", long_about = None)]
struct Args {
    /// Host address to bind both listeners to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// WebSocket port
    #[arg(short = 'p', long, env = "PORT", default_value_t = 5000)]
    port: u16,

    /// Diagnostic HTTP port
    #[arg(long, env = "HTTP_PORT", default_value_t = 5001)]
    http_port: u16,

    /// Default log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(&env!("CARGO_BIN_NAME").replace('-', "_"), &args.log_level);

    let server = match CowatchServer::builder()
        .bind(&format!("{}:{}", args.host, args.port))
        .diagnostics(&format!("{}:{}", args.host, args.http_port))
        .build()
        .await
    {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        tracing::error!(error = %e, "server error");
        std::process::exit(1);
    }
}
