use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use concierge_server::ServerConfig;
use concierge_upstream::UpstreamClient;

/// Hotel concierge gateway: proxies the data service and pushes state-change
/// events to WebSocket subscribers.
#[derive(Parser, Debug)]
#[command(name = "concierge")]
struct Args {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Base URL of the hotel data service.
    #[arg(long, env = "UPSTREAM_BASE_URL", default_value = "http://localhost:5000")]
    upstream_base_url: String,

    /// Seconds before an upstream request is abandoned.
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = 30)]
    upstream_timeout_secs: u64,

    /// Directory of the static frontend served at `/`.
    #[arg(long, env = "STATIC_DIR", default_value = "public")]
    static_dir: PathBuf,
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    tracing::info!("Starting concierge gateway");

    let upstream = UpstreamClient::with_timeout(
        args.upstream_base_url,
        Duration::from_secs(args.upstream_timeout_secs),
    )
    .expect("Failed to build upstream client");
    tracing::info!(base_url = %upstream.base_url(), "Upstream client ready");

    let config = ServerConfig {
        port: args.port,
        static_dir: Some(args.static_dir),
        ..Default::default()
    };

    let handle = concierge_server::start(config, Arc::new(upstream))
        .await
        .expect("Failed to start server");

    tracing::info!(port = handle.port, "Concierge gateway ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl+c");

    tracing::info!("Shutting down");
}
