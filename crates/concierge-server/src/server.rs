use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use concierge_core::events::iso_timestamp;
use concierge_core::ids::SubscriberId;
use concierge_upstream::UpstreamApi;

use crate::gateway::{self, GatewayState};
use crate::hub::EventHub;
use crate::relay;
use crate::subscriber::{self, SubscriberRegistry};

/// Server configuration.
pub struct ServerConfig {
    pub port: u16,
    pub max_send_queue: usize,
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            max_send_queue: 256,
            static_dir: Some(PathBuf::from("public")),
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: GatewayState,
    pub registry: Arc<SubscriberRegistry>,
    pub message_tx: mpsc::Sender<(SubscriberId, String)>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let api = gateway::api_router().with_state(state.gateway.clone());

    let mut router = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .nest("/api", api);

    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Create and start the gateway. Returns a handle that keeps the background
/// tasks alive.
pub async fn start(
    config: ServerConfig,
    upstream: Arc<dyn UpstreamApi>,
) -> Result<ServerHandle, std::io::Error> {
    let registry = Arc::new(SubscriberRegistry::new(config.max_send_queue));
    let hub = Arc::new(EventHub::new(Arc::clone(&registry)));

    // Inbound relay channel: subscriber frames → rebroadcast.
    let (message_tx, message_rx) = mpsc::channel::<(SubscriberId, String)>(1024);
    let relay_handle = tokio::spawn(relay::process_subscriber_messages(
        message_rx,
        Arc::clone(&hub),
    ));

    // Dead-peer sweep (every 60s).
    let cleanup_handle =
        subscriber::start_cleanup_task(Arc::clone(&registry), Duration::from_secs(60));

    let state = AppState {
        gateway: GatewayState::new(upstream, hub),
        registry,
        message_tx,
    };

    let router = build_router(state, config.static_dir);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "concierge gateway started");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server_handle,
        _relay: relay_handle,
        _cleanup: cleanup_handle,
    })
}

/// Handle returned by `start()` — keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
    _relay: tokio::task::JoinHandle<()>,
    _cleanup: tokio::task::JoinHandle<()>,
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Register the new subscriber and run its connection to completion.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (subscriber_id, rx) = state.registry.register();
    tracing::info!(subscriber_id = %subscriber_id, "subscriber connected");

    subscriber::handle_ws_connection(
        socket,
        subscriber_id,
        rx,
        state.registry,
        state.message_tx,
    )
    .await;
}

/// Health check HTTP endpoint.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": iso_timestamp(),
    }))
}
