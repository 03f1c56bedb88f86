//! Axum API server.

use crate::api::events::ChatHub;
use crate::config::{RealtimeConfig, ServerConfig};
use crate::gateway::ChatGateway;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for all API handlers.
#[derive(Clone)]
pub struct AppState {
    /// Chat gateway; owns the reply cache for the process lifetime.
    pub gateway: Arc<ChatGateway>,
    /// Realtime fan-out for `/ws/chat`.
    pub chat_hub: ChatHub,
    /// Semaphore limiting the number of concurrent WebSocket connections.
    ///
    /// Each accepted upgrade holds one permit for the lifetime of the
    /// connection; once exhausted the handler returns HTTP 503.
    pub ws_semaphore: Arc<tokio::sync::Semaphore>,
}

impl AppState {
    pub fn new(gateway: Arc<ChatGateway>, realtime: &RealtimeConfig) -> Self {
        Self {
            gateway,
            chat_hub: ChatHub::new(realtime.channel_capacity),
            ws_semaphore: Arc::new(tokio::sync::Semaphore::new(realtime.max_connections)),
        }
    }
}

/// Build the axum router with all API routes.
pub fn build_router(state: AppState, server: &ServerConfig) -> Router {
    let shared_state = Arc::new(state);

    // An origin that fails to parse allows nothing; Config::validate rejects
    // it before we get here. `AllowOrigin::list` panics on a wildcard.
    let allow_origin = match server.cors_origin.as_deref().map(str::trim) {
        Some("*") | None => AllowOrigin::any(),
        Some(origin) => AllowOrigin::list(origin.parse::<HeaderValue>().ok()),
    };
    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("authorization"),
        ]);

    Router::new()
        .route("/api/ask", post(super::routes::ask::ask))
        .route("/api/health", get(super::routes::health::get_health))
        .route("/ws/chat", get(super::routes::ws::ws_chat))
        .layer(DefaultBodyLimit::max(server.body_limit_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(shared_state)
}

/// Start the API server.
pub async fn start_server(
    server: &ServerConfig,
    state: AppState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = build_router(state, server);
    let addr = format!("{}:{}", server.bind, server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("API server listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
