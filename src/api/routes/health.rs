//! Health endpoint.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::server::AppState;

/// GET /api/health: liveness plus cache and provider status.
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let stats = state.gateway.cache().stats();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "provider_configured": state.gateway.is_configured(),
        "cache": stats,
        "realtime_listeners": state.chat_hub.receiver_count(),
    }))
}
