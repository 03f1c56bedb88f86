//! Chat assistant route.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde_json::Value;
use std::sync::Arc;
use tracing::error;

use crate::api::server::AppState;
use crate::error::GatewayError;
use crate::gateway::ChatReply;

/// POST /api/ask: answer `{"message": string}` with `{"reply": string}`.
///
/// Malformed bodies, a missing `message`, or a non-string `message` are all
/// `400`. Everything else is decided by the gateway.
///
/// Resolution runs on its own task: a client that disconnects mid-retry
/// does not stop the retry loop, and a late success still fills the cache.
pub async fn ask(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ChatReply>, GatewayError> {
    let Json(body) =
        body.map_err(|e| GatewayError::BadRequest(format!("invalid JSON body: {}", e.body_text())))?;

    let message = body
        .get("message")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::BadRequest("message is required and must be a string".into()))?;

    let gateway = Arc::clone(&state.gateway);
    let message = message.to_string();
    let resolution = tokio::spawn(async move { gateway.handle_chat_request(&message).await });

    // Upstream failures are logged where they are classified.
    match resolution.await {
        Ok(result) => result.map(Json).inspect_err(|e| {
            if let GatewayError::Misconfigured(msg) = e {
                error!("Chat request failed: {msg}");
            }
        }),
        Err(e) => {
            error!(error = %e, "Chat resolution task failed");
            Err(GatewayError::Internal(e.to_string()))
        }
    }
}
