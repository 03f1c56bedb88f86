//! WebSocket relay for realtime chat.

use crate::api::events::{ChatEvent, ChatHub};
use crate::api::server::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

/// GET /ws/chat: every text frame a client sends is relayed to all
/// connected clients, the sender included.
///
/// Connections are capped by [`AppState::ws_semaphore`]; at the cap the
/// upgrade is refused with 503.
pub async fn ws_chat(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let permit = match state.ws_semaphore.clone().try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            warn!("Rejecting WebSocket upgrade: connection cap reached");
            return (StatusCode::SERVICE_UNAVAILABLE, "Too many WebSocket connections")
                .into_response();
        }
    };

    let hub = state.chat_hub.clone();
    ws.on_upgrade(move |socket| handle_ws(socket, hub, permit))
}

async fn handle_ws(
    mut socket: WebSocket,
    hub: ChatHub,
    // Released when the connection ends.
    _permit: tokio::sync::OwnedSemaphorePermit,
) {
    let mut rx = hub.subscribe();
    debug!(listeners = hub.receiver_count(), "WebSocket client connected");
    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(e) => {
                        let json = match serde_json::to_string(&e) {
                            Ok(j) => j,
                            Err(_) => continue,
                        };
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "WebSocket client lagging, dropped chat events");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        hub.publish(ChatEvent::from_text(text.as_str()));
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    debug!("WebSocket client disconnected");
}
