//! Realtime chat hub. Fans chat messages out to every WebSocket listener.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

/// A message relayed on the realtime channel.
///
/// The payload is opaque: whatever a client sent is delivered as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    pub id: Uuid,
    pub payload: Value,
    pub sent_at: DateTime<Utc>,
}

impl ChatEvent {
    pub fn new(payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            sent_at: Utc::now(),
        }
    }

    /// Wrap a raw text frame. JSON text keeps its structure; anything else
    /// is carried as a string.
    pub fn from_text(text: &str) -> Self {
        let payload =
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()));
        Self::new(payload)
    }
}

/// Broadcast-based hub. No persistence; delivery order is whatever the
/// channel observes.
#[derive(Clone)]
pub struct ChatHub {
    tx: broadcast::Sender<ChatEvent>,
}

impl ChatHub {
    /// Create a new hub with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Send an event to all subscribers. Silently drops if no subscribers.
    pub fn publish(&self, event: ChatEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.tx.subscribe()
    }

    /// Get the current number of active subscribers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
