//! civic-ask: chat assistant gateway for the civic reporting app.
//!
//! Answers citizen questions by relaying them to a chat-completion
//! provider, with a short-lived reply cache, bounded retries and tolerant
//! reply extraction in front of it. A WebSocket relay broadcasts realtime
//! chat between connected clients.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod providers;
pub mod utils;

pub use cache::ResponseCache;
pub use config::Config;
pub use error::{GatewayError, Result};
pub use gateway::{ChatGateway, ChatReply};
