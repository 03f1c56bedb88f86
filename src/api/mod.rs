//! HTTP API: the chat endpoint, health, and the realtime chat socket.

pub mod events;
pub mod routes;
pub mod server;
