//! Chat-completion provider plumbing.
//!
//! [`UpstreamTransport`] is the seam between the gateway and the provider's
//! HTTP API. A transport performs exactly one request and reports what came
//! back (status, content type, raw body) without judging it; classification
//! into success, transient and fatal outcomes lives in the gateway.

pub mod http;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use http::HttpTransport;

/// Body sent to the provider's chat endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamRequest {
    pub model: String,
    pub message: String,
}

/// Raw provider response, as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl UpstreamResponse {
    /// Build a JSON response. Mostly useful for fakes.
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: Some("application/json".to_string()),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Whether the declared content type is JSON (`application/json` or any
    /// `+json` structured suffix), ignoring parameters such as `charset`.
    pub fn is_json(&self) -> bool {
        let Some(ct) = self.content_type.as_deref() else {
            return false;
        };
        let mime = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        mime == "application/json" || mime.ends_with("+json")
    }
}

/// Failure to obtain any response from the provider.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection to provider failed: {0}")]
    Connect(String),
    #[error("provider request failed: {0}")]
    Request(String),
}

/// One-shot request to the chat-completion provider.
#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    /// Send `request`, authenticated with `api_key` as a bearer token.
    async fn send(
        &self,
        api_key: &str,
        request: &UpstreamRequest,
    ) -> std::result::Result<UpstreamResponse, TransportError>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}
