//! Reqwest-backed transport for the chat-completion provider.
//!
//! Sends `POST {api_url}` with `Authorization: Bearer <key>` and a JSON body
//! of `{model, message}`. The response body is read as text; the gateway
//! decides whether it is JSON worth parsing.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::{TransportError, UpstreamRequest, UpstreamResponse, UpstreamTransport};

/// Connect timeout for the underlying client. The per-attempt deadline is
/// enforced by the gateway on top of this.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP transport to the provider.
pub struct HttpTransport {
    api_url: String,
    client: Client,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl HttpTransport {
    /// Build a transport posting to `api_url`.
    pub fn new(api_url: impl Into<String>) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            api_url: api_url.into(),
            client,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[async_trait]
impl UpstreamTransport for HttpTransport {
    async fn send(
        &self,
        api_key: &str,
        request: &UpstreamRequest,
    ) -> Result<UpstreamResponse, TransportError> {
        debug!(url = %self.api_url, model = %request.model, "Connecting to chat provider");

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Accept", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    TransportError::Connect(e.to_string())
                } else {
                    TransportError::Request(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Request(format!("failed to read response body: {e}")))?;

        debug!(status, content_type = ?content_type, bytes = body.len(), "Chat provider responded");

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}
