//! Chat gateway: cache, resilient upstream call, reply extraction.
//!
//! ```text
//! message -> validate -> cache lookup --hit--> reply
//!                              | miss
//!                              v
//!            credential? -> retry loop (timeout per attempt)
//!                              |
//!                              v
//!            extract reply -> cache put -> reply
//! ```

pub mod extract;
pub mod retry;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::ResponseCache;
use crate::config::{Config, ConfigError};
use crate::error::{GatewayError, Result};
use crate::providers::{HttpTransport, UpstreamRequest, UpstreamResponse, UpstreamTransport};
use crate::utils::sanitize::{compact_detail, truncate_chars, MAX_DETAIL_CHARS, MAX_LOG_CHARS};

use self::extract::ReplyExtractor;
use self::retry::{run_with_retry, AttemptOutcome, JitterSource, RandomJitter, RetryPolicy};

/// Successful answer to a chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
}

/// Per-gateway settings that are not collaborators.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "command-r-plus".to_string(),
            timeout: Duration::from_millis(10_000),
            retry: RetryPolicy::default(),
        }
    }
}

/// Resilient front for the chat-completion provider.
pub struct ChatGateway {
    transport: Arc<dyn UpstreamTransport>,
    cache: Arc<ResponseCache>,
    settings: GatewaySettings,
    jitter: Arc<dyn JitterSource>,
    extractor: ReplyExtractor,
}

impl std::fmt::Debug for ChatGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatGateway")
            .field("transport", &self.transport.name())
            .field("model", &self.settings.model)
            .field("configured", &self.is_configured())
            .field("timeout", &self.settings.timeout)
            .field("retry", &self.settings.retry)
            .field("cache", &self.cache)
            .finish()
    }
}

impl ChatGateway {
    pub fn new(
        transport: Arc<dyn UpstreamTransport>,
        cache: Arc<ResponseCache>,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            transport,
            cache,
            settings,
            jitter: Arc::new(RandomJitter),
            extractor: ReplyExtractor::default(),
        }
    }

    /// Build a gateway with the HTTP transport and a fresh cache.
    pub fn from_config(config: &Config) -> std::result::Result<Self, ConfigError> {
        let transport = HttpTransport::new(config.provider.api_url.clone())
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let cache = ResponseCache::new(config.cache.ttl(), config.cache.max_entries);
        let settings = GatewaySettings {
            api_key: config.provider.credential().map(String::from),
            model: config.provider.model.clone(),
            timeout: config.provider.timeout(),
            retry: config.retry.to_policy(),
        };
        Ok(Self::new(Arc::new(transport), Arc::new(cache), settings))
    }

    /// Replace the backoff jitter source.
    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Replace the reply extractor.
    pub fn with_extractor(mut self, extractor: ReplyExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Whether a provider credential is available.
    pub fn is_configured(&self) -> bool {
        self.settings.api_key.is_some()
    }

    /// Answer a user query, from cache if possible.
    pub async fn handle_chat_request(&self, message: &str) -> Result<ChatReply> {
        if message.trim().is_empty() {
            return Err(GatewayError::BadRequest(
                "message must be a non-empty string".into(),
            ));
        }

        let key = ResponseCache::normalize_key(message);
        if let Some(reply) = self.cache.get(&key) {
            debug!(key = %truncate_chars(&key, 32), "Chat cache hit");
            return Ok(ChatReply { reply });
        }

        let response = self.resolve_upstream(message).await?;
        let reply = self.extractor.extract(&response);
        info!(reply = %truncate_chars(&reply, MAX_LOG_CHARS), "Chat reply extracted");

        self.cache.put(key, reply.clone());
        Ok(ChatReply { reply })
    }

    /// Call the provider with timeout, classification and retries.
    async fn resolve_upstream(&self, message: &str) -> Result<Value> {
        let Some(api_key) = self.settings.api_key.as_deref() else {
            return Err(GatewayError::Misconfigured(
                "no chat provider credential configured (AI_API_KEY)".into(),
            ));
        };

        let request = UpstreamRequest {
            model: self.settings.model.clone(),
            message: message.to_string(),
        };

        info!(
            transport = self.transport.name(),
            model = %request.model,
            "Cache miss, querying chat provider"
        );

        let request = &request;
        run_with_retry(&self.settings.retry, self.jitter.as_ref(), move |attempt| {
            self.attempt(api_key, request, attempt)
        })
        .await
    }

    async fn attempt(
        &self,
        api_key: &str,
        request: &UpstreamRequest,
        attempt: u32,
    ) -> AttemptOutcome<Value> {
        debug!(attempt, "Sending chat provider request");
        let timeout = self.settings.timeout;
        match tokio::time::timeout(timeout, self.transport.send(api_key, request)).await {
            Err(_) => AttemptOutcome::Retryable(format!(
                "request timed out after {}ms",
                timeout.as_millis()
            )),
            Ok(Err(e)) => AttemptOutcome::Retryable(e.to_string()),
            Ok(Ok(response)) => classify(response),
        }
    }
}

/// Map a raw provider response onto the retry state machine's outcomes.
///
/// Status is checked before content type: 5xx is transient and 4xx is fatal
/// whatever the body looks like. A 2xx must declare JSON before the body is
/// parsed.
pub fn classify(response: UpstreamResponse) -> AttemptOutcome<Value> {
    let status = response.status;

    if response.is_server_error() {
        return AttemptOutcome::Retryable(format!(
            "provider returned {}: {}",
            status,
            compact_detail(&response.body, MAX_DETAIL_CHARS)
        ));
    }

    if response.is_client_error() {
        let detail = upstream_error_detail(&response);
        warn!(status, detail = %detail, "Chat provider rejected request");
        return AttemptOutcome::Fatal(GatewayError::UpstreamRejected { status, detail });
    }

    if !response.is_json() {
        let content_type = response.content_type.as_deref().unwrap_or("<none>");
        warn!(status, content_type, "Chat provider returned non-JSON content");
        return AttemptOutcome::Fatal(GatewayError::UpstreamMalformed {
            detail: format!("expected application/json, got {content_type} (status {status})"),
        });
    }

    if !response.is_success() {
        return AttemptOutcome::Fatal(GatewayError::UpstreamMalformed {
            detail: format!("unexpected status {status}"),
        });
    }

    match serde_json::from_str::<Value>(&response.body) {
        Ok(json) => AttemptOutcome::Success(json),
        Err(e) => AttemptOutcome::Fatal(GatewayError::UpstreamMalformed {
            detail: format!("invalid JSON body: {e}"),
        }),
    }
}

/// Best human-readable error message from a rejected response.
fn upstream_error_detail(response: &UpstreamResponse) -> String {
    let from_json = if response.is_json() {
        serde_json::from_str::<Value>(&response.body)
            .ok()
            .and_then(|v| {
                v["message"]
                    .as_str()
                    .or_else(|| v["error"]["message"].as_str())
                    .or_else(|| v["error"].as_str())
                    .map(String::from)
            })
    } else {
        None
    };
    let raw = from_json.unwrap_or_else(|| response.body.clone());
    if raw.trim().is_empty() {
        format!("status {}", response.status)
    } else {
        compact_detail(&raw, MAX_DETAIL_CHARS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::providers::testing::{FakeTransport, Step};
    use super::retry::FixedJitter;
    use tokio::time::Instant;

    const OK_BODY: &str = r#"{"message":{"content":[{"type":"text","text":"We logged your report."}]}}"#;

    struct Harness {
        gateway: ChatGateway,
        transport: Arc<FakeTransport>,
        clock: ManualClock,
    }

    fn harness_with(steps: Vec<Step>, api_key: Option<&str>) -> Harness {
        let transport = Arc::new(FakeTransport::new(steps));
        let clock = ManualClock::new();
        let cache = Arc::new(ResponseCache::with_clock(
            Duration::from_secs(30),
            64,
            Arc::new(clock.clone()),
        ));
        let settings = GatewaySettings {
            api_key: api_key.map(String::from),
            ..GatewaySettings::default()
        };
        let gateway = ChatGateway::new(transport.clone(), cache, settings)
            .with_jitter(Arc::new(FixedJitter(Duration::from_millis(100))));
        Harness {
            gateway,
            transport,
            clock,
        }
    }

    fn harness(steps: Vec<Step>) -> Harness {
        harness_with(steps, Some("sk-test"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_extracts_and_sends_request() {
        let h = harness(vec![Step::json(200, OK_BODY)]);
        let reply = h.gateway.handle_chat_request("Is my pothole fixed?").await.unwrap();
        assert_eq!(reply.reply, "We logged your report.");

        let requests = h.transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "sk-test");
        assert_eq!(requests[0].1.model, "command-r-plus");
        assert_eq!(requests[0].1.message, "Is my pothole fixed?");
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_message_is_bad_request_without_upstream_call() {
        let h = harness(vec![Step::json(200, OK_BODY)]);
        for input in ["", "   ", "\n\t"] {
            let err = h.gateway.handle_chat_request(input).await.unwrap_err();
            assert!(matches!(err, GatewayError::BadRequest(_)));
        }
        assert_eq!(h.transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_cache_hit_skips_upstream() {
        let h = harness(vec![Step::json(200, OK_BODY)]);
        h.gateway.cache().put("hello".into(), "cached answer".into());

        let reply = h.gateway.handle_chat_request("hello").await.unwrap();
        assert_eq!(reply.reply, "cached answer");
        assert_eq!(h.transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_normalized_queries_share_cache_entry() {
        let h = harness(vec![Step::json(200, r#"{"text":"hi there"}"#)]);
        let first = h.gateway.handle_chat_request("  Hello World  ").await.unwrap();
        let second = h.gateway.handle_chat_request("hello world").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(h.transport.calls(), 1);
        assert_eq!(h.gateway.cache().stats().hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_triggers_fresh_resolution() {
        let h = harness(vec![
            Step::json(200, r#"{"text":"first"}"#),
            Step::json(200, r#"{"text":"second"}"#),
        ]);
        assert_eq!(h.gateway.handle_chat_request("q").await.unwrap().reply, "first");

        h.clock.advance(Duration::from_secs(30));
        assert_eq!(h.gateway.handle_chat_request("q").await.unwrap().reply, "second");
        assert_eq!(h.transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_credential_is_misconfigured_without_upstream_call() {
        let h = harness_with(vec![Step::json(200, OK_BODY)], None);
        let err = h.gateway.handle_chat_request("hi").await.unwrap_err();
        assert!(matches!(err, GatewayError::Misconfigured(_)));
        assert_eq!(h.transport.calls(), 0);
        assert!(!h.gateway.is_configured());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_served_even_without_credential() {
        let h = harness_with(vec![], None);
        h.gateway.cache().put("hi".into(), "cached".into());
        assert_eq!(h.gateway.handle_chat_request("HI").await.unwrap().reply, "cached");
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_then_success_waits_for_backoff() {
        let h = harness(vec![
            Step::json(500, r#"{"message":"internal"}"#),
            Step::json(500, r#"{"message":"internal"}"#),
            Step::json(200, r#"{"generations":[{"text":"third time"}]}"#),
        ]);
        let start = Instant::now();
        let reply = h.gateway.handle_chat_request("retry me").await.unwrap();

        assert_eq!(reply.reply, "third time");
        assert_eq!(h.transport.calls(), 3);
        // (300 + 100) + (600 + 100) with fixed jitter
        assert!(start.elapsed() >= Duration::from_millis(1100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_fails_immediately() {
        let h = harness(vec![
            Step::json(429, r#"{"message":"rate limit exceeded"}"#),
            Step::json(200, OK_BODY),
        ]);
        let start = Instant::now();
        let err = h.gateway.handle_chat_request("too fast").await.unwrap_err();

        match err {
            GatewayError::UpstreamRejected { status, detail } => {
                assert_eq!(status, 429);
                assert_eq!(detail, "rate limit exceeded");
            }
            other => panic!("expected UpstreamRejected, got {other:?}"),
        }
        assert_eq!(h.transport.calls(), 1);
        assert!(start.elapsed() < Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_html_success_is_malformed() {
        let h = harness(vec![Step::with_content_type(
            200,
            "text/html",
            "<html><body>Bad gateway</body></html>",
        )]);
        let err = h.gateway.handle_chat_request("hello").await.unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamMalformed { .. }));
        assert_eq!(h.transport.calls(), 1);
        assert!(h.gateway.cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_report_unavailable() {
        let h = harness(vec![Step::json(503, r#"{"message":"overloaded"}"#)]);
        let start = Instant::now();
        let err = h.gateway.handle_chat_request("anyone there").await.unwrap_err();

        match err {
            GatewayError::UpstreamUnavailable { attempts, detail } => {
                assert_eq!(attempts, 4);
                assert!(detail.contains("503"), "{detail}");
            }
            other => panic!("expected UpstreamUnavailable, got {other:?}"),
        }
        assert_eq!(h.transport.calls(), 4);
        // 400 + 700 + 1300; no sleep after the last attempt.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(2400), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(2400 + 300), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_retryable() {
        let h = harness(vec![Step::Hang, Step::json(200, r#"{"text":"late but ok"}"#)]);
        let start = Instant::now();
        let reply = h.gateway.handle_chat_request("slow").await.unwrap();

        assert_eq!(reply.reply, "late but ok");
        assert_eq!(h.transport.calls(), 2);
        assert!(start.elapsed() >= Duration::from_millis(10_000 + 400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_is_retryable() {
        let h = harness(vec![
            Step::Fail("connection refused".into()),
            Step::json(200, r#"{"text":"recovered"}"#),
        ]);
        let reply = h.gateway.handle_chat_request("flaky").await.unwrap();
        assert_eq!(reply.reply, "recovered");
        assert_eq!(h.transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_not_cached() {
        let h = harness(vec![
            Step::json(400, r#"{"message":"bad"}"#),
            Step::json(200, r#"{"text":"fine now"}"#),
        ]);
        assert!(h.gateway.handle_chat_request("q").await.is_err());
        assert!(h.gateway.cache().is_empty());
        assert_eq!(h.gateway.handle_chat_request("q").await.unwrap().reply, "fine now");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrecognised_shape_falls_back_to_serialized_body() {
        let h = harness(vec![Step::json(200, r#"{"weird":true}"#)]);
        let reply = h.gateway.handle_chat_request("q").await.unwrap();
        assert_eq!(reply.reply, r#"{"weird":true}"#);
    }

    #[test]
    fn test_classify_json_success() {
        let outcome = classify(UpstreamResponse::json(200, r#"{"text":"x"}"#));
        assert!(matches!(outcome, AttemptOutcome::Success(_)));
    }

    #[test]
    fn test_classify_invalid_json_is_malformed() {
        let outcome = classify(UpstreamResponse::json(200, "{not json"));
        assert!(matches!(
            outcome,
            AttemptOutcome::Fatal(GatewayError::UpstreamMalformed { .. })
        ));
    }

    #[test]
    fn test_classify_server_error_with_html_is_retryable() {
        let outcome = classify(UpstreamResponse {
            status: 502,
            content_type: Some("text/html".into()),
            body: "<html>proxy error</html>".into(),
        });
        assert!(matches!(outcome, AttemptOutcome::Retryable(_)));
    }

    #[test]
    fn test_classify_redirect_is_malformed() {
        let outcome = classify(UpstreamResponse::json(304, ""));
        assert!(matches!(
            outcome,
            AttemptOutcome::Fatal(GatewayError::UpstreamMalformed { .. })
        ));
    }

    #[test]
    fn test_rejected_detail_prefers_nested_error_message() {
        let outcome = classify(UpstreamResponse::json(
            401,
            r#"{"error":{"message":"invalid api token"}}"#,
        ));
        match outcome {
            AttemptOutcome::Fatal(GatewayError::UpstreamRejected { detail, .. }) => {
                assert_eq!(detail, "invalid api token");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_rejected_detail_bounded_and_never_empty() {
        let long = UpstreamResponse {
            status: 400,
            content_type: Some("text/plain".into()),
            body: "x".repeat(2000),
        };
        match classify(long) {
            AttemptOutcome::Fatal(GatewayError::UpstreamRejected { detail, .. }) => {
                assert_eq!(detail.chars().count(), MAX_DETAIL_CHARS);
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        let empty = UpstreamResponse {
            status: 404,
            content_type: None,
            body: String::new(),
        };
        match classify(empty) {
            AttemptOutcome::Fatal(GatewayError::UpstreamRejected { detail, .. }) => {
                assert_eq!(detail, "status 404");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_from_config_picks_up_credential() {
        let mut config = Config::default();
        assert!(!ChatGateway::from_config(&config).unwrap().is_configured());
        config.provider.api_key = Some("sk-live".into());
        assert!(ChatGateway::from_config(&config).unwrap().is_configured());
    }
}
