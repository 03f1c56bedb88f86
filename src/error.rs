//! Error types for the chat gateway.
//!
//! Every failure of `POST /api/ask` is one of five kinds. Validation and
//! configuration errors never reach the retry loop; upstream errors are
//! either fatal (rejected, malformed) or the result of exhausted retries.
//! All upstream kinds collapse to `502` for clients with a bounded detail.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::utils::sanitize::{truncate_chars, MAX_DETAIL_CHARS};

/// Errors produced while handling a chat request.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Client input was invalid. Never retried.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Deployment error, e.g. no provider credential. Never retried.
    #[error("Gateway misconfigured: {0}")]
    Misconfigured(String),

    /// The provider answered with a 4xx status.
    #[error("Upstream rejected the request ({status}): {detail}")]
    UpstreamRejected { status: u16, detail: String },

    /// The provider answered with something that is not JSON.
    #[error("Upstream returned a malformed response: {detail}")]
    UpstreamMalformed { detail: String },

    /// Every attempt ended in a transient failure.
    #[error("Upstream unavailable after {attempts} attempt(s): {detail}")]
    UpstreamUnavailable { attempts: u32, detail: String },

    /// The task resolving the request died before producing a result.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    /// HTTP status reported to API clients.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Misconfigured(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamRejected { .. }
            | Self::UpstreamMalformed { .. }
            | Self::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Stable, user-facing message for the `error` field.
    pub fn public_message(&self) -> &str {
        match self {
            Self::BadRequest(msg) => msg,
            Self::Misconfigured(_) => "AI service is not configured",
            Self::UpstreamRejected { .. } => "AI service rejected the request",
            Self::UpstreamMalformed { .. } => "AI service returned an invalid response",
            Self::UpstreamUnavailable { .. } => "AI service is unavailable",
            Self::Internal(_) => "Internal server error",
        }
    }

    /// Bounded upstream detail for the `detail` field, if this kind carries one.
    pub fn public_detail(&self) -> Option<&str> {
        match self {
            Self::UpstreamRejected { detail, .. }
            | Self::UpstreamMalformed { detail }
            | Self::UpstreamUnavailable { detail, .. } => {
                Some(truncate_chars(detail, MAX_DETAIL_CHARS))
            }
            Self::BadRequest(_) | Self::Misconfigured(_) | Self::Internal(_) => None,
        }
    }

    /// Whether the kind originated upstream (as opposed to locally).
    pub fn is_upstream(&self) -> bool {
        self.status_code() == StatusCode::BAD_GATEWAY
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = match self.public_detail() {
            Some(detail) => json!({ "error": self.public_message(), "detail": detail }),
            None => json!({ "error": self.public_message() }),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            GatewayError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::Misconfigured("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GatewayError::UpstreamRejected {
                status: 429,
                detail: "slow down".into()
            }
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::UpstreamMalformed { detail: "html".into() }.status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::UpstreamUnavailable {
                attempts: 4,
                detail: "503".into()
            }
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_local_errors_have_no_detail() {
        assert!(GatewayError::BadRequest("x".into()).public_detail().is_none());
        assert!(GatewayError::Misconfigured("no key".into())
            .public_detail()
            .is_none());
    }

    #[test]
    fn test_internal_is_500_without_detail() {
        let err = GatewayError::Internal("task panicked".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.public_detail().is_none());
        assert!(!err.public_message().contains("panicked"));
    }

    #[test]
    fn test_misconfigured_hides_internal_message() {
        let err = GatewayError::Misconfigured("AI_API_KEY is not set".into());
        assert!(!err.public_message().contains("AI_API_KEY"));
    }

    #[test]
    fn test_detail_is_bounded() {
        let err = GatewayError::UpstreamUnavailable {
            attempts: 4,
            detail: "e".repeat(5000),
        };
        assert_eq!(err.public_detail().unwrap().chars().count(), MAX_DETAIL_CHARS);
    }

    #[test]
    fn test_is_upstream() {
        assert!(GatewayError::UpstreamMalformed { detail: String::new() }.is_upstream());
        assert!(!GatewayError::BadRequest(String::new()).is_upstream());
    }
}
