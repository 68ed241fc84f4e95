//! Jaskier Shared Pattern — error
//! Gateway-wide error taxonomy (spec.md §7). Every fallible path in the
//! proxy pipeline returns one of these; `IntoResponse` is the single place
//! that decides the HTTP status and the sanitized client-visible body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("no upstream available")]
    NoUpstreamAvailable,

    #[error("upstream transient error: {0}")]
    UpstreamTransient(String),

    #[error("upstream decode error: {0}")]
    UpstreamDecodeError(String),

    #[error("canceled")]
    Canceled,

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    /// The kind name as used in the client-visible error body's `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::InvalidRequest(_) => "invalid_request",
            GatewayError::Unauthorized => "unauthorized",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::NoUpstreamAvailable => "no_upstream_available",
            GatewayError::UpstreamTransient(_) => "upstream_transient",
            GatewayError::UpstreamDecodeError(_) => "upstream_decode_error",
            GatewayError::Canceled => "canceled",
            GatewayError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::NoUpstreamAvailable => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamTransient(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamDecodeError(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Canceled => StatusCode::REQUEST_TIMEOUT,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client. Internal errors never leak their cause.
    fn client_message(&self) -> String {
        match self {
            GatewayError::Internal(_) => "an internal error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        if matches!(self, GatewayError::Internal(ref e)) {
            tracing::error!("internal error: {:#}", e);
        }

        let status = self.status();
        let mut response = (
            status,
            Json(json!({
                "error": {
                    "message": self.client_message(),
                    "type": self.kind(),
                    "code": status.as_u16(),
                }
            })),
        )
            .into_response();

        if let GatewayError::RateLimited { retry_after_secs } = self {
            if let Ok(value) = axum::http::HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert("retry-after", value);
            }
        }

        response
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
