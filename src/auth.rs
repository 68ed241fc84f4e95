//! Jaskier Shared Pattern — auth
//! Bearer-token middleware (spec.md §4.8 step 1). Admin/API routes require
//! `user_token`; model routes accept either `user_token` or `model_token`
//! via `Authorization: Bearer` or `X-Api-Key`. Repeated failures from the
//! same IP feed the Rate Limiter (C3).

use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::GatewayError;
use crate::state::AppState;

fn extract_token(request: &Request) -> Option<String> {
    if let Some(header) = request.headers().get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(token) = header.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }
    request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn client_ip(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED))
}

fn check_rate_limit(state: &AppState, ip: IpAddr) -> Result<(), GatewayError> {
    if !state.rate_limiter.allow(ip) {
        let retry_after_secs = state.rate_limiter.retry_after_secs(ip).unwrap_or(60);
        return Err(GatewayError::RateLimited { retry_after_secs });
    }
    Ok(())
}

/// Admin/UI routes: requires `user_token` exactly.
pub async fn require_user_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let ip = client_ip(&request);
    let token = extract_token(&request);

    match token {
        Some(t) if t == state.config.user_token() => Ok(next.run(request).await),
        _ => {
            check_rate_limit(&state, ip)?;
            tracing::warn!("auth: rejected user-token request from {ip}");
            Err(GatewayError::Unauthorized)
        }
    }
}

/// Model routes: accepts either `user_token` or `model_token`.
pub async fn require_model_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let ip = client_ip(&request);
    let token = extract_token(&request);

    match token {
        Some(t) if t == state.config.user_token() || t == state.config.model_token() => {
            Ok(next.run(request).await)
        }
        _ => {
            check_rate_limit(&state, ip)?;
            tracing::warn!("auth: rejected model-token request from {ip}");
            Err(GatewayError::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;

    #[test]
    fn extracts_bearer_token() {
        let request = HttpRequest::builder()
            .header("authorization", "Bearer abc123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_token(&request), Some("abc123".to_string()));
    }

    #[test]
    fn extracts_api_key_header_when_no_bearer() {
        let request = HttpRequest::builder().header("x-api-key", "abc123").body(Body::empty()).unwrap();
        assert_eq!(extract_token(&request), Some("abc123".to_string()));
    }

    #[test]
    fn no_token_present_is_none() {
        let request = HttpRequest::builder().body(Body::empty()).unwrap();
        assert_eq!(extract_token(&request), None);
    }
}
