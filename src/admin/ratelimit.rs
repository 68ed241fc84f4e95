//! Jaskier Shared Pattern — admin::ratelimit
//! `GET /admin/ratelimit` (stats) and `POST /admin/ratelimit/reset` (spec.md §6).

use axum::extract::State;
use axum::Json;

use crate::models::ResetRateLimitRequest;
use crate::ratelimit::RateLimitStats;
use crate::state::AppState;

#[utoipa::path(get, path = "/admin/ratelimit", tag = "admin",
    responses((status = 200, description = "Current rate-limit bucket stats", body = RateLimitStats)))]
pub async fn ratelimit_stats(State(state): State<AppState>) -> Json<RateLimitStats> {
    Json(state.rate_limiter.stats())
}

#[utoipa::path(post, path = "/admin/ratelimit/reset", tag = "admin", request_body = ResetRateLimitRequest,
    responses((status = 204, description = "Bucket for the given IP cleared")))]
pub async fn reset_ratelimit(State(state): State<AppState>, Json(req): Json<ResetRateLimitRequest>) -> axum::http::StatusCode {
    state.rate_limiter.reset(req.ip);
    axum::http::StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[tokio::test]
    async fn reset_clears_tracked_ip() {
        let (state, _dir) = AppState::new_test();
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        state.rate_limiter.allow(ip);
        assert_eq!(ratelimit_stats(State(state.clone())).await.0.total_ips_tracked, 1);

        reset_ratelimit(State(state.clone()), Json(ResetRateLimitRequest { ip })).await;
        assert_eq!(ratelimit_stats(State(state)).await.0.total_ips_tracked, 0);
    }
}
