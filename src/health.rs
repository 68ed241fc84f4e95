//! Jaskier Shared Pattern — health
//! `/api/health`, `/api/health/ready`, `/api/metrics` (spec.md §6 [AMBIENT]
//! observability endpoints), grounded in the teacher's `metrics_handler`
//! shape but reporting gateway counters instead of CPU/memory.

use axum::extract::State;
use axum::Json;

use crate::models::{HealthResponse, ReadyResponse};
use crate::state::AppState;

#[utoipa::path(get, path = "/api/health", tag = "health",
    responses((status = 200, description = "Liveness probe", body = HealthResponse)))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        providers_configured: state.config.list_providers().len(),
        rules_configured: state.config.list_rules(None).len(),
    })
}

#[utoipa::path(get, path = "/api/health/ready", tag = "health",
    responses((status = 200, description = "Readiness probe", body = ReadyResponse)))]
pub async fn readiness(State(state): State<AppState>) -> Json<ReadyResponse> {
    Json(ReadyResponse { ready: state.is_ready() })
}

#[utoipa::path(get, path = "/api/metrics", tag = "health",
    responses((status = 200, description = "Prometheus text exposition")))]
pub async fn metrics(State(state): State<AppState>) -> String {
    let uptime = state.start_time.elapsed().as_secs();
    let all_stats = state.stats.all_stats().await;
    let rl = state.rate_limiter.stats();

    let requests_total: u64 = all_stats.values().map(|s| s.requests_total).sum();
    let errors_total: u64 = all_stats.values().map(|s| s.errors_total).sum();
    let input_tokens_total: u64 = all_stats.values().map(|s| s.input_tokens_total).sum();
    let output_tokens_total: u64 = all_stats.values().map(|s| s.output_tokens_total).sum();

    let mut out = format!(
        "# HELP gateway_uptime_seconds Gateway uptime in seconds\n\
         # TYPE gateway_uptime_seconds counter\n\
         gateway_uptime_seconds {uptime}\n\
         # HELP gateway_requests_total Total proxied requests across all services\n\
         # TYPE gateway_requests_total counter\n\
         gateway_requests_total {requests_total}\n\
         # HELP gateway_errors_total Total failed proxied requests\n\
         # TYPE gateway_errors_total counter\n\
         gateway_errors_total {errors_total}\n\
         # HELP gateway_input_tokens_total Total input tokens across all services\n\
         # TYPE gateway_input_tokens_total counter\n\
         gateway_input_tokens_total {input_tokens_total}\n\
         # HELP gateway_output_tokens_total Total output tokens across all services\n\
         # TYPE gateway_output_tokens_total counter\n\
         gateway_output_tokens_total {output_tokens_total}\n\
         # HELP gateway_ratelimit_blocked_ips Currently-blocked IPs\n\
         # TYPE gateway_ratelimit_blocked_ips gauge\n\
         gateway_ratelimit_blocked_ips {}\n",
        rl.currently_blocked,
    );

    for ((provider_uuid, model), stats) in &all_stats {
        out.push_str(&format!(
            "gateway_service_requests_total{{provider=\"{provider_uuid}\",model=\"{model}\"}} {}\n",
            stats.requests_total
        ));
    }

    out
}
