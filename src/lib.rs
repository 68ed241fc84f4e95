pub mod admin;
pub mod audit;
pub mod auth;
pub mod balancer;
pub mod client_pool;
pub mod config;
pub mod crypto;
pub mod error;
pub mod health;
pub mod model_routes;
pub mod models;
pub mod oauth;
pub mod proxy;
pub mod ratelimit;
pub mod remote_exec;
pub mod router;
pub mod state;
pub mod stats;
pub mod tokens;
pub mod tracking;
pub mod translator;
pub mod watchdog;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use state::AppState;

// ═══════════════════════════════════════════════════════════════════════
//  Request correlation ID middleware — Jaskier Shared Pattern
// ═══════════════════════════════════════════════════════════════════════

/// Middleware that generates a UUID v4 correlation ID for each request.
///
/// - Adds it to the current tracing span as `request_id`
/// - Returns it in the `X-Request-Id` response header
/// - Accepts an incoming `X-Request-Id` header to propagate from upstream
async fn request_id_middleware(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::Span::current().record("request_id", &request_id.as_str());
    tracing::debug!(request_id = %request_id, "request correlation ID assigned");

    let mut response = next.run(req).await;

    if let Ok(header_value) = axum::http::HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", header_value);
    }

    response
}

// ── OpenAPI documentation ────────────────────────────────────────────────────

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Model Gateway Core API",
        version = "1.0.0",
        description = "OpenAI/Anthropic-compatible model routing gateway",
        license(name = "MIT")
    ),
    paths(
        health::health_check,
        health::readiness,
        health::metrics,
        model_routes::list_models,
        model_routes::chat_completions,
        model_routes::messages,
        model_routes::responses,
        admin::logs::logs,
        admin::stats::stats,
        admin::ratelimit::ratelimit_stats,
        admin::ratelimit::reset_ratelimit,
        admin::tokens::generate,
        admin::tokens::validate,
        admin::providers::list_providers,
        admin::providers::upsert_provider,
        admin::providers::delete_provider,
        admin::providers::provider_models,
        admin::rules::list_rules,
        admin::rules::upsert_rule,
        admin::rules::get_rule,
        admin::rules::delete_rule,
        remote_exec::handshake,
        remote_exec::execute,
        remote_exec::status,
        remote_exec::close,
    ),
    components(schemas(
        models::HealthResponse,
        models::ReadyResponse,
        models::GenerateTokenRequest,
        models::GenerateTokenResponse,
        models::ValidateTokenRequest,
        models::ValidateTokenResponse,
        models::ResetRateLimitRequest,
        models::AuditLogPage,
        model_routes::ModelEntry,
        model_routes::ModelList,
        admin::stats::ServiceStatsEntry,
        ratelimit::RateLimitStats,
        config::Provider,
        config::Rule,
        config::Stats,
        remote_exec::Session,
        remote_exec::SessionStatus,
        remote_exec::ExecuteRequest,
        remote_exec::CloseRequest,
    )),
    tags(
        (name = "health", description = "Health, readiness, metrics"),
        (name = "model", description = "OpenAI/Anthropic-compatible model routes"),
        (name = "admin", description = "Control-plane: config, stats, tokens, rate limiting"),
        (name = "opsx", description = "Remote execution sessions"),
    )
)]
pub struct ApiDoc;

/// Build the application router with the given shared state. Extracted from
/// `main()` so integration tests can construct the app without binding to a
/// network port.
pub fn create_router(state: AppState) -> Router {
    let rl_model = GovernorConfigBuilder::default().per_millisecond(500).burst_size(120).finish().expect("rate limiter config: model");
    let rl_admin = GovernorConfigBuilder::default().per_millisecond(500).burst_size(120).finish().expect("rate limiter config: admin");

    // ── Public: health, metrics, model-listing, swagger ─────────────
    let public = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::readiness))
        .route("/api/metrics", get(health::metrics));

    // ── Model plane — model or user token ───────────────────────────
    let model_plane = Router::new()
        .route("/v1/models", get(model_routes::list_models))
        .route("/openai/v1/models", get(model_routes::list_models))
        .route("/anthropic/v1/models", get(model_routes::list_models))
        .route("/v1/chat/completions", post(model_routes::chat_completions))
        .route("/openai/v1/chat/completions", post(model_routes::chat_completions))
        .route("/v1/responses", post(model_routes::responses))
        .route("/v1/messages", post(model_routes::messages))
        .route("/anthropic/v1/messages", post(model_routes::messages))
        .layer(GovernorLayer::new(rl_model))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_model_token));

    // ── Control plane — user token only ─────────────────────────────
    let control_plane = Router::new()
        .route("/admin/logs", get(admin::logs::logs))
        .route("/admin/stats", get(admin::stats::stats))
        .route("/admin/ratelimit", get(admin::ratelimit::ratelimit_stats))
        .route("/admin/ratelimit/reset", post(admin::ratelimit::reset_ratelimit))
        .route("/admin/tokens/generate", post(admin::tokens::generate))
        .route("/admin/tokens/validate", post(admin::tokens::validate))
        .route("/api/providers", get(admin::providers::list_providers).post(admin::providers::upsert_provider))
        .route("/api/providers/{uuid}", delete(admin::providers::delete_provider))
        .route("/api/provider-models/{name}", get(admin::providers::provider_models))
        .route("/api/rules", get(admin::rules::list_rules).post(admin::rules::upsert_rule))
        .route("/api/rule/{name}", get(admin::rules::get_rule).delete(admin::rules::delete_rule))
        .route("/opsx/handshake", post(remote_exec::handshake))
        .route("/opsx/execute", post(remote_exec::execute))
        .route("/opsx/close", post(remote_exec::close))
        .route("/opsx/status/{id}", get(remote_exec::status))
        .layer(GovernorLayer::new(rl_admin))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_user_token));

    public
        .merge(model_plane)
        .merge(control_plane)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(60 * 1024 * 1024))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .with_state(state)
}
