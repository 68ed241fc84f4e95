//! Jaskier Shared Pattern — model_routes
//! Model-plane handlers (spec.md §6): `GET /v1/models` (+ style aliases) and
//! the chat/messages/responses POST routes, all funneled through
//! `proxy::handle`. One generic handler per verb, registered under every
//! path alias so `ClientShape::from_path` always sees the real request path.

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, OriginalUri, State};
use axum::response::Response;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{GatewayError, GatewayResult};
use crate::proxy::{self, RequestContext};
use crate::state::AppState;
use crate::translator::ClientShape;

const DEFAULT_REQUEST_DEADLINE: Duration = Duration::from_secs(120);

fn client_ip(connect_info: Option<&ConnectInfo<SocketAddr>>) -> IpAddr {
    connect_info.map(|ConnectInfo(addr)| addr.ip()).unwrap_or(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED))
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ModelEntry {
    pub id: String,
    pub object: &'static str,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<ModelEntry>,
}

/// `GET /v1/models`, `/openai/v1/models`, `/anthropic/v1/models` — the
/// distinct `request_model` names configured across every active rule.
#[utoipa::path(get, path = "/v1/models", tag = "model",
    responses((status = 200, description = "Configured model names", body = ModelList)))]
pub async fn list_models(State(state): State<AppState>) -> Json<ModelList> {
    let mut names: Vec<String> = state.config.list_rules(None).into_iter().filter(|r| r.active).map(|r| r.request_model).collect();
    names.sort();
    names.dedup();
    Json(ModelList {
        object: "list",
        data: names.into_iter().map(|id| ModelEntry { id, object: "model" }).collect(),
    })
}

#[utoipa::path(post, path = "/v1/chat/completions", tag = "model",
    responses((status = 200, description = "OpenAI-chat-shaped completion or SSE stream")))]
pub async fn chat_completions(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: axum::http::HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> GatewayResult<Response> {
    dispatch(state, uri.path(), connect_info.as_ref(), &headers, body).await
}

#[utoipa::path(post, path = "/v1/messages", tag = "model",
    responses((status = 200, description = "Anthropic-messages-shaped completion or SSE stream")))]
pub async fn messages(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: axum::http::HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> GatewayResult<Response> {
    dispatch(state, uri.path(), connect_info.as_ref(), &headers, body).await
}

#[utoipa::path(post, path = "/v1/responses", tag = "model",
    responses((status = 200, description = "OpenAI-responses-shaped completion or SSE stream")))]
pub async fn responses(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: axum::http::HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> GatewayResult<Response> {
    dispatch(state, uri.path(), connect_info.as_ref(), &headers, body).await
}

async fn dispatch(
    state: AppState,
    path: &str,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    headers: &axum::http::HeaderMap,
    body: serde_json::Value,
) -> GatewayResult<Response> {
    let client_shape = ClientShape::from_path(path).ok_or_else(|| GatewayError::NotFound(format!("unrecognized model route {path}")))?;
    let scenario = proxy::resolve_scenario(headers, client_shape);

    let ctx = RequestContext {
        request_id: Uuid::new_v4(),
        client_ip: client_ip(connect_info),
        client_shape,
        scenario,
        deadline: Instant::now() + DEFAULT_REQUEST_DEADLINE,
    };

    proxy::handle(state, ctx, body).await
}
