//! Jaskier Shared Pattern — proxy
//! Per-request pipeline (spec.md §4.8, C8): auth already ran as middleware
//! by the time a handler reaches here. This module does parse → route →
//! select → translate → forward/stream → track → audit.

use std::collections::HashSet;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use uuid::Uuid;

use crate::audit::AuditEntry;
use crate::balancer;
use crate::config::{Provider, Rule, Service};
use crate::error::{GatewayError, GatewayResult};
use crate::router;
use crate::state::AppState;
use crate::tracking::{self, RequestTrace};
use crate::translator::{self, sse, ClientShape, Event};

/// Resolve a request's scenario bucket. An explicit `x-scenario` header
/// wins; otherwise the client shape picks a reasonable default bucket so
/// unconfigured deployments still route through `global`.
pub fn resolve_scenario(headers: &axum::http::HeaderMap, client_shape: ClientShape) -> String {
    if let Some(header) = headers.get("x-scenario").and_then(|v| v.to_str().ok()) {
        if !header.is_empty() {
            return header.to_string();
        }
    }
    match client_shape {
        ClientShape::AnthropicMessages => "claude_code".to_string(),
        ClientShape::OpenAiChat | ClientShape::OpenAiResponses => "openai_generic".to_string(),
    }
}

pub struct RequestContext {
    pub request_id: Uuid,
    pub client_ip: IpAddr,
    pub client_shape: ClientShape,
    pub scenario: String,
    pub deadline: Instant,
}

/// Entry point for every model-plane POST route. Parses `body`, runs the
/// full routing/translation/forward pipeline, and returns the finished
/// HTTP response (streaming or not).
pub async fn handle(state: AppState, ctx: RequestContext, body: Value) -> GatewayResult<Response> {
    let started = Instant::now();
    let audit = state.audit.clone();

    if !translator::has_content(ctx.client_shape, &body) {
        return Err(GatewayError::InvalidRequest("request has no messages/input".to_string()));
    }
    let request_model = translator::extract_model(&body)?;

    let snapshot = state.config.snapshot();
    let rule = router::resolve_rule(&snapshot, &ctx.scenario, &request_model)
        .ok_or_else(|| GatewayError::NotFound(format!("no rule for scenario={} request_model={}", ctx.scenario, request_model)))?;

    let stream_requested = body.get("stream").and_then(Value::as_bool).unwrap_or(false);

    let flags = |key: &str| {
        state.config.get_scenario_flag(&crate::config::ScenarioFlagKey {
            scenario: ctx.scenario.clone(),
            key: key.to_string(),
        })
    };
    let provider_enabled = |id: Uuid| snapshot.providers.get(&id).is_some_and(|p| p.enabled);

    let mut failed: HashSet<(Uuid, String)> = HashSet::new();
    let mut last_error: Option<GatewayError> = None;

    loop {
        if Instant::now() >= ctx.deadline {
            break;
        }

        let selection = match balancer::select(&rule, &body, &failed, &provider_enabled, &flags, chrono::Utc::now()) {
            Ok(s) => s,
            Err(e) => {
                last_error = Some(e);
                break;
            }
        };

        let Some(provider) = snapshot.providers.get(&selection.service.provider_uuid).cloned() else {
            failed.insert(selection.service.key());
            continue;
        };

        let attempt_deadline = ctx.deadline.min(Instant::now() + Duration::from_millis(provider.timeout_ms.unwrap_or(60_000)));

        let outcome = if stream_requested {
            forward_streaming(&state, &ctx, &body, &rule, &selection.service, &provider, &request_model, started).await
        } else {
            forward_once(&state, &ctx, &body, &rule, &selection.service, &provider, &request_model, attempt_deadline, started).await
        };

        match outcome {
            Ok(response) => return Ok(response),
            Err(GatewayError::UpstreamTransient(msg)) => {
                tracing::warn!("proxy: transient failure on {}: {msg}, trying fallback", selection.service.provider_uuid);
                failed.insert(selection.service.key());
                last_error = Some(GatewayError::UpstreamTransient(msg));
                if selection.ordered_fallbacks.is_empty() {
                    break;
                }
                continue;
            }
            Err(other) => return Err(other),
        }
    }

    let error = last_error.unwrap_or(GatewayError::NoUpstreamAvailable);
    audit.emit(&AuditEntry {
        request_id: ctx.request_id,
        user_id: None,
        client_ip: ctx.client_ip.to_string(),
        rule_uuid: Some(rule.uuid),
        service_key: None,
        status: 502,
        duration_ms: started.elapsed().as_millis() as u64,
        tokens_in: 0,
        tokens_out: 0,
        error: Some(&error.to_string()),
    });
    Err(error)
}

async fn upstream_auth_header(
    http_client: &reqwest::Client,
    config: &crate::config::ConfigStore,
    provider: &Provider,
) -> GatewayResult<(&'static str, String)> {
    let token = crate::oauth::valid_access_token(http_client, config, provider)
        .await
        .ok_or_else(|| GatewayError::Internal(anyhow::anyhow!("no credential for provider {}", provider.uuid)))?;

    match provider.api_style {
        crate::config::ApiStyle::OpenAi => Ok(("authorization", format!("Bearer {token}"))),
        crate::config::ApiStyle::Anthropic => Ok(("x-api-key", token)),
    }
}

fn upstream_path(provider: &Provider, stream: bool) -> &'static str {
    let _ = stream;
    match provider.api_style {
        crate::config::ApiStyle::OpenAi => "/chat/completions",
        crate::config::ApiStyle::Anthropic => "/messages",
    }
}

#[allow(clippy::too_many_arguments)]
async fn forward_once(
    state: &AppState,
    ctx: &RequestContext,
    body: &Value,
    rule: &Rule,
    service: &Service,
    provider: &Provider,
    request_model: &str,
    deadline: Instant,
    started: Instant,
) -> GatewayResult<Response> {
    let upstream_body = translator::translate_request(ctx.client_shape, provider.api_style, body, &service.model)?;

    let client = state
        .client_pool
        .get_or_create(provider, &service.model)
        .map_err(|e| GatewayError::Internal(anyhow::anyhow!(e)))?;

    let (auth_header, auth_value) = upstream_auth_header(&state.http_client, &state.config, provider).await?;
    let url = format!("{}{}", provider.api_base.trim_end_matches('/'), upstream_path(provider, false));
    let remaining = deadline.saturating_duration_since(Instant::now());

    let mut request = client.post(&url).header("content-type", "application/json").header(auth_header, auth_value);
    if provider.api_style == crate::config::ApiStyle::Anthropic {
        request = request.header("anthropic-version", "2023-06-01");
    }

    let response = request
        .json(&upstream_body)
        .timeout(remaining)
        .send()
        .await
        .map_err(|e| GatewayError::UpstreamTransient(e.to_string()))?;

    if response.status().is_server_error() || response.status().as_u16() == 429 {
        return Err(GatewayError::UpstreamTransient(format!("upstream status {}", response.status())));
    }
    if !response.status().is_success() {
        let status = response.status();
        let detail = response.text().await.unwrap_or_default();
        return Err(GatewayError::InvalidRequest(format!("upstream rejected request ({status}): {detail}")));
    }

    let response_json: Value = response
        .json()
        .await
        .map_err(|e| GatewayError::UpstreamDecodeError(e.to_string()))?;

    let input_tokens = usage_field(&response_json, provider.api_style, true);
    let output_tokens = usage_field(&response_json, provider.api_style, false);

    let trace = RequestTrace {
        request_id: ctx.request_id,
        client_ip: ctx.client_ip,
        rule_uuid: rule.uuid,
        request_model: request_model.to_string(),
        stream: false,
    };
    tracking::record(
        &state.config,
        &state.stats,
        &state.audit,
        &trace,
        service,
        input_tokens,
        output_tokens,
        200,
        started.elapsed().as_millis() as u64,
        None,
    )
    .await;

    let translated = translator::translate_response(ctx.client_shape, provider.api_style, &response_json, &rule.response_model)?;
    Ok((axum::http::StatusCode::OK, axum::Json(translated)).into_response())
}

fn usage_field(body: &Value, style: crate::config::ApiStyle, input: bool) -> u64 {
    let usage = body.get("usage");
    match (style, input) {
        (crate::config::ApiStyle::OpenAi, true) => usage.and_then(|u| u.get("prompt_tokens")).and_then(Value::as_u64).unwrap_or(0),
        (crate::config::ApiStyle::OpenAi, false) => usage.and_then(|u| u.get("completion_tokens")).and_then(Value::as_u64).unwrap_or(0),
        (crate::config::ApiStyle::Anthropic, true) => usage.and_then(|u| u.get("input_tokens")).and_then(Value::as_u64).unwrap_or(0),
        (crate::config::ApiStyle::Anthropic, false) => usage.and_then(|u| u.get("output_tokens")).and_then(Value::as_u64).unwrap_or(0),
    }
}

/// Streaming forward: once the first byte reaches the client there is no
/// falling back (spec.md §4.8 step 7) — errors become an in-band event.
async fn forward_streaming(
    state: &AppState,
    ctx: &RequestContext,
    body: &Value,
    rule: &Rule,
    service: &Service,
    provider: &Provider,
    request_model: &str,
    started: Instant,
) -> GatewayResult<Response> {
    let _ = request_model;
    let upstream_body = translator::translate_request(ctx.client_shape, provider.api_style, body, &service.model)?;

    let client = state
        .client_pool
        .get_or_create(provider, &service.model)
        .map_err(|e| GatewayError::Internal(anyhow::anyhow!(e)))?;
    let (auth_header, auth_value) = upstream_auth_header(&state.http_client, &state.config, provider).await?;
    let url = format!("{}{}", provider.api_base.trim_end_matches('/'), upstream_path(provider, true));

    let mut request = client
        .post(&url)
        .header("content-type", "application/json")
        .header("accept", "text/event-stream")
        .header(auth_header, auth_value);
    if provider.api_style == crate::config::ApiStyle::Anthropic {
        request = request.header("anthropic-version", "2023-06-01");
    }

    let upstream_response = request
        .json(&upstream_body)
        .send()
        .await
        .map_err(|e| GatewayError::UpstreamTransient(e.to_string()))?;

    if !upstream_response.status().is_success() {
        return Err(GatewayError::UpstreamTransient(format!("upstream status {}", upstream_response.status())));
    }

    let client_shape = ctx.client_shape;
    let upstream_style = provider.api_style;
    let model_name = rule.response_model.clone();
    let stats = state.stats.clone();
    let audit = state.audit.clone();
    let service = service.clone();
    let trace = RequestTrace {
        request_id: ctx.request_id,
        client_ip: ctx.client_ip,
        rule_uuid: rule.uuid,
        request_model: request_model.to_string(),
        stream: true,
    };

    let config = state.config.clone();
    let byte_stream = upstream_response.bytes_stream();
    let event_stream = async_stream::stream! {
        let mut buf = String::new();
        let mut total_input = 0u64;
        let mut total_output = 0u64;
        let mut saw_usage_update = false;
        let mut delta_output_estimate = 0u64;
        let mut upstream_bytes = Box::pin(byte_stream);

        use futures_util::StreamExt;
        while let Some(chunk) = upstream_bytes.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    yield Ok::<_, std::convert::Infallible>(axum::body::Bytes::from(
                        sse::encode_client_frame(client_shape, &Event::Error(e.to_string()), &model_name)
                    ));
                    break;
                }
            };
            buf.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(idx) = buf.find("\n\n") {
                let frame = buf[..idx].to_string();
                buf.drain(..idx + 2);

                for line in frame.lines() {
                    if let Some(data) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) {
                        for event in sse::decode_upstream_frame(upstream_style, data.trim()) {
                            match &event {
                                Event::UsageUpdate { input_tokens, output_tokens } => {
                                    saw_usage_update = true;
                                    // input_tokens arrives once (message_start); output_tokens is
                                    // cumulative on every update. Never let a zero overwrite a
                                    // value already seen.
                                    if *input_tokens > 0 {
                                        total_input = *input_tokens;
                                    }
                                    if *output_tokens > 0 {
                                        total_output = *output_tokens;
                                    }
                                }
                                Event::Delta(text) => delta_output_estimate += sse::estimate_tokens(text),
                                _ => {}
                            }
                            let encoded = sse::encode_client_frame(client_shape, &event, &model_name);
                            yield Ok::<_, std::convert::Infallible>(axum::body::Bytes::from(encoded));
                        }
                    }
                }
            }
        }

        if !saw_usage_update {
            total_output = delta_output_estimate;
        }

        tracking::record(
            &config,
            &stats,
            &audit,
            &trace,
            &service,
            total_input,
            total_output,
            200,
            started.elapsed().as_millis() as u64,
            None,
        )
        .await;
    };

    let response = Response::builder()
        .status(axum::http::StatusCode::OK)
        .header("content-type", "text/event-stream")
        .header("cache-control", "no-cache")
        .body(Body::from_stream(event_stream))
        .map_err(|e| GatewayError::Internal(anyhow::anyhow!(e)))?;

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    #[test]
    fn resolve_scenario_prefers_explicit_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-scenario", "custom".parse().unwrap());
        assert_eq!(resolve_scenario(&headers, ClientShape::OpenAiChat), "custom");
    }

    #[test]
    fn resolve_scenario_defaults_by_client_shape() {
        let headers = HeaderMap::new();
        assert_eq!(resolve_scenario(&headers, ClientShape::AnthropicMessages), "claude_code");
        assert_eq!(resolve_scenario(&headers, ClientShape::OpenAiChat), "openai_generic");
    }
}
