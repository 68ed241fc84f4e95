// Jaskier Shared Pattern -- backend integration test
// End-to-end proxy pipeline exercised against mocked upstreams.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use modelgate_core::config::{ApiStyle, AuthDetail, Provider, Rule, Service};
use modelgate_core::state::AppState;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn provider_for(mock_base: &str) -> Provider {
    Provider {
        uuid: Uuid::new_v4(),
        name: "mock-provider".to_string(),
        api_base: mock_base.to_string(),
        api_style: ApiStyle::OpenAi,
        auth: AuthDetail::ApiKey { token: "sk-mock".to_string() },
        enabled: true,
        proxy_url: None,
        timeout_ms: Some(5_000),
        tags: vec![],
    }
}

fn rule_for(providers: &[&Provider]) -> Rule {
    Rule {
        uuid: Uuid::new_v4(),
        scenario: "openai_generic".to_string(),
        request_model: "gpt-5".to_string(),
        response_model: "gpt-5".to_string(),
        active: true,
        services: providers
            .iter()
            .map(|p| Service {
                provider_uuid: p.uuid,
                model: "gpt-5-upstream".to_string(),
                weight: 1,
                active: true,
                time_window_seconds: 60,
                stats: Default::default(),
            })
            .collect(),
        smart_enabled: false,
        smart_routing: vec![],
        description: None,
    }
}

async fn chat_completion_request(token: &str) -> Request<Body> {
    let body = json!({
        "model": "gpt-5",
        "messages": [{"role": "user", "content": "hi"}],
        "stream": false
    });
    Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn sample_chat_response() -> Value {
    json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "model": "gpt-5-upstream",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "hello there"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8}
    })
}

#[tokio::test]
async fn chat_completion_routes_through_a_single_provider() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sample_chat_response()))
        .mount(&mock_server)
        .await;

    let (state, _dir) = AppState::new_test();
    let provider = provider_for(&mock_server.uri()).await;
    state.config.upsert_provider(provider.clone()).await.unwrap();
    state.config.upsert_rule(rule_for(&[&provider])).await.unwrap();

    let app = modelgate_core::create_router(state.clone());
    let response = app.oneshot(chat_completion_request(&state.config.model_token()).await).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["choices"][0]["message"]["content"], "hello there");
}

/// Seed scenario: the first-selected provider returns a transient 503, the
/// proxy falls back to the second provider in the rule's service list
/// without the client ever seeing the failure.
#[tokio::test]
async fn falls_back_to_next_provider_on_upstream_503() {
    let failing_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&failing_server)
        .await;

    let healthy_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sample_chat_response()))
        .mount(&healthy_server)
        .await;

    let (state, _dir) = AppState::new_test();
    let failing_provider = provider_for(&failing_server.uri()).await;
    let healthy_provider = provider_for(&healthy_server.uri()).await;
    state.config.upsert_provider(failing_provider.clone()).await.unwrap();
    state.config.upsert_provider(healthy_provider.clone()).await.unwrap();
    state.config.upsert_rule(rule_for(&[&failing_provider, &healthy_provider])).await.unwrap();

    let app = modelgate_core::create_router(state.clone());
    let response = app.oneshot(chat_completion_request(&state.config.model_token()).await).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["choices"][0]["message"]["content"], "hello there");
}

#[tokio::test]
async fn returns_bad_gateway_when_every_provider_fails() {
    let failing_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&failing_server)
        .await;

    let (state, _dir) = AppState::new_test();
    let provider = provider_for(&failing_server.uri()).await;
    state.config.upsert_provider(provider.clone()).await.unwrap();
    state.config.upsert_rule(rule_for(&[&provider])).await.unwrap();

    let app = modelgate_core::create_router(state.clone());
    let response = app.oneshot(chat_completion_request(&state.config.model_token()).await).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
