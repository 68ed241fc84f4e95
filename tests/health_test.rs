// Jaskier Shared Pattern -- backend integration test

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use modelgate_core::state::AppState;

/// Build a test app router without touching a real `~/.tingly-box`.
fn test_app() -> (axum::Router, tempfile::TempDir) {
    let (state, dir) = AppState::new_test();
    (modelgate_core::create_router(state), dir)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoint_returns_ok() {
    let (app, _dir) = test_app();
    let response = app
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_endpoint_returns_json_with_status_field() {
    let (app, _dir) = test_app();
    let response = app
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json.get("version").is_some());
}

#[tokio::test]
async fn readiness_returns_false_before_mark_ready() {
    let (app, _dir) = test_app();
    let response = app
        .oneshot(Request::builder().uri("/api/health/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["ready"], false);
}

#[tokio::test]
async fn metrics_endpoint_is_public_and_text() {
    let (app, _dir) = test_app();
    let response = app
        .oneshot(Request::builder().uri("/api/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("gateway_uptime_seconds"));
}

#[tokio::test]
async fn nonexistent_route_returns_404() {
    let (app, _dir) = test_app();
    let response = app
        .oneshot(Request::builder().uri("/api/does-not-exist").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn model_route_without_token_is_unauthorized() {
    let (app, _dir) = test_app();
    let response = app
        .oneshot(Request::builder().uri("/v1/models").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_route_without_token_is_unauthorized() {
    let (app, _dir) = test_app();
    let response = app
        .oneshot(Request::builder().uri("/admin/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
