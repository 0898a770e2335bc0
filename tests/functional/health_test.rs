//! Functional tests for the health endpoint

#[path = "../common/mod.rs"]
mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use common::{state_with, FakeLoader, FakeProbe};
use gpu_image_gen::api::routes::create_router;
use serde_json::Value;
use std::sync::atomic::Ordering;
use tower::ServiceExt;

async fn health(app: Router) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn generate(app: Router) -> StatusCode {
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri("/api/generate")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"prompt": "a red circle", "width": 64, "height": 64}"#))
            .unwrap(),
    )
    .await
    .unwrap()
    .status()
}

#[tokio::test]
async fn test_health_without_accelerator() {
    let (state, _) = state_with(FakeLoader::new(), FakeProbe::none());
    let (status, body) = health(create_router(state)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["gpu_available"], false);
    assert!(body.get("gpu_info").is_none());
    assert_eq!(body["model_loaded"], false);
}

#[tokio::test]
async fn test_health_with_accelerator() {
    let (state, _) = state_with(FakeLoader::new(), FakeProbe::gpu());
    let (status, body) = health(create_router(state)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["gpu_available"], true);
    assert_eq!(body["gpu_info"]["name"], "NVIDIA A100 80GB PCIe");
    assert_eq!(body["gpu_info"]["memory_total_gb"], 79.15);
    assert!(body["gpu_info"].get("memory_allocated_gb").is_some());
    assert!(body["gpu_info"].get("memory_reserved_gb").is_some());
}

#[tokio::test]
async fn test_model_loaded_after_first_generation() {
    let (state, _) = state_with(FakeLoader::new(), FakeProbe::none());
    let app = create_router(state);

    let (_, body) = health(app.clone()).await;
    assert_eq!(body["model_loaded"], false);

    assert_eq!(generate(app.clone()).await, StatusCode::OK);

    let (_, body) = health(app).await;
    assert_eq!(body["model_loaded"], true);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_degraded_after_failed_load() {
    let loader = FakeLoader {
        failures_before_success: 1,
        ..FakeLoader::new()
    };
    let (state, _) = state_with(loader, FakeProbe::none());
    let app = create_router(state);

    assert_eq!(generate(app.clone()).await, StatusCode::SERVICE_UNAVAILABLE);

    let (status, body) = health(app.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["model_loaded"], false);

    assert_eq!(generate(app.clone()).await, StatusCode::OK);

    let (_, body) = health(app).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model_loaded"], true);
}

#[tokio::test]
async fn test_repeated_health_checks_reuse_gpu_reading() {
    let probe = FakeProbe::gpu();
    let calls = probe.calls.clone();
    let (state, _) = state_with(FakeLoader::new(), probe);
    let app = create_router(state);

    for _ in 0..5 {
        let (status, body) = health(app.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["gpu_available"], true);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
