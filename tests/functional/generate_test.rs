//! Functional tests for the generate endpoint

#[path = "../common/mod.rs"]
mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_TYPE, Request, StatusCode},
    Router,
};
use common::{state_with, FakeLoader, FakeProbe};
use gpu_image_gen::{api::routes::create_router, response::decode_image};
use serde_json::Value;
use std::sync::atomic::Ordering;
use tower::ServiceExt;

async fn post_json(app: Router, body: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/generate")
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_generate_with_defaults() {
    let (state, counters) = state_with(FakeLoader::new(), FakeProbe::none());
    let app = create_router(state);

    let (status, body) = post_json(app, r#"{"prompt": "a red circle"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["prompt"], "a red circle");
    assert_eq!(body["format"], "png");
    assert_eq!(body["width"], 512);
    assert_eq!(body["height"], 512);

    let image = body["image"].as_str().unwrap();
    assert!(!image.is_empty());
    let decoded = decode_image(image).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (512, 512));

    assert_eq!(counters.invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_generate_with_custom_dimensions() {
    let (state, _) = state_with(FakeLoader::new(), FakeProbe::none());
    let app = create_router(state);

    let (status, body) = post_json(
        app,
        r#"{"prompt": "a blue square", "negative_prompt": "blurry", "num_steps": 10,
            "guidance_scale": 3.0, "width": 640, "height": 384}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["width"], 640);
    assert_eq!(body["height"], 384);

    let decoded = decode_image(body["image"].as_str().unwrap()).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (640, 384));
}

#[tokio::test]
async fn test_empty_prompt_rejected() {
    let (state, counters) = state_with(FakeLoader::new(), FakeProbe::none());
    let app = create_router(state);

    let (status, body) = post_json(app, r#"{"prompt": ""}"#).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("prompt"));
    assert!(error.contains("required"));
    assert!(body.get("image").is_none());
    assert_eq!(counters.invocations.load(Ordering::SeqCst), 0);
    assert_eq!(counters.load_attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_prompt_and_empty_body_rejected() {
    let (state, counters) = state_with(FakeLoader::new(), FakeProbe::none());
    let app = create_router(state);

    let (status, body) = post_json(app.clone(), r#"{"num_steps": 10}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, body) = post_json(app, "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("prompt"));

    assert_eq!(counters.invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_negative_width_rejected_without_inference() {
    let (state, counters) = state_with(FakeLoader::new(), FakeProbe::none());
    let app = create_router(state);

    let (status, body) = post_json(app, r#"{"prompt": "x", "width": -1}"#).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("width"));
    assert_eq!(counters.invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_non_positive_numbers_rejected() {
    let (state, counters) = state_with(FakeLoader::new(), FakeProbe::none());
    let app = create_router(state);

    for body in [
        r#"{"prompt": "x", "num_steps": 0}"#,
        r#"{"prompt": "x", "num_steps": -5}"#,
        r#"{"prompt": "x", "guidance_scale": 0}"#,
        r#"{"prompt": "x", "guidance_scale": -1.5}"#,
        r#"{"prompt": "x", "height": 0}"#,
        r#"{"prompt": "x", "width": 0}"#,
    ] {
        let (status, response) = post_json(app.clone(), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
        assert_eq!(response["success"], false, "{}", body);
    }

    assert_eq!(counters.invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_malformed_json_rejected() {
    let (state, _) = state_with(FakeLoader::new(), FakeProbe::none());
    let app = create_router(state);

    let (status, body) = post_json(app.clone(), r#"{"prompt": "x""#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, body) = post_json(app, r#"{"prompt": "x", "num_steps": "many"}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_generate_via_query_string() {
    let (state, _) = state_with(FakeLoader::new(), FakeProbe::none());
    let app = create_router(state);

    let (status, body) = get(app.clone(), "/api/generate?prompt=a%20red%20circle&width=256&height=128").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prompt"], "a red circle");
    assert_eq!(body["width"], 256);
    assert_eq!(body["height"], 128);

    let (status, body) = get(app, "/api/generate?width=256").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_construction_failure_is_service_unavailable_then_retried() {
    let loader = FakeLoader {
        failures_before_success: 1,
        ..FakeLoader::new()
    };
    let (state, counters) = state_with(loader, FakeProbe::none());
    let app = create_router(state);

    let (status, body) = post_json(app.clone(), r#"{"prompt": "x"}"#).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
    assert!(body.get("image").is_none());

    let (status, body) = post_json(app, r#"{"prompt": "x"}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    assert_eq!(counters.load_attempts.load(Ordering::SeqCst), 2);
    assert_eq!(counters.constructions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_wrong_output_size_is_internal_error() {
    let loader = FakeLoader {
        output_size: Some((64, 64)),
        ..FakeLoader::new()
    };
    let (state, _) = state_with(loader, FakeProbe::none());
    let app = create_router(state);

    let (status, body) = post_json(app, r#"{"prompt": "x"}"#).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert!(body.get("image").is_none());
    // internal detail stays in the log
    assert!(!body["error"].as_str().unwrap().contains("64x64"));
}

#[tokio::test]
async fn test_index_page_served() {
    let (state, _) = state_with(FakeLoader::new(), FakeProbe::none());
    let app = create_router(state);

    let response = app
        .oneshot(Request::builder().uri("/api/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("/api/generate"));
}
