//! Request handlers

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    response::Html,
    Json,
};
use std::sync::Arc;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::api::types::{GenerateResponse, HealthResponse};
use crate::error::{AppError, Result};
use crate::generation::GenerateParams;
use crate::AppState;

const INDEX_HTML: &str = include_str!("../../assets/index.html");

/// `POST /api/generate`
///
/// An empty body is treated as an empty request so the caller gets the
/// missing-prompt error rather than a parse error.
pub async fn generate_from_body(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<GenerateResponse>> {
    let params = if body.iter().all(u8::is_ascii_whitespace) {
        GenerateParams::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::InvalidArgument(format!("Invalid JSON body: {}", e)))?
    };

    run_generation(&state, params).await
}

/// `GET /api/generate?prompt=...`
pub async fn generate_from_query(
    State(state): State<Arc<AppState>>,
    query: std::result::Result<Query<GenerateParams>, QueryRejection>,
) -> Result<Json<GenerateResponse>> {
    let Query(params) =
        query.map_err(|e| AppError::InvalidArgument(format!("Invalid query string: {}", e)))?;

    run_generation(&state, params).await
}

async fn run_generation(state: &AppState, params: GenerateParams) -> Result<Json<GenerateResponse>> {
    let span = info_span!("generate", request_id = %Uuid::new_v4());
    let result = state.generator.generate(params).instrument(span).await?;
    Ok(Json(result.into()))
}

/// `GET /api/health`
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let gpu_info = state.probe.probe().await;
    let model_loaded = state.pipeline.is_loaded();
    let status = if !model_loaded && state.pipeline.last_error().is_some() {
        "degraded"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status,
        gpu_available: gpu_info.is_some(),
        gpu_info,
        model_loaded,
    })
}

/// `GET /api/`
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}
