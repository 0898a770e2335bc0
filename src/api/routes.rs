//! Router construction

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::api::handlers;
use crate::middleware::rate_limit::RateLimitLayer;
use crate::AppState;

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let rate_limit = state.settings.rate_limit.clone();

    let mut router = Router::new()
        .route(
            "/api/generate",
            post(handlers::generate_from_body).get(handlers::generate_from_query),
        )
        .route("/api/health", get(handlers::health))
        .route("/api", get(handlers::index))
        .route("/api/", get(handlers::index))
        .with_state(state);

    if rate_limit.enabled {
        router = router.layer(RateLimitLayer::new(
            rate_limit.requests_per_second,
            rate_limit.burst_size,
        ));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
