//! Router assembly

use super::{
    handlers::{health, models, remove_bg},
    middleware::{cors_layer, request_id},
    state::AppState,
};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Build the service router
pub fn create_router(state: AppState) -> Router {
    let max_body_bytes = state.config.max_body_bytes;
    let cors = cors_layer(&state.config.allowed_origins);

    Router::new()
        .route("/remove-bg", post(remove_bg))
        .route("/health", get(health))
        .route("/models", get(models))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id))
        .layer(cors)
        .with_state(state)
}
