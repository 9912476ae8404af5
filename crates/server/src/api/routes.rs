use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{handlers, middleware::metrics_middleware, models};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let max_upload_bytes = state.config().server.max_upload_bytes;

    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/viewer-token", get(handlers::viewer_token))
        // Model records
        .route("/models", post(models::ingest_model).get(models::list_models))
        .route("/models/{id}", get(models::get_model).put(models::update_model))
        .route("/models/{id}/convert", post(models::convert_model))
        .route("/models/{id}/poll", post(models::poll_model))
        .route("/models/{id}/download", post(models::download_model))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
