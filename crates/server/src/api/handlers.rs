use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use modelbridge_core::gateway::ViewerToken;
use modelbridge_core::SanitizedConfig;

use super::models::{lifecycle_error, ApiError};
use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

/// Read-only token for the browser viewer.
pub async fn viewer_token(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let token: ViewerToken = state
        .lifecycle()
        .viewer_token()
        .await
        .map_err(lifecycle_error)?;

    Ok(([(header::CACHE_CONTROL, "no-store")], Json(token)))
}

/// Prometheus scrape endpoint.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state);
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        encode_metrics(),
    )
}
