//! Model record API handlers.

use axum::{
    extract::{
        multipart::MultipartError, rejection::JsonRejection, Multipart, Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};

use modelbridge_core::{
    IngestRequest, LifecycleError, MetadataUpdate, ModelRecord, RecordFilter, RecordStatus,
};

use crate::state::AppState;

/// Maximum allowed limit for record queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for record queries
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing records
#[derive(Debug, Deserialize)]
pub struct ListModelsParams {
    /// Filter by lifecycle status (e.g. `needConvert`)
    pub status: Option<String>,
    /// Filter by category
    pub category: Option<String>,
    /// Maximum number of records to return
    pub limit: Option<i64>,
    /// Pagination offset
    pub offset: Option<i64>,
}

/// Response for listing records
#[derive(Debug, Serialize)]
pub struct ListModelsResponse {
    pub models: Vec<ModelRecord>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
            kind: "invalid_request".to_string(),
            record_id: None,
        }),
    )
}

/// Oversized bodies surface here as 413, everything else as 400.
fn multipart_error(err: MultipartError) -> ApiError {
    (
        err.status(),
        Json(ErrorResponse {
            error: err.body_text(),
            kind: "invalid_request".to_string(),
            record_id: None,
        }),
    )
}

/// HTTP status for a lifecycle failure.
fn status_for(err: &LifecycleError) -> StatusCode {
    match err {
        LifecycleError::RecordNotFound { .. } | LifecycleError::DerivativeNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        LifecycleError::InvalidStateTransition { .. }
        | LifecycleError::NoTranslationHandle { .. } => StatusCode::CONFLICT,
        LifecycleError::UploadFailed { .. }
        | LifecycleError::TranslationSubmitFailed { .. }
        | LifecycleError::ManifestFetchFailed { .. }
        | LifecycleError::DownloadFailed { .. }
        | LifecycleError::ViewerTokenFailed { .. } => StatusCode::BAD_GATEWAY,
        LifecycleError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn lifecycle_error(err: LifecycleError) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        if err.is_upstream() {
            warn!("Upstream failure: {}", err);
        } else {
            error!("Request failed: {}", err);
        }
    }

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            kind: err.kind().to_string(),
            record_id: err.record_id().map(str::to_string),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Upload a source model and create its record.
///
/// Multipart fields: `file` (required), `displayName`, `category`, `description`.
pub async fn ingest_model(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ModelRecord>), ApiError> {
    let mut file: Option<(String, Bytes)> = None;
    let mut display_name = None;
    let mut category = None;
    let mut description = None;

    loop {
        let Some(field) = multipart.next_field().await.map_err(multipart_error)? else {
            break;
        };

        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().map(|s| s.to_string()).unwrap_or_default();
                let data = field.bytes().await.map_err(multipart_error)?;
                file = Some((file_name, data));
            }
            "displayName" | "category" | "description" => {
                let text = field.text().await.map_err(multipart_error)?;
                match name.as_str() {
                    "displayName" => display_name = Some(text),
                    "category" => category = Some(text),
                    _ => description = Some(text),
                }
            }
            _ => {}
        }
    }

    let (file_name, data) = file.ok_or_else(|| bad_request("Missing 'file' field"))?;
    if file_name.trim().is_empty() {
        return Err(bad_request("Uploaded file has no file name"));
    }
    if data.is_empty() {
        return Err(bad_request("Uploaded file is empty"));
    }

    let mut request = IngestRequest::new(file_name, data);
    if let Some(name) = display_name {
        request = request.with_display_name(name);
    }
    if let Some(category) = category {
        request = request.with_category(category);
    }
    if let Some(description) = description {
        request = request.with_description(description);
    }

    let record = state
        .lifecycle()
        .ingest(request)
        .await
        .map_err(lifecycle_error)?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// List records, newest first.
pub async fn list_models(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListModelsParams>,
) -> Result<Json<ListModelsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = RecordFilter::new().with_limit(limit).with_offset(offset);
    if let Some(status) = params.status.as_deref() {
        let status: RecordStatus = status.parse().map_err(bad_request)?;
        filter = filter.with_status(status);
    }
    if let Some(category) = params.category {
        filter = filter.with_category(category);
    }

    let lifecycle = state.lifecycle();
    let models = lifecycle.list(&filter).map_err(lifecycle_error)?;
    let total = lifecycle.count(&filter).map_err(lifecycle_error)?;

    Ok(Json(ListModelsResponse {
        models,
        total,
        limit,
        offset,
    }))
}

/// Get a single record.
pub async fn get_model(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ModelRecord>, ApiError> {
    state.lifecycle().get(&id).map(Json).map_err(lifecycle_error)
}

/// Update display name, category or description.
pub async fn update_model(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<MetadataUpdate>, JsonRejection>,
) -> Result<Json<ModelRecord>, ApiError> {
    let Json(update) = body.map_err(|e| bad_request(e.body_text()))?;

    state
        .lifecycle()
        .update_metadata(&id, &update)
        .map(Json)
        .map_err(lifecycle_error)
}

/// Submit the record's source for translation.
pub async fn convert_model(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ModelRecord>, ApiError> {
    state
        .lifecycle()
        .submit_translation(&id)
        .await
        .map(Json)
        .map_err(lifecycle_error)
}

/// Refresh status and progress from the translation manifest.
pub async fn poll_model(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ModelRecord>, ApiError> {
    state
        .lifecycle()
        .poll_status(&id)
        .await
        .map(Json)
        .map_err(lifecycle_error)
}

/// Download the configured derivative to local storage.
pub async fn download_model(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ModelRecord>, ApiError> {
    state
        .lifecycle()
        .resolve_and_download(&id)
        .await
        .map(Json)
        .map_err(lifecycle_error)
}
