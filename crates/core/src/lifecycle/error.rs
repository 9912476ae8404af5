//! Error types for the lifecycle controller.

use thiserror::Error;

use crate::gateway::GatewayError;
use crate::record::{RecordError, RecordStatus};

/// Errors returned by lifecycle operations.
///
/// None of these leave a partially updated record behind: the store is only
/// written after every external step of an operation has succeeded.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Source upload (or spooling it locally) failed. No record was created.
    #[error("Upload failed: {reason}")]
    UploadFailed { reason: String },

    /// The translation service rejected the job.
    #[error("Translation submit failed for {record_id}: {source}")]
    TranslationSubmitFailed {
        record_id: String,
        #[source]
        source: GatewayError,
    },

    /// The operation is not allowed in the record's current status.
    #[error("Cannot {operation} record {record_id} in status {status}")]
    InvalidStateTransition {
        record_id: String,
        status: RecordStatus,
        operation: &'static str,
    },

    /// Translation was never submitted for this record.
    #[error("Record {record_id} has no translation handle")]
    NoTranslationHandle { record_id: String },

    /// The manifest could not be fetched or understood.
    #[error("Manifest fetch failed for {record_id}: {reason}")]
    ManifestFetchFailed { record_id: String, reason: String },

    /// The manifest holds no finished derivative of the configured kind.
    #[error("No {output_type}/{role} derivative available for {record_id}")]
    DerivativeNotFound {
        record_id: String,
        output_type: String,
        role: String,
    },

    /// Obtaining credentials or writing the artifact failed.
    #[error("Download failed for {record_id}: {reason}")]
    DownloadFailed { record_id: String, reason: String },

    /// The translation service refused a viewer token.
    #[error("Failed to obtain viewer token: {reason}")]
    ViewerTokenFailed { reason: String },

    #[error("Record not found: {record_id}")]
    RecordNotFound { record_id: String },

    #[error("Record store error: {0}")]
    Store(RecordError),
}

impl LifecycleError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleError::UploadFailed { .. } => "upload_failed",
            LifecycleError::TranslationSubmitFailed { .. } => "translation_submit_failed",
            LifecycleError::InvalidStateTransition { .. } => "invalid_state_transition",
            LifecycleError::NoTranslationHandle { .. } => "no_translation_handle",
            LifecycleError::ManifestFetchFailed { .. } => "manifest_fetch_failed",
            LifecycleError::DerivativeNotFound { .. } => "derivative_not_found",
            LifecycleError::DownloadFailed { .. } => "download_failed",
            LifecycleError::ViewerTokenFailed { .. } => "viewer_token_failed",
            LifecycleError::RecordNotFound { .. } => "record_not_found",
            LifecycleError::Store(_) => "store_error",
        }
    }

    /// Record the error refers to, if any.
    pub fn record_id(&self) -> Option<&str> {
        match self {
            LifecycleError::TranslationSubmitFailed { record_id, .. }
            | LifecycleError::InvalidStateTransition { record_id, .. }
            | LifecycleError::NoTranslationHandle { record_id }
            | LifecycleError::ManifestFetchFailed { record_id, .. }
            | LifecycleError::DerivativeNotFound { record_id, .. }
            | LifecycleError::DownloadFailed { record_id, .. }
            | LifecycleError::RecordNotFound { record_id } => Some(record_id),
            LifecycleError::UploadFailed { .. }
            | LifecycleError::ViewerTokenFailed { .. }
            | LifecycleError::Store(_) => None,
        }
    }

    /// Whether the failure came from the translation service rather than local state.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            LifecycleError::UploadFailed { .. }
                | LifecycleError::TranslationSubmitFailed { .. }
                | LifecycleError::ManifestFetchFailed { .. }
                | LifecycleError::DownloadFailed { .. }
                | LifecycleError::ViewerTokenFailed { .. }
        )
    }
}

impl From<RecordError> for LifecycleError {
    fn from(e: RecordError) -> Self {
        match e {
            RecordError::NotFound(record_id) => LifecycleError::RecordNotFound { record_id },
            other => LifecycleError::Store(other),
        }
    }
}
