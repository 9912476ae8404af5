//! Lifecycle controller implementation.
//!
//! Drives model records through the translation lifecycle:
//! - Ingest: spool upload, push to bucket storage, create record
//! - Submit: request translation of the stored object
//! - Poll: mirror the manifest status into the record
//! - Download: resolve the configured derivative and store it locally
//!
//! Every store write happens after the gateway calls of the operation have
//! succeeded, so a failed operation leaves the record as it was.

use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use bytes::Bytes;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::gateway::{
    ByteStream, DownloadCredential, GatewayError, GatewayOperation, ManifestStatus,
    TranslationGateway, ViewerToken,
};
use crate::metrics;
use crate::record::{
    MetadataUpdate, ModelRecord, NewRecord, RecordFilter, RecordStatus, RecordStore,
};

use super::config::LifecycleConfig;
use super::error::LifecycleError;
use super::locks::RecordLocks;

/// Category assigned when the uploader gives none.
pub const DEFAULT_CATEGORY: &str = "uncategorized";

/// A file received for ingestion.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Original file name; its extension is kept on the stored object.
    pub file_name: String,
    pub data: Bytes,
    pub display_name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
}

impl IngestRequest {
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            data: data.into(),
            display_name: None,
            category: None,
            description: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Encode a storage object id into the handle used by the derivative API.
pub fn encode_translation_handle(object_id: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(object_id)
}

/// Map a manifest status onto the record vocabulary. `None` for unknown spellings.
fn record_status_for(status: &ManifestStatus) -> Option<RecordStatus> {
    match status {
        ManifestStatus::Pending => Some(RecordStatus::Pending),
        ManifestStatus::InProgress => Some(RecordStatus::InProgress),
        ManifestStatus::Success => Some(RecordStatus::Success),
        ManifestStatus::Failed => Some(RecordStatus::Failed),
        ManifestStatus::Timeout => Some(RecordStatus::Timeout),
        ManifestStatus::Unknown(_) => None,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Coordinates the record store and the translation gateway.
pub struct LifecycleController {
    config: LifecycleConfig,
    store: Arc<dyn RecordStore>,
    gateway: Arc<dyn TranslationGateway>,
    locks: RecordLocks,
}

impl LifecycleController {
    /// Create a new lifecycle controller.
    pub fn new(
        config: LifecycleConfig,
        store: Arc<dyn RecordStore>,
        gateway: Arc<dyn TranslationGateway>,
    ) -> Self {
        Self {
            config,
            store,
            gateway,
            locks: RecordLocks::new(),
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Create the upload and artifact directories if they are missing.
    pub async fn prepare_storage(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.config.upload_dir).await?;
        tokio::fs::create_dir_all(&self.config.artifact_dir).await?;
        Ok(())
    }

    /// Upload a source file and create its record in `needConvert`.
    pub async fn ingest(&self, request: IngestRequest) -> Result<ModelRecord, LifecycleError> {
        let result = self.do_ingest(request).await;
        record_outcome("ingest", &result);
        result
    }

    /// Request translation of a freshly uploaded record.
    pub async fn submit_translation(&self, id: &str) -> Result<ModelRecord, LifecycleError> {
        let result = self.do_submit_translation(id).await;
        record_outcome("submit_translation", &result);
        result
    }

    /// Mirror the current manifest status into the record.
    pub async fn poll_status(&self, id: &str) -> Result<ModelRecord, LifecycleError> {
        let result = self.do_poll_status(id).await;
        record_outcome("poll_status", &result);
        result
    }

    /// Download the configured derivative and mark the record `downloaded`.
    ///
    /// Only `success` and `downloaded` records can be downloaded. Poll first to
    /// pick up a finished translation.
    pub async fn resolve_and_download(&self, id: &str) -> Result<ModelRecord, LifecycleError> {
        let result = self.do_resolve_and_download(id).await;
        record_outcome("resolve_and_download", &result);
        result
    }

    /// Obtain a read-only token for the browser viewer. Touches no record.
    pub async fn viewer_token(&self) -> Result<ViewerToken, LifecycleError> {
        let result = self
            .observed(GatewayOperation::ViewerToken, self.gateway.viewer_token())
            .await
            .map_err(|e| LifecycleError::ViewerTokenFailed {
                reason: e.to_string(),
            });
        record_outcome("viewer_token", &result);
        result
    }

    /// Merge metadata fields into a record. Allowed in every status.
    pub fn update_metadata(
        &self,
        id: &str,
        update: &MetadataUpdate,
    ) -> Result<ModelRecord, LifecycleError> {
        let result = self
            .store
            .update_metadata(id, update)
            .map_err(LifecycleError::from);
        if result.is_ok() {
            debug!("Updated metadata of record {}", id);
        }
        record_outcome("update_metadata", &result);
        result
    }

    /// Fetch a single record.
    pub fn get(&self, id: &str) -> Result<ModelRecord, LifecycleError> {
        self.store
            .get(id)?
            .ok_or_else(|| LifecycleError::RecordNotFound {
                record_id: id.to_string(),
            })
    }

    /// List records, newest first.
    pub fn list(&self, filter: &RecordFilter) -> Result<Vec<ModelRecord>, LifecycleError> {
        Ok(self.store.list(filter)?)
    }

    /// Count records matching `filter`.
    pub fn count(&self, filter: &RecordFilter) -> Result<i64, LifecycleError> {
        Ok(self.store.count(filter)?)
    }

    async fn do_ingest(&self, request: IngestRequest) -> Result<ModelRecord, LifecycleError> {
        let file_name = request.file_name.trim().to_string();
        if file_name.is_empty() {
            return Err(LifecycleError::UploadFailed {
                reason: "file name is empty".to_string(),
            });
        }
        if request.data.is_empty() {
            return Err(LifecycleError::UploadFailed {
                reason: format!("{} is empty", file_name),
            });
        }

        let id = Uuid::new_v4().to_string();
        let extension = Path::new(&file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default();
        let object_key = format!("{}{}", id, extension);
        let size = request.data.len();

        let spool = self.spool_upload(request.data).await?;

        let uploaded = self
            .observed(
                GatewayOperation::Upload,
                self.gateway
                    .upload(spool.path(), &self.config.bucket_key, &object_key),
            )
            .await;

        // Removes the spooled file whether or not the upload worked
        if let Err(e) = spool.close() {
            warn!("Failed to remove spooled upload for {}: {}", object_key, e);
        }

        let uploaded = uploaded.map_err(|e| LifecycleError::UploadFailed {
            reason: e.to_string(),
        })?;
        metrics::UPLOADED_BYTES.inc_by(size as u64);

        let record = self.store.create(NewRecord {
            id,
            display_name: non_blank(request.display_name).unwrap_or_else(|| file_name.clone()),
            category: non_blank(request.category).unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            description: request.description.unwrap_or_default(),
            source_object_id: uploaded.object_id,
        })?;

        info!(
            "Ingested {} as record {} ({} bytes)",
            file_name, record.id, size
        );
        Ok(record)
    }

    /// Write the payload to a scoped temporary file inside the upload directory.
    async fn spool_upload(&self, data: Bytes) -> Result<tempfile::NamedTempFile, LifecycleError> {
        let upload_dir = self.config.upload_dir.clone();

        tokio::task::spawn_blocking(move || -> std::io::Result<tempfile::NamedTempFile> {
            let mut file = tempfile::Builder::new()
                .prefix("upload-")
                .tempfile_in(&upload_dir)?;
            file.write_all(&data)?;
            file.flush()?;
            Ok(file)
        })
        .await
        .map_err(|e| LifecycleError::UploadFailed {
            reason: format!("spooling task failed: {}", e),
        })?
        .map_err(|e| LifecycleError::UploadFailed {
            reason: format!("failed to spool upload: {}", e),
        })
    }

    async fn do_submit_translation(&self, id: &str) -> Result<ModelRecord, LifecycleError> {
        let _guard = self.locks.acquire(id).await;
        let mut record = self.get(id)?;

        if record.status != RecordStatus::NeedConvert {
            return Err(LifecycleError::InvalidStateTransition {
                record_id: record.id,
                status: record.status,
                operation: "submit translation for",
            });
        }

        let handle = encode_translation_handle(&record.source_object_id);
        let ack = self
            .observed(
                GatewayOperation::SubmitJob,
                self.gateway.submit_job(&handle, &self.config.output_formats),
            )
            .await
            .map_err(|source| LifecycleError::TranslationSubmitFailed {
                record_id: record.id.clone(),
                source,
            })?;

        record.translation_handle = Some(handle);
        record.status = RecordStatus::InProgress;
        record.error_message = None;

        let record = self.store.write_lifecycle(&record)?;
        info!(
            "Submitted translation for record {} (job result: {})",
            record.id, ack.result
        );
        Ok(record)
    }

    async fn do_poll_status(&self, id: &str) -> Result<ModelRecord, LifecycleError> {
        let _guard = self.locks.acquire(id).await;
        let mut record = self.get(id)?;
        let handle = Self::require_handle(&record)?;

        let manifest = self
            .observed(GatewayOperation::GetManifest, self.gateway.get_manifest(&handle))
            .await
            .map_err(|e| LifecycleError::ManifestFetchFailed {
                record_id: record.id.clone(),
                reason: e.to_string(),
            })?;

        let status = record_status_for(&manifest.status).ok_or_else(|| {
            LifecycleError::ManifestFetchFailed {
                record_id: record.id.clone(),
                reason: format!("unrecognized manifest status '{}'", manifest.status),
            }
        })?;

        let previous = record.status;
        record.progress = manifest.progress.clone();

        // A stored artifact stays valid whatever the service reports later
        if previous != RecordStatus::Downloaded {
            record.status = status;
            record.error_message = if status.is_failure() {
                Some(
                    manifest
                        .failure_message()
                        .unwrap_or_else(|| format!("translation ended with status {}", status)),
                )
            } else {
                None
            };
        }

        let record = self.store.write_lifecycle(&record)?;

        if record.status != previous {
            info!(
                "Record {} status {} -> {}",
                record.id, previous, record.status
            );
            if record.status.is_terminal() {
                metrics::TRANSLATION_OUTCOMES
                    .with_label_values(&[record.status.as_str()])
                    .inc();
            }
        } else {
            debug!(
                "Record {} still {} ({})",
                record.id,
                record.status,
                record.progress.as_deref().unwrap_or("no progress")
            );
        }

        Ok(record)
    }

    async fn do_resolve_and_download(&self, id: &str) -> Result<ModelRecord, LifecycleError> {
        let _guard = self.locks.acquire(id).await;
        let mut record = self.get(id)?;
        let handle = Self::require_handle(&record)?;

        if !matches!(
            record.status,
            RecordStatus::Success | RecordStatus::Downloaded
        ) {
            return Err(LifecycleError::InvalidStateTransition {
                record_id: record.id,
                status: record.status,
                operation: "download",
            });
        }

        let manifest = self
            .observed(GatewayOperation::GetManifest, self.gateway.get_manifest(&handle))
            .await
            .map_err(|e| LifecycleError::ManifestFetchFailed {
                record_id: record.id.clone(),
                reason: e.to_string(),
            })?;

        let selector = &self.config.derivative;
        let derivative_urn = manifest
            .find_derivative(&selector.output_type, &selector.role)
            .ok_or_else(|| LifecycleError::DerivativeNotFound {
                record_id: record.id.clone(),
                output_type: selector.output_type.clone(),
                role: selector.role.clone(),
            })?
            .to_string();

        debug!(
            "Resolved derivative {} for record {}",
            derivative_urn, record.id
        );

        let credential = self
            .observed(
                GatewayOperation::GetDownloadCredential,
                self.gateway.get_download_credential(&handle, &derivative_urn),
            )
            .await
            .map_err(|e| download_failed(&record.id, e))?;

        let (path, written) = self.write_artifact(&record.id, &credential).await?;
        metrics::ARTIFACT_BYTES.inc_by(written);

        record.local_artifact_path = Some(path.to_string_lossy().into_owned());
        record.status = RecordStatus::Downloaded;
        record.progress = manifest.progress;
        record.error_message = None;

        let record = self.store.write_lifecycle(&record)?;
        info!(
            "Downloaded derivative for record {} to {} ({} bytes)",
            record.id,
            path.display(),
            written
        );
        Ok(record)
    }

    /// Stream the derivative into a temporary file next to its final path, then rename it.
    async fn write_artifact(
        &self,
        record_id: &str,
        credential: &DownloadCredential,
    ) -> Result<(PathBuf, u64), LifecycleError> {
        let stream = self
            .observed(
                GatewayOperation::FetchBytes,
                self.gateway.fetch_bytes(credential),
            )
            .await
            .map_err(|e| download_failed(record_id, e))?;

        let artifact_dir = self.config.artifact_dir.clone();
        let (staging, handle) = tokio::task::spawn_blocking(move || {
            let staging = tempfile::Builder::new()
                .prefix(".download-")
                .tempfile_in(&artifact_dir)?;
            let handle = staging.reopen()?;
            Ok::<_, std::io::Error>((staging, handle))
        })
        .await
        .map_err(|e| download_failed(record_id, e))?
        .map_err(|e| download_failed(record_id, e))?;

        let written = match copy_stream(stream, tokio::fs::File::from_std(handle)).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::task::spawn_blocking(move || staging.close()).await;
                return Err(download_failed(record_id, e));
            }
        };

        let destination = self.config.artifact_path(record_id);
        let target = destination.clone();
        tokio::task::spawn_blocking(move || staging.persist(&target).map_err(|e| e.error))
            .await
            .map_err(|e| download_failed(record_id, e))?
            .map_err(|e| download_failed(record_id, e))?;

        Ok((destination, written))
    }

    fn require_handle(record: &ModelRecord) -> Result<String, LifecycleError> {
        record
            .translation_handle
            .clone()
            .ok_or_else(|| LifecycleError::NoTranslationHandle {
                record_id: record.id.clone(),
            })
    }

    /// Run one gateway call, recording its duration and result.
    async fn observed<T, F>(&self, operation: GatewayOperation, call: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        let gateway = self.gateway.name();
        let timer = metrics::GATEWAY_DURATION
            .with_label_values(&[gateway, operation.as_str()])
            .start_timer();
        let result = call.await;
        timer.observe_duration();

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => {
                warn!("{} {} failed: {}", gateway, operation.as_str(), e);
                "error"
            }
        };
        metrics::GATEWAY_REQUESTS
            .with_label_values(&[gateway, operation.as_str(), outcome])
            .inc();

        result
    }
}

/// Drain `stream` into `file` and sync it to disk, returning the byte count.
async fn copy_stream(mut stream: ByteStream, mut file: tokio::fs::File) -> Result<u64, String> {
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| e.to_string())?;
        file.write_all(&chunk).await.map_err(|e| e.to_string())?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| e.to_string())?;
    file.sync_all().await.map_err(|e| e.to_string())?;
    Ok(written)
}

fn download_failed(record_id: &str, reason: impl std::fmt::Display) -> LifecycleError {
    LifecycleError::DownloadFailed {
        record_id: record_id.to_string(),
        reason: reason.to_string(),
    }
}

fn record_outcome<T>(operation: &str, result: &Result<T, LifecycleError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    metrics::LIFECYCLE_OPERATIONS
        .with_label_values(&[operation, outcome])
        .inc();
}
