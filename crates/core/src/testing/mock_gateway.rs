//! Mock translation gateway for testing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use tokio::sync::RwLock;

use crate::gateway::{
    ByteStream, DownloadCredential, GatewayError, GatewayOperation, JobAck, Manifest,
    OutputFormat, TranslationGateway, UploadedObject, ViewerToken,
};

const MOCK_URL_PREFIX: &str = "mock://derivatives/";

/// A recorded upload for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    /// Path the controller handed over (already removed after ingest).
    pub source_path: PathBuf,
    pub bucket_key: String,
    pub object_key: String,
    /// File contents at the time of the upload.
    pub data: Vec<u8>,
    pub timestamp: chrono::DateTime<Utc>,
}

/// A recorded job submission for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedSubmission {
    pub urn: String,
    pub formats: Vec<OutputFormat>,
    pub timestamp: chrono::DateTime<Utc>,
}

/// Mock implementation of the TranslationGateway trait.
///
/// Provides controllable behavior for testing:
/// - Track uploads and job submissions for assertions
/// - Serve manifests and derivative payloads set by the test
/// - Fail a chosen operation once
///
/// # Example
///
/// ```rust,ignore
/// let gateway = MockGateway::new();
///
/// gateway.set_manifest(&handle, fixtures::obj_manifest("urn:derivative")).await;
/// gateway.set_payload("urn:derivative", b"v 0 0 0\n".to_vec()).await;
///
/// // Make the next submission fail
/// gateway
///     .fail_next(GatewayOperation::SubmitJob, GatewayError::Timeout)
///     .await;
/// ```
#[derive(Debug, Default)]
pub struct MockGateway {
    uploads: Arc<RwLock<Vec<RecordedUpload>>>,
    submissions: Arc<RwLock<Vec<RecordedSubmission>>>,
    credential_requests: Arc<RwLock<Vec<(String, String)>>>,
    /// Manifests by translation handle.
    manifests: Arc<RwLock<HashMap<String, Manifest>>>,
    /// Derivative payloads by derivative urn.
    payloads: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    /// Derivative urns whose stream breaks after the first chunk.
    broken_streams: Arc<RwLock<Vec<String>>>,
    /// One-shot failures per operation.
    next_errors: Arc<RwLock<HashMap<GatewayOperation, GatewayError>>>,
    /// Delay applied to every job submission.
    submit_delay: Arc<RwLock<Option<Duration>>>,
    viewer_tokens_issued: Arc<RwLock<usize>>,
}

impl MockGateway {
    /// Create a new mock gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded uploads.
    pub async fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.read().await.clone()
    }

    /// Get all recorded job submissions.
    pub async fn submissions(&self) -> Vec<RecordedSubmission> {
        self.submissions.read().await.clone()
    }

    /// Get all recorded `(urn, derivative_urn)` credential requests.
    pub async fn credential_requests(&self) -> Vec<(String, String)> {
        self.credential_requests.read().await.clone()
    }

    /// Number of viewer tokens handed out.
    pub async fn viewer_tokens_issued(&self) -> usize {
        *self.viewer_tokens_issued.read().await
    }

    /// Serve `manifest` for the translation handle `urn`.
    pub async fn set_manifest(&self, urn: &str, manifest: Manifest) {
        self.manifests
            .write()
            .await
            .insert(urn.to_string(), manifest);
    }

    /// Serve `data` as the body of `derivative_urn`.
    pub async fn set_payload(&self, derivative_urn: &str, data: Vec<u8>) {
        self.payloads
            .write()
            .await
            .insert(derivative_urn.to_string(), data);
    }

    /// Make the download stream of `derivative_urn` fail after its first chunk.
    pub async fn break_stream(&self, derivative_urn: &str) {
        self.broken_streams
            .write()
            .await
            .push(derivative_urn.to_string());
    }

    /// Configure the next call of `operation` to fail with `error`.
    pub async fn fail_next(&self, operation: GatewayOperation, error: GatewayError) {
        self.next_errors.write().await.insert(operation, error);
    }

    /// Slow down job submissions, e.g. to widen race windows.
    pub async fn set_submit_delay(&self, delay: Duration) {
        *self.submit_delay.write().await = Some(delay);
    }

    /// Take the pending error for `operation` if set.
    async fn take_error(&self, operation: GatewayOperation) -> Option<GatewayError> {
        self.next_errors.write().await.remove(&operation)
    }

    fn derivative_urn_from_url(url: &str) -> Option<&str> {
        url.strip_prefix(MOCK_URL_PREFIX)
    }
}

#[async_trait]
impl TranslationGateway for MockGateway {
    fn name(&self) -> &str {
        "mock"
    }

    async fn upload(
        &self,
        source: &Path,
        bucket_key: &str,
        object_key: &str,
    ) -> Result<UploadedObject, GatewayError> {
        let data = tokio::fs::read(source).await?;

        if let Some(error) = self.take_error(GatewayOperation::Upload).await {
            return Err(error);
        }

        let size = data.len() as u64;
        self.uploads.write().await.push(RecordedUpload {
            source_path: source.to_path_buf(),
            bucket_key: bucket_key.to_string(),
            object_key: object_key.to_string(),
            data,
            timestamp: Utc::now(),
        });

        Ok(UploadedObject {
            object_id: format!("urn:adsk.objects:os.object:{}/{}", bucket_key, object_key),
            bucket_key: bucket_key.to_string(),
            object_key: object_key.to_string(),
            size: Some(size),
        })
    }

    async fn submit_job(
        &self,
        urn: &str,
        formats: &[OutputFormat],
    ) -> Result<JobAck, GatewayError> {
        let delay = *self.submit_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.take_error(GatewayOperation::SubmitJob).await {
            return Err(error);
        }

        self.submissions.write().await.push(RecordedSubmission {
            urn: urn.to_string(),
            formats: formats.to_vec(),
            timestamp: Utc::now(),
        });

        Ok(JobAck {
            result: "success".to_string(),
            urn: urn.to_string(),
        })
    }

    async fn get_manifest(&self, urn: &str) -> Result<Manifest, GatewayError> {
        if let Some(error) = self.take_error(GatewayOperation::GetManifest).await {
            return Err(error);
        }

        self.manifests
            .read()
            .await
            .get(urn)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("manifest for {}", urn)))
    }

    async fn get_download_credential(
        &self,
        urn: &str,
        derivative_urn: &str,
    ) -> Result<DownloadCredential, GatewayError> {
        if let Some(error) = self
            .take_error(GatewayOperation::GetDownloadCredential)
            .await
        {
            return Err(error);
        }

        self.credential_requests
            .write()
            .await
            .push((urn.to_string(), derivative_urn.to_string()));

        Ok(DownloadCredential {
            url: format!("{}{}", MOCK_URL_PREFIX, derivative_urn),
            cookies: vec![
                "CloudFront-Policy=mock".to_string(),
                "CloudFront-Signature=mock".to_string(),
            ],
        })
    }

    async fn fetch_bytes(
        &self,
        credential: &DownloadCredential,
    ) -> Result<ByteStream, GatewayError> {
        if let Some(error) = self.take_error(GatewayOperation::FetchBytes).await {
            return Err(error);
        }

        let derivative_urn = Self::derivative_urn_from_url(&credential.url)
            .ok_or_else(|| GatewayError::NotFound(credential.url.clone()))?;

        let data = self
            .payloads
            .read()
            .await
            .get(derivative_urn)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(derivative_urn.to_string()))?;

        let broken = self
            .broken_streams
            .read()
            .await
            .iter()
            .any(|urn| urn == derivative_urn);

        // Serve in small chunks so writers see a real stream
        let mut chunks: Vec<Result<Bytes, GatewayError>> = data
            .chunks(4)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        if broken {
            chunks.truncate(1);
            chunks.push(Err(GatewayError::ConnectionFailed(
                "connection reset mid-stream".to_string(),
            )));
        }

        Ok(futures::stream::iter(chunks).boxed())
    }

    async fn viewer_token(&self) -> Result<ViewerToken, GatewayError> {
        if let Some(error) = self.take_error(GatewayOperation::ViewerToken).await {
            return Err(error);
        }

        let mut issued = self.viewer_tokens_issued.write().await;
        *issued += 1;
        Ok(ViewerToken {
            access_token: format!("mock-viewer-token-{}", *issued),
            expires_in: 3599,
        })
    }
}
