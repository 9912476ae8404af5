//! Types for translation gateway operations.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while talking to the translation service.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        GatewayError::Io(e.to_string())
    }
}

/// Individual gateway calls, used for metrics labels and failure injection in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOperation {
    Upload,
    SubmitJob,
    GetManifest,
    GetDownloadCredential,
    FetchBytes,
    ViewerToken,
}

impl GatewayOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayOperation::Upload => "upload",
            GatewayOperation::SubmitJob => "submit_job",
            GatewayOperation::GetManifest => "get_manifest",
            GatewayOperation::GetDownloadCredential => "get_download_credential",
            GatewayOperation::FetchBytes => "fetch_bytes",
            GatewayOperation::ViewerToken => "viewer_token",
        }
    }
}

/// An object stored in the service's bucket storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedObject {
    /// Opaque object id (an `urn:adsk.objects:...` string for APS).
    pub object_id: String,
    pub bucket_key: String,
    pub object_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Acknowledgement of an accepted translation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobAck {
    /// `"success"` for a new job, `"created"` when an identical job already exists.
    pub result: String,
    pub urn: String,
}

/// A requested translation output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFormat {
    #[serde(rename = "type")]
    pub format_type: String,
    pub views: Vec<String>,
}

impl OutputFormat {
    pub fn new(format_type: impl Into<String>, views: &[&str]) -> Self {
        Self {
            format_type: format_type.into(),
            views: views.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// Translation status as reported by a manifest.
///
/// Unrecognized spellings are kept in `Unknown` instead of failing the parse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ManifestStatus {
    Pending,
    InProgress,
    Success,
    Failed,
    Timeout,
    Unknown(String),
}

impl ManifestStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ManifestStatus::Pending => "pending",
            ManifestStatus::InProgress => "inprogress",
            ManifestStatus::Success => "success",
            ManifestStatus::Failed => "failed",
            ManifestStatus::Timeout => "timeout",
            ManifestStatus::Unknown(s) => s,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ManifestStatus::Success)
    }
}

impl From<String> for ManifestStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => ManifestStatus::Pending,
            "inprogress" => ManifestStatus::InProgress,
            "success" => ManifestStatus::Success,
            "failed" => ManifestStatus::Failed,
            "timeout" => ManifestStatus::Timeout,
            _ => ManifestStatus::Unknown(s),
        }
    }
}

impl From<ManifestStatus> for String {
    fn from(status: ManifestStatus) -> Self {
        match status {
            ManifestStatus::Unknown(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for ManifestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Translation manifest for one source object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub status: ManifestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    #[serde(default)]
    pub derivatives: Vec<Derivative>,
}

/// One output produced by a translation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Derivative {
    pub output_type: String,
    pub status: ManifestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<DerivativeMessage>,
    #[serde(default)]
    pub children: Vec<DerivativeChild>,
}

/// Diagnostic attached to a derivative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivativeMessage {
    #[serde(rename = "type", default)]
    pub message_type: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: serde_json::Value,
}

impl DerivativeMessage {
    /// The message text; the service sends either a string or a list of strings.
    pub fn text(&self) -> Option<String> {
        match &self.message {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Array(parts) => {
                let joined = parts
                    .iter()
                    .filter_map(|p| p.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                (!joined.is_empty()).then_some(joined)
            }
            _ => self.code.clone(),
        }
    }
}

/// A downloadable resource inside a derivative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivativeChild {
    #[serde(default)]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ManifestStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urn: Option<String>,
}

impl Manifest {
    /// Find the first successful child with `role` inside a successful
    /// derivative of `output_type`, returning its urn.
    pub fn find_derivative(&self, output_type: &str, role: &str) -> Option<&str> {
        self.derivatives
            .iter()
            .filter(|d| d.output_type == output_type && d.status.is_success())
            .flat_map(|d| d.children.iter())
            .find(|c| c.role == role && c.status.as_ref().is_some_and(|s| s.is_success()))
            .and_then(|c| c.urn.as_deref())
    }

    /// First diagnostic text reported by any derivative.
    pub fn failure_message(&self) -> Option<String> {
        self.derivatives
            .iter()
            .flat_map(|d| d.messages.iter())
            .find(|m| m.message_type == "error")
            .or_else(|| self.derivatives.iter().flat_map(|d| d.messages.iter()).next())
            .and_then(DerivativeMessage::text)
    }
}

/// Signed access to a derivative file.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadCredential {
    pub url: String,
    /// `name=value` pairs sent back as the `Cookie` header.
    pub cookies: Vec<String>,
}

impl DownloadCredential {
    pub fn cookie_header(&self) -> String {
        self.cookies.join("; ")
    }
}

/// Read-only access token handed to the browser viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerToken {
    pub access_token: String,
    /// Seconds until the token expires.
    pub expires_in: u64,
}

/// Body of a derivative download.
pub type ByteStream = BoxStream<'static, Result<Bytes, GatewayError>>;

/// Trait for translation service backends.
#[async_trait]
pub trait TranslationGateway: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Upload a local file into `bucket_key` under `object_key`.
    async fn upload(
        &self,
        source: &Path,
        bucket_key: &str,
        object_key: &str,
    ) -> Result<UploadedObject, GatewayError>;

    /// Request translation of the object identified by `urn`.
    async fn submit_job(&self, urn: &str, formats: &[OutputFormat])
        -> Result<JobAck, GatewayError>;

    /// Fetch the current manifest for `urn`.
    async fn get_manifest(&self, urn: &str) -> Result<Manifest, GatewayError>;

    /// Obtain signed credentials for downloading one derivative.
    async fn get_download_credential(
        &self,
        urn: &str,
        derivative_urn: &str,
    ) -> Result<DownloadCredential, GatewayError>;

    /// Open the derivative body described by `credential`.
    async fn fetch_bytes(&self, credential: &DownloadCredential)
        -> Result<ByteStream, GatewayError>;

    /// Obtain a token limited to viewing translated derivatives.
    async fn viewer_token(&self) -> Result<ViewerToken, GatewayError>;
}
