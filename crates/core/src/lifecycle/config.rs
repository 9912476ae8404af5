//! Configuration for the lifecycle controller.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::gateway::OutputFormat;

/// Configuration for the upload/convert/poll/download lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Bucket that receives uploaded source files.
    #[serde(default = "default_bucket_key")]
    pub bucket_key: String,

    /// Directory for spooled uploads. Files here only live for one request.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Directory that receives downloaded derivatives.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// Viewer formats requested when translation is submitted.
    #[serde(default = "default_output_formats")]
    pub output_formats: Vec<OutputFormat>,

    /// Which derivative is downloaded.
    #[serde(default)]
    pub derivative: DerivativeConfig,
}

/// Selects the derivative file to download from a manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivativeConfig {
    /// Manifest `outputType` of the parent derivative.
    #[serde(default = "default_output_type")]
    pub output_type: String,

    /// Role of the child resource.
    #[serde(default = "default_role")]
    pub role: String,

    /// File extension of the stored artifact, without the dot.
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_bucket_key() -> String {
    "modelbridge-models".to_string()
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_output_formats() -> Vec<OutputFormat> {
    vec![OutputFormat::new("svf", &["2d", "3d"])]
}

fn default_output_type() -> String {
    "obj".to_string()
}

fn default_role() -> String {
    "OBJ".to_string()
}

fn default_extension() -> String {
    "obj".to_string()
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            bucket_key: default_bucket_key(),
            upload_dir: default_upload_dir(),
            artifact_dir: default_artifact_dir(),
            output_formats: default_output_formats(),
            derivative: DerivativeConfig::default(),
        }
    }
}

impl Default for DerivativeConfig {
    fn default() -> Self {
        Self {
            output_type: default_output_type(),
            role: default_role(),
            extension: default_extension(),
        }
    }
}

impl LifecycleConfig {
    /// Sets the upload and artifact directories.
    pub fn with_dirs(mut self, upload_dir: impl Into<PathBuf>, artifact_dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = upload_dir.into();
        self.artifact_dir = artifact_dir.into();
        self
    }

    /// Final location of the artifact for `record_id`.
    pub fn artifact_path(&self, record_id: &str) -> PathBuf {
        self.artifact_dir
            .join(format!("{}.{}", record_id, self.derivative.extension))
    }
}
