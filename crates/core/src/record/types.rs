//! Core model record data types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a model record.
///
/// State machine flow:
/// ```text
/// NeedConvert -> InProgress -> (Pending | InProgress)* -> Success -> Downloaded
///                                                     \-> Failed
///                                                     \-> Timeout
/// ```
///
/// The translation statuses share their spelling with the manifest vocabulary
/// of the translation service, so a poll copies them across unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordStatus {
    /// Uploaded, translation not yet requested.
    #[serde(rename = "needConvert")]
    NeedConvert,
    /// Job accepted, not yet started by the service.
    #[serde(rename = "pending")]
    Pending,
    /// Translation submitted or running.
    #[serde(rename = "inprogress")]
    InProgress,
    /// Translation finished successfully.
    #[serde(rename = "success")]
    Success,
    /// Translation failed.
    #[serde(rename = "failed")]
    Failed,
    /// Translation timed out on the service side.
    #[serde(rename = "timeout")]
    Timeout,
    /// A derivative has been stored locally.
    #[serde(rename = "downloaded")]
    Downloaded,
}

impl RecordStatus {
    /// All statuses, in state machine order.
    pub const ALL: [RecordStatus; 7] = [
        RecordStatus::NeedConvert,
        RecordStatus::Pending,
        RecordStatus::InProgress,
        RecordStatus::Success,
        RecordStatus::Failed,
        RecordStatus::Timeout,
        RecordStatus::Downloaded,
    ];

    /// Returns the wire/storage spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::NeedConvert => "needConvert",
            RecordStatus::Pending => "pending",
            RecordStatus::InProgress => "inprogress",
            RecordStatus::Success => "success",
            RecordStatus::Failed => "failed",
            RecordStatus::Timeout => "timeout",
            RecordStatus::Downloaded => "downloaded",
        }
    }

    /// Terminal with respect to the translation pipeline.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RecordStatus::Success
                | RecordStatus::Failed
                | RecordStatus::Timeout
                | RecordStatus::Downloaded
        )
    }

    /// Translation ended without a usable result.
    pub fn is_failure(&self) -> bool {
        matches!(self, RecordStatus::Failed | RecordStatus::Timeout)
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown record status: {}", s))
    }
}

/// One uploaded CAD model and where it is in the translation lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRecord {
    pub id: String,
    pub display_name: String,
    pub category: String,
    pub description: String,
    /// Object id returned by the storage service after upload.
    pub source_object_id: String,
    /// Base64 form of `source_object_id`, set when translation is submitted.
    pub translation_handle: Option<String>,
    pub status: RecordStatus,
    pub local_artifact_path: Option<String>,
    /// Progress text from the last manifest poll. Advisory only.
    pub progress: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Data needed to insert a freshly uploaded record.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub id: String,
    pub display_name: String,
    pub category: String,
    pub description: String,
    pub source_object_id: String,
}

/// Partial metadata update. `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MetadataUpdate {
    /// Returns true if no field would change.
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.category.is_none() && self.description.is_none()
    }
}
