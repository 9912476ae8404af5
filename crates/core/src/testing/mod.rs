//! Testing utilities and mock implementations.
//!
//! This module provides a mock translation gateway and manifest fixtures,
//! allowing lifecycle and API tests without a real service account.
//!
//! # Example
//!
//! ```rust,ignore
//! use modelbridge_core::testing::{fixtures, MockGateway};
//!
//! let gateway = Arc::new(MockGateway::new());
//! gateway.set_manifest(&handle, fixtures::manifest(ManifestStatus::Success)).await;
//!
//! // Use in LifecycleController...
//! ```

mod mock_gateway;

pub use mock_gateway::{MockGateway, RecordedSubmission, RecordedUpload};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::gateway::{
        Derivative, DerivativeChild, DerivativeMessage, Manifest, ManifestStatus,
    };

    /// A manifest with the given status and no derivatives.
    pub fn manifest(status: ManifestStatus) -> Manifest {
        let progress = match status {
            ManifestStatus::Success | ManifestStatus::Failed | ManifestStatus::Timeout => {
                "complete".to_string()
            }
            _ => "0% complete".to_string(),
        };
        Manifest {
            status,
            progress: Some(progress),
            derivatives: Vec::new(),
        }
    }

    /// A running translation at `percent`.
    pub fn in_progress_manifest(percent: u32) -> Manifest {
        Manifest {
            status: ManifestStatus::InProgress,
            progress: Some(format!("{}% complete", percent)),
            derivatives: Vec::new(),
        }
    }

    /// A finished translation with a viewer derivative and an OBJ derivative
    /// whose `OBJ` child has `derivative_urn`.
    pub fn obj_manifest(derivative_urn: &str) -> Manifest {
        Manifest {
            status: ManifestStatus::Success,
            progress: Some("complete".to_string()),
            derivatives: vec![
                derivative("svf", ManifestStatus::Success, vec![child("3d", "urn:svf")]),
                derivative("obj", ManifestStatus::Success, vec![child("OBJ", derivative_urn)]),
            ],
        }
    }

    /// A failed translation carrying one error message.
    pub fn failed_manifest(message: &str) -> Manifest {
        let mut failed = derivative("svf", ManifestStatus::Failed, Vec::new());
        failed.messages.push(DerivativeMessage {
            message_type: "error".to_string(),
            code: Some("TranslationWorker-InternalFailure".to_string()),
            message: serde_json::Value::String(message.to_string()),
        });
        Manifest {
            status: ManifestStatus::Failed,
            progress: Some("complete".to_string()),
            derivatives: vec![failed],
        }
    }

    /// A derivative of `output_type` with the given children.
    pub fn derivative(
        output_type: &str,
        status: ManifestStatus,
        children: Vec<DerivativeChild>,
    ) -> Derivative {
        Derivative {
            output_type: output_type.to_string(),
            status,
            progress: Some("complete".to_string()),
            messages: Vec::new(),
            children,
        }
    }

    /// A successful child resource.
    pub fn child(role: &str, urn: &str) -> DerivativeChild {
        DerivativeChild {
            role: role.to_string(),
            status: Some(ManifestStatus::Success),
            urn: Some(urn.to_string()),
        }
    }
}
