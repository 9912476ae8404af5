//! Upload, translation, polling and download lifecycle of model records.

mod config;
mod controller;
mod error;
mod locks;

pub use config::{DerivativeConfig, LifecycleConfig};
pub use controller::{
    encode_translation_handle, IngestRequest, LifecycleController, DEFAULT_CATEGORY,
};
pub use error::LifecycleError;
pub use locks::RecordLocks;
