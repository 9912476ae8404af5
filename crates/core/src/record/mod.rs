//! Durable storage for model records and their lifecycle state.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteRecordStore;
pub use store::{RecordError, RecordFilter, RecordStore};
pub use types::{MetadataUpdate, ModelRecord, NewRecord, RecordStatus};
