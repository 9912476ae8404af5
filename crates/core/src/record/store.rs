//! Record storage trait and types.

use thiserror::Error;

use super::{MetadataUpdate, ModelRecord, NewRecord, RecordStatus};

/// Error type for record storage operations.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Record not found.
    #[error("Record not found: {0}")]
    NotFound(String),
    /// A record with this id already exists.
    #[error("Record already exists: {0}")]
    AlreadyExists(String),
    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for RecordError {
    fn from(e: rusqlite::Error) -> Self {
        RecordError::Database(e.to_string())
    }
}

/// Filter for querying records.
#[derive(Debug, Clone)]
pub struct RecordFilter {
    /// Filter by status.
    pub status: Option<RecordStatus>,
    /// Filter by category (exact match).
    pub category: Option<String>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordFilter {
    /// Create a new filter with defaults.
    pub fn new() -> Self {
        Self {
            status: None,
            category: None,
            limit: 100,
            offset: 0,
        }
    }

    /// Filter by status.
    pub fn with_status(mut self, status: RecordStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filter by category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Set limit.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Set offset.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for record storage backends.
///
/// Lifecycle writes and metadata writes touch disjoint columns, so a metadata
/// update racing a lifecycle operation on the same record is never lost.
pub trait RecordStore: Send + Sync {
    /// Insert a new record in `needConvert` status.
    fn create(&self, record: NewRecord) -> Result<ModelRecord, RecordError>;

    /// Get a record by ID.
    fn get(&self, id: &str) -> Result<Option<ModelRecord>, RecordError>;

    /// List records matching the filter, newest first.
    fn list(&self, filter: &RecordFilter) -> Result<Vec<ModelRecord>, RecordError>;

    /// Count records matching the filter (limit/offset ignored).
    fn count(&self, filter: &RecordFilter) -> Result<i64, RecordError>;

    /// Persist the lifecycle fields of `record` (status, translation handle,
    /// progress, artifact path, error message) and return the stored row.
    ///
    /// An already-set translation handle is never overwritten.
    fn write_lifecycle(&self, record: &ModelRecord) -> Result<ModelRecord, RecordError>;

    /// Merge metadata fields into a record.
    fn update_metadata(&self, id: &str, update: &MetadataUpdate)
        -> Result<ModelRecord, RecordError>;
}
