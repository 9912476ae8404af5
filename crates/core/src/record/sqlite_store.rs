//! SQLite-backed record store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{
    FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef,
};
use rusqlite::{params, Connection};

use super::{
    MetadataUpdate, ModelRecord, NewRecord, RecordError, RecordFilter, RecordStatus, RecordStore,
};

const SELECT_COLUMNS: &str = "SELECT id, display_name, category, description, source_object_id, translation_handle, status, local_artifact_path, progress, error_message, created_at FROM model_records";

/// SQLite-backed record store.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    /// Create a new SQLite record store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, RecordError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite record store (useful for testing).
    pub fn in_memory() -> Result<Self, RecordError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), RecordError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS model_records (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                category TEXT NOT NULL,
                description TEXT NOT NULL,
                source_object_id TEXT NOT NULL,
                translation_handle TEXT,
                status TEXT NOT NULL,
                local_artifact_path TEXT,
                progress TEXT,
                error_message TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_model_records_status ON model_records(status);
            CREATE INDEX IF NOT EXISTS idx_model_records_category ON model_records(category);
            CREATE INDEX IF NOT EXISTS idx_model_records_created_at ON model_records(created_at DESC);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, RecordError> {
        self.conn
            .lock()
            .map_err(|_| RecordError::Database("connection mutex poisoned".to_string()))
    }

    fn build_where_clause(filter: &RecordFilter) -> (String, Vec<Box<dyn ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status));
        }

        if let Some(ref category) = filter.category {
            conditions.push("category = ?");
            params.push(Box::new(category.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<ModelRecord> {
        let created_at_str: String = row.get(10)?;

        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(e)))?;

        Ok(ModelRecord {
            id: row.get(0)?,
            display_name: row.get(1)?,
            category: row.get(2)?,
            description: row.get(3)?,
            source_object_id: row.get(4)?,
            translation_handle: row.get(5)?,
            status: row.get(6)?,
            local_artifact_path: row.get(7)?,
            progress: row.get(8)?,
            error_message: row.get(9)?,
            created_at,
        })
    }

    fn fetch(conn: &Connection, id: &str) -> Result<Option<ModelRecord>, RecordError> {
        let result = conn.query_row(
            &format!("{} WHERE id = ?", SELECT_COLUMNS),
            params![id],
            Self::row_to_record,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn fetch_existing(conn: &Connection, id: &str) -> Result<ModelRecord, RecordError> {
        Self::fetch(conn, id)?.ok_or_else(|| RecordError::NotFound(id.to_string()))
    }
}

impl ToSql for RecordStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for RecordStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

impl RecordStore for SqliteRecordStore {
    fn create(&self, record: NewRecord) -> Result<ModelRecord, RecordError> {
        let conn = self.conn()?;

        let now = Utc::now();
        let status = RecordStatus::NeedConvert;

        let result = conn.execute(
            "INSERT INTO model_records (id, display_name, category, description, source_object_id, status, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                record.id,
                record.display_name,
                record.category,
                record.description,
                record.source_object_id,
                status,
                // Fixed width keeps ORDER BY created_at chronological
                now.to_rfc3339_opts(SecondsFormat::Nanos, true),
            ],
        );

        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(RecordError::AlreadyExists(record.id));
            }
            Err(e) => return Err(e.into()),
        }

        Ok(ModelRecord {
            id: record.id,
            display_name: record.display_name,
            category: record.category,
            description: record.description,
            source_object_id: record.source_object_id,
            translation_handle: None,
            status,
            local_artifact_path: None,
            progress: None,
            error_message: None,
            created_at: now,
        })
    }

    fn get(&self, id: &str) -> Result<Option<ModelRecord>, RecordError> {
        let conn = self.conn()?;
        Self::fetch(&conn, id)
    }

    fn list(&self, filter: &RecordFilter) -> Result<Vec<ModelRecord>, RecordError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "{} {} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            SELECT_COLUMNS, where_clause
        );

        let mut stmt = conn.prepare(&sql)?;

        let mut all_params: Vec<Box<dyn ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt.query_map(param_refs.as_slice(), Self::row_to_record)?;

        let mut records = Vec::new();
        for row_result in rows {
            records.push(row_result?);
        }

        Ok(records)
    }

    fn count(&self, filter: &RecordFilter) -> Result<i64, RecordError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM model_records {}", where_clause);
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let count: i64 = conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?;
        Ok(count)
    }

    fn write_lifecycle(&self, record: &ModelRecord) -> Result<ModelRecord, RecordError> {
        let conn = self.conn()?;

        let changed = conn.execute(
            "UPDATE model_records SET status = ?, translation_handle = COALESCE(translation_handle, ?), progress = ?, local_artifact_path = ?, error_message = ? WHERE id = ?",
            params![
                record.status,
                record.translation_handle,
                record.progress,
                record.local_artifact_path,
                record.error_message,
                record.id,
            ],
        )?;

        if changed == 0 {
            return Err(RecordError::NotFound(record.id.clone()));
        }

        Self::fetch_existing(&conn, &record.id)
    }

    fn update_metadata(
        &self,
        id: &str,
        update: &MetadataUpdate,
    ) -> Result<ModelRecord, RecordError> {
        let conn = self.conn()?;

        let changed = conn.execute(
            "UPDATE model_records SET display_name = COALESCE(?, display_name), category = COALESCE(?, category), description = COALESCE(?, description) WHERE id = ?",
            params![update.display_name, update.category, update.description, id],
        )?;

        if changed == 0 {
            return Err(RecordError::NotFound(id.to_string()));
        }

        Self::fetch_existing(&conn, id)
    }
}
