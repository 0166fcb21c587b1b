use std::path::PathBuf;

use thiserror::Error;

use super::processing_record::{NewProcessingRecord, ProcessingRecord};

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("failed to create store directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("record store error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("existing record table is missing columns: {}", missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },
    #[error("record store lock poisoned")]
    Poisoned,
}

/// Append-only log of completed blur jobs.
///
/// Implementations must be safe to call from many sessions at once and
/// serialize writes themselves.
pub trait RecordStore: Send + Sync {
    /// Creates the backing table if it is absent. Safe to call repeatedly.
    fn ensure_schema(&self) -> Result<(), PersistenceError>;

    /// Inserts one record and returns its assigned id.
    fn append(&self, record: &NewProcessingRecord) -> Result<i64, PersistenceError>;

    /// Most recent records, newest first.
    fn recent(&self, limit: usize) -> Result<Vec<ProcessingRecord>, PersistenceError>;
}
