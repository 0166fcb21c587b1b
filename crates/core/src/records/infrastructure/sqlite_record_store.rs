use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection};

use crate::records::domain::processing_record::{NewProcessingRecord, ProcessingRecord};
use crate::records::domain::record_store::{PersistenceError, RecordStore};

const EXPECTED_COLUMNS: &[&str] = &["id", "path", "radius", "elapsed_ms"];

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS transformations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL,
    radius INTEGER NOT NULL,
    elapsed_ms INTEGER NOT NULL
)";

/// Record store backed by an embedded SQLite database.
///
/// A single connection sits behind a mutex, so concurrent sessions take
/// turns and each append is one insert.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    /// Opens (or creates) the database file, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| PersistenceError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        log::debug!("Opened record store at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, PersistenceError> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, PersistenceError> {
        self.conn.lock().map_err(|_| PersistenceError::Poisoned)
    }
}

fn table_columns(conn: &Connection) -> Result<Vec<String>, PersistenceError> {
    let mut stmt = conn.prepare("PRAGMA table_info(transformations)")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

impl RecordStore for SqliteRecordStore {
    fn ensure_schema(&self) -> Result<(), PersistenceError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(CREATE_TABLE, [])?;

        let columns = table_columns(&tx)?;
        let missing: Vec<String> = EXPECTED_COLUMNS
            .iter()
            .filter(|c| !columns.iter().any(|have| have == *c))
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(PersistenceError::SchemaMismatch { missing });
        }

        tx.commit()?;
        Ok(())
    }

    fn append(&self, record: &NewProcessingRecord) -> Result<i64, PersistenceError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO transformations (path, radius, elapsed_ms) VALUES (?1, ?2, ?3)",
            params![
                record.path,
                i64::from(record.radius),
                i64::try_from(record.elapsed_ms).unwrap_or(i64::MAX)
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn recent(&self, limit: usize) -> Result<Vec<ProcessingRecord>, PersistenceError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, path, radius, elapsed_ms FROM transformations ORDER BY id DESC LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let records = stmt
            .query_map([limit], |row| {
                Ok(ProcessingRecord {
                    id: row.get(0)?,
                    path: row.get(1)?,
                    radius: row.get::<_, i64>(2)?.clamp(0, u32::MAX as i64) as u32,
                    elapsed_ms: row.get::<_, i64>(3)?.max(0) as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}
