//! Database connection management.
//!
//! Wraps a single rusqlite Connection in a Mutex. Configures WAL mode and
//! the usual PRAGMAs on open, then runs migrations.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use holdoff_core::error::HoldoffError;

use crate::migrations;

/// SQLite database handle shared by the stores.
///
/// rusqlite's Connection is not Sync, hence the Mutex. Writes are ordered
/// by the single store worker, not by this lock.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database at the given path.
    pub fn new(path: &Path) -> Result<Self, HoldoffError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| HoldoffError::Storage(format!("Failed to open database: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| HoldoffError::Storage(format!("Failed to set pragmas: {}", e)))?;

        info!("Database opened at {}", path.display());
        Self::migrated(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, HoldoffError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| HoldoffError::Storage(format!("Failed to open in-memory db: {}", e)))?;
        Self::migrated(conn)
    }

    fn migrated(conn: Connection) -> Result<Self, HoldoffError> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Execute a closure with a reference to the underlying connection.
    ///
    /// The mutex is held for the duration of the closure.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, HoldoffError>
    where
        F: FnOnce(&Connection) -> Result<T, HoldoffError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| HoldoffError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_rows(db: &Database) -> i64 {
        db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM pending_changes", [], |row| row.get(0))
                .map_err(|e| HoldoffError::Storage(e.to_string()))
        })
        .unwrap()
    }

    #[test]
    fn test_in_memory_database() {
        let db = Database::in_memory().unwrap();
        assert_eq!(pending_rows(&db), 0);
    }

    #[test]
    fn test_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("holdoff.db");
        let db = Database::new(&path).unwrap();
        assert_eq!(pending_rows(&db), 0);
        assert!(path.exists());
    }

    #[test]
    fn test_file_database_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("holdoff.db");
        {
            let db = Database::new(&path).unwrap();
            db.with_conn(|conn| {
                conn.execute(
                    "INSERT INTO pending_changes (action_type, payload, description, queued_at, applies_at, status)
                     VALUES ('lockNow', '{\"params\":[]}', 'Lock device', 0, 10, 'pending')",
                    [],
                )
                .map_err(|e| HoldoffError::Storage(e.to_string()))?;
                Ok(())
            })
            .unwrap();
        }
        let db = Database::new(&path).unwrap();
        assert_eq!(pending_rows(&db), 1);
    }

    #[test]
    fn test_wal_mode_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(&dir.path().join("wal.db")).unwrap();
        let mode: String = db
            .with_conn(|conn| {
                conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))
                    .map_err(|e| HoldoffError::Storage(e.to_string()))
            })
            .unwrap();
        assert_eq!(mode, "wal");
    }
}
