//! Database schema migrations.
//!
//! Applies the initial schema: the pending_changes queue, the
//! delay_settings key-value table and schema_migrations.

use rusqlite::Connection;
use tracing::info;

use holdoff_core::error::HoldoffError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), HoldoffError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| HoldoffError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| HoldoffError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: pending_changes");
    }

    Ok(())
}

/// Version 1: deferred action queue and policy settings.
fn apply_v1(conn: &Connection) -> Result<(), HoldoffError> {
    conn.execute_batch(
        "
        -- AUTOINCREMENT keeps ids monotonic even after the newest row is deleted.
        CREATE TABLE IF NOT EXISTS pending_changes (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            action_type     TEXT NOT NULL,
            payload         TEXT NOT NULL,
            description     TEXT NOT NULL DEFAULT '',
            queued_at       INTEGER NOT NULL,
            applies_at      INTEGER NOT NULL,
            status          TEXT NOT NULL DEFAULT 'pending'
                            CHECK (status IN ('pending', 'failed')),
            CHECK (applies_at >= queued_at)
        );

        CREATE INDEX IF NOT EXISTS idx_pending_changes_status_applies
            ON pending_changes (status, applies_at ASC, id ASC);

        CREATE TABLE IF NOT EXISTS delay_settings (
            key             TEXT PRIMARY KEY NOT NULL,
            value           TEXT NOT NULL,
            updated_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'pending_changes');
        ",
    )
    .map_err(|e| HoldoffError::Storage(format!("Migration v1 failed: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn test_migrations_run_once() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_status_check() {
        let conn = open_test_conn();
        let result = conn.execute(
            "INSERT INTO pending_changes (action_type, payload, queued_at, applies_at, status)
             VALUES ('reboot', '{}', 0, 0, 'applying')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_applies_at_not_before_queued_at() {
        let conn = open_test_conn();
        let result = conn.execute(
            "INSERT INTO pending_changes (action_type, payload, queued_at, applies_at)
             VALUES ('reboot', '{}', 100, 99)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_ids_not_reused_after_delete() {
        let conn = open_test_conn();
        let insert = "INSERT INTO pending_changes (action_type, payload, queued_at, applies_at)
                      VALUES ('lockNow', '{}', 0, 0)";
        conn.execute(insert, []).unwrap();
        let first = conn.last_insert_rowid();
        conn.execute("DELETE FROM pending_changes", []).unwrap();
        conn.execute(insert, []).unwrap();
        assert!(conn.last_insert_rowid() > first);
    }

    #[test]
    fn test_delay_settings_table_exists() {
        let conn = open_test_conn();
        conn.execute(
            "INSERT INTO delay_settings (key, value) VALUES ('enabled', 'true')",
            [],
        )
        .unwrap();
        let value: String = conn
            .query_row(
                "SELECT value FROM delay_settings WHERE key = 'enabled'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(value, "true");
    }
}
