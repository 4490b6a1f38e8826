//! Durable queue of deferred actions.
//!
//! All queries order by `applies_at` and break ties by id, so records queued
//! with the same delay come back in submission order.

use std::sync::Arc;

use rusqlite::{OptionalExtension, Row};
use tracing::debug;

use holdoff_core::error::HoldoffError;
use holdoff_core::types::{ActionId, ActionRecord, ActionStatus, NewAction, Timestamp};

use crate::db::Database;

const SELECT_COLUMNS: &str =
    "SELECT id, action_type, payload, description, queued_at, applies_at, status FROM pending_changes";

/// Repository for `pending_changes`.
///
/// Has no ordering guarantees of its own; callers serialize access.
#[derive(Debug, Clone)]
pub struct ActionStore {
    db: Arc<Database>,
}

impl ActionStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new pending record and return its assigned id.
    pub fn insert(&self, action: &NewAction) -> Result<ActionId, HoldoffError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO pending_changes (action_type, payload, description, queued_at, applies_at, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'pending')",
                rusqlite::params![
                    action.action_type,
                    action.payload,
                    action.description,
                    action.queued_at.0,
                    action.applies_at.0,
                ],
            )
            .map_err(|e| HoldoffError::Storage(format!("Failed to insert action: {}", e)))?;
            let id = ActionId(conn.last_insert_rowid());
            debug!(id = %id, action_type = %action.action_type, "Inserted pending change");
            Ok(id)
        })
    }

    /// Delete a record regardless of status. Returns whether a row existed.
    pub fn delete(&self, id: ActionId) -> Result<bool, HoldoffError> {
        self.db.with_conn(|conn| {
            let affected = conn
                .execute(
                    "DELETE FROM pending_changes WHERE id = ?1",
                    rusqlite::params![id.0],
                )
                .map_err(|e| HoldoffError::Storage(format!("Failed to delete action: {}", e)))?;
            Ok(affected > 0)
        })
    }

    /// Persist the record's status. Other fields are immutable.
    ///
    /// A failed record never goes back to pending; such an update, or one
    /// for a record that no longer exists, returns `false`.
    pub fn update(&self, record: &ActionRecord) -> Result<bool, HoldoffError> {
        self.db.with_conn(|conn| {
            let affected = conn
                .execute(
                    "UPDATE pending_changes SET status = ?1
                     WHERE id = ?2 AND NOT (status = 'failed' AND ?1 = 'pending')",
                    rusqlite::params![record.status.to_string(), record.id.0],
                )
                .map_err(|e| HoldoffError::Storage(format!("Failed to update action: {}", e)))?;
            Ok(affected > 0)
        })
    }

    pub fn get(&self, id: ActionId) -> Result<Option<ActionRecord>, HoldoffError> {
        self.db.with_conn(|conn| {
            let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
            let result = conn
                .query_row(&sql, rusqlite::params![id.0], |row| Ok(row_to_record(row)))
                .optional()
                .map_err(|e| HoldoffError::Storage(e.to_string()))?;

            match result {
                Some(record) => Ok(Some(record?)),
                None => Ok(None),
            }
        })
    }

    /// All pending records, soonest first.
    pub fn all_pending(&self) -> Result<Vec<ActionRecord>, HoldoffError> {
        self.query(
            &format!(
                "{} WHERE status = 'pending' ORDER BY applies_at ASC, id ASC",
                SELECT_COLUMNS
            ),
            rusqlite::params![],
        )
    }

    /// Pending records whose `applies_at` is at or before `now`.
    pub fn ready_to_apply(&self, now: Timestamp) -> Result<Vec<ActionRecord>, HoldoffError> {
        self.query(
            &format!(
                "{} WHERE status = 'pending' AND applies_at <= ?1 ORDER BY applies_at ASC, id ASC",
                SELECT_COLUMNS
            ),
            rusqlite::params![now.0],
        )
    }

    /// Records that could not be applied, oldest deadline first.
    pub fn failed(&self) -> Result<Vec<ActionRecord>, HoldoffError> {
        self.query(
            &format!(
                "{} WHERE status = 'failed' ORDER BY applies_at ASC, id ASC",
                SELECT_COLUMNS
            ),
            rusqlite::params![],
        )
    }

    pub fn pending_count(&self) -> Result<u64, HoldoffError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM pending_changes WHERE status = 'pending'",
                    [],
                    |row| row.get(0),
                )
                .map_err(|e| HoldoffError::Storage(e.to_string()))?;
            Ok(u64::try_from(count).unwrap_or_default())
        })
    }

    /// The pending record that becomes ready first.
    pub fn next_pending(&self) -> Result<Option<ActionRecord>, HoldoffError> {
        let sql = format!(
            "{} WHERE status = 'pending' ORDER BY applies_at ASC, id ASC LIMIT 1",
            SELECT_COLUMNS
        );
        Ok(self.query(&sql, rusqlite::params![])?.into_iter().next())
    }

    fn query(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<ActionRecord>, HoldoffError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(sql)
                .map_err(|e| HoldoffError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(params, |row| Ok(row_to_record(row)))
                .map_err(|e| HoldoffError::Storage(e.to_string()))?;

            let mut records = Vec::new();
            for row in rows {
                let record = row.map_err(|e| HoldoffError::Storage(e.to_string()))??;
                records.push(record);
            }
            Ok(records)
        })
    }
}

fn row_to_record(row: &Row<'_>) -> Result<ActionRecord, HoldoffError> {
    let get_err = |e: rusqlite::Error| HoldoffError::Storage(e.to_string());

    let status: String = row.get(6).map_err(get_err)?;
    let status = status
        .parse::<ActionStatus>()
        .map_err(HoldoffError::Storage)?;

    Ok(ActionRecord {
        id: ActionId(row.get(0).map_err(get_err)?),
        action_type: row.get(1).map_err(get_err)?,
        payload: row.get(2).map_err(get_err)?,
        description: row.get(3).map_err(get_err)?,
        queued_at: Timestamp(row.get(4).map_err(get_err)?),
        applies_at: Timestamp(row.get(5).map_err(get_err)?),
        status,
    })
}
