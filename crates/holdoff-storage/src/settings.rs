//! Persistent delay policy, stored as rows of the `delay_settings` table.

use std::sync::Arc;

use rusqlite::OptionalExtension;
use tracing::info;

use holdoff_core::error::HoldoffError;
use holdoff_core::types::{DelayPolicy, DurationUnit};

use crate::db::Database;

const KEY_ENABLED: &str = "enabled";
const KEY_DURATION_VALUE: &str = "duration_value";
const KEY_DURATION_UNIT: &str = "duration_unit";

#[derive(Debug, Clone)]
pub struct SettingsStore {
    db: Arc<Database>,
}

impl SettingsStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Read the stored policy, or persist and return `seed` on first run.
    ///
    /// Keys missing from a partially written table fall back to the
    /// matching field of `seed`.
    pub fn load_or_seed(&self, seed: DelayPolicy) -> Result<DelayPolicy, HoldoffError> {
        let enabled = self.read(KEY_ENABLED)?;
        let value = self.read(KEY_DURATION_VALUE)?;
        let unit = self.read(KEY_DURATION_UNIT)?;

        if enabled.is_none() && value.is_none() && unit.is_none() {
            self.save_policy(&seed)?;
            info!(
                enabled = seed.enabled,
                duration = %seed.display_duration(),
                "Seeded delay policy"
            );
            return Ok(seed);
        }

        let policy = DelayPolicy {
            enabled: match enabled {
                Some(raw) => parse_bool(&raw)?,
                None => seed.enabled,
            },
            duration_value: match value {
                Some(raw) => raw.parse::<u32>().map_err(|e| {
                    HoldoffError::Storage(format!("Invalid stored duration value {:?}: {}", raw, e))
                })?,
                None => seed.duration_value,
            },
            duration_unit: match unit {
                Some(raw) => raw
                    .parse::<DurationUnit>()
                    .map_err(HoldoffError::Storage)?,
                None => seed.duration_unit,
            },
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Write every field of the policy in one transaction.
    pub fn save_policy(&self, policy: &DelayPolicy) -> Result<(), HoldoffError> {
        policy.validate()?;
        self.db.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| HoldoffError::Storage(format!("Failed to begin transaction: {}", e)))?;
            for (key, value) in [
                (KEY_ENABLED, policy.enabled.to_string()),
                (KEY_DURATION_VALUE, policy.duration_value.to_string()),
                (KEY_DURATION_UNIT, policy.duration_unit.to_string()),
            ] {
                tx.execute(
                    "INSERT INTO delay_settings (key, value, updated_at)
                     VALUES (?1, ?2, strftime('%s', 'now'))
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                    rusqlite::params![key, value],
                )
                .map_err(|e| HoldoffError::Storage(format!("Failed to save {}: {}", key, e)))?;
            }
            tx.commit()
                .map_err(|e| HoldoffError::Storage(format!("Failed to commit policy: {}", e)))
        })
    }

    fn read(&self, key: &str) -> Result<Option<String>, HoldoffError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM delay_settings WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| HoldoffError::Storage(e.to_string()))
        })
    }
}

fn parse_bool(raw: &str) -> Result<bool, HoldoffError> {
    raw.parse::<bool>()
        .map_err(|e| HoldoffError::Storage(format!("Invalid stored flag {:?}: {}", raw, e)))
}
