use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HoldoffError;

// =============================================================================
// Enums
// =============================================================================

/// Lifecycle status of a persisted action.
///
/// `applying` and `completed` are never stored: a record is deleted once it
/// has been applied successfully, so only these two states are durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Failed,
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionStatus::Pending => write!(f, "pending"),
            ActionStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ActionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ActionStatus::Pending),
            "failed" => Ok(ActionStatus::Failed),
            _ => Err(format!("Unknown action status: {}", s)),
        }
    }
}

/// Unit of the configured delay duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationUnit {
    Seconds,
    Minutes,
    #[default]
    Hours,
}

impl DurationUnit {
    /// Milliseconds in one unit.
    pub fn millis(&self) -> i64 {
        match self {
            DurationUnit::Seconds => 1_000,
            DurationUnit::Minutes => 60 * 1_000,
            DurationUnit::Hours => 60 * 60 * 1_000,
        }
    }
}

impl fmt::Display for DurationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DurationUnit::Seconds => write!(f, "seconds"),
            DurationUnit::Minutes => write!(f, "minutes"),
            DurationUnit::Hours => write!(f, "hours"),
        }
    }
}

impl std::str::FromStr for DurationUnit {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s" | "sec" | "second" | "seconds" => Ok(DurationUnit::Seconds),
            "m" | "min" | "minute" | "minutes" => Ok(DurationUnit::Minutes),
            "h" | "hour" | "hours" => Ok(DurationUnit::Hours),
            _ => Err(format!("Unknown duration unit: {}", s)),
        }
    }
}

// =============================================================================
// Newtype Wrappers
// =============================================================================

/// Milliseconds since the UNIX epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_millis())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.0).unwrap_or_default()
    }

    /// This timestamp shifted forward by `millis`.
    pub fn plus_millis(&self, millis: i64) -> Self {
        Self(self.0.saturating_add(millis))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

/// Store-assigned identity of a persisted action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActionId(pub i64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Domain Structs
// =============================================================================

/// A deferred administrative call as it is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: ActionId,
    pub action_type: String,
    pub payload: String,
    pub description: String,
    pub queued_at: Timestamp,
    pub applies_at: Timestamp,
    pub status: ActionStatus,
}

impl ActionRecord {
    /// Milliseconds left until the record becomes ready, never negative.
    pub fn remaining_millis(&self, now: Timestamp) -> i64 {
        (self.applies_at.0 - now.0).max(0)
    }

    pub fn is_ready(&self, now: Timestamp) -> bool {
        self.status == ActionStatus::Pending && now >= self.applies_at
    }
}

/// An action that has not been inserted yet. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAction {
    pub action_type: String,
    pub payload: String,
    pub description: String,
    pub queued_at: Timestamp,
    pub applies_at: Timestamp,
}

impl NewAction {
    /// Build a pending action whose `applies_at` is `queued_at + delay_millis`.
    pub fn new(
        action_type: impl Into<String>,
        payload: impl Into<String>,
        description: impl Into<String>,
        queued_at: Timestamp,
        delay_millis: i64,
    ) -> Self {
        Self {
            action_type: action_type.into(),
            payload: payload.into(),
            description: description.into(),
            queued_at,
            applies_at: queued_at.plus_millis(delay_millis.max(0)),
        }
    }
}

/// Whether mutating calls are deferred, and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayPolicy {
    pub enabled: bool,
    pub duration_value: u32,
    pub duration_unit: DurationUnit,
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            duration_value: 1,
            duration_unit: DurationUnit::Hours,
        }
    }
}

impl DelayPolicy {
    /// The configured delay in milliseconds.
    pub fn delay_millis(&self) -> i64 {
        i64::from(self.duration_value) * self.duration_unit.millis()
    }

    /// Reject a zero duration.
    pub fn validate(&self) -> crate::error::Result<()> {
        validate_duration(self.duration_value)
    }

    /// Human-readable duration, singular when the value is 1 ("1 hour").
    pub fn display_duration(&self) -> String {
        let unit = self.duration_unit.to_string();
        if self.duration_value == 1 {
            format!("1 {}", unit.trim_end_matches('s'))
        } else {
            format!("{} {}", self.duration_value, unit)
        }
    }
}

/// Check the `duration_value > 0` invariant.
pub fn validate_duration(value: u32) -> crate::error::Result<()> {
    if value == 0 {
        return Err(HoldoffError::InvalidPolicy(
            "duration value must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Ordered view of the pending queue handed to observers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSnapshot {
    /// Pending records ordered by `applies_at`.
    pub records: Vec<ActionRecord>,
    /// Soonest `applies_at` among the pending records.
    pub next_deadline: Option<Timestamp>,
}

impl PendingSnapshot {
    pub fn from_records(records: Vec<ActionRecord>) -> Self {
        let next_deadline = records.iter().map(|r| r.applies_at).min();
        Self {
            records,
            next_deadline,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Compact remaining-time label: "45s", "12m", "3h 5m".
pub fn format_remaining(millis: i64) -> String {
    let seconds = millis.max(0) / 1000;
    if seconds < 60 {
        return format!("{}s", seconds);
    }
    let minutes = seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }
    format!("{}h {}m", minutes / 60, minutes % 60)
}
