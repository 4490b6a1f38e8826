use serde::{Deserialize, Serialize};

use crate::types::{ActionId, DelayPolicy, Timestamp};

/// Domain events published by the delay coordinator.
///
/// Consumed by observers through a broadcast channel; a lagging observer
/// misses events but can always re-read the pending snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DelayEvent {
    /// A mutating call was persisted for later application.
    Queued {
        id: ActionId,
        action_type: String,
        applies_at: Timestamp,
        timestamp: Timestamp,
    },

    /// A pending or failed record was removed by the user.
    Cancelled { id: ActionId, timestamp: Timestamp },

    /// A ready record was applied and deleted.
    Applied {
        id: ActionId,
        action_type: String,
        timestamp: Timestamp,
    },

    /// A ready record could not be applied and is now terminal.
    Failed {
        id: ActionId,
        action_type: String,
        timestamp: Timestamp,
    },

    /// The enabled flag or the configured duration changed.
    PolicyChanged {
        policy: DelayPolicy,
        timestamp: Timestamp,
    },
}

impl DelayEvent {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            DelayEvent::Queued { timestamp, .. }
            | DelayEvent::Cancelled { timestamp, .. }
            | DelayEvent::Applied { timestamp, .. }
            | DelayEvent::Failed { timestamp, .. }
            | DelayEvent::PolicyChanged { timestamp, .. } => *timestamp,
        }
    }

    /// Short event name used in log lines.
    pub fn event_name(&self) -> &'static str {
        match self {
            DelayEvent::Queued { .. } => "action_queued",
            DelayEvent::Cancelled { .. } => "action_cancelled",
            DelayEvent::Applied { .. } => "action_applied",
            DelayEvent::Failed { .. } => "action_failed",
            DelayEvent::PolicyChanged { .. } => "policy_changed",
        }
    }

    /// The record this event refers to, if any.
    pub fn action_id(&self) -> Option<ActionId> {
        match self {
            DelayEvent::Queued { id, .. }
            | DelayEvent::Cancelled { id, .. }
            | DelayEvent::Applied { id, .. }
            | DelayEvent::Failed { id, .. } => Some(*id),
            DelayEvent::PolicyChanged { .. } => None,
        }
    }
}
