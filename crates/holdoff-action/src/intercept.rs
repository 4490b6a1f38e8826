//! Gateway decorator that routes mutating calls through the delay policy.
//!
//! Queries always reach the wrapped gateway. A command is forwarded as-is
//! while the delay is off; while it is on, the command is encoded and
//! queued, and the caller sees success as soon as the record is stored.
//! A later failure of the queued command shows up only in the failed list
//! and the coordinator's events.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use holdoff_core::types::{ActionId, Timestamp};

use crate::command::PolicyCommand;
use crate::coordinator::DelayCoordinator;
use crate::error::GatewayError;
use crate::gateway::{ManagementGateway, PolicyQuery, QueryValue};

/// What [`InterceptingGateway::submit`] did with a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Forwarded to the wrapped gateway, which accepted it.
    Applied,
    /// Stored for later; the wrapped gateway has not seen it yet.
    Queued { id: ActionId, applies_at: Timestamp },
}

pub struct InterceptingGateway {
    inner: Arc<dyn ManagementGateway>,
    coordinator: DelayCoordinator,
}

impl InterceptingGateway {
    pub fn new(inner: Arc<dyn ManagementGateway>, coordinator: DelayCoordinator) -> Self {
        Self { inner, coordinator }
    }

    pub fn coordinator(&self) -> &DelayCoordinator {
        &self.coordinator
    }

    /// Forward or queue `command` depending on the delay policy.
    pub async fn submit(&self, command: PolicyCommand) -> Result<Submission, GatewayError> {
        let tag = command.tag();
        let payload = command.encode().map_err(|e| {
            warn!(action_type = tag, error = %e, "Failed to encode command");
            GatewayError::QueueFailed(tag.to_string())
        })?;
        let queued = self
            .coordinator
            .queue_if_enabled(tag, &payload, &command.describe())
            .await
            .map_err(|e| {
                warn!(action_type = tag, error = %e, "Failed to queue command");
                GatewayError::QueueFailed(tag.to_string())
            })?;

        match queued {
            Some(record) => Ok(Submission::Queued {
                id: record.id,
                applies_at: record.applies_at,
            }),
            None => {
                debug!(command = %command, "Delay off, forwarding");
                self.inner.apply(command).await?;
                Ok(Submission::Applied)
            }
        }
    }
}

#[async_trait]
impl ManagementGateway for InterceptingGateway {
    async fn query(&self, query: PolicyQuery) -> Result<QueryValue, GatewayError> {
        self.inner.query(query).await
    }

    /// `Ok(())` means applied or accepted for later.
    async fn apply(&self, command: PolicyCommand) -> Result<(), GatewayError> {
        self.submit(command).await.map(|_| ())
    }
}
