//! Maps a persisted action back to a live invocation.
//!
//! Handlers are looked up by the record's `action_type`. Every failure
//! (unknown tag, malformed payload, gateway error, handler panic) reduces
//! to `false` from [`ActionDispatcher::execute`]; the detail goes to the log.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use holdoff_core::types::ActionRecord;

use crate::codec;
use crate::coordinator::DelayCoordinator;
use crate::error::ActionError;
use crate::gateway::ManagementGateway;
use crate::handler::{ActionHandler, CommandHandler, DisableDelayHandler, SetDelayDurationHandler};

/// Registry of [`ActionHandler`]s keyed by action type.
#[derive(Default)]
pub struct ActionDispatcher {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handlers for every gateway command plus the delay policy actions.
    ///
    /// `gateway` must be the real gateway, not an intercepting one.
    pub fn with_defaults(
        gateway: Arc<dyn ManagementGateway>,
        coordinator: DelayCoordinator,
    ) -> Self {
        let mut dispatcher = Self::new();
        for handler in CommandHandler::all(gateway) {
            dispatcher.register(Arc::new(handler));
        }
        dispatcher.register(Arc::new(DisableDelayHandler::new(coordinator.clone())));
        dispatcher.register(Arc::new(SetDelayDurationHandler::new(coordinator)));
        dispatcher
    }

    /// Register a handler, replacing any previous one for the same type.
    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) {
        let action_type = handler.action_type().to_string();
        if self
            .handlers
            .insert(action_type.clone(), handler)
            .is_some()
        {
            debug!(action_type = %action_type, "Replaced action handler");
        }
    }

    pub fn handler(&self, action_type: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(action_type).cloned()
    }

    /// Registered action types, sorted.
    pub fn action_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Describe an action as its handler would, if the payload decodes.
    pub fn describe(&self, action_type: &str, payload: &str) -> Option<String> {
        let handler = self.handlers.get(action_type)?;
        let params = codec::decode(payload).ok()?;
        Some(handler.describe(&params))
    }

    /// Run the record's handler and return the detailed outcome.
    ///
    /// The handler runs on its own task so a panic is reported as
    /// [`ActionError::HandlerPanicked`] instead of unwinding into the caller.
    pub async fn try_execute(&self, record: &ActionRecord) -> Result<(), ActionError> {
        let handler = self
            .handler(&record.action_type)
            .ok_or_else(|| ActionError::UnknownAction(record.action_type.clone()))?;
        let params = codec::decode(&record.payload)?;

        tokio::spawn(async move { handler.execute(&params).await })
            .await
            .map_err(|e| ActionError::HandlerPanicked(e.to_string()))?
    }

    /// Apply `record`. Returns whether it succeeded.
    pub async fn execute(&self, record: &ActionRecord) -> bool {
        match self.try_execute(record).await {
            Ok(()) => {
                info!(
                    id = %record.id,
                    action_type = %record.action_type,
                    "Applied deferred action"
                );
                true
            }
            Err(ActionError::UnknownAction(action_type)) => {
                warn!(
                    id = %record.id,
                    action_type = %action_type,
                    "No handler for action type"
                );
                false
            }
            Err(e) => {
                warn!(
                    id = %record.id,
                    action_type = %record.action_type,
                    error = %e,
                    "Deferred action failed"
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for ActionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDispatcher")
            .field("action_types", &self.action_types())
            .finish()
    }
}
