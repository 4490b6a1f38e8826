//! Action handler trait and the built-in handlers.
//!
//! A handler turns the decoded parameters of one action type back into a
//! live call. [`ActionDispatcher`](crate::dispatcher::ActionDispatcher)
//! keys handlers by [`ActionHandler::action_type`].

pub mod command;
pub mod delay;

use async_trait::async_trait;

use crate::codec::Params;
use crate::error::ActionError;

pub use command::CommandHandler;
pub use delay::{DisableDelayHandler, SetDelayDurationHandler};

/// Executes one persisted action type.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Tag this handler is registered under.
    fn action_type(&self) -> &str;

    /// Perform the action. Any error marks the record failed.
    async fn execute(&self, params: &Params) -> Result<(), ActionError>;

    /// Summary for display, built from the same parameters.
    fn describe(&self, params: &Params) -> String;
}
