//! Handler that replays a [`PolicyCommand`] against the real gateway.

use std::sync::Arc;

use async_trait::async_trait;

use crate::codec::Params;
use crate::command::PolicyCommand;
use crate::error::ActionError;
use crate::gateway::ManagementGateway;
use crate::handler::ActionHandler;

/// One instance per command tag, all sharing the same gateway.
///
/// The gateway must be the undecorated one: replaying through an
/// intercepting gateway would queue the action again.
pub struct CommandHandler {
    tag: &'static str,
    gateway: Arc<dyn ManagementGateway>,
}

impl CommandHandler {
    pub fn new(tag: &'static str, gateway: Arc<dyn ManagementGateway>) -> Self {
        Self { tag, gateway }
    }

    /// A handler for every tag in [`PolicyCommand::TAGS`].
    pub fn all(gateway: Arc<dyn ManagementGateway>) -> Vec<Self> {
        PolicyCommand::TAGS
            .into_iter()
            .map(|tag| Self::new(tag, Arc::clone(&gateway)))
            .collect()
    }
}

#[async_trait]
impl ActionHandler for CommandHandler {
    fn action_type(&self) -> &str {
        self.tag
    }

    async fn execute(&self, params: &Params) -> Result<(), ActionError> {
        let command = PolicyCommand::decode(self.tag, params)?;
        tracing::debug!(command = %command, "Replaying deferred command");
        self.gateway.apply(command).await?;
        Ok(())
    }

    fn describe(&self, params: &Params) -> String {
        PolicyCommand::decode(self.tag, params)
            .map(|c| c.describe())
            .unwrap_or_else(|_| self.tag.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Param;
    use crate::error::{CodecError, GatewayError};
    use crate::gateway::SimulatedGateway;

    fn handler(tag: &'static str) -> (CommandHandler, Arc<SimulatedGateway>) {
        let gateway = Arc::new(SimulatedGateway::new());
        (CommandHandler::new(tag, gateway.clone()), gateway)
    }

    #[tokio::test]
    async fn test_execute_applies_command() {
        let (handler, gateway) = handler("setCameraDisabled");
        let params = Params::new(vec![Param::Bool(true)]);
        handler.execute(&params).await.unwrap();

        assert_eq!(gateway.calls(), vec![PolicyCommand::SetCameraDisabled(true)]);
        assert!(gateway.state().camera_disabled);
    }

    #[tokio::test]
    async fn test_execute_surfaces_gateway_rejection() {
        let (handler, gateway) = handler("lockNow");
        gateway.reject("lockNow", "screen lock unavailable");

        let err = handler.execute(&Params::default()).await.unwrap_err();
        assert!(matches!(
            err,
            ActionError::Gateway(GatewayError::Rejected { .. })
        ));
    }

    #[tokio::test]
    async fn test_execute_bad_params() {
        let (handler, gateway) = handler("setCameraDisabled");
        let params = Params::new(vec![Param::Str("yes".to_string())]);

        let err = handler.execute(&params).await.unwrap_err();
        assert!(matches!(
            err,
            ActionError::Codec(CodecError::TypeMismatch { index: 0, .. })
        ));
        assert!(gateway.calls().is_empty());
    }

    #[test]
    fn test_describe() {
        let (handler, _) = handler("setCameraDisabled");
        assert_eq!(
            handler.describe(&Params::new(vec![Param::Bool(true)])),
            "Disable camera"
        );
        assert_eq!(handler.describe(&Params::default()), "setCameraDisabled");
    }

    #[test]
    fn test_all_covers_every_tag() {
        let gateway: Arc<dyn ManagementGateway> = Arc::new(SimulatedGateway::new());
        let handlers = CommandHandler::all(gateway);
        assert_eq!(handlers.len(), PolicyCommand::TAGS.len());
        assert!(handlers.iter().any(|h| h.action_type() == "wipeData"));
    }
}
