//! Handlers for the queued actions that change the delay policy itself.

use async_trait::async_trait;

use holdoff_core::error::HoldoffError;
use holdoff_core::types::{DelayPolicy, DurationUnit};

use crate::codec::Params;
use crate::coordinator::{DelayCoordinator, DISABLE_DELAY, SET_DELAY_DURATION};
use crate::error::ActionError;
use crate::handler::ActionHandler;

/// Applies a queued `disableDelay` by flipping the policy directly, never
/// through a gateway, so it cannot queue itself again.
pub struct DisableDelayHandler {
    coordinator: DelayCoordinator,
}

impl DisableDelayHandler {
    pub fn new(coordinator: DelayCoordinator) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl ActionHandler for DisableDelayHandler {
    fn action_type(&self) -> &str {
        DISABLE_DELAY
    }

    async fn execute(&self, _params: &Params) -> Result<(), ActionError> {
        self.coordinator.disable_now().await?;
        tracing::info!("Delay disabled");
        Ok(())
    }

    fn describe(&self, _params: &Params) -> String {
        "Disable delay".to_string()
    }
}

/// Applies a queued `setDelayDuration` with parameters `[value, unit]`.
pub struct SetDelayDurationHandler {
    coordinator: DelayCoordinator,
}

impl SetDelayDurationHandler {
    pub fn new(coordinator: DelayCoordinator) -> Self {
        Self { coordinator }
    }
}

fn duration_params(params: &Params) -> Result<(u32, DurationUnit), ActionError> {
    let value = params.get_long(0)?;
    let value = u32::try_from(value).map_err(|_| {
        HoldoffError::InvalidPolicy(format!("duration value {} out of range", value))
    })?;
    let unit = params
        .get_string(1)?
        .parse::<DurationUnit>()
        .map_err(HoldoffError::InvalidPolicy)?;
    Ok((value, unit))
}

#[async_trait]
impl ActionHandler for SetDelayDurationHandler {
    fn action_type(&self) -> &str {
        SET_DELAY_DURATION
    }

    async fn execute(&self, params: &Params) -> Result<(), ActionError> {
        let (value, unit) = duration_params(params)?;
        self.coordinator.apply_duration(value, unit).await?;
        tracing::info!(value, unit = %unit, "Delay duration changed");
        Ok(())
    }

    fn describe(&self, params: &Params) -> String {
        match duration_params(params) {
            Ok((duration_value, duration_unit)) => {
                let policy = DelayPolicy {
                    enabled: true,
                    duration_value,
                    duration_unit,
                };
                format!("Set delay duration: {}", policy.display_duration())
            }
            Err(_) => "Set delay duration".to_string(),
        }
    }
}
