//! Error types for the deferred action engine.

use holdoff_core::error::HoldoffError;

/// Errors from encoding, decoding or reading action parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("Malformed payload: {0}")]
    Malformed(String),
    #[error("Parameter index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Parameter {index}: expected {expected}, found {found}")]
    TypeMismatch {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },
    #[error("Parameter {index}: value {value} does not fit in a 32-bit integer")]
    Overflow { index: usize, value: i64 },
    #[error("Failed to encode parameters: {0}")]
    Encode(String),
}

/// Errors reported by a management gateway.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("{action} rejected: {reason}")]
    Rejected { action: String, reason: String },
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
    #[error("Failed to queue {0}")]
    QueueFailed(String),
    #[error("Unexpected gateway response: {0}")]
    InvalidResponse(String),
}

/// Errors from dispatching a persisted action.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("Unknown action type: {0}")]
    UnknownAction(String),
    #[error("Action handler panicked: {0}")]
    HandlerPanicked(String),
    #[error("Storage error: {0}")]
    Storage(#[from] HoldoffError),
}

/// Errors from the background scheduler lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Scheduler is already running")]
    AlreadyRunning,
    #[error("Scheduler is not running")]
    NotRunning,
    #[error("Scheduler task failed: {0}")]
    Join(String),
}
