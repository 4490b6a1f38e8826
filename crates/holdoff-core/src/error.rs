use thiserror::Error;

/// Top-level error type for the holdoff workspace.
///
/// Subsystem crates define their own error types and wrap this one via
/// `#[from]` so that `?` works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HoldoffError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid delay policy: {0}")]
    InvalidPolicy(String),

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl From<toml::de::Error> for HoldoffError {
    fn from(err: toml::de::Error) -> Self {
        HoldoffError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for HoldoffError {
    fn from(err: toml::ser::Error) -> Self {
        HoldoffError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for HoldoffError {
    fn from(err: serde_json::Error) -> Self {
        HoldoffError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for holdoff operations.
pub type Result<T> = std::result::Result<T, HoldoffError>;
