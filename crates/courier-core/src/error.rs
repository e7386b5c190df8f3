use thiserror::Error;

/// Top-level error type for the Courier system.
///
/// Each variant wraps a subsystem-specific failure. Subsystem crates define
/// their own error types and implement `From<SubsystemError> for CourierError`
/// so that the `?` operator works seamlessly across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CourierError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl From<toml::de::Error> for CourierError {
    fn from(err: toml::de::Error) -> Self {
        CourierError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for CourierError {
    fn from(err: toml::ser::Error) -> Self {
        CourierError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for CourierError {
    fn from(err: serde_json::Error) -> Self {
        CourierError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Courier operations.
pub type Result<T> = std::result::Result<T, CourierError>;
