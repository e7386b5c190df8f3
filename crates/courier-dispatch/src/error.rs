//! Error types for the dispatch engine.

use courier_core::error::CourierError;

/// Errors from sending an action over the transport.
///
/// Send failures are handled locally by the retry state machine and never
/// propagate to producers; this type exists for the `Transport` seam and
/// for logging.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Transport send failed: {0}")]
    Transport(String),
    #[error("Dispatcher is shutting down")]
    ShuttingDown,
}

impl From<DispatchError> for CourierError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Transport(msg) => CourierError::Transport(msg),
            DispatchError::ShuttingDown => CourierError::ShuttingDown,
        }
    }
}
