//! Transport seam.
//!
//! The transport actually talking to the external service (connection
//! management, rate-limit backoff) lives outside this crate; the dispatcher
//! only needs a send primitive. Any non-`Delivered` outcome is a send
//! failure subject to the retry policy.

use async_trait::async_trait;
use tracing::info;

use courier_core::types::{Action, SendOutcome};

use crate::error::DispatchError;

/// Send primitive for handing actions to the external service.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, action: &Action) -> Result<SendOutcome, DispatchError>;
}

/// Transport that logs the command instead of sending it.
///
/// Useful for dry runs and as the default wiring before a real transport
/// is configured.
#[derive(Debug, Clone, Default)]
pub struct LoggingTransport;

#[async_trait]
impl Transport for LoggingTransport {
    async fn send(&self, action: &Action) -> Result<SendOutcome, DispatchError> {
        info!(
            identity = %action.identity,
            command = %action.command(),
            "Dry-run send"
        );
        Ok(SendOutcome::Delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_logging_transport_delivers() {
        let transport = LoggingTransport;
        let action = Action::new("hunt", "hunt");
        let outcome = transport.send(&action).await.unwrap();
        assert_eq!(outcome, SendOutcome::Delivered);
    }
}
