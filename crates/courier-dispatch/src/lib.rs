//! Courier dispatch engine.
//!
//! A queue-driven scheduler that sends one action at a time over a
//! transport, records an expectation of external confirmation in a
//! verification ledger, and reconciles the ledger on a fixed tick,
//! re-queuing unconfirmed actions under a retry budget.

pub mod dispatcher;
pub mod error;
pub mod pacing;
pub mod state;
pub mod transport;

pub use dispatcher::Dispatcher;
pub use error::DispatchError;
pub use pacing::{FixedPacing, NoPacing, PacingSource};
pub use state::{DispatchState, EnqueueOutcome, LedgerEntry};
pub use transport::{LoggingTransport, Transport};
