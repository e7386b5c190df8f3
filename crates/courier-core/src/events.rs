use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dispatch lifecycle events.
///
/// Emitted by the dispatcher after state changes and consumed by:
/// - Structured logging (every event is also traced)
/// - Optional subscribers on the broadcast channel (metrics, dashboards)
///
/// Only `RetryBudgetExhausted` carries a failure a producer might care
/// about; everything else is informational. Producers never receive these
/// as errors.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DispatchEvent {
    /// An action was handed to the transport and accepted.
    ActionSent {
        action_id: Uuid,
        identity: String,
        retry_count: u32,
        timestamp: DateTime<Utc>,
    },

    /// An external confirmation matched a pending ledger entry.
    ActionConfirmed {
        action_id: Uuid,
        identity: String,
        timestamp: DateTime<Utc>,
    },

    /// An unconfirmed or failed action re-entered the queue.
    ActionRequeued {
        action_id: Uuid,
        identity: String,
        retry_count: u32,
        timestamp: DateTime<Utc>,
    },

    /// An action exhausted its retry budget and was dropped.
    RetryBudgetExhausted {
        action_id: Uuid,
        identity: String,
        retries: u32,
        timestamp: DateTime<Utc>,
    },

    /// An action was dropped for a terminal, non-budget reason
    /// (cancellation or a fatal failure signal).
    ActionDropped {
        action_id: Uuid,
        identity: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl DispatchEvent {
    /// Returns the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            DispatchEvent::ActionSent { timestamp, .. }
            | DispatchEvent::ActionConfirmed { timestamp, .. }
            | DispatchEvent::ActionRequeued { timestamp, .. }
            | DispatchEvent::RetryBudgetExhausted { timestamp, .. }
            | DispatchEvent::ActionDropped { timestamp, .. } => *timestamp,
        }
    }

    /// Returns a human-readable event name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            DispatchEvent::ActionSent { .. } => "action_sent",
            DispatchEvent::ActionConfirmed { .. } => "action_confirmed",
            DispatchEvent::ActionRequeued { .. } => "action_requeued",
            DispatchEvent::RetryBudgetExhausted { .. } => "retry_budget_exhausted",
            DispatchEvent::ActionDropped { .. } => "action_dropped",
        }
    }

    /// The identity of the action the event refers to.
    pub fn identity(&self) -> &str {
        match self {
            DispatchEvent::ActionSent { identity, .. }
            | DispatchEvent::ActionConfirmed { identity, .. }
            | DispatchEvent::ActionRequeued { identity, .. }
            | DispatchEvent::RetryBudgetExhausted { identity, .. }
            | DispatchEvent::ActionDropped { identity, .. } => identity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_timestamp() {
        let ts = Utc::now();
        let event = DispatchEvent::ActionSent {
            action_id: Uuid::new_v4(),
            identity: "hunt".into(),
            retry_count: 0,
            timestamp: ts,
        };
        assert_eq!(event.timestamp(), ts);
    }

    #[test]
    fn test_event_name() {
        let event = DispatchEvent::RetryBudgetExhausted {
            action_id: Uuid::new_v4(),
            identity: "slots".into(),
            retries: 5,
            timestamp: Utc::now(),
        };
        assert_eq!(event.event_name(), "retry_budget_exhausted");
    }

    #[test]
    fn test_event_identity() {
        let event = DispatchEvent::ActionDropped {
            action_id: Uuid::new_v4(),
            identity: "battle".into(),
            reason: "cancelled".into(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.identity(), "battle");
    }

    #[test]
    fn test_event_serialization() {
        let event = DispatchEvent::ActionConfirmed {
            action_id: Uuid::new_v4(),
            identity: "hunt".into(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("ActionConfirmed"));
    }
}
