use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Pacing class handed to the `PacingSource` when throttling sends.
///
/// The dispatcher never inspects how a delay is computed; the class is an
/// opaque label describing the kind of traffic the action generates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacingClass {
    /// Ordinary command traffic (default).
    #[default]
    Command,
    /// Read-only lookups against the external service.
    Lookup,
    /// Tightly spaced traffic allowed a shorter delay.
    Burst,
}

impl std::fmt::Display for PacingClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PacingClass::Command => "command",
            PacingClass::Lookup => "lookup",
            PacingClass::Burst => "burst",
        };
        write!(f, "{}", s)
    }
}

/// Result of handing an action to the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendOutcome {
    /// The external service accepted the command.
    Delivered,
    /// The transport declined the command (treated as a send failure).
    Rejected,
}

/// Classification of an explicit failure signal for an in-flight action.
///
/// Delivered by the confirmation-feed collaborator via `Dispatcher::fail`.
/// The classification decides whether the action is re-queued under the
/// retry budget or dropped immediately.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Transient failure; the action may succeed if resent.
    Transient,
    /// The external service throttled the command; resend later.
    Throttled,
    /// The command was rejected outright; retrying cannot help.
    Fatal,
}

impl FailureReason {
    /// Whether an action failed for this reason should re-enter the queue.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FailureReason::Fatal)
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureReason::Transient => "transient",
            FailureReason::Throttled => "throttled",
            FailureReason::Fatal => "fatal",
        };
        write!(f, "{}", s)
    }
}

// =============================================================================
// Action
// =============================================================================

/// A unit of work to send to the external interactive service.
///
/// Lifecycle: `Queued -> Sent -> PendingVerification -> {Confirmed |
/// Retrying -> Queued | Dropped}`. Actions that do not require verification
/// go terminal immediately after a successful send.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Action {
    /// Per-instance id, used for logging only.
    pub id: Uuid,
    /// Identifier of the operation to perform (e.g. "hunt").
    pub name: String,
    /// Optional payload appended to the command.
    pub arguments: Option<String>,
    /// Whether an external confirmation is expected after sending.
    pub requires_verification: bool,
    /// De-duplication key: at most one live action per identity may be
    /// queued or pending verification at any time.
    pub identity: String,
    /// Incremented on each re-queue; the action is dropped once it would
    /// exceed the configured maximum.
    pub retry_count: u32,
    /// Set by external logic to request silent removal at the next
    /// checkpoint (pre-send check or reconcile pass).
    pub cancelled: bool,
    /// Urgent retries re-enter at the front of the queue.
    pub urgent: bool,
    /// Pacing class for throttling the send that follows this one.
    pub pacing: PacingClass,
    pub created_at: DateTime<Utc>,
}

impl Action {
    /// Create an action with the given operation name and identity.
    ///
    /// Defaults: no arguments, no verification, normal priority,
    /// `PacingClass::Command`.
    pub fn new(name: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            arguments: None,
            requires_verification: false,
            identity: identity.into(),
            retry_count: 0,
            cancelled: false,
            urgent: false,
            pacing: PacingClass::Command,
            created_at: Utc::now(),
        }
    }

    /// Attach an argument payload.
    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = Some(arguments.into());
        self
    }

    /// Mark this action as requiring external confirmation.
    pub fn with_verification(mut self) -> Self {
        self.requires_verification = true;
        self
    }

    /// Mark this action as urgent (retries re-enter at the queue front).
    pub fn with_urgent(mut self) -> Self {
        self.urgent = true;
        self
    }

    /// Set the pacing class.
    pub fn with_pacing(mut self, pacing: PacingClass) -> Self {
        self.pacing = pacing;
        self
    }

    /// The full command string sent over the transport.
    pub fn command(&self) -> String {
        match &self.arguments {
            Some(args) => format!("{} {}", self.name, args),
            None => self.name.clone(),
        }
    }
}
