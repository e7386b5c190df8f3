//! The dispatch engine.
//!
//! Two cooperating loops share one `DispatchState`:
//!
//! - `run` pops actions off the queue one at a time, hands them to the
//!   transport, records verification-bearing sends in the ledger and
//!   observes the pacing delay between sends.
//! - `reconcile` ticks on a fixed interval, re-queuing pending entries
//!   whose verification deadline has passed and dropping those that have
//!   exhausted their retry budget.
//!
//! Producers interact through `enqueue`, `cancel`, `confirm` and `fail`;
//! none of those block on I/O and none return transport errors. Lifecycle
//! events go out on a broadcast channel and are mirrored into tracing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{broadcast, Notify};
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use courier_core::config::DispatchConfig;
use courier_core::events::DispatchEvent;
use courier_core::types::{Action, FailureReason, SendOutcome};

use crate::pacing::PacingSource;
use crate::state::{DispatchState, EnqueueOutcome};
use crate::transport::Transport;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Poll interval while paused, kept short so resume is prompt.
const PAUSE_POLL: Duration = Duration::from_millis(200);

/// Queue-driven action dispatcher with a verification ledger.
pub struct Dispatcher {
    state: Mutex<DispatchState>,
    transport: Arc<dyn Transport>,
    pacing: Arc<dyn PacingSource>,
    config: DispatchConfig,
    /// Wakes the send loop when work arrives on an empty queue.
    wake: Notify,
    shutdown: Notify,
    stopped: AtomicBool,
    paused: AtomicBool,
    events: broadcast::Sender<DispatchEvent>,
}

impl Dispatcher {
    pub fn new(
        config: DispatchConfig,
        transport: Arc<dyn Transport>,
        pacing: Arc<dyn PacingSource>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(DispatchState::new()),
            transport,
            pacing,
            config,
            wake: Notify::new(),
            shutdown: Notify::new(),
            stopped: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            events,
        }
    }

    /// Subscribe to dispatch lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.events.subscribe()
    }

    /// Hand a fresh action to the dispatcher.
    ///
    /// Verification-bearing actions are de-duplicated by identity; the
    /// returned outcome says whether the action queued, replaced a queued
    /// duplicate, or was dropped because the identity is already awaiting
    /// verification.
    pub fn enqueue(&self, action: Action) -> EnqueueOutcome {
        let identity = action.identity.clone();
        let outcome = self.locked().enqueue_new(action);
        match outcome {
            EnqueueOutcome::Queued => {
                debug!(%identity, "Action queued");
                self.wake.notify_one();
            }
            EnqueueOutcome::Replaced => {
                debug!(%identity, "Queued duplicate replaced");
                self.wake.notify_one();
            }
            EnqueueOutcome::DroppedPending => {
                debug!(%identity, "Dropped: identity awaiting verification");
            }
        }
        outcome
    }

    /// Flag every live instance of `identity` for silent removal.
    ///
    /// Queued instances are discarded at the pre-send check; pending ones
    /// at the next reconcile pass. Returns the number of instances flagged.
    pub fn cancel(&self, identity: &str) -> usize {
        let flagged = self.locked().cancel(identity);
        if flagged > 0 {
            info!(%identity, flagged, "Cancellation requested");
        }
        flagged
    }

    /// Settle a pending entry on external confirmation.
    ///
    /// Returns false when nothing was pending under that identity; a late
    /// confirmation for an already-reconciled entry is harmless.
    pub fn confirm(&self, identity: &str) -> bool {
        let confirmed = self.locked().confirm(identity);
        match confirmed {
            Some(action) => {
                self.emit(DispatchEvent::ActionConfirmed {
                    action_id: action.id,
                    identity: action.identity,
                    timestamp: Utc::now(),
                });
                true
            }
            None => {
                debug!(%identity, "Confirmation with no pending entry");
                false
            }
        }
    }

    /// Report an explicit failure signal for a pending entry.
    ///
    /// Retryable failures re-queue the action under the retry budget;
    /// fatal ones drop it. Returns false when nothing was pending.
    pub fn fail(&self, identity: &str, reason: FailureReason) -> bool {
        let taken = self.locked().take_pending(identity);
        let Some(action) = taken else {
            debug!(%identity, %reason, "Failure signal with no pending entry");
            return false;
        };
        if action.cancelled {
            self.drop_action(action, "cancelled");
        } else if reason.is_retryable() {
            warn!(%identity, %reason, "Pending action failed; re-queuing");
            self.requeue_or_drop(action);
        } else {
            warn!(%identity, %reason, "Pending action failed fatally");
            self.drop_action(action, &reason.to_string());
        }
        true
    }

    /// Suspend sending. Pending entries accrue pause credit so their
    /// verification deadlines do not burn down while paused.
    pub fn pause(&self) {
        if !self.paused.swap(true, Ordering::SeqCst) {
            info!("Dispatcher paused");
        }
    }

    /// Resume sending.
    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::SeqCst) {
            info!("Dispatcher resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Stop both loops. An in-flight send completes first; nothing further
    /// is dequeued.
    pub fn shutdown(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            info!("Dispatcher shutting down");
            self.shutdown.notify_waiters();
            // notify_waiters stores no permit; a permit-storing wake makes
            // the empty-queue wait re-check the stopped flag even when the
            // waiter has not registered yet.
            self.wake.notify_one();
        }
    }

    pub fn queue_len(&self) -> usize {
        self.locked().queue_len()
    }

    pub fn ledger_len(&self) -> usize {
        self.locked().ledger_len()
    }

    pub fn is_idle(&self) -> bool {
        self.locked().is_idle()
    }

    /// The send loop. Runs until `shutdown`.
    pub async fn run(&self) {
        info!("Dispatch loop started");
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }
            if self.paused.load(Ordering::SeqCst) {
                tokio::select! {
                    _ = sleep(PAUSE_POLL) => {}
                    _ = self.shutdown.notified() => {}
                }
                continue;
            }

            let (dropped, next) = self.locked().pop_sendable();
            for action in dropped {
                self.drop_action(action, "cancelled");
            }
            let Some(action) = next else {
                tokio::select! {
                    _ = self.wake.notified() => {}
                    _ = self.shutdown.notified() => {}
                }
                continue;
            };

            let pacing_class = action.pacing;
            match self.transport.send(&action).await {
                Ok(SendOutcome::Delivered) => {
                    self.emit(DispatchEvent::ActionSent {
                        action_id: action.id,
                        identity: action.identity.clone(),
                        retry_count: action.retry_count,
                        timestamp: Utc::now(),
                    });
                    if action.requires_verification {
                        self.locked().ledger_insert(action);
                    }
                }
                Ok(SendOutcome::Rejected) => {
                    warn!(identity = %action.identity, "Transport rejected send");
                    self.requeue_or_drop(action);
                }
                Err(e) => {
                    warn!(identity = %action.identity, error = %e, "Send failed");
                    self.requeue_or_drop(action);
                }
            }

            let delay = self.pacing.next_delay(pacing_class);
            if !delay.is_zero() {
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = self.shutdown.notified() => {}
                }
            }
        }
        info!("Dispatch loop stopped");
    }

    /// The ledger reconciliation loop. Runs until `shutdown`.
    pub async fn reconcile(&self) {
        let tick_secs = self.config.reconcile_tick_secs.max(1);
        let mut tick = interval(Duration::from_secs(tick_secs));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let deadline = chrono::Duration::seconds(self.config.verification_deadline_secs as i64);
        let credit = chrono::Duration::seconds(tick_secs as i64);

        info!("Reconcile loop started");
        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = self.shutdown.notified() => break,
            }
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }

            // Cancelled entries leave at the next pass, not at their
            // deadline, so the identity frees up promptly.
            let cancelled = self.locked().take_cancelled();
            for action in cancelled {
                self.drop_action(action, "cancelled");
            }

            if self.paused.load(Ordering::SeqCst) {
                self.locked().credit_pause(credit);
                continue;
            }

            let expired = self.locked().take_expired(Utc::now(), deadline);
            for action in expired {
                if action.cancelled {
                    self.drop_action(action, "cancelled");
                } else {
                    debug!(
                        identity = %action.identity,
                        retry_count = action.retry_count,
                        "Verification deadline passed"
                    );
                    self.requeue_or_drop(action);
                }
            }
        }
        info!("Reconcile loop stopped");
    }

    /// Re-queue an unconfirmed or failed action, or drop it once the
    /// retry budget is spent.
    fn requeue_or_drop(&self, mut action: Action) {
        if action.retry_count >= self.config.max_retries {
            warn!(
                identity = %action.identity,
                retries = action.retry_count,
                "Retry budget exhausted; dropping action"
            );
            self.emit(DispatchEvent::RetryBudgetExhausted {
                action_id: action.id,
                identity: action.identity,
                retries: action.retry_count,
                timestamp: Utc::now(),
            });
            return;
        }
        action.retry_count += 1;
        let event = DispatchEvent::ActionRequeued {
            action_id: action.id,
            identity: action.identity.clone(),
            retry_count: action.retry_count,
            timestamp: Utc::now(),
        };
        if self.locked().enqueue_retry(action) {
            self.emit(event);
            self.wake.notify_one();
        } else {
            // Another live instance of the identity appeared first.
            debug!(identity = %event.identity(), "Retry superseded by live duplicate");
        }
    }

    fn drop_action(&self, action: Action, reason: &str) {
        self.emit(DispatchEvent::ActionDropped {
            action_id: action.id,
            identity: action.identity,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn emit(&self, event: DispatchEvent) {
        debug!(event = event.event_name(), identity = event.identity(), "Dispatch event");
        // Send only fails when no subscriber exists, which is fine.
        let _ = self.events.send(event);
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
