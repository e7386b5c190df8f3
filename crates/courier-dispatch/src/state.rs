//! Queue and verification ledger.
//!
//! All mutable dispatch state lives behind one lock so that the send loop,
//! the reconcile tick and the confirmation feed observe a consistent view.
//! In particular a confirmation arriving in the same instant a deadline
//! expires resolves to exactly one outcome, whichever party takes the lock
//! first.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

use courier_core::types::Action;

/// Outcome of a producer enqueue, reported for logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The action entered the queue.
    Queued,
    /// A queued action with the same identity was replaced in place.
    Replaced,
    /// The identity is awaiting verification; the new instance was dropped.
    DroppedPending,
}

/// A sent action awaiting external confirmation.
#[derive(Clone, Debug)]
pub struct LedgerEntry {
    pub action: Action,
    /// When the action was sent.
    pub inserted_at: DateTime<Utc>,
    /// Time spent paused since insertion. Subtracted from the entry's age
    /// so a pause never burns verification deadline.
    pub pause_credit: Duration,
}

impl LedgerEntry {
    fn new(action: Action) -> Self {
        Self {
            action,
            inserted_at: Utc::now(),
            pause_credit: Duration::zero(),
        }
    }

    /// Age of the entry with pause time discounted.
    pub fn effective_age(&self, now: DateTime<Utc>) -> Duration {
        now - self.inserted_at - self.pause_credit
    }
}

/// The dispatcher's queue and verification ledger.
///
/// Identity uniqueness is the core invariant: among the queue and the
/// ledger together, at most one live action exists per identity for
/// verification-bearing actions.
#[derive(Debug, Default)]
pub struct DispatchState {
    queue: VecDeque<Action>,
    ledger: Vec<LedgerEntry>,
}

impl DispatchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a fresh producer action.
    ///
    /// Verification-bearing actions are de-duplicated by identity: a queued
    /// duplicate is replaced in place (keeping its position), and if the
    /// identity is already awaiting verification the incoming instance is
    /// dropped. Fire-and-forget actions always queue.
    pub fn enqueue_new(&mut self, action: Action) -> EnqueueOutcome {
        if !action.requires_verification {
            self.queue.push_back(action);
            return EnqueueOutcome::Queued;
        }
        if self.ledger.iter().any(|e| e.action.identity == action.identity) {
            return EnqueueOutcome::DroppedPending;
        }
        if let Some(slot) = self
            .queue
            .iter_mut()
            .find(|a| a.identity == action.identity)
        {
            *slot = action;
            return EnqueueOutcome::Replaced;
        }
        self.queue.push_back(action);
        EnqueueOutcome::Queued
    }

    /// Re-enqueue an unconfirmed or failed action.
    ///
    /// Dropped silently if another live instance of the identity appeared
    /// in the meantime. Urgent actions re-enter at the front.
    pub fn enqueue_retry(&mut self, action: Action) -> bool {
        let duplicate = self.queue.iter().any(|a| a.identity == action.identity)
            || self
                .ledger
                .iter()
                .any(|e| e.action.identity == action.identity);
        if duplicate {
            return false;
        }
        if action.urgent {
            self.queue.push_front(action);
        } else {
            self.queue.push_back(action);
        }
        true
    }

    /// Pop the next sendable action, skipping cancelled ones.
    ///
    /// Returns the cancelled actions that were dropped on the way (for
    /// event emission) and the action to send, if any.
    pub fn pop_sendable(&mut self) -> (Vec<Action>, Option<Action>) {
        let mut dropped = Vec::new();
        while let Some(action) = self.queue.pop_front() {
            if action.cancelled {
                dropped.push(action);
                continue;
            }
            return (dropped, Some(action));
        }
        (dropped, None)
    }

    /// Mark every live instance of `identity` cancelled. Queued instances
    /// are flagged for removal at the pre-send check; pending instances are
    /// dropped at the next reconcile pass instead of being retried.
    pub fn cancel(&mut self, identity: &str) -> usize {
        let mut flagged = 0;
        for action in self.queue.iter_mut().filter(|a| a.identity == identity) {
            if !action.cancelled {
                action.cancelled = true;
                flagged += 1;
            }
        }
        for entry in self
            .ledger
            .iter_mut()
            .filter(|e| e.action.identity == identity)
        {
            if !entry.action.cancelled {
                entry.action.cancelled = true;
                flagged += 1;
            }
        }
        flagged
    }

    /// Settle a pending entry on external confirmation.
    ///
    /// Returns the confirmed action, or `None` when nothing was pending
    /// under that identity (a late confirmation for an already-reconciled
    /// entry is a no-op).
    pub fn confirm(&mut self, identity: &str) -> Option<Action> {
        let idx = self
            .ledger
            .iter()
            .position(|e| e.action.identity == identity)?;
        Some(self.ledger.swap_remove(idx).action)
    }

    /// Remove a pending entry by identity, returning it if present.
    ///
    /// Used by the explicit failure path, which decides retry-or-drop
    /// itself.
    pub fn take_pending(&mut self, identity: &str) -> Option<Action> {
        let idx = self
            .ledger
            .iter()
            .position(|e| e.action.identity == identity)?;
        Some(self.ledger.swap_remove(idx).action)
    }

    /// Record a sent action as awaiting verification.
    ///
    /// Any stale entry under the same identity is discarded first so the
    /// deadline clock restarts from this send.
    pub fn ledger_insert(&mut self, action: Action) {
        self.ledger.retain(|e| e.action.identity != action.identity);
        self.ledger.push(LedgerEntry::new(action));
    }

    /// Credit one pause tick to every pending entry.
    pub fn credit_pause(&mut self, tick: Duration) {
        for entry in &mut self.ledger {
            entry.pause_credit = entry.pause_credit + tick;
        }
    }

    /// Drain entries flagged cancelled, regardless of age.
    ///
    /// Run every reconcile pass so a cancelled identity frees up at the
    /// next tick instead of lingering until its verification deadline.
    pub fn take_cancelled(&mut self) -> Vec<Action> {
        let mut cancelled = Vec::new();
        let mut i = 0;
        while i < self.ledger.len() {
            if self.ledger[i].action.cancelled {
                cancelled.push(self.ledger.swap_remove(i).action);
            } else {
                i += 1;
            }
        }
        cancelled
    }

    /// Drain the entries whose effective age has exceeded the deadline.
    pub fn take_expired(&mut self, now: DateTime<Utc>, deadline: Duration) -> Vec<Action> {
        let mut expired = Vec::new();
        let mut i = 0;
        while i < self.ledger.len() {
            if self.ledger[i].effective_age(now) >= deadline {
                expired.push(self.ledger.swap_remove(i).action);
            } else {
                i += 1;
            }
        }
        expired
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn ledger_len(&self) -> usize {
        self.ledger.len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.ledger.is_empty()
    }

    #[cfg(test)]
    fn backdate(&mut self, identity: &str, by: Duration) {
        for entry in self
            .ledger
            .iter_mut()
            .filter(|e| e.action.identity == identity)
        {
            entry.inserted_at = entry.inserted_at - by;
        }
    }
}
