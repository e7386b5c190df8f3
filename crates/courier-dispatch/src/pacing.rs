//! Pacing seam for throttling sends.
//!
//! The dispatcher asks its `PacingSource` how long to wait before the next
//! dequeue and never inspects how the delay is computed. Richer profiles
//! (jitter, time-of-day curves) plug in behind the same trait.

use std::time::Duration;

use courier_core::config::DispatchConfig;
use courier_core::types::PacingClass;

/// Source of inter-send delays, keyed by pacing class.
pub trait PacingSource: Send + Sync {
    fn next_delay(&self, class: PacingClass) -> Duration;
}

/// Fixed per-class delays read from configuration.
#[derive(Debug, Clone)]
pub struct FixedPacing {
    config: DispatchConfig,
}

impl FixedPacing {
    pub fn new(config: DispatchConfig) -> Self {
        Self { config }
    }
}

impl PacingSource for FixedPacing {
    fn next_delay(&self, class: PacingClass) -> Duration {
        self.config.delay_for(class)
    }
}

/// Zero delay for every class. Used in tests and bench harnesses.
#[derive(Debug, Clone, Default)]
pub struct NoPacing;

impl PacingSource for NoPacing {
    fn next_delay(&self, _class: PacingClass) -> Duration {
        Duration::ZERO
    }
}
