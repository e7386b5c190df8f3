//! Courier response cache - layered read-through caching for lookups
//! against the external service.
//!
//! Provides deterministic request fingerprinting, a capacity-bounded
//! volatile tier, a WAL-mode SQLite durable tier with lazy expiry, and a
//! TTL category policy. Cache failures never propagate to callers: `get`
//! returns a miss and `put` logs and continues, preserving the
//! fallback-to-fetch contract.

pub mod cache;
pub mod durable;
pub mod fingerprint;
pub mod memory;
pub mod ttl;

pub use cache::{CacheStats, ResponseCache};
pub use durable::DurableTier;
pub use fingerprint::fingerprint;
pub use memory::{CacheEntry, MemoryTier};
pub use ttl::TtlPolicy;
