//! Layered read-through response cache.
//!
//! Lookups consult the volatile tier first, then the durable tier; durable
//! hits that cross the promotion threshold are copied into the volatile
//! tier. Writes go through to both tiers. Durable-tier failures degrade to
//! volatile-only operation; a cache problem is never an error to the
//! caller, only a miss.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use courier_core::config::CacheConfig;
use courier_core::error::CourierError;

use crate::durable::DurableTier;
use crate::fingerprint::fingerprint;
use crate::memory::{CacheEntry, MemoryTier};

/// Combined statistics over both tiers.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub volatile_entries: usize,
    pub durable_entries: u64,
    pub durable_expired: u64,
    pub average_ttl_ms: f64,
}

/// Two-tier response cache keyed by request fingerprint.
///
/// Safe for concurrent use from unrelated callers; each tier serializes
/// its own mutations and the tiers have no cross-tier lock ordering.
pub struct ResponseCache {
    memory: MemoryTier,
    durable: Option<DurableTier>,
    promotion_threshold: u32,
}

impl ResponseCache {
    /// Open a cache with a file-backed durable tier.
    pub fn open(config: &CacheConfig, path: &Path) -> Result<Self, CourierError> {
        Ok(Self {
            memory: MemoryTier::new(config.volatile_capacity),
            durable: Some(DurableTier::open(path)?),
            promotion_threshold: config.promotion_threshold,
        })
    }

    /// Open a cache with an in-memory durable tier (for testing).
    pub fn in_memory(config: &CacheConfig) -> Result<Self, CourierError> {
        Ok(Self {
            memory: MemoryTier::new(config.volatile_capacity),
            durable: Some(DurableTier::in_memory()?),
            promotion_threshold: config.promotion_threshold,
        })
    }

    /// Degraded mode: no durable tier at all.
    ///
    /// Used when the durable store cannot be opened; the cache keeps
    /// serving from the volatile tier alone.
    pub fn volatile_only(config: &CacheConfig) -> Self {
        Self {
            memory: MemoryTier::new(config.volatile_capacity),
            durable: None,
            promotion_threshold: config.promotion_threshold,
        }
    }

    /// Read-through lookup. Returns the cached value or a miss; never an
    /// error.
    pub fn get(&self, endpoint: &str, params: &Value) -> Option<Value> {
        let fp = fingerprint(endpoint, params);
        let now = now_ms();

        if let Some(value) = self.memory.get(&fp, now) {
            return Some(value);
        }

        let durable = self.durable.as_ref()?;
        match durable.get(&fp, now) {
            Ok(Some((value, access_count))) => {
                if access_count > self.promotion_threshold {
                    debug!(fingerprint = %fp, access_count, "Promoting entry to volatile tier");
                    self.memory.insert(
                        fp,
                        CacheEntry {
                            value: value.clone(),
                            created_at: now,
                            expires_at: self.promoted_expiry(&value, now),
                            access_count,
                        },
                    );
                }
                Some(value)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Durable cache lookup failed, treating as miss");
                None
            }
        }
    }

    /// Write-through insert with the caller-chosen TTL.
    pub fn put(&self, endpoint: &str, params: &Value, value: Value, ttl: Duration) {
        let fp = fingerprint(endpoint, params);
        let now = now_ms();
        let expires_at = now + ttl.as_millis() as i64;

        if let Some(durable) = &self.durable {
            if let Err(e) = durable.put(&fp, &value, now, expires_at) {
                warn!(error = %e, "Durable cache write failed, volatile tier only");
            }
        }
        self.memory.insert(fp, CacheEntry::new(value, now, expires_at));
    }

    /// Sweep both tiers for expired entries, returning the count removed.
    ///
    /// Intended for a periodic background tick; the request path relies on
    /// lazy per-access filtering instead.
    pub fn evict_expired(&self) -> usize {
        let now = now_ms();
        let mut removed = self.memory.remove_expired(now);
        if let Some(durable) = &self.durable {
            match durable.remove_expired(now) {
                Ok(n) => removed += n,
                Err(e) => warn!(error = %e, "Durable cache expiry sweep failed"),
            }
        }
        removed
    }

    /// Combined cache statistics. Durable numbers are zero in degraded mode.
    pub fn stats(&self) -> CacheStats {
        let durable = self
            .durable
            .as_ref()
            .and_then(|d| d.stats(now_ms()).ok());
        CacheStats {
            volatile_entries: self.memory.len(),
            durable_entries: durable.as_ref().map(|s| s.total_entries).unwrap_or(0),
            durable_expired: durable.as_ref().map(|s| s.expired_entries).unwrap_or(0),
            average_ttl_ms: durable.map(|s| s.average_ttl_ms).unwrap_or(0.0),
        }
    }

    /// Expiry for a promoted copy.
    ///
    /// The durable row keeps the authoritative expiry; the promoted copy
    /// only needs to live until the next durable lookup would, so it gets a
    /// short fixed horizon rather than a second query for the row's expiry.
    fn promoted_expiry(&self, _value: &Value, now: i64) -> i64 {
        now + Duration::from_secs(300).as_millis() as i64
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache() -> ResponseCache {
        ResponseCache::in_memory(&CacheConfig::default()).unwrap()
    }

    #[test]
    fn test_put_then_get_round_trip() {
        let cache = cache();
        cache.put(
            "users/42",
            &json!({}),
            json!({"name": "echo"}),
            Duration::from_secs(60),
        );
        assert_eq!(
            cache.get("users/42", &json!({})),
            Some(json!({"name": "echo"}))
        );
    }

    #[test]
    fn test_get_after_ttl_elapses_is_a_miss() {
        let cache = cache();
        cache.put("k", &json!({}), json!(1), Duration::from_millis(20));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(cache.get("k", &json!({})), None);
    }

    #[test]
    fn test_param_order_is_irrelevant() {
        let cache = cache();
        cache.put(
            "x",
            &json!({"a": 1, "b": 2}),
            json!("v"),
            Duration::from_secs(60),
        );
        assert_eq!(cache.get("x", &json!({"b": 2, "a": 1})), Some(json!("v")));
    }

    #[test]
    fn test_miss_on_unknown_key() {
        assert_eq!(cache().get("nothing", &json!({})), None);
    }

    #[test]
    fn test_promotion_after_threshold_durable_hits() {
        let config = CacheConfig {
            promotion_threshold: 3,
            ..CacheConfig::default()
        };
        let cache = ResponseCache::in_memory(&config).unwrap();
        cache.put("hot", &json!({}), json!("v"), Duration::from_secs(60));

        let fp = fingerprint("hot", &json!({}));
        // Drop the volatile copy so lookups fall through to the durable tier.
        cache.memory.remove_expired(i64::MAX);
        assert_eq!(cache.memory.len(), 0);

        // Durable access counts: put=1, then 2, 3 on these gets; not promoted yet.
        cache.get("hot", &json!({}));
        cache.get("hot", &json!({}));
        assert_eq!(cache.memory.access_count(&fp), None);

        // Fourth access crosses the threshold and promotes.
        cache.get("hot", &json!({}));
        assert!(cache.memory.access_count(&fp).is_some());

        // Subsequent lookups hit the volatile tier.
        assert_eq!(cache.get("hot", &json!({})), Some(json!("v")));
    }

    #[test]
    fn test_volatile_only_mode_still_serves() {
        let cache = ResponseCache::volatile_only(&CacheConfig::default());
        cache.put("k", &json!({}), json!(7), Duration::from_secs(60));
        assert_eq!(cache.get("k", &json!({})), Some(json!(7)));

        let stats = cache.stats();
        assert_eq!(stats.volatile_entries, 1);
        assert_eq!(stats.durable_entries, 0);
    }

    #[test]
    fn test_evict_expired_sweeps_both_tiers() {
        let cache = cache();
        cache.put("a", &json!({}), json!(1), Duration::from_millis(10));
        cache.put("b", &json!({}), json!(2), Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(30));

        // "a" is expired in both tiers: one volatile removal + one durable row.
        assert_eq!(cache.evict_expired(), 2);
        assert_eq!(cache.get("a", &json!({})), None);
        assert_eq!(cache.get("b", &json!({})), Some(json!(2)));
    }

    #[test]
    fn test_stats_reflects_both_tiers() {
        let cache = cache();
        cache.put("a", &json!({}), json!(1), Duration::from_secs(60));
        cache.put("b", &json!({}), json!(2), Duration::from_secs(60));

        let stats = cache.stats();
        assert_eq!(stats.volatile_entries, 2);
        assert_eq!(stats.durable_entries, 2);
        assert_eq!(stats.durable_expired, 0);
        assert!(stats.average_ttl_ms > 0.0);
    }

    #[test]
    fn test_put_with_policy_chosen_ttl() {
        let config = CacheConfig::default();
        let policy = crate::ttl::TtlPolicy::from_config(&config);
        let cache = ResponseCache::in_memory(&config).unwrap();

        // The caller resolves the TTL per endpoint; the cache stays agnostic.
        let ttl = policy.ttl_for("guilds/9/channels");
        cache.put("guilds/9/channels", &json!({}), json!([]), ttl);
        assert_eq!(cache.get("guilds/9/channels", &json!({})), Some(json!([])));
    }

    #[test]
    fn test_put_overwrites_previous_value() {
        let cache = cache();
        cache.put("k", &json!({}), json!("old"), Duration::from_secs(60));
        cache.put("k", &json!({}), json!("new"), Duration::from_secs(60));
        assert_eq!(cache.get("k", &json!({})), Some(json!("new")));
    }
}
