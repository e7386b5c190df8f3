//! Volatile cache tier.
//!
//! A capacity-bounded in-memory map from fingerprint to cached value.
//! When the tier exceeds its capacity, entries are evicted in
//! `(access_count ascending, expires_at ascending)` order: least-used,
//! soonest-expiring entries go first.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

/// A cached response with its expiry and usage bookkeeping.
///
/// Timestamps are unix milliseconds.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub created_at: i64,
    pub expires_at: i64,
    pub access_count: u32,
}

impl CacheEntry {
    pub fn new(value: Value, created_at: i64, expires_at: i64) -> Self {
        Self {
            value,
            created_at,
            expires_at,
            access_count: 1,
        }
    }

    /// Whether the entry is expired at `now` (unix millis).
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// The fast, capacity-bounded in-memory tier.
///
/// Safe for concurrent use from multiple callers; all access goes through
/// a single interior mutex.
pub struct MemoryTier {
    capacity: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryTier {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a fingerprint. A hit increments the access count; an expired
    /// entry is lazily removed and reported as a miss.
    pub fn get(&self, fingerprint: &str, now: i64) -> Option<Value> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get_mut(fingerprint) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(fingerprint);
                None
            }
            Some(entry) => {
                entry.access_count += 1;
                Some(entry.value.clone())
            }
            None => None,
        }
    }

    /// Insert or replace an entry, then evict until back under capacity.
    pub fn insert(&self, fingerprint: impl Into<String>, entry: CacheEntry) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(fingerprint.into(), entry);
        Self::enforce_capacity(&mut entries, self.capacity);
    }

    /// Remove all expired entries, returning the number removed.
    pub fn remove_expired(&self, now: i64) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            entries.remove(key);
        }
        expired.len()
    }

    /// Number of live entries (including any not yet lazily expired).
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current access count for an entry, if present. Test/stats helper.
    pub fn access_count(&self, fingerprint: &str) -> Option<u32> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(fingerprint)
            .map(|e| e.access_count)
    }

    fn enforce_capacity(entries: &mut HashMap<String, CacheEntry>, capacity: usize) {
        while entries.len() > capacity {
            let victim = entries
                .iter()
                .min_by_key(|(_, e)| (e.access_count, e.expires_at))
                .map(|(k, _)| k.clone());
            match victim {
                Some(key) => {
                    entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(value: i64, expires_at: i64, access_count: u32) -> CacheEntry {
        CacheEntry {
            value: json!(value),
            created_at: 0,
            expires_at,
            access_count,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let tier = MemoryTier::new(10);
        tier.insert("k1", entry(42, 1_000, 1));
        assert_eq!(tier.get("k1", 500), Some(json!(42)));
    }

    #[test]
    fn test_get_increments_access_count() {
        let tier = MemoryTier::new(10);
        tier.insert("k1", entry(1, 1_000, 1));
        tier.get("k1", 0);
        tier.get("k1", 0);
        assert_eq!(tier.access_count("k1"), Some(3));
    }

    #[test]
    fn test_expired_entry_is_a_miss_and_removed() {
        let tier = MemoryTier::new(10);
        tier.insert("k1", entry(1, 100, 1));
        assert_eq!(tier.get("k1", 100), None);
        assert_eq!(tier.len(), 0);
    }

    #[test]
    fn test_eviction_removes_lowest_access_count_first() {
        let tier = MemoryTier::new(3);
        tier.insert("low", entry(1, 10_000, 1));
        tier.insert("mid", entry(2, 10_000, 5));
        tier.insert("high", entry(3, 10_000, 9));
        // Fourth insert pushes the tier over capacity.
        tier.insert("new", entry(4, 10_000, 7));

        assert_eq!(tier.len(), 3);
        assert_eq!(tier.get("low", 0), None);
        assert!(tier.get("mid", 0).is_some());
        assert!(tier.get("high", 0).is_some());
        assert!(tier.get("new", 0).is_some());
    }

    #[test]
    fn test_eviction_ties_break_on_soonest_expiry() {
        let tier = MemoryTier::new(2);
        tier.insert("soon", entry(1, 1_000, 1));
        tier.insert("later", entry(2, 9_000, 1));
        tier.insert("new", entry(3, 5_000, 1));

        assert_eq!(tier.len(), 2);
        assert_eq!(tier.get("soon", 0), None, "soonest-expiring evicted first");
    }

    #[test]
    fn test_remove_expired_counts_removals() {
        let tier = MemoryTier::new(10);
        tier.insert("a", entry(1, 100, 1));
        tier.insert("b", entry(2, 200, 1));
        tier.insert("c", entry(3, 10_000, 1));
        assert_eq!(tier.remove_expired(500), 2);
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn test_replace_existing_key_does_not_grow() {
        let tier = MemoryTier::new(2);
        tier.insert("a", entry(1, 1_000, 1));
        tier.insert("a", entry(2, 2_000, 1));
        assert_eq!(tier.len(), 1);
        assert_eq!(tier.get("a", 0), Some(json!(2)));
    }
}
