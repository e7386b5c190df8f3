//! TTL category policy.
//!
//! Maps endpoints to time-to-live values via ordered substring rules, with
//! a default for anything unmatched. The cache itself is TTL-agnostic; the
//! caller resolves a TTL here and passes it to `put`.

use std::time::Duration;

use courier_core::config::{CacheConfig, TtlRule};

/// Ordered endpoint-pattern TTL lookup.
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    rules: Vec<TtlRule>,
    default_ttl: Duration,
}

impl TtlPolicy {
    pub fn new(rules: Vec<TtlRule>, default_ttl: Duration) -> Self {
        Self { rules, default_ttl }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            config.ttl_rules.clone(),
            Duration::from_secs(config.default_ttl_secs),
        )
    }

    /// Resolve the TTL for an endpoint. The first matching rule wins.
    pub fn ttl_for(&self, endpoint: &str) -> Duration {
        self.rules
            .iter()
            .find(|rule| endpoint.contains(&rule.pattern))
            .map(|rule| Duration::from_secs(rule.ttl_secs))
            .unwrap_or(self.default_ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> TtlPolicy {
        TtlPolicy::new(
            vec![
                TtlRule::new("messages", 60),
                TtlRule::new("channels", 3600),
            ],
            Duration::from_secs(300),
        )
    }

    #[test]
    fn test_matching_rule_wins() {
        let p = policy();
        assert_eq!(
            p.ttl_for("channels/123/messages"),
            Duration::from_secs(60),
            "first matching rule wins even when a later rule also matches"
        );
        assert_eq!(p.ttl_for("channels/123"), Duration::from_secs(3600));
    }

    #[test]
    fn test_unmatched_endpoint_uses_default() {
        assert_eq!(policy().ttl_for("users/@me"), Duration::from_secs(300));
    }

    #[test]
    fn test_from_config_defaults() {
        let p = TtlPolicy::from_config(&CacheConfig::default());
        assert_eq!(p.ttl_for("guilds/42"), Duration::from_secs(7200));
        assert_eq!(p.ttl_for("something-else"), Duration::from_secs(300));
    }
}
