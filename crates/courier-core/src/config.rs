use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{CourierError, Result};
use crate::types::PacingClass;

/// Top-level configuration for the Courier application.
///
/// Loaded from `~/.courier/config.toml` by default. Each section corresponds
/// to a component or cross-cutting concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourierConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl CourierConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CourierConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| CourierError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the durable cache database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.courier/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Dispatcher and verification-ledger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// How long a sent action may sit unconfirmed before it is re-queued.
    pub verification_deadline_secs: u64,
    /// Retry budget: an action is dropped once `retry_count` would exceed this.
    pub max_retries: u32,
    /// Tick interval of the ledger reconciliation loop.
    pub reconcile_tick_secs: u64,
    /// Pacing delay for `PacingClass::Command` actions, in milliseconds.
    pub command_delay_ms: u64,
    /// Pacing delay for `PacingClass::Lookup` actions, in milliseconds.
    pub lookup_delay_ms: u64,
    /// Pacing delay for `PacingClass::Burst` actions, in milliseconds.
    pub burst_delay_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            verification_deadline_secs: 15,
            max_retries: 5,
            reconcile_tick_secs: 1,
            command_delay_ms: 3000,
            lookup_delay_ms: 1500,
            burst_delay_ms: 500,
        }
    }
}

impl DispatchConfig {
    /// The configured pacing delay for a class.
    pub fn delay_for(&self, class: PacingClass) -> std::time::Duration {
        let ms = match class {
            PacingClass::Command => self.command_delay_ms,
            PacingClass::Lookup => self.lookup_delay_ms,
            PacingClass::Burst => self.burst_delay_ms,
        };
        std::time::Duration::from_millis(ms)
    }
}

/// Response-cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entries held in the volatile (in-memory) tier.
    pub volatile_capacity: usize,
    /// Durable hits with an access count above this are copied into the
    /// volatile tier.
    pub promotion_threshold: u32,
    /// TTL applied when no rule matches the endpoint, in seconds.
    pub default_ttl_secs: u64,
    /// Endpoint-pattern TTL rules, checked in order (substring match).
    pub ttl_rules: Vec<TtlRule>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            volatile_capacity: 100,
            promotion_threshold: 3,
            default_ttl_secs: 300,
            ttl_rules: vec![
                TtlRule::new("messages", 60),
                TtlRule::new("channels", 3600),
                TtlRule::new("users", 3600),
                TtlRule::new("guilds", 7200),
                TtlRule::new("assets", 86400),
            ],
        }
    }
}

/// A single endpoint-pattern TTL rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlRule {
    /// Substring matched against the endpoint.
    pub pattern: String,
    /// TTL in seconds for matching endpoints.
    pub ttl_secs: u64,
}

impl TtlRule {
    pub fn new(pattern: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            pattern: pattern.into(),
            ttl_secs,
        }
    }
}
