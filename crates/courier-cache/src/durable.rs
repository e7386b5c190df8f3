//! Durable cache tier backed by SQLite.
//!
//! Wraps a single rusqlite Connection in a Mutex for thread-safe access.
//! Configures WAL mode on initialization. Expiry is lazy: lookups filter
//! on `expires_at` and a background sweep deletes stale rows.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use tracing::info;

use courier_core::error::CourierError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS responses (
    fingerprint TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    access_count INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_responses_expires ON responses(expires_at);
";

/// Aggregate statistics over the durable tier.
#[derive(Debug, Clone, PartialEq)]
pub struct DurableStats {
    pub total_entries: u64,
    pub expired_entries: u64,
    /// Average `expires_at - created_at` in milliseconds, 0 when empty.
    pub average_ttl_ms: f64,
}

/// Persistent response store keyed by request fingerprint.
///
/// Timestamps are unix milliseconds, matching the volatile tier.
pub struct DurableTier {
    conn: Mutex<Connection>,
}

impl DurableTier {
    /// Open (or create) the durable tier database at the given path.
    pub fn open(path: &Path) -> Result<Self, CourierError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| CourierError::Cache(format!("Failed to open database: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| CourierError::Cache(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| CourierError::Cache(format!("Failed to create schema: {}", e)))?;

        info!("Durable cache tier opened at {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory durable tier (for testing).
    pub fn in_memory() -> Result<Self, CourierError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CourierError::Cache(format!("Failed to open in-memory db: {}", e)))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| CourierError::Cache(format!("Failed to create schema: {}", e)))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T, CourierError>
    where
        F: FnOnce(&Connection) -> Result<T, CourierError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CourierError::Cache(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Look up an unexpired entry, incrementing its access count.
    ///
    /// Returns the cached value and the access count after the increment.
    pub fn get(&self, fingerprint: &str, now: i64) -> Result<Option<(Value, u32)>, CourierError> {
        self.with_conn(|conn| {
            let row: Option<(String, u32)> = conn
                .query_row(
                    "SELECT value, access_count FROM responses
                     WHERE fingerprint = ?1 AND expires_at > ?2",
                    rusqlite::params![fingerprint, now],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(|e| CourierError::Cache(format!("Lookup failed: {}", e)))?;

            match row {
                Some((raw, count)) => {
                    conn.execute(
                        "UPDATE responses SET access_count = access_count + 1
                         WHERE fingerprint = ?1",
                        rusqlite::params![fingerprint],
                    )
                    .map_err(|e| CourierError::Cache(format!("Access update failed: {}", e)))?;
                    let value: Value = serde_json::from_str(&raw)
                        .map_err(|e| CourierError::Cache(format!("Corrupt cache row: {}", e)))?;
                    Ok(Some((value, count + 1)))
                }
                None => Ok(None),
            }
        })
    }

    /// Insert or replace an entry, resetting its access count to 1.
    pub fn put(
        &self,
        fingerprint: &str,
        value: &Value,
        created_at: i64,
        expires_at: i64,
    ) -> Result<(), CourierError> {
        let raw = serde_json::to_string(value)
            .map_err(|e| CourierError::Cache(format!("Serialize failed: {}", e)))?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO responses
                 (fingerprint, value, created_at, expires_at, access_count)
                 VALUES (?1, ?2, ?3, ?4, 1)",
                rusqlite::params![fingerprint, raw, created_at, expires_at],
            )
            .map_err(|e| CourierError::Cache(format!("Insert failed: {}", e)))?;
            Ok(())
        })
    }

    /// Delete all rows whose expiry has passed, returning the count removed.
    pub fn remove_expired(&self, now: i64) -> Result<usize, CourierError> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM responses WHERE expires_at <= ?1",
                rusqlite::params![now],
            )
            .map_err(|e| CourierError::Cache(format!("Expiry sweep failed: {}", e)))
        })
    }

    /// Aggregate statistics for observability.
    pub fn stats(&self, now: i64) -> Result<DurableStats, CourierError> {
        self.with_conn(|conn| {
            let total: u64 = conn
                .query_row("SELECT COUNT(*) FROM responses", [], |row| row.get(0))
                .map_err(|e| CourierError::Cache(format!("Stats query failed: {}", e)))?;
            let expired: u64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM responses WHERE expires_at <= ?1",
                    rusqlite::params![now],
                    |row| row.get(0),
                )
                .map_err(|e| CourierError::Cache(format!("Stats query failed: {}", e)))?;
            let average_ttl_ms: f64 = conn
                .query_row(
                    "SELECT COALESCE(AVG(expires_at - created_at), 0) FROM responses",
                    [],
                    |row| row.get(0),
                )
                .map_err(|e| CourierError::Cache(format!("Stats query failed: {}", e)))?;
            Ok(DurableStats {
                total_entries: total,
                expired_entries: expired,
                average_ttl_ms,
            })
        })
    }
}

impl std::fmt::Debug for DurableTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableTier").finish()
    }
}
