//! Courier application binary - composition root.
//!
//! Ties together the Courier crates into a single executable:
//! 1. Load configuration from TOML
//! 2. Open the two-tier response cache (SQLite durable tier)
//! 3. Build the dispatcher (transport + pacing)
//! 4. Start the send and reconcile loops plus a cache eviction sweep
//! 5. Shut down cleanly on Ctrl-C
//!
//! The transport wired here is the logging dry-run transport; a real
//! deployment swaps in a transport speaking to the external service.

mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use courier_cache::ResponseCache;
use courier_core::config::CourierConfig;
use courier_dispatch::{Dispatcher, FixedPacing, LoggingTransport};

use cli::CliArgs;

/// Interval between expired-entry sweeps of the response cache.
const CACHE_SWEEP_SECS: u64 = 60;

/// Expand ~ to home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if data_dir.starts_with("~/") || data_dir.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&data_dir[2..])
    } else {
        PathBuf::from(data_dir)
    }
}

/// Periodically evict expired entries from both cache tiers.
async fn cache_sweep_loop(cache: Arc<ResponseCache>) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(CACHE_SWEEP_SECS));
    loop {
        interval.tick().await;
        let evicted = cache.evict_expired();
        if evicted > 0 {
            tracing::debug!(evicted, "Cache sweep removed expired entries");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config. Tracing is not up yet, so remember the load outcome and
    // report it after init instead of relying on load-time logging.
    let config_file = args.resolve_config_path();
    let (mut config, load_error) = match CourierConfig::load(&config_file) {
        Ok(config) => (config, None),
        Err(e) => (CourierConfig::default(), Some(e)),
    };
    if let Some(data_dir) = args.resolve_data_dir() {
        config.general.data_dir = data_dir;
    }
    if let Some(level) = args.resolve_log_level() {
        config.general.log_level = level;
    }

    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting Courier v{}", env!("CARGO_PKG_VERSION"));
    match load_error {
        None => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Some(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load config; using defaults"
        ),
    }

    // Response cache. A durable-tier failure degrades to volatile-only
    // rather than aborting startup.
    let data_dir = resolve_data_dir(&config.general.data_dir);
    let db_path = data_dir.join("courier.db");
    let cache = match ResponseCache::open(&config.cache, &db_path) {
        Ok(cache) => {
            tracing::info!(path = %db_path.display(), "Response cache opened");
            cache
        }
        Err(e) => {
            tracing::warn!(
                path = %db_path.display(),
                error = %e,
                "Durable cache tier unavailable; running volatile-only"
            );
            ResponseCache::volatile_only(&config.cache)
        }
    };
    let cache = Arc::new(cache);

    // Dispatcher.
    let dispatcher = Arc::new(Dispatcher::new(
        config.dispatch.clone(),
        Arc::new(LoggingTransport),
        Arc::new(FixedPacing::new(config.dispatch.clone())),
    ));
    if args.paused {
        dispatcher.pause();
        tracing::info!("Starting paused (--paused)");
    }

    // === Background tasks ===

    let send_loop = {
        let d = Arc::clone(&dispatcher);
        tokio::spawn(async move { d.run().await })
    };
    let reconcile_loop = {
        let d = Arc::clone(&dispatcher);
        tokio::spawn(async move { d.reconcile().await })
    };
    let sweep_loop = tokio::spawn(cache_sweep_loop(Arc::clone(&cache)));

    tracing::info!("Courier running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    // === Shutdown ===

    tracing::info!("Ctrl-C received; shutting down");
    dispatcher.shutdown();
    send_loop.await?;
    reconcile_loop.await?;
    sweep_loop.abort();

    let stats = cache.stats();
    tracing::info!(
        volatile_entries = stats.volatile_entries,
        durable_entries = stats.durable_entries,
        "Final cache stats"
    );

    Ok(())
}
