//! Memo Cache demo
//!
//! Memoizes a small function, shows cache hits, then lets the background
//! sweeper evict the expired entries.

use std::time::Duration;

use serde_json::Value;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memo_cache::{Args, Cache, CacheConfig, CachedOptions, Signature};

/// Main entry point for the demo.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache (starting its sweeper)
/// 4. Memoize and call `square`
/// 5. Wait for the sweeper (or Ctrl+C), then stop it
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memo_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Memo Cache demo");

    let mut config = CacheConfig::from_env();
    if config.default_timeout.is_zero() {
        config = config.with_default_timeout(Duration::from_secs(1));
    }
    if config.sweeper_interval.is_none() {
        config = config.with_sweeper_interval(Duration::from_millis(500));
    }
    info!(
        "Configuration loaded: hashing={}, prefix={:?}, default_timeout={}s, sweeper_interval={:?}",
        config.hashing,
        config.prefix,
        config.default_timeout_secs(),
        config.sweeper_interval
    );

    let cache: Cache<i64> = Cache::new(config)?;

    let signature = Signature::new("square").param("x");
    let params = signature.clone();
    let square = cache.cached(signature, CachedOptions::new(), move |args: &Args| {
        let x = args.get(&params, "x").and_then(Value::as_i64).unwrap_or_default();
        info!("computing square({})", x);
        x * x
    })?;

    for x in [8, 8, 3, 8] {
        let value = square.call(&Args::new().arg(x));
        info!("square({}) = {}", x, value);
    }

    // Same binding by keyword: served from the positional call's entry
    let value = square.call(&Args::new().kwarg("x", 3));
    info!("square(x=3) = {}", value);

    info!("Cached entries: {}", cache.len());
    info!("Cache dump:\n{}", cache.dump()?);

    let wait = cache.config().default_timeout
        + cache.sweeper_interval().unwrap_or_default() * 2;

    tokio::select! {
        _ = tokio::time::sleep(wait) => {
            info!("Cached entries after sweep: {}", cache.len());
        }
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
    }

    cache.stop_sweeper().await;
    info!("Memo Cache demo complete");

    Ok(())
}
