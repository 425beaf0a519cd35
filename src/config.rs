//! Configuration Module
//!
//! Handles building, validating and loading cache configuration.

use std::env;
use std::time::Duration;

use tracing::warn;

use crate::error::{CacheError, Result};

/// Default separator between the parts of a derived cache key.
pub const DEFAULT_KEY_JOIN: &str = "|";

/// Cache configuration parameters.
///
/// Immutable once handed to [`crate::Cache::new`]. All values can also be
/// loaded from environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Hash the argument material of derived keys (explicit keys are never hashed)
    pub hashing: bool,
    /// Separator used to join prefix, function name and argument material
    pub key_join: String,
    /// Enables per-key hit counters and verbose tracing
    pub debug: bool,
    /// Silences per-hit tracing while `debug` is on
    pub quiet: bool,
    /// Prefix applied to every key
    pub prefix: String,
    /// Default expiration for cached entries, zero = never expires
    pub default_timeout: Duration,
    /// Interval between background sweeps, None = no sweeper
    pub sweeper_interval: Option<Duration>,
}

impl CacheConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables hashing of key material.
    pub fn with_hashing(mut self, hashing: bool) -> Self {
        self.hashing = hashing;
        self
    }

    /// Sets the key join separator.
    pub fn with_key_join(mut self, key_join: impl Into<String>) -> Self {
        self.key_join = key_join.into();
        self
    }

    /// Enables debug mode (hit counters and verbose tracing).
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Silences per-hit tracing in debug mode.
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Sets the key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the default timeout. Must be a whole number of seconds.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Enables the background sweeper with the given interval.
    pub fn with_sweeper_interval(mut self, interval: Duration) -> Self {
        self.sweeper_interval = Some(interval);
        self
    }

    // == Validate ==
    /// Checks the configuration before any cache is built from it.
    ///
    /// # Errors
    /// - `default_timeout` with a sub-second part
    /// - a zero `sweeper_interval`
    pub fn validate(&self) -> Result<()> {
        let default_timeout = whole_seconds(self.default_timeout, "default_timeout")?;

        if let Some(interval) = self.sweeper_interval {
            if interval.is_zero() {
                return Err(CacheError::Configuration(
                    "sweeper_interval must be greater than zero".to_string(),
                ));
            }
            if default_timeout == 0 {
                warn!(
                    "Sweeper configured without a default timeout; only entries with an explicit timeout will expire"
                );
            }
        }

        Ok(())
    }

    /// Default timeout in whole seconds (0 = never expires).
    pub fn default_timeout_secs(&self) -> u64 {
        self.default_timeout.as_secs()
    }

    /// True when every cache hit should be traced.
    pub fn verbose(&self) -> bool {
        self.debug && !self.quiet
    }

    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MEMO_CACHE_HASHING` - Hash key material (default: true)
    /// - `MEMO_CACHE_KEY_JOIN` - Key separator (default: "|")
    /// - `MEMO_CACHE_DEBUG` - Debug mode (default: false)
    /// - `MEMO_CACHE_QUIET` - Quiet debug mode (default: false)
    /// - `MEMO_CACHE_PREFIX` - Key prefix (default: "")
    /// - `MEMO_CACHE_DEFAULT_TIMEOUT` - Default timeout in seconds (default: 0)
    /// - `MEMO_CACHE_SWEEPER_INTERVAL_MS` - Sweeper interval in milliseconds (default: none)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            hashing: parse_env("MEMO_CACHE_HASHING").unwrap_or(defaults.hashing),
            key_join: env::var("MEMO_CACHE_KEY_JOIN").unwrap_or(defaults.key_join),
            debug: parse_env("MEMO_CACHE_DEBUG").unwrap_or(defaults.debug),
            quiet: parse_env("MEMO_CACHE_QUIET").unwrap_or(defaults.quiet),
            prefix: env::var("MEMO_CACHE_PREFIX").unwrap_or(defaults.prefix),
            default_timeout: parse_env("MEMO_CACHE_DEFAULT_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_timeout),
            sweeper_interval: parse_env::<u64>("MEMO_CACHE_SWEEPER_INTERVAL_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            hashing: true,
            key_join: DEFAULT_KEY_JOIN.to_string(),
            debug: false,
            quiet: false,
            prefix: String::new(),
            default_timeout: Duration::ZERO,
            sweeper_interval: None,
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

// == Whole Seconds ==
/// Converts a timeout to whole seconds, rejecting sub-second precision.
pub(crate) fn whole_seconds(timeout: Duration, what: &str) -> Result<u64> {
    if timeout.subsec_nanos() != 0 {
        return Err(CacheError::Configuration(format!(
            "{} must be a whole number of seconds, got {:?}",
            what, timeout
        )));
    }
    Ok(timeout.as_secs())
}
