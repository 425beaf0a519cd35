//! Cache Handle Module
//!
//! The public face of the cache: container operations, the memoization
//! protocol, scoped overrides, persistence and the sweeper lifecycle.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{Args, CacheEntry, CacheStore, HitCounters, KeyDeriver, Signature};
use crate::config::{whole_seconds, CacheConfig};
use crate::error::{CacheError, Result};
use crate::memo::cached::{CachedOptions, ClearCache, Memoized};
use crate::memo::scope::{CachingDisabled, ScopeState, TimeoutOverride};
use crate::models::{decode_snapshot, encode_snapshot, DumpEntry};
use crate::tasks::spawn_sweeper;

// == Sweeper State ==
/// Lifecycle state of a cache's background sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweeperState {
    Running,
    Stopped,
}

#[derive(Debug)]
struct Sweeper {
    interval: Duration,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct CacheInner<V> {
    config: CacheConfig,
    keys: KeyDeriver,
    store: Arc<CacheStore<V>>,
    scopes: ScopeState,
    // Dropping the last handle drops the stop sender, which ends the task.
    sweeper: Mutex<Option<Sweeper>>,
}

// == Cache ==
/// An in-process memoization cache.
///
/// Cloning is cheap and every clone shares the same store, scopes and sweeper.
pub struct Cache<V> {
    inner: Arc<CacheInner<V>>,
}

impl<V> Clone for Cache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for Cache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sweeper = match self.inner.sweeper.try_lock() {
            Some(guard) => match guard.as_ref() {
                Some(sweeper) if !sweeper.handle.is_finished() => "running",
                _ => "stopped",
            },
            None => "locked",
        };

        f.debug_struct("Cache")
            .field("config", &self.inner.config)
            .field("sweeper", &sweeper)
            .finish()
    }
}

impl<V: Clone + Send + 'static> Cache<V> {
    // == Constructor ==
    /// Creates a cache from a validated configuration.
    ///
    /// Starts the sweeper when `sweeper_interval` is set, which requires a
    /// running tokio runtime.
    ///
    /// # Errors
    /// `Configuration` for an invalid config or a sweeper with no runtime.
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;

        let cache = Self {
            inner: Arc::new(CacheInner {
                keys: KeyDeriver::from_config(&config),
                store: Arc::new(CacheStore::new()),
                scopes: ScopeState::default(),
                sweeper: Mutex::new(None),
                config,
            }),
        };

        if let Some(interval) = cache.inner.config.sweeper_interval {
            cache.start_sweeper(interval)?;
        }

        Ok(cache)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn key_deriver(&self) -> &KeyDeriver {
        &self.inner.keys
    }

    // == Container Surface ==
    /// Number of cached entries (reservations excluded).
    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.store.contains(key)
    }

    /// Returns the entry under `key`, `NotFound` if absent or reserved.
    pub fn get(&self, key: &str) -> Result<CacheEntry<V>> {
        self.inner.store.get(key)
    }

    pub fn insert(&self, key: impl Into<String>, entry: CacheEntry<V>) {
        self.inner.store.insert(key, entry);
    }

    /// Deletes the entry under `key`, `NotFound` if absent or reserved.
    pub fn remove(&self, key: &str) -> Result<()> {
        self.inner.store.remove(key)
    }

    pub fn pop(&self, key: &str) -> Result<CacheEntry<V>> {
        self.inner.store.pop(key)
    }

    /// Removes an arbitrary entry. Only meant for tests and diagnostics.
    pub fn pop_item(&self) -> Option<(String, CacheEntry<V>)> {
        self.inner.store.pop_item()
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.store.keys()
    }

    pub fn values(&self) -> Vec<CacheEntry<V>> {
        self.inner.store.values()
    }

    pub fn items(&self) -> Vec<(String, CacheEntry<V>)> {
        self.inner.store.items()
    }

    /// Drops every cached entry and resets hit counters.
    pub fn clear(&self) {
        self.inner.store.clear();
        if self.inner.config.verbose() {
            debug!("cache cleared");
        }
    }

    /// True when `key` is claimed by a registration but holds no value yet.
    pub fn is_reserved(&self, key: &str) -> bool {
        self.inner.store.is_reserved(key)
    }

    /// Hit counts per key. Always empty unless debug mode is on.
    pub fn hit_counters(&self) -> HitCounters {
        self.inner.store.hit_counters()
    }

    // == Collect ==
    /// Removes expired entries, plus entries created after `since` if given.
    ///
    /// Returns the number of entries removed.
    pub fn collect(&self, since: Option<DateTime<Utc>>) -> usize {
        let removed = self.inner.store.collect(since);
        if removed > 0 && self.inner.config.verbose() {
            debug!("collected {} entries", removed);
        }
        removed
    }

    // == Scopes ==
    /// Forces every memoized call to use `timeout` until the guard drops.
    ///
    /// # Errors
    /// `Configuration` if `timeout` is not a whole number of seconds.
    pub fn override_timeout(&self, timeout: Duration) -> Result<TimeoutOverride<'_>> {
        let secs = whole_seconds(timeout, "override timeout")?;
        Ok(self.inner.scopes.push_timeout(secs))
    }

    /// Bypasses the store for every memoized call until the guard drops.
    pub fn disable_caching(&self) -> CachingDisabled<'_> {
        self.inner.scopes.push_disabled()
    }

    pub fn caching_enabled(&self) -> bool {
        self.inner.scopes.caching_enabled()
    }

    /// Timeout in seconds for a call: override, then registration, then
    /// default. Zero means the entry never expires.
    pub fn effective_timeout(&self, registered: Option<u64>) -> u64 {
        self.inner
            .scopes
            .override_timeout()
            .or(registered)
            .unwrap_or_else(|| self.inner.config.default_timeout_secs())
    }

    // == Registration ==
    /// Wraps `func` so its results are memoized in this cache.
    ///
    /// Validation and key reservation happen here, once, so misconfiguration
    /// surfaces before the first call.
    ///
    /// # Errors
    /// - `Configuration` if the timeout is not a whole number of seconds
    /// - `Collision` if the explicit key is already registered or cached
    pub fn cached<F, R>(
        &self,
        signature: Signature,
        options: CachedOptions,
        func: F,
    ) -> Result<Memoized<V, F>>
    where
        F: Fn(&Args) -> R,
    {
        let timeout = options
            .timeout
            .map(|timeout| whole_seconds(timeout, "timeout"))
            .transpose()?;

        let key = options.key.filter(|key| !key.is_empty());
        if let Some(key) = &key {
            self.inner.store.reserve(&self.inner.keys.reserved_key(key))?;
        }

        Ok(Memoized::new(self.clone(), signature, key, timeout, func))
    }

    /// Wraps `func` so every call clears the whole cache first.
    pub fn clear_cache<F, R>(&self, func: F) -> ClearCache<V, F>
    where
        F: Fn(&Args) -> R,
    {
        ClearCache::new(self.clone(), func)
    }

    // == Memoization ==
    /// Serves `key` from the cache, or computes, stores and returns it.
    ///
    /// `timeout` plays the part of a registration timeout: an active override
    /// still wins over it, and `None` falls back to the default.
    ///
    /// # Errors
    /// `Configuration` if `timeout` is not a whole number of seconds. Nothing
    /// is computed in that case.
    pub fn memoize_with<F>(&self, key: &str, timeout: Option<Duration>, compute: F) -> Result<V>
    where
        F: FnOnce() -> V,
    {
        let timeout = timeout
            .map(|timeout| whole_seconds(timeout, "timeout"))
            .transpose()?;

        match self.serve(key, timeout, || Ok::<V, Infallible>(compute())) {
            Ok(value) => Ok(value),
            Err(never) => match never {},
        }
    }

    /// Like [`Cache::memoize_with`] for fallible computations. Errors from
    /// `compute` are returned untouched and never cached; a bad timeout comes
    /// back converted into `E`.
    pub fn try_memoize_with<F, E>(
        &self,
        key: &str,
        timeout: Option<Duration>,
        compute: F,
    ) -> std::result::Result<V, E>
    where
        F: FnOnce() -> std::result::Result<V, E>,
        E: From<CacheError>,
    {
        let timeout = timeout
            .map(|timeout| whole_seconds(timeout, "timeout"))
            .transpose()?;

        self.serve(key, timeout, compute)
    }

    /// The per-call protocol shared by every memoized wrapper.
    ///
    /// The store lock is never held while `compute` runs, so two concurrent
    /// misses on one key may both compute; the last write wins.
    pub(crate) fn serve<F, E>(
        &self,
        key: &str,
        registered_timeout: Option<u64>,
        compute: F,
    ) -> std::result::Result<V, E>
    where
        F: FnOnce() -> std::result::Result<V, E>,
    {
        if !self.caching_enabled() {
            return compute();
        }

        let verbose = self.inner.config.verbose();
        let timeout = self.effective_timeout(registered_timeout);

        match self.inner.store.get(key) {
            Ok(entry) if !entry.is_expired() => {
                if verbose {
                    debug!("cache hit: {}", key);
                }
                if self.inner.config.debug {
                    self.inner.store.record_hit(key);
                }
                return Ok(entry.value);
            }
            Ok(_) => {
                if verbose {
                    debug!("cache timeout: {}", key);
                }
            }
            // Absent, reserved, or removed by another thread: all misses
            Err(_) => {}
        }

        if verbose {
            debug!("caching {}", key);
        }

        let value = compute()?;
        self.inner
            .store
            .insert(key, CacheEntry::new(value.clone(), Some(timeout)));
        Ok(value)
    }

    // == Sweeper Lifecycle ==
    /// Starts the background sweeper.
    ///
    /// # Errors
    /// `Configuration` for a zero interval, an already running sweeper, or no
    /// tokio runtime.
    pub fn start_sweeper(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(CacheError::Configuration(
                "sweeper_interval must be greater than zero".to_string(),
            ));
        }

        let mut slot = self.inner.sweeper.lock();
        if slot.as_ref().is_some_and(|s| !s.handle.is_finished()) {
            return Err(CacheError::Configuration(
                "sweeper is already running".to_string(),
            ));
        }

        let (stop, stop_rx) = watch::channel(false);
        let handle = spawn_sweeper(Arc::clone(&self.inner.store), interval, stop_rx)?;
        *slot = Some(Sweeper {
            interval,
            stop,
            handle,
        });

        Ok(())
    }

    pub fn sweeper_state(&self) -> SweeperState {
        match self.inner.sweeper.lock().as_ref() {
            Some(sweeper) if !sweeper.handle.is_finished() => SweeperState::Running,
            _ => SweeperState::Stopped,
        }
    }

    /// Interval of the running sweeper, if any.
    pub fn sweeper_interval(&self) -> Option<Duration> {
        self.inner.sweeper.lock().as_ref().map(|sweeper| sweeper.interval)
    }

    /// Signals the sweeper to stop and waits for it to exit.
    ///
    /// A no-op when no sweeper is running.
    pub async fn stop_sweeper(&self) {
        let sweeper = self.inner.sweeper.lock().take();

        if let Some(sweeper) = sweeper {
            // A send error only means the task already exited
            let _ = sweeper.stop.send(true);
            if let Err(e) = sweeper.handle.await {
                warn!("Cache sweeper ended abnormally: {}", e);
            }
        }
    }
}

impl<V> Cache<V>
where
    V: Clone + Send + Serialize + 'static,
{
    // == Dump ==
    /// Renders all cached entries as pretty JSON, sorted by key.
    ///
    /// Takes a single snapshot, so writers are blocked for one lock
    /// acquisition at most.
    pub fn dump(&self) -> Result<String> {
        let items = self.items();
        let rendered: BTreeMap<&str, DumpEntry<'_, V>> = items
            .iter()
            .map(|(key, entry)| (key.as_str(), DumpEntry::new(entry)))
            .collect();

        Ok(serde_json::to_string_pretty(&rendered)?)
    }

    // == Serialize ==
    /// Writes an opaque snapshot of the whole store to `path`.
    ///
    /// The format is not guaranteed to be readable by other versions.
    pub fn serialize(&self, path: impl AsRef<Path>) -> Result<()> {
        let slots = self.inner.store.slots();
        let bytes = encode_snapshot(&slots)?;
        std::fs::write(path.as_ref(), bytes)?;

        info!(
            count = slots.len(),
            "Cache snapshot written to {}",
            path.as_ref().display()
        );
        Ok(())
    }
}

impl<V> Cache<V>
where
    V: Clone + Send + DeserializeOwned + 'static,
{
    // == Deserialize ==
    /// Replaces the whole store with a snapshot read from `path`.
    ///
    /// # Errors
    /// `Io`, `Snapshot` or `Serialization`; the store is untouched on error.
    pub fn deserialize(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = std::fs::read(path.as_ref())?;
        let slots = decode_snapshot(&bytes)?;
        let count = slots.len();
        self.inner.store.replace_all(slots);

        info!(count, "Cache snapshot loaded from {}", path.as_ref().display());
        Ok(())
    }
}
