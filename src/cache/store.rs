//! Cache Store Module
//!
//! Thread-safe keyed container behind a single lock, holding cached entries,
//! reserved key slots and debug hit counters.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::trace;

use crate::cache::{CacheEntry, HitCounters, Slot};
use crate::error::{CacheError, Result};

#[derive(Debug)]
struct StoreState<V> {
    slots: HashMap<String, Slot<V>>,
    counters: HitCounters,
}

// == Cache Store ==
/// Thread-safe mapping from cache key to entry.
///
/// Every operation takes the one lock for its whole duration and never calls
/// user code while holding it. Reserved slots are kept in the backing map for
/// collision detection but are invisible to lookups, counts and iteration.
#[derive(Debug)]
pub struct CacheStore<V> {
    state: Mutex<StoreState<V>>,
}

impl<V> Default for CacheStore<V> {
    fn default() -> Self {
        Self {
            state: Mutex::new(StoreState {
                slots: HashMap::new(),
                counters: HitCounters::new(),
            }),
        }
    }
}

impl<V: Clone> CacheStore<V> {
    // == Constructor ==
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // == Length ==
    /// Number of cached entries, reserved slots excluded.
    pub fn len(&self) -> usize {
        let state = self.state.lock();
        state.slots.values().filter(|slot| !slot.is_reserved()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // == Contains ==
    /// True when `key` holds a real entry (expired or not).
    pub fn contains(&self, key: &str) -> bool {
        let state = self.state.lock();
        matches!(state.slots.get(key), Some(Slot::Cached(_)))
    }

    // == Get ==
    /// Returns a copy of the entry stored under `key`.
    ///
    /// # Errors
    /// `NotFound` if the key is absent or only reserved.
    pub fn get(&self, key: &str) -> Result<CacheEntry<V>> {
        let state = self.state.lock();
        match state.slots.get(key) {
            Some(Slot::Cached(entry)) => Ok(entry.clone()),
            _ => Err(CacheError::NotFound(key.to_string())),
        }
    }

    // == Insert ==
    /// Stores an entry, replacing whatever the key held. Last write wins.
    pub fn insert(&self, key: impl Into<String>, entry: CacheEntry<V>) {
        let mut state = self.state.lock();
        state.slots.insert(key.into(), Slot::Cached(entry));
    }

    // == Delete ==
    /// Removes the entry under `key`.
    ///
    /// # Errors
    /// `NotFound` if the key is absent or only reserved; a reservation is left
    /// in place.
    pub fn remove(&self, key: &str) -> Result<()> {
        self.pop(key).map(|_| ())
    }

    // == Pop ==
    /// Removes and returns the entry under `key`.
    pub fn pop(&self, key: &str) -> Result<CacheEntry<V>> {
        let mut state = self.state.lock();
        match state.slots.get(key) {
            Some(Slot::Cached(_)) => match state.slots.remove(key) {
                Some(Slot::Cached(entry)) => Ok(entry),
                _ => Err(CacheError::NotFound(key.to_string())),
            },
            _ => Err(CacheError::NotFound(key.to_string())),
        }
    }

    /// Removes and returns an arbitrary entry. No ordering guarantee.
    pub fn pop_item(&self) -> Option<(String, CacheEntry<V>)> {
        let mut state = self.state.lock();
        let key = state
            .slots
            .iter()
            .find(|(_, slot)| !slot.is_reserved())
            .map(|(key, _)| key.clone())?;

        match state.slots.remove(&key) {
            Some(Slot::Cached(entry)) => Some((key, entry)),
            _ => None,
        }
    }

    // == Snapshots ==
    /// Keys of all cached entries, as of one lock acquisition.
    pub fn keys(&self) -> Vec<String> {
        self.items().into_iter().map(|(key, _)| key).collect()
    }

    /// All cached entries, as of one lock acquisition.
    pub fn values(&self) -> Vec<CacheEntry<V>> {
        self.items().into_iter().map(|(_, entry)| entry).collect()
    }

    /// All `(key, entry)` pairs, as of one lock acquisition.
    pub fn items(&self) -> Vec<(String, CacheEntry<V>)> {
        let state = self.state.lock();
        state
            .slots
            .iter()
            .filter_map(|(key, slot)| slot.entry().map(|entry| (key.clone(), entry.clone())))
            .collect()
    }

    /// Raw copy of the backing map, reservations included.
    pub fn slots(&self) -> HashMap<String, Slot<V>> {
        self.state.lock().slots.clone()
    }

    // == Clear ==
    /// Drops every cached entry and resets hit counters.
    ///
    /// Reservations survive so explicit keys stay claimed.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.slots.retain(|_, slot| slot.is_reserved());
        state.counters.clear();
    }

    /// Replaces the whole backing map, resetting hit counters.
    pub fn replace_all(&self, slots: HashMap<String, Slot<V>>) {
        let mut state = self.state.lock();
        state.slots = slots;
        state.counters.clear();
    }

    // == Reservations ==
    /// Claims `key` for a registration.
    ///
    /// # Errors
    /// `Collision` if the key already holds an entry or a reservation.
    pub fn reserve(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock();
        match state.slots.get(key) {
            Some(Slot::Reserved) => Err(CacheError::Collision(format!(
                "cache key '{}' is already registered",
                key
            ))),
            Some(Slot::Cached(_)) => Err(CacheError::Collision(format!(
                "cache key '{}' already exists",
                key
            ))),
            None => {
                state.slots.insert(key.to_string(), Slot::Reserved);
                Ok(())
            }
        }
    }

    pub fn is_reserved(&self, key: &str) -> bool {
        matches!(self.state.lock().slots.get(key), Some(Slot::Reserved))
    }

    // == Hit Counters ==
    /// Counts a hit on `key`.
    pub fn record_hit(&self, key: &str) {
        self.state.lock().counters.record_hit(key);
    }

    /// Copy of the current hit counters.
    pub fn hit_counters(&self) -> HitCounters {
        self.state.lock().counters.clone()
    }

    // == Collect ==
    /// Removes entries that have expired, or that were created after `since`.
    ///
    /// Candidates are picked from a snapshot, then removed one at a time. Each
    /// removal re-checks the entry under the lock, so a key already gone or
    /// refreshed in the meantime is left alone.
    ///
    /// Returns the number of entries removed.
    pub fn collect(&self, since: Option<DateTime<Utc>>) -> usize {
        let now = Utc::now();
        let stale = |entry: &CacheEntry<V>| {
            entry.is_expired_at(now) || since.is_some_and(|since| entry.created_after(since))
        };

        let candidates: Vec<String> = self
            .items()
            .into_iter()
            .filter(|(_, entry)| stale(entry))
            .map(|(key, _)| key)
            .collect();

        let mut removed = 0;
        for key in candidates {
            let mut state = self.state.lock();
            let still_stale = matches!(state.slots.get(&key), Some(Slot::Cached(entry)) if stale(entry));
            if still_stale {
                state.slots.remove(&key);
                removed += 1;
                trace!("collected {}", key);
            }
        }

        removed
    }
}
