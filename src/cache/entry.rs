//! Cache Entry Module
//!
//! Defines cached entries with TTL support and the reserved slot marker.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

// == Cache Entry ==
/// A single cached value with its creation and expiration times.
///
/// Entries are never mutated once built; refreshing a key stores a new entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Expiration timestamp, None = no expiration
    pub expires_at: Option<DateTime<Utc>>,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry with optional TTL.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `ttl_seconds` - TTL in seconds; `None` or `Some(0)` never expires
    pub fn new(value: V, ttl_seconds: Option<u64>) -> Self {
        let now = Utc::now();
        // A TTL too large to represent saturates to "never expires"
        let expires_at = ttl_seconds
            .filter(|ttl| *ttl > 0)
            .and_then(|ttl| i64::try_from(ttl).ok())
            .and_then(ChronoDuration::try_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl));

        Self {
            value,
            created_at: now,
            expires_at,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time reaches its expiration time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Checks expiration against a given instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    /// True when the entry was created strictly after `since`.
    pub fn created_after(&self, since: DateTime<Utc>) -> bool {
        self.created_at > since
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(0)` if the entry has expired
    /// - `Some(remaining_ms)` if the entry has TTL and hasn't expired
    /// - `None` if the entry never expires
    pub fn ttl_remaining_ms(&self) -> Option<u64> {
        self.expires_at.map(|expires| {
            let remaining = (expires - Utc::now()).num_milliseconds();
            u64::try_from(remaining).unwrap_or(0)
        })
    }

    /// Returns remaining TTL in seconds, or None if no expiration is set.
    pub fn ttl_remaining(&self) -> Option<u64> {
        self.ttl_remaining_ms().map(|ms| ms / 1000)
    }
}

// == Slot ==
/// What a key in the store's backing map holds.
///
/// `Reserved` claims an explicit key at registration time, before the
/// memoized function has produced anything. It is present for collision
/// detection but invisible to lookups and counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Slot<V> {
    /// Key claimed by a registration, nothing cached yet
    Reserved,
    /// A real cached entry
    Cached(CacheEntry<V>),
}

impl<V> Slot<V> {
    /// Returns the cached entry, if any.
    pub fn entry(&self) -> Option<&CacheEntry<V>> {
        match self {
            Slot::Cached(entry) => Some(entry),
            Slot::Reserved => None,
        }
    }

    pub fn is_reserved(&self) -> bool {
        matches!(self, Slot::Reserved)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn test_entry_creation_no_ttl() {
        let entry = CacheEntry::new("test_value".to_string(), None);

        assert_eq!(entry.value, "test_value");
        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_entry_zero_ttl_never_expires() {
        let entry = CacheEntry::new(1, Some(0));
        assert!(entry.expires_at.is_none());
        assert!(entry.ttl_remaining().is_none());
    }

    #[test]
    fn test_entry_creation_with_ttl() {
        let entry = CacheEntry::new("test_value".to_string(), Some(60));

        assert!(entry.expires_at.is_some());
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_entry_expiration() {
        let entry = CacheEntry::new(64, Some(1));

        assert!(!entry.is_expired());

        sleep(Duration::from_millis(1100));

        assert!(entry.is_expired());
    }

    #[test]
    fn test_ttl_remaining() {
        let entry = CacheEntry::new(0u8, Some(10));

        let remaining = entry.ttl_remaining().unwrap();
        assert!(remaining <= 10);
        assert!(remaining >= 9);

        let remaining_ms = entry.ttl_remaining_ms().unwrap();
        assert!(remaining_ms <= 10_000);
        assert!(remaining_ms >= 9_000);
    }

    #[test]
    fn test_ttl_remaining_expired() {
        let now = Utc::now();
        let entry = CacheEntry {
            value: (),
            created_at: now - ChronoDuration::seconds(5),
            expires_at: Some(now - ChronoDuration::seconds(1)),
        };

        assert_eq!(entry.ttl_remaining().unwrap(), 0);
        assert_eq!(entry.ttl_remaining_ms().unwrap(), 0);
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let now = Utc::now();
        let entry = CacheEntry {
            value: "test".to_string(),
            created_at: now,
            expires_at: Some(now),
        };

        assert!(entry.is_expired_at(now), "Entry should be expired at boundary");
        assert!(!entry.is_expired_at(now - ChronoDuration::milliseconds(1)));
    }

    #[test]
    fn test_created_after() {
        let entry = CacheEntry::new(1, None);
        assert!(entry.created_after(entry.created_at - ChronoDuration::seconds(1)));
        assert!(!entry.created_after(entry.created_at));
    }

    #[test]
    fn test_slot_accessors() {
        let reserved: Slot<i32> = Slot::Reserved;
        assert!(reserved.is_reserved());
        assert!(reserved.entry().is_none());

        let cached = Slot::Cached(CacheEntry::new(7, None));
        assert!(!cached.is_reserved());
        assert_eq!(cached.entry().map(|e| e.value), Some(7));
    }
}
