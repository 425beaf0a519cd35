//! Dump and snapshot formats
//!
//! `dump()` renders entries as pretty JSON for diagnostics. Persisted
//! snapshots are opaque: the format may change between versions and is not
//! meant to be read by other versions of this crate.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::{CacheEntry, Slot};
use crate::error::{CacheError, Result};

/// File format magic bytes
pub const SNAPSHOT_MAGIC: &[u8; 4] = b"MEMO";
/// Current file format version
pub const SNAPSHOT_VERSION: u8 = 1;

const HEADER_LEN: usize = 13;

/// One entry as rendered by `dump()`.
#[derive(Debug, Clone, Serialize)]
pub struct DumpEntry<'a, V> {
    /// The cached value
    pub value: &'a V,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Expiration timestamp, null when the entry never expires
    pub expires_at: Option<DateTime<Utc>>,
    /// Remaining lifetime in seconds, null when the entry never expires
    pub ttl_remaining: Option<u64>,
}

impl<'a, V> DumpEntry<'a, V> {
    pub fn new(entry: &'a CacheEntry<V>) -> Self {
        Self {
            value: &entry.value,
            created_at: entry.created_at,
            expires_at: entry.expires_at,
            ttl_remaining: entry.ttl_remaining(),
        }
    }
}

/// Encodes the full backing map, reservations included.
///
/// ```text
/// magic (4 bytes): "MEMO"
/// version (1 byte): 1
/// count (8 bytes): number of slots, little endian
/// slots (variable): JSON map of key to slot
/// ```
pub fn encode_snapshot<V: Serialize>(slots: &HashMap<String, Slot<V>>) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(slots)?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(SNAPSHOT_MAGIC);
    bytes.push(SNAPSHOT_VERSION);
    bytes.extend_from_slice(&(slots.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&payload);

    Ok(bytes)
}

/// Decodes a snapshot produced by [`encode_snapshot`].
///
/// # Errors
/// `Snapshot` for a short file, bad magic, unknown version or a slot count
/// that does not match the payload; `Serialization` for a corrupt payload.
pub fn decode_snapshot<V: DeserializeOwned>(bytes: &[u8]) -> Result<HashMap<String, Slot<V>>> {
    if bytes.len() < HEADER_LEN {
        return Err(CacheError::Snapshot("file too short".to_string()));
    }

    if &bytes[0..4] != SNAPSHOT_MAGIC {
        return Err(CacheError::Snapshot("invalid magic bytes".to_string()));
    }

    let version = bytes[4];
    if version != SNAPSHOT_VERSION {
        return Err(CacheError::Snapshot(format!(
            "unsupported version {} (expected {})",
            version, SNAPSHOT_VERSION
        )));
    }

    let mut count = [0u8; 8];
    count.copy_from_slice(&bytes[5..HEADER_LEN]);
    let count = u64::from_le_bytes(count);

    let slots: HashMap<String, Slot<V>> = serde_json::from_slice(&bytes[HEADER_LEN..])?;
    if slots.len() as u64 != count {
        return Err(CacheError::Snapshot(format!(
            "expected {} slots, found {}",
            count,
            slots.len()
        )));
    }

    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> HashMap<String, Slot<i64>> {
        let mut slots = HashMap::new();
        slots.insert("a".to_string(), Slot::Cached(CacheEntry::new(64, Some(60))));
        slots.insert("test".to_string(), Slot::Reserved);
        slots
    }

    #[test]
    fn test_snapshot_header() {
        let bytes = encode_snapshot(&sample()).unwrap();
        assert_eq!(&bytes[0..4], b"MEMO");
        assert_eq!(bytes[4], SNAPSHOT_VERSION);
        assert_eq!(u64::from_le_bytes(bytes[5..13].try_into().unwrap()), 2);
    }

    #[test]
    fn test_snapshot_preserves_reservations() {
        let slots = sample();
        let decoded: HashMap<String, Slot<i64>> =
            decode_snapshot(&encode_snapshot(&slots).unwrap()).unwrap();
        assert_eq!(decoded, slots);
        assert!(decoded["test"].is_reserved());
    }

    #[test]
    fn test_decode_rejects_bad_header() {
        assert!(matches!(
            decode_snapshot::<i64>(b"MEMO"),
            Err(CacheError::Snapshot(_))
        ));

        let mut bytes = encode_snapshot(&sample()).unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            decode_snapshot::<i64>(&bytes),
            Err(CacheError::Snapshot(_))
        ));

        let mut bytes = encode_snapshot(&sample()).unwrap();
        bytes[4] = SNAPSHOT_VERSION + 1;
        assert!(matches!(
            decode_snapshot::<i64>(&bytes),
            Err(CacheError::Snapshot(_))
        ));
    }

    #[test]
    fn test_decode_rejects_corrupt_payload() {
        let mut bytes = encode_snapshot(&sample()).unwrap();
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            decode_snapshot::<i64>(&bytes),
            Err(CacheError::Serialization(_))
        ));
    }

    #[test]
    fn test_dump_entry_serialize() {
        let entry = CacheEntry::new("hello".to_string(), None);
        let json = serde_json::to_value(DumpEntry::new(&entry)).unwrap();
        assert_eq!(json["value"], "hello");
        assert!(json["expires_at"].is_null());
        assert!(json["ttl_remaining"].is_null());
        assert!(json["created_at"].is_string());
    }
}
