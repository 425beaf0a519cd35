//! Data models for cache dumps and persisted snapshots
//!
//! Defines the JSON shape of `dump()` and the on-disk snapshot format.

pub mod snapshot;

// Re-export commonly used types
pub use snapshot::{decode_snapshot, encode_snapshot, DumpEntry, SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
