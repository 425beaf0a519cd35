//! Cache Module
//!
//! Storage primitives for memoization: entries with TTL expiration, the
//! locked store, debug hit counters and key derivation.

mod counters;
mod entry;
mod key;
mod store;


// Re-export public types
pub use counters::HitCounters;
pub use entry::{CacheEntry, Slot};
pub use key::{Args, KeyDeriver, Param, Signature};
pub use store::CacheStore;
