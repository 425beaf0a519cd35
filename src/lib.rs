//! Memo Cache - An in-process memoization cache
//!
//! Memoizes function results under deterministic keys, with TTL expiration,
//! explicit-key collision detection and an optional background sweeper.

pub mod cache;
pub mod config;
pub mod error;
pub mod memo;
pub mod models;
pub mod tasks;

pub use cache::{Args, CacheEntry, Signature};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use memo::{
    Cache, CachedOptions, CachingDisabled, ClearCache, Memoized, SweeperState, TimeoutOverride,
};
pub use tasks::spawn_sweeper;
