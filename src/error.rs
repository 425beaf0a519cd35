//! Error types for the memoization cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
///
/// `Configuration` and `Collision` are raised at setup time (construction or
/// registration), never on a memoized call.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Invalid construction or registration parameters
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An explicit key is already registered or cached
    #[error("Cache key collision: {0}")]
    Collision(String),

    /// Key not found in cache (absent or only reserved)
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Persisted snapshot could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Value or snapshot (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisted snapshot has an unexpected header
    #[error("Invalid snapshot: {0}")]
    Snapshot(String),
}

impl CacheError {
    /// Returns true for the not-found condition the memoizer treats as a miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
