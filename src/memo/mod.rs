//! Memo Module
//!
//! The cache handle, memoized function wrappers and scoped overrides.

mod cache;
mod cached;
mod scope;

pub use cache::{Cache, SweeperState};
pub use cached::{CachedOptions, ClearCache, Memoized};
pub use scope::{CachingDisabled, TimeoutOverride};
