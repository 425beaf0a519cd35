//! Background Tasks Module
//!
//! Contains background tasks that run alongside a cache.
//!
//! # Tasks
//! - Sweeper: Evicts expired cache entries at configured intervals

mod sweeper;

pub use sweeper::spawn_sweeper;
