//! Expiration Sweeper Task
//!
//! Background task that periodically evicts expired cache entries, so stale
//! entries go away without waiting for a cache access.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::cache::CacheStore;
use crate::error::{CacheError, Result};

/// Spawns a background task that periodically collects expired entries.
///
/// The next sweep is scheduled `interval` after the previous one finished,
/// not after the missed deadline. The task exits as soon as `stop` receives
/// `true` or its sender is dropped.
///
/// # Arguments
/// * `store` - Shared store to sweep
/// * `interval` - Time between sweeps
/// * `stop` - Stop signal
///
/// # Errors
/// `Configuration` when called outside a tokio runtime.
///
/// # Example
/// ```ignore
/// let (stop_tx, stop_rx) = watch::channel(false);
/// let handle = spawn_sweeper(store.clone(), Duration::from_secs(1), stop_rx)?;
/// // Later, during shutdown:
/// stop_tx.send(true)?;
/// handle.await?;
/// ```
pub fn spawn_sweeper<V>(
    store: Arc<CacheStore<V>>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) -> Result<JoinHandle<()>>
where
    V: Clone + Send + 'static,
{
    let runtime = Handle::try_current().map_err(|e| {
        CacheError::Configuration(format!("sweeper requires a running tokio runtime: {}", e))
    })?;

    Ok(runtime.spawn(async move {
        info!("Starting cache sweeper with interval of {:?}", interval);

        let mut next_sweep = Instant::now() + interval;

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(next_sweep) => {
                    let removed = store.collect(None);

                    if removed > 0 {
                        info!("Cache sweep: removed {} expired entries", removed);
                    } else {
                        debug!("Cache sweep: no expired entries found");
                    }

                    next_sweep = Instant::now() + interval;
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Cache sweeper stopped");
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEntry;
    use chrono::{Duration as ChronoDuration, Utc};

    fn expired_entry() -> CacheEntry<String> {
        let now = Utc::now();
        CacheEntry {
            value: "value".to_string(),
            created_at: now - ChronoDuration::seconds(5),
            expires_at: Some(now - ChronoDuration::seconds(1)),
        }
    }

    #[tokio::test]
    async fn test_sweeper_removes_expired_entries() {
        let store = Arc::new(CacheStore::new());
        store.insert("expired", expired_entry());

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn_sweeper(store.clone(), Duration::from_millis(100), stop_rx).unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(!store.contains("expired"), "Expired entry should have been swept");

        stop_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_sweeper_preserves_valid_entries() {
        let store = Arc::new(CacheStore::new());
        store.insert("long_lived", CacheEntry::new("value".to_string(), Some(3600)));
        store.insert("forever", CacheEntry::new("value".to_string(), None));

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn_sweeper(store.clone(), Duration::from_millis(100), stop_rx).unwrap();

        tokio::time::sleep(Duration::from_millis(350)).await;

        assert_eq!(store.len(), 2, "Valid entries should not be removed");

        stop_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_sweeper_stops_promptly() {
        let store: Arc<CacheStore<String>> = Arc::new(CacheStore::new());

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn_sweeper(store, Duration::from_secs(3600), stop_rx).unwrap();

        stop_tx.send(true).unwrap();

        let joined = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(joined.is_ok(), "Sweeper should stop well within one interval");
    }

    #[tokio::test]
    async fn test_sweeper_stops_when_sender_dropped() {
        let store: Arc<CacheStore<String>> = Arc::new(CacheStore::new());

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn_sweeper(store, Duration::from_secs(3600), stop_rx).unwrap();

        drop(stop_tx);

        let joined = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(joined.is_ok(), "Sweeper should exit once its stop sender is gone");
    }

    #[test]
    fn test_sweeper_requires_runtime() {
        let store: Arc<CacheStore<String>> = Arc::new(CacheStore::new());
        let (_stop_tx, stop_rx) = watch::channel(false);

        let result = spawn_sweeper(store, Duration::from_secs(1), stop_rx);
        assert!(matches!(result, Err(CacheError::Configuration(_))));
    }
}
