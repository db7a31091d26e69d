//! Expiry Sweeper Task
//!
//! Background task that periodically removes time-expired entries from the
//! memory tier and expired or unparseable envelopes from the durable tier.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheStore;

/// Spawns a background task that periodically sweeps both cache tiers.
///
/// The task runs in an infinite loop, sleeping for the specified interval
/// between passes. It acquires a write lock on the store for the duration of
/// each pass; get/set calls are never blocked between passes.
///
/// # Arguments
/// * `store` - Shared reference to the tiered store
/// * `interval_secs` - Interval in seconds between sweep passes
///
/// # Returns
/// A JoinHandle for the spawned task, aborted by the manager's `dispose`.
pub fn spawn_sweeper_task(
    store: Arc<RwLock<CacheStore>>,
    interval_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting cache sweeper with interval of {} seconds",
            interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            let (memory_removed, durable_removed) = {
                let mut store_guard = store.write().await;
                store_guard.sweep_expired()
            };

            if memory_removed > 0 || durable_removed > 0 {
                info!(
                    "Sweep removed {} memory entries, {} durable entries",
                    memory_removed, durable_removed
                );
            } else {
                debug!("Sweep found no expired entries");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEntry, MemoryMedium};
    use crate::config::CacheConfig;
    use std::time::Duration;

    fn shared_store() -> Arc<RwLock<CacheStore>> {
        let config = CacheConfig::default();
        Arc::new(RwLock::new(CacheStore::new(
            &config,
            Box::new(MemoryMedium::new()),
        )))
    }

    fn entry(ttl_ms: u64) -> CacheEntry {
        CacheEntry::new("\"v\"".to_string(), ttl_ms, "1".to_string())
    }

    #[tokio::test]
    async fn test_sweeper_removes_expired_entries() {
        let store = shared_store();
        {
            let mut guard = store.write().await;
            guard.set_entry("expire_soon", entry(100));
        }

        let handle = spawn_sweeper_task(store.clone(), 1);

        tokio::time::sleep(Duration::from_millis(2500)).await;

        {
            let mut guard = store.write().await;
            assert!(
                guard.get_any("expire_soon").is_none(),
                "Expired entry should have been swept"
            );
        }

        handle.abort();
    }

    #[tokio::test]
    async fn test_sweeper_preserves_valid_entries() {
        let store = shared_store();
        {
            let mut guard = store.write().await;
            guard.set_entry("long_lived", entry(3_600_000));
        }

        let handle = spawn_sweeper_task(store.clone(), 1);

        tokio::time::sleep(Duration::from_millis(1500)).await;

        {
            let mut guard = store.write().await;
            let got = guard.get_fresh("long_lived");
            assert!(got.is_some(), "Valid entry should not be swept");
            assert_eq!(got.unwrap().data, "\"v\"");
        }

        handle.abort();
    }

    #[tokio::test]
    async fn test_sweeper_can_be_aborted() {
        let store = shared_store();

        let handle = spawn_sweeper_task(store, 1);
        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
