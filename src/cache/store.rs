//! Cache Store Module
//!
//! Combines the in-memory tier with its durable mirror behind one mutation
//! surface, so every write lands in both tiers and the size bound is
//! enforced in the same critical section as the insert.

use std::collections::HashMap;

use tracing::warn;

use crate::cache::durable::{DurableMedium, DurableStore};
use crate::cache::{CacheEntry, CacheStats};
use crate::config::CacheConfig;

// == Cache Store ==
/// Two-tier cache storage: bounded in-memory map plus best-effort durable
/// mirror.
pub struct CacheStore {
    /// In-memory tier
    entries: HashMap<String, CacheEntry>,
    /// Durable mirror
    durable: DurableStore,
    /// Performance counters
    stats: CacheStats,
    /// Maximum number of in-memory entries
    max_entries: usize,
    /// Default TTL in milliseconds for entries without explicit TTL
    default_ttl_ms: u64,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a CacheStore over the given durable medium and immediately
    /// repopulates the memory tier from it. Expired or corrupt persisted
    /// entries are deleted during this pass.
    pub fn new(config: &CacheConfig, medium: Box<dyn DurableMedium>) -> Self {
        let durable = DurableStore::new(medium, config.key_prefix.clone());

        let mut entries = HashMap::new();
        for (key, entry) in durable.load_all() {
            entries.insert(key, entry);
        }

        let mut store = Self {
            entries,
            durable,
            stats: CacheStats::new(),
            max_entries: config.max_entries,
            default_ttl_ms: config.default_ttl_ms,
        };
        store.enforce_bound();
        store
    }

    /// Default TTL applied when a caller supplies none.
    pub fn default_ttl_ms(&self) -> u64 {
        self.default_ttl_ms
    }

    // == Get Fresh ==
    /// Returns a non-expired entry for the key, consulting the memory tier
    /// first and promoting a durable hit into it. Expired entries are left
    /// in place for the degraded read paths; the sweeper removes them.
    pub fn get_fresh(&mut self, key: &str) -> Option<CacheEntry> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                self.stats.record_hit();
                return Some(entry.clone());
            }
        }

        if let Some(entry) = self.durable.get(key) {
            if !entry.is_expired() {
                self.entries.insert(key.to_string(), entry.clone());
                self.enforce_bound();
                self.stats.record_hit();
                return Some(entry);
            }
        }

        self.stats.record_miss();
        None
    }

    // == Get Any ==
    /// Returns whatever entry exists for the key regardless of freshness,
    /// memory tier first. Used by the degraded paths of network-first and
    /// stale-while-revalidate.
    pub fn get_any(&mut self, key: &str) -> Option<CacheEntry> {
        if let Some(entry) = self.entries.get(key) {
            self.stats.record_hit();
            return Some(entry.clone());
        }
        if let Some(entry) = self.durable.get(key) {
            self.stats.record_hit();
            return Some(entry);
        }
        self.stats.record_miss();
        None
    }

    // == Set ==
    /// Writes an entry to both tiers and enforces the memory bound. The
    /// durable write is best-effort: a failure is logged and counted, never
    /// surfaced.
    pub fn set_entry(&mut self, key: &str, entry: CacheEntry) {
        if let Err(e) = self.durable.set(key, &entry) {
            warn!("durable write failed for '{}': {}", key, e);
            self.stats.record_persist_failure();
        }
        self.entries.insert(key.to_string(), entry);
        self.enforce_bound();
    }

    // == Delete ==
    /// Removes an entry from both tiers.
    pub fn delete(&mut self, key: &str) {
        self.entries.remove(key);
        if let Err(e) = self.durable.delete(key) {
            warn!("durable delete failed for '{}': {}", key, e);
        }
    }

    // == Clear ==
    /// Empties both tiers.
    pub fn clear(&mut self) {
        self.entries.clear();
        if let Err(e) = self.durable.clear() {
            warn!("durable clear failed: {}", e);
        }
    }

    // == Enforce Bound ==
    /// Evicts oldest-by-timestamp entries until the memory tier is back
    /// within `max_entries`. Approximate LRU by insertion time, not by
    /// access.
    fn enforce_bound(&mut self) {
        if self.entries.len() <= self.max_entries {
            return;
        }

        let excess = self.entries.len() - self.max_entries;
        let mut by_age: Vec<(String, u64)> = self
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.timestamp))
            .collect();
        by_age.sort_by_key(|(_, timestamp)| *timestamp);

        for (key, _) in by_age.into_iter().take(excess) {
            self.entries.remove(&key);
            self.stats.record_eviction();
        }
    }

    // == Sweep ==
    /// Removes time-expired entries from the memory tier and expired or
    /// unparseable envelopes from the durable tier. Returns per-tier
    /// removal counts.
    pub fn sweep_expired(&mut self) -> (usize, usize) {
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        let memory_removed = expired_keys.len();
        for key in expired_keys {
            self.entries.remove(&key);
        }

        let durable_removed = self.durable.sweep_expired();
        (memory_removed, durable_removed)
    }

    // == Stats ==
    /// Returns a snapshot of counters plus the derived per-tier view.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.memory_entries = self.entries.len();
        stats.durable_entries = self.durable.len();
        stats.memory_keys = self.entries.keys().cloned().collect();
        stats.approx_size_bytes = self.entries.values().map(|e| e.data.len()).sum();
        stats
    }

    // == Length ==
    /// Number of entries in the memory tier.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the memory tier currently holds the key (any freshness).
    /// Test-support accessor.
    #[cfg(test)]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::durable::MemoryMedium;
    use std::thread::sleep;
    use std::time::Duration;

    fn store_with(max_entries: usize) -> CacheStore {
        let config = CacheConfig {
            max_entries,
            ..CacheConfig::default()
        };
        CacheStore::new(&config, Box::new(MemoryMedium::new()))
    }

    fn entry(data: &str, ttl_ms: u64) -> CacheEntry {
        CacheEntry::new(data.to_string(), ttl_ms, "1".to_string())
    }

    #[test]
    fn test_set_writes_both_tiers() {
        let mut store = store_with(100);
        store.set_entry("k", entry("v", 60_000));

        assert!(store.get_fresh("k").is_some());
        let stats = store.stats();
        assert_eq!(stats.memory_entries, 1);
        assert_eq!(stats.durable_entries, 1);
    }

    #[test]
    fn test_get_fresh_ignores_expired() {
        let mut store = store_with(100);
        store.set_entry("k", entry("v", 20));
        sleep(Duration::from_millis(50));

        assert!(store.get_fresh("k").is_none());
        // Still reachable for the degraded paths.
        assert!(store.get_any("k").is_some());
    }

    #[test]
    fn test_durable_hit_promotes_into_memory() {
        let medium = MemoryMedium::new();
        let persisted = entry("v", 60_000);
        medium
            .set_item("loft-cache-k", &serde_json::to_string(&persisted).unwrap())
            .unwrap();

        let config = CacheConfig::default();
        let mut store = CacheStore::new(&config, Box::new(medium));

        // Startup load already promoted it.
        assert!(store.contains_key("k"));
        assert_eq!(store.get_fresh("k").unwrap().data, "v");
    }

    #[test]
    fn test_delete_removes_both_tiers() {
        let mut store = store_with(100);
        store.set_entry("k", entry("v", 60_000));
        store.delete("k");

        assert!(store.get_any("k").is_none());
        assert_eq!(store.stats().durable_entries, 0);
    }

    #[test]
    fn test_clear_empties_both_tiers() {
        let mut store = store_with(100);
        for i in 0..5 {
            store.set_entry(&format!("k{}", i), entry("v", 60_000));
        }
        store.clear();

        let stats = store.stats();
        assert_eq!(stats.memory_entries, 0);
        assert_eq!(stats.durable_entries, 0);
    }

    #[test]
    fn test_bound_evicts_oldest_first() {
        let mut store = store_with(3);
        // Distinct timestamps so eviction order is deterministic.
        for key in ["a", "b", "c", "d"] {
            store.set_entry(key, entry("v", 60_000));
            sleep(Duration::from_millis(5));
        }

        assert_eq!(store.len(), 3);
        assert!(!store.contains_key("a"));
        assert!(store.contains_key("b"));
        assert!(store.contains_key("c"));
        assert!(store.contains_key("d"));
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_sweep_removes_expired_from_memory() {
        let mut store = store_with(100);
        store.set_entry("short", entry("v", 20));
        store.set_entry("long", entry("v", 60_000));
        sleep(Duration::from_millis(50));

        let (memory_removed, durable_removed) = store.sweep_expired();
        assert_eq!(memory_removed, 1);
        assert_eq!(durable_removed, 1);
        assert_eq!(store.len(), 1);
        assert!(store.get_any("short").is_none());
    }

    #[test]
    fn test_stats_size_estimate() {
        let mut store = store_with(100);
        store.set_entry("a", entry("12345", 60_000));
        store.set_entry("b", entry("123", 60_000));

        let stats = store.stats();
        assert_eq!(stats.approx_size_bytes, 8);
        let mut keys = stats.memory_keys.clone();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_persist_failure_counted_but_not_fatal() {
        struct FailingMedium;

        impl crate::cache::durable::DurableMedium for FailingMedium {
            fn get_item(&self, _key: &str) -> crate::error::Result<Option<String>> {
                Ok(None)
            }
            fn set_item(&self, _key: &str, _value: &str) -> crate::error::Result<()> {
                Err(crate::error::CacheError::Storage("quota exceeded".to_string()))
            }
            fn remove_item(&self, _key: &str) -> crate::error::Result<()> {
                Ok(())
            }
            fn keys(&self) -> crate::error::Result<Vec<String>> {
                Ok(Vec::new())
            }
        }

        let config = CacheConfig::default();
        let mut store = CacheStore::new(&config, Box::new(FailingMedium));

        store.set_entry("k", entry("v", 60_000));

        // The memory tier stays authoritative; the failure is only counted.
        assert_eq!(store.get_fresh("k").unwrap().data, "v");
        assert_eq!(store.stats().persist_failures, 1);
    }

    #[test]
    fn test_hit_miss_accounting() {
        let mut store = store_with(100);
        store.set_entry("k", entry("v", 60_000));

        store.get_fresh("k");
        store.get_fresh("missing");

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }
}
