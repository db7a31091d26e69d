//! Durable Tier Module
//!
//! Second-chance cache tier persisted to a pluggable storage medium that
//! survives process restarts. Entries are stored as JSON envelopes under a
//! fixed key prefix so the tier can be enumerated and swept independently of
//! anything else sharing the medium.
//!
//! Durability is best-effort: write failures are reported to the caller so
//! they can be counted, but they never abort a cache operation. Corrupted
//! entries self-heal by being deleted on first read.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::cache::CacheEntry;
use crate::error::{CacheError, Result};

// == Durable Medium ==
/// A key-value storage medium that survives process restarts.
///
/// Mirrors the surface of browser-local storage: item access by string key
/// plus whole-medium key enumeration. Implementations must be safe to share
/// across tasks.
pub trait DurableMedium: Send + Sync {
    /// Returns the raw value stored under `key`, if any.
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, overwriting any previous value.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Removes `key`; removing an absent key is not an error.
    fn remove_item(&self, key: &str) -> Result<()>;

    /// Enumerates every key currently present in the medium.
    fn keys(&self) -> Result<Vec<String>>;
}

// == Memory Medium ==
/// In-process medium used in tests and as the default when no persistent
/// backing is configured. Survives nothing, but exercises the same code path.
#[derive(Debug, Default)]
pub struct MemoryMedium {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DurableMedium for MemoryMedium {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let items = self.items.lock().expect("medium lock poisoned");
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self.items.lock().expect("medium lock poisoned");
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let mut items = self.items.lock().expect("medium lock poisoned");
        items.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let items = self.items.lock().expect("medium lock poisoned");
        Ok(items.keys().cloned().collect())
    }
}

// == File Medium ==
/// Directory-backed medium: one file per key, file names hex-encoded so any
/// key (URLs included) maps to a filesystem-safe name.
#[derive(Debug)]
pub struct FileMedium {
    root: PathBuf,
}

impl FileMedium {
    /// Creates the medium rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| CacheError::Storage(format!("create {}: {}", root.display(), e)))?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(hex::encode(key.as_bytes()))
    }
}

impl DurableMedium for FileMedium {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::Storage(format!("read '{}': {}", key, e))),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        fs::write(self.path_for(key), value)
            .map_err(|e| CacheError::Storage(format!("write '{}': {}", key, e)))
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Storage(format!("remove '{}': {}", key, e))),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| CacheError::Storage(format!("list {}: {}", self.root.display(), e)))?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| CacheError::Storage(format!("list entry: {}", e)))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            // Foreign files in the directory are ignored rather than treated
            // as corruption.
            if let Ok(bytes) = hex::decode(name) {
                if let Ok(key) = String::from_utf8(bytes) {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }
}

// == Durable Store ==
/// The durable cache tier: envelope (de)serialization and prefix namespacing
/// on top of a [`DurableMedium`].
pub struct DurableStore {
    medium: Box<dyn DurableMedium>,
    prefix: String,
}

impl DurableStore {
    /// Creates a durable store over `medium`, namespaced under `prefix`.
    pub fn new(medium: Box<dyn DurableMedium>, prefix: impl Into<String>) -> Self {
        Self {
            medium,
            prefix: prefix.into(),
        }
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    // == Get ==
    /// Reads an entry. A corrupted envelope is deleted and reported as a
    /// miss so it cannot poison subsequent reads; medium read failures are
    /// logged and reported as a miss.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let storage_key = self.storage_key(key);
        let raw = match self.medium.get_item(&storage_key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("durable read failed for '{}': {}", key, e);
                return None;
            }
        };

        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("dropping corrupted durable entry '{}': {}", key, e);
                let _ = self.medium.remove_item(&storage_key);
                None
            }
        }
    }

    // == Set ==
    /// Writes an entry. Failures propagate so the caller can count them;
    /// they must never abort the cache operation that triggered the write.
    pub fn set(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        let raw = serde_json::to_string(entry).map_err(|e| CacheError::Codec {
            key: key.to_string(),
            source: e,
        })?;
        self.medium.set_item(&self.storage_key(key), &raw)
    }

    // == Delete ==
    pub fn delete(&self, key: &str) -> Result<()> {
        self.medium.remove_item(&self.storage_key(key))
    }

    // == Clear ==
    /// Removes every entry under the prefix, leaving unrelated keys in the
    /// medium untouched.
    pub fn clear(&self) -> Result<()> {
        for key in self.prefixed_keys()? {
            self.medium.remove_item(&key)?;
        }
        Ok(())
    }

    // == Keys / Length ==
    /// All medium keys belonging to this store (prefix included).
    fn prefixed_keys(&self) -> Result<Vec<String>> {
        Ok(self
            .medium
            .keys()?
            .into_iter()
            .filter(|k| k.starts_with(&self.prefix))
            .collect())
    }

    /// Number of entries currently persisted under the prefix.
    pub fn len(&self) -> usize {
        self.prefixed_keys().map(|k| k.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // == Startup Load ==
    /// One-time pass at construction: parses every persisted entry, returns
    /// the fresh ones for promotion into the memory tier, and deletes
    /// expired or corrupt ones on the spot.
    pub fn load_all(&self) -> Vec<(String, CacheEntry)> {
        let keys = match self.prefixed_keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!("durable startup enumeration failed: {}", e);
                return Vec::new();
            }
        };

        let mut promoted = Vec::new();
        for storage_key in keys {
            let cache_key = storage_key[self.prefix.len()..].to_string();
            let raw = match self.medium.get_item(&storage_key) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    warn!("durable startup read failed for '{}': {}", cache_key, e);
                    continue;
                }
            };

            match serde_json::from_str::<CacheEntry>(&raw) {
                Ok(entry) if !entry.is_expired() => promoted.push((cache_key, entry)),
                Ok(_) => {
                    debug!("discarding expired durable entry '{}'", cache_key);
                    let _ = self.medium.remove_item(&storage_key);
                }
                Err(e) => {
                    warn!("discarding corrupt durable entry '{}': {}", cache_key, e);
                    let _ = self.medium.remove_item(&storage_key);
                }
            }
        }
        promoted
    }

    // == Sweep ==
    /// Removes expired or unparseable entries under the prefix. Returns the
    /// number of entries removed.
    pub fn sweep_expired(&self) -> usize {
        let keys = match self.prefixed_keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!("durable sweep enumeration failed: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        for storage_key in keys {
            let expired = match self.medium.get_item(&storage_key) {
                Ok(Some(raw)) => match serde_json::from_str::<CacheEntry>(&raw) {
                    Ok(entry) => entry.is_expired(),
                    Err(_) => true,
                },
                Ok(None) => false,
                Err(_) => false,
            };

            if expired && self.medium.remove_item(&storage_key).is_ok() {
                removed += 1;
            }
        }
        removed
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn memory_store() -> DurableStore {
        DurableStore::new(Box::new(MemoryMedium::new()), "loft-cache-")
    }

    fn entry(data: &str, ttl_ms: u64) -> CacheEntry {
        CacheEntry::new(data.to_string(), ttl_ms, "1".to_string())
    }

    #[test]
    fn test_set_and_get() {
        let store = memory_store();
        store.set("lofts", &entry("[1,2]", 60_000)).unwrap();

        let got = store.get("lofts").unwrap();
        assert_eq!(got.data, "[1,2]");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_missing() {
        let store = memory_store();
        assert!(store.get("nope").is_none());
    }

    #[test]
    fn test_corrupt_entry_self_heals() {
        let medium = MemoryMedium::new();
        medium.set_item("loft-cache-bad", "not json at all").unwrap();
        let store = DurableStore::new(Box::new(medium), "loft-cache-");

        assert!(store.get("bad").is_none());
        // Deleted on first read, not just skipped.
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_clear_respects_prefix() {
        let medium = MemoryMedium::new();
        medium.set_item("unrelated", "keep me").unwrap();
        let store = DurableStore::new(Box::new(medium), "loft-cache-");

        store.set("a", &entry("1", 60_000)).unwrap();
        store.set("b", &entry("2", 60_000)).unwrap();
        store.clear().unwrap();

        assert_eq!(store.len(), 0);
        assert_eq!(
            store.medium.get_item("unrelated").unwrap().as_deref(),
            Some("keep me")
        );
    }

    #[test]
    fn test_load_all_promotes_fresh_and_drops_rest() {
        let medium = MemoryMedium::new();
        let fresh = entry("fresh", 60_000);
        let expired = CacheEntry {
            data: "old".to_string(),
            timestamp: 0,
            ttl_ms: 1,
            version: "1".to_string(),
        };
        medium
            .set_item("loft-cache-fresh", &serde_json::to_string(&fresh).unwrap())
            .unwrap();
        medium
            .set_item("loft-cache-old", &serde_json::to_string(&expired).unwrap())
            .unwrap();
        medium.set_item("loft-cache-corrupt", "{{{").unwrap();

        let store = DurableStore::new(Box::new(medium), "loft-cache-");
        let promoted = store.load_all();

        assert_eq!(promoted.len(), 1);
        assert_eq!(promoted[0].0, "fresh");
        // Expired and corrupt entries were deleted from the medium.
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_sweep_removes_expired_and_unparseable() {
        let medium = MemoryMedium::new();
        let expired = CacheEntry {
            data: "old".to_string(),
            timestamp: 0,
            ttl_ms: 1,
            version: "1".to_string(),
        };
        medium
            .set_item("loft-cache-old", &serde_json::to_string(&expired).unwrap())
            .unwrap();
        medium.set_item("loft-cache-corrupt", "???").unwrap();

        let store = DurableStore::new(Box::new(medium), "loft-cache-");
        store.set("fresh", &entry("v", 60_000)).unwrap();

        assert_eq!(store.sweep_expired(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.get("fresh").is_some());
    }

    #[test]
    fn test_file_medium_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let medium = FileMedium::new(dir.path()).unwrap();

        medium
            .set_item("loft-cache-lofts:1", "{\"data\":\"x\"}")
            .unwrap();
        assert_eq!(
            medium.get_item("loft-cache-lofts:1").unwrap().as_deref(),
            Some("{\"data\":\"x\"}")
        );

        let keys = medium.keys().unwrap();
        assert_eq!(keys, vec!["loft-cache-lofts:1".to_string()]);

        medium.remove_item("loft-cache-lofts:1").unwrap();
        assert!(medium.get_item("loft-cache-lofts:1").unwrap().is_none());
    }

    #[test]
    fn test_file_medium_remove_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let medium = FileMedium::new(dir.path()).unwrap();
        assert!(medium.remove_item("never-existed").is_ok());
    }
}
