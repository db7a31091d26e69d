//! Offline Snapshot Provider
//!
//! First tier of the fallback chain: caller-registered structured snapshots
//! of logical datasets, keyed by dataset name and locale. Consulted only
//! after every live attempt has failed.

use std::collections::HashMap;

use serde_json::Value;

/// Locale applied when a call supplies none.
pub const DEFAULT_LOCALE: &str = "en";

// == Snapshot Provider ==
/// Source of offline snapshot data for the fallback chain.
pub trait SnapshotProvider: Send + Sync {
    /// Returns the snapshot for a logical dataset in the given locale, or
    /// None when the provider has nothing for that combination.
    fn snapshot(&self, fallback_key: &str, locale: &str) -> Option<Value>;
}

// == Static Snapshot Provider ==
/// In-memory provider built up-front from known dataset snapshots. Falls
/// back to the default locale when the requested one is missing.
#[derive(Debug, Default)]
pub struct StaticSnapshotProvider {
    snapshots: HashMap<(String, String), Value>,
}

impl StaticSnapshotProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a snapshot for a dataset/locale pair.
    pub fn insert(
        mut self,
        fallback_key: impl Into<String>,
        locale: impl Into<String>,
        data: Value,
    ) -> Self {
        self.snapshots
            .insert((fallback_key.into(), locale.into()), data);
        self
    }
}

impl SnapshotProvider for StaticSnapshotProvider {
    fn snapshot(&self, fallback_key: &str, locale: &str) -> Option<Value> {
        let exact = (fallback_key.to_string(), locale.to_string());
        if let Some(data) = self.snapshots.get(&exact) {
            return Some(data.clone());
        }
        if locale != DEFAULT_LOCALE {
            let fallback = (fallback_key.to_string(), DEFAULT_LOCALE.to_string());
            return self.snapshots.get(&fallback).cloned();
        }
        None
    }
}
