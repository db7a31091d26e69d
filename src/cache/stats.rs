//! Cache Statistics Module
//!
//! Derived observability view over both tiers plus running performance
//! counters. Never consulted for correctness decisions.

use serde::Serialize;

// == Cache Stats ==
/// Snapshot of cache state and performance counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (key not found or expired)
    pub misses: u64,
    /// Number of entries evicted by the size bound
    pub evictions: u64,
    /// Number of best-effort durable writes that failed
    pub persist_failures: u64,
    /// Current number of entries in the in-memory tier
    pub memory_entries: usize,
    /// Current number of entries persisted in the durable tier
    pub durable_entries: usize,
    /// Keys currently held in the in-memory tier
    pub memory_keys: Vec<String>,
    /// Sum of serialized payload lengths of in-memory entries, in bytes
    pub approx_size_bytes: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    // == Record Hit ==
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    // == Record Miss ==
    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    // == Record Eviction ==
    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    // == Record Persist Failure ==
    pub fn record_persist_failure(&mut self) {
        self.persist_failures += 1;
    }
}
