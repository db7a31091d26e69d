//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL and schema
//! versioning support. The same entry shape is used by both tiers: the
//! in-memory tier holds it as a live struct, the durable tier persists it as
//! a JSON envelope.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

// == Cache Entry ==
/// Represents a single cache entry with codec-encoded payload and metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The codec-encoded payload text
    pub data: String,
    /// Creation/refresh timestamp (Unix milliseconds)
    pub timestamp: u64,
    /// Milliseconds after which the entry is considered expired
    pub ttl_ms: u64,
    /// Caller-supplied schema tag; entries with different versions never
    /// satisfy each other's reads
    pub version: String,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry stamped with the current time.
    ///
    /// # Arguments
    /// * `data` - The codec-encoded payload
    /// * `ttl_ms` - TTL in milliseconds
    /// * `version` - Schema version tag
    pub fn new(data: String, ttl_ms: u64, version: String) -> Self {
        Self {
            data,
            timestamp: current_timestamp_ms(),
            ttl_ms,
            version,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired iff `now - timestamp > ttl_ms` (strictly greater:
    /// an entry whose TTL has elapsed to the exact millisecond is still
    /// fresh). Expired entries may still be served by the degraded paths of
    /// network-first and stale-while-revalidate, but never count as fresh.
    pub fn is_expired(&self) -> bool {
        current_timestamp_ms().saturating_sub(self.timestamp) > self.ttl_ms
    }

    // == Age ==
    /// Returns the entry's age in milliseconds.
    pub fn age_ms(&self) -> u64 {
        current_timestamp_ms().saturating_sub(self.timestamp)
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, zero once expired.
    pub fn ttl_remaining_ms(&self) -> u64 {
        self.ttl_ms.saturating_sub(self.age_ms())
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}

/// Builds the composite cache key `"{caller_key}:{version}"`.
///
/// Distinct versions of the same caller key occupy distinct cache lines, so
/// a schema bump invalidates stale-shape data without an explicit delete.
pub fn versioned_key(key: &str, version: &str) -> String {
    format!("{}:{}", key, version)
}
