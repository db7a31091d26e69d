//! Cache Module
//!
//! Two-tier caching (in-memory + durable) with TTL expiry, size-bounded
//! eviction and five per-call read strategies.

mod durable;
mod entry;
mod manager;
mod stats;
mod store;


// Re-export public types
pub use durable::{DurableMedium, DurableStore, FileMedium, MemoryMedium};
pub use entry::{current_timestamp_ms, versioned_key, CacheEntry};
pub use manager::{CacheManager, Codec, GetOptions, JsonCodec, Strategy, DEFAULT_VERSION};
pub use stats::CacheStats;
pub use store::CacheStore;
