//! loft-cache - Tiered client-side cache for the loft booking platform
//!
//! Two storage tiers (in-memory + durable) behind five per-call read
//! strategies, a background expiry sweeper, and an API fallback manager for
//! degraded-network operation.

pub mod cache;
pub mod config;
pub mod error;
pub mod fallback;
pub mod models;
pub mod tasks;

pub use cache::{CacheManager, CacheStats, GetOptions, Strategy};
pub use config::{CacheConfig, FallbackConfig};
pub use error::{CacheError, Result};
pub use fallback::{ApiFallbackManager, ApiResponse, DatasetClient};
