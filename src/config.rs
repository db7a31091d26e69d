//! Configuration Module
//!
//! Handles loading and managing cache and fallback configuration from
//! environment variables.

use std::env;
use std::time::Duration;

// == Cache Config ==
/// Configuration for the tiered cache.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries the in-memory tier can hold
    pub max_entries: usize,
    /// Default TTL in milliseconds for entries without explicit TTL
    pub default_ttl_ms: u64,
    /// Background sweep interval in seconds
    pub sweep_interval_secs: u64,
    /// Key prefix namespacing durable-tier entries
    pub key_prefix: String,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_ENTRIES` - Maximum in-memory entries (default: 1000)
    /// - `CACHE_DEFAULT_TTL_MS` - Default TTL in milliseconds (default: 300000)
    /// - `CACHE_SWEEP_INTERVAL` - Sweep frequency in seconds (default: 60)
    /// - `CACHE_KEY_PREFIX` - Durable-tier key prefix (default: "loft-cache-")
    pub fn from_env() -> Self {
        Self {
            max_entries: env::var("CACHE_MAX_ENTRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
            default_ttl_ms: env::var("CACHE_DEFAULT_TTL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300_000),
            sweep_interval_secs: env::var("CACHE_SWEEP_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            key_prefix: env::var("CACHE_KEY_PREFIX")
                .ok()
                .unwrap_or_else(|| "loft-cache-".to_string()),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            default_ttl_ms: 300_000,
            sweep_interval_secs: 60,
            key_prefix: "loft-cache-".to_string(),
        }
    }
}

// == Fallback Config ==
/// Configuration for the API fallback manager.
#[derive(Debug, Clone)]
pub struct FallbackConfig {
    /// Number of retries after the initial network attempt
    pub max_retries: u32,
    /// Base delay between retries; attempt N waits `retry_delay * N`
    pub retry_delay: Duration,
    /// Hard bound on each individual network attempt
    pub timeout: Duration,
    /// Whether degraded data sources are consulted after retries are exhausted
    pub enable_fallback: bool,
    /// Settling delay before the fallback chain runs, so a transient blip is
    /// not treated as a hard outage
    pub fallback_delay: Duration,
}

impl FallbackConfig {
    /// Creates a new FallbackConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `FALLBACK_MAX_RETRIES` - Retries per call (default: 3)
    /// - `FALLBACK_RETRY_DELAY_MS` - Base retry delay (default: 1000)
    /// - `FALLBACK_TIMEOUT_MS` - Per-attempt timeout (default: 8000)
    /// - `FALLBACK_ENABLED` - Enable the fallback chain (default: true)
    /// - `FALLBACK_SETTLE_MS` - Settling delay before fallback (default: 2000)
    pub fn from_env() -> Self {
        Self {
            max_retries: env::var("FALLBACK_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            retry_delay: Duration::from_millis(
                env::var("FALLBACK_RETRY_DELAY_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1000),
            ),
            timeout: Duration::from_millis(
                env::var("FALLBACK_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(8000),
            ),
            enable_fallback: env::var("FALLBACK_ENABLED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
            fallback_delay: Duration::from_millis(
                env::var("FALLBACK_SETTLE_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(2000),
            ),
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            timeout: Duration::from_millis(8000),
            enable_fallback: true,
            fallback_delay: Duration::from_millis(2000),
        }
    }
}
