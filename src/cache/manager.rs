//! Cache Manager Module
//!
//! The strategy engine: given a key, a live data producer and per-call
//! options, runs one of five read algorithms over the two storage tiers.
//! Cold-key reads on the cache-consulting strategies are coalesced through a
//! per-key in-flight guard so concurrent callers share one producer
//! invocation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::durable::{DurableMedium, MemoryMedium};
use crate::cache::entry::versioned_key;
use crate::cache::{CacheEntry, CacheStats, CacheStore};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::tasks::spawn_sweeper_task;

/// Schema version applied when the caller does not supply one.
pub const DEFAULT_VERSION: &str = "1";

// == Strategy ==
/// The five read algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Fresh cache hit wins; producer only on miss
    #[default]
    CacheFirst,
    /// Producer wins; any cached entry (stale included) on producer failure
    NetworkFirst,
    /// Fresh cache hit or error; producer never invoked
    CacheOnly,
    /// Producer always; tiers never read or written
    NetworkOnly,
    /// Any cached entry immediately; stale entries refreshed in background
    StaleWhileRevalidate,
}

// == Codec ==
/// Encodes payloads to the text form stored in both tiers and decodes them
/// back. The default JSON codec covers any serde type; callers with special
/// shapes supply their own.
pub trait Codec<T>: Send + Sync {
    fn encode(&self, value: &T) -> serde_json::Result<String>;
    fn decode(&self, raw: &str) -> serde_json::Result<T>;
}

/// Default codec: serde_json text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T> Codec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> serde_json::Result<String> {
        serde_json::to_string(value)
    }

    fn decode(&self, raw: &str) -> serde_json::Result<T> {
        serde_json::from_str(raw)
    }
}

// == Get Options ==
/// Per-call configuration for [`CacheManager::get`]. All fields default.
#[derive(Debug, Clone)]
pub struct GetOptions {
    /// TTL in milliseconds; the manager's default when None
    pub ttl_ms: Option<u64>,
    /// Read algorithm for this call; never sticky to the key
    pub strategy: Strategy,
    /// Schema version tag; distinct versions never share cache lines
    pub version: String,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self {
            ttl_ms: None,
            strategy: Strategy::default(),
            version: DEFAULT_VERSION.to_string(),
        }
    }
}

impl GetOptions {
    /// Options with the given strategy and everything else defaulted.
    pub fn strategy(strategy: Strategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = Some(ttl_ms);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

// == Cache Manager ==
/// The public cache surface: tiered storage plus the strategy engine and an
/// explicit sweeper lifecycle.
pub struct CacheManager {
    store: Arc<RwLock<CacheStore>>,
    config: CacheConfig,
    /// Per-key guards coalescing concurrent cold-key producer calls
    inflight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl CacheManager {
    // == Constructor ==
    /// Creates a manager over the given durable medium. The durable tier is
    /// loaded into memory immediately; the sweeper does not run until
    /// [`CacheManager::start`].
    pub fn new(config: CacheConfig, medium: Box<dyn DurableMedium>) -> Self {
        let store = CacheStore::new(&config, medium);
        Self {
            store: Arc::new(RwLock::new(store)),
            config,
            inflight: Mutex::new(HashMap::new()),
            sweeper: Mutex::new(None),
        }
    }

    /// Manager with default configuration over an in-process medium.
    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default(), Box::new(MemoryMedium::new()))
    }

    /// Shared handle to the underlying store, for the sweeper task and
    /// advanced callers.
    pub fn store(&self) -> Arc<RwLock<CacheStore>> {
        self.store.clone()
    }

    // == Lifecycle ==
    /// Starts the background sweeper at the configured interval. Starting an
    /// already-started manager replaces the previous sweeper.
    pub fn start(&self) {
        let handle = spawn_sweeper_task(self.store.clone(), self.config.sweep_interval_secs);
        let mut sweeper = self.sweeper.lock().expect("sweeper lock poisoned");
        if let Some(old) = sweeper.replace(handle) {
            old.abort();
        }
    }

    /// Stops the background sweeper. Safe to call when never started.
    pub fn dispose(&self) {
        let mut sweeper = self.sweeper.lock().expect("sweeper lock poisoned");
        if let Some(handle) = sweeper.take() {
            handle.abort();
        }
    }

    // == Get ==
    /// Reads `key` with the JSON codec. See [`CacheManager::get_with_codec`].
    pub async fn get<T, F, Fut>(&self, key: &str, produce: F, options: GetOptions) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.get_with_codec(key, produce, options, Arc::new(JsonCodec))
            .await
    }

    /// Reads `key` under the options' strategy, calling `produce` for live
    /// data where the strategy requires it. Every successful producer result
    /// is written through both tiers under the versioned key.
    pub async fn get_with_codec<T, F, Fut>(
        &self,
        key: &str,
        produce: F,
        options: GetOptions,
        codec: Arc<dyn Codec<T>>,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let vkey = versioned_key(key, &options.version);
        let ttl_ms = options.ttl_ms.unwrap_or(self.config.default_ttl_ms);

        match options.strategy {
            Strategy::CacheFirst => self.cache_first(&vkey, produce, ttl_ms, &options, codec).await,
            Strategy::NetworkFirst => {
                self.network_first(&vkey, produce, ttl_ms, &options, codec).await
            }
            Strategy::CacheOnly => self.cache_only(key, &vkey, codec).await,
            Strategy::NetworkOnly => Ok(produce().await?),
            Strategy::StaleWhileRevalidate => {
                self.stale_while_revalidate(&vkey, produce, ttl_ms, &options, codec)
                    .await
            }
        }
    }

    // == Cache First ==
    async fn cache_first<T, F, Fut>(
        &self,
        vkey: &str,
        produce: F,
        ttl_ms: u64,
        options: &GetOptions,
        codec: Arc<dyn Codec<T>>,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        if let Some(entry) = self.store.write().await.get_fresh(vkey) {
            if let Some(value) = self.decode_or_evict(vkey, &entry, codec.as_ref()).await {
                return Ok(value);
            }
        }

        // Cold key: coalesce with any concurrent caller, then re-check
        // before producing.
        let guard = self.inflight_guard(vkey).await;
        if let Some(entry) = self.store.write().await.get_fresh(vkey) {
            if let Some(value) = self.decode_or_evict(vkey, &entry, codec.as_ref()).await {
                self.release_inflight(vkey, guard);
                return Ok(value);
            }
        }

        let result = produce().await;
        let value = match result {
            Ok(value) => value,
            Err(e) => {
                self.release_inflight(vkey, guard);
                return Err(CacheError::Produce(e));
            }
        };
        self.write_back(vkey, &value, ttl_ms, &options.version, codec.as_ref())
            .await;
        self.release_inflight(vkey, guard);
        Ok(value)
    }

    // == Network First ==
    async fn network_first<T, F, Fut>(
        &self,
        vkey: &str,
        produce: F,
        ttl_ms: u64,
        options: &GetOptions,
        codec: Arc<dyn Codec<T>>,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        match produce().await {
            Ok(value) => {
                self.write_back(vkey, &value, ttl_ms, &options.version, codec.as_ref())
                    .await;
                Ok(value)
            }
            Err(e) => {
                // Degraded: any entry for the key will do, stale included.
                if let Some(entry) = self.store.write().await.get_any(vkey) {
                    if let Some(value) = self.decode_or_evict(vkey, &entry, codec.as_ref()).await
                    {
                        debug!("network-first degraded to cached entry for '{}'", vkey);
                        return Ok(value);
                    }
                }
                Err(CacheError::Produce(e))
            }
        }
    }

    // == Cache Only ==
    async fn cache_only<T>(
        &self,
        key: &str,
        vkey: &str,
        codec: Arc<dyn Codec<T>>,
    ) -> Result<T>
    where
        T: Send + 'static,
    {
        if let Some(entry) = self.store.write().await.get_fresh(vkey) {
            if let Some(value) = self.decode_or_evict(vkey, &entry, codec.as_ref()).await {
                return Ok(value);
            }
        }
        Err(CacheError::NoCachedData(key.to_string()))
    }

    // == Stale While Revalidate ==
    async fn stale_while_revalidate<T, F, Fut>(
        &self,
        vkey: &str,
        produce: F,
        ttl_ms: u64,
        options: &GetOptions,
        codec: Arc<dyn Codec<T>>,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let existing = self.store.write().await.get_any(vkey);
        if let Some(entry) = existing {
            if let Some(value) = self.decode_or_evict(vkey, &entry, codec.as_ref()).await {
                if entry.is_expired() {
                    self.spawn_revalidation(vkey, produce(), ttl_ms, &options.version, codec);
                }
                return Ok(value);
            }
        }

        // Nothing cached at all: behave like a coalesced cache-first miss.
        let guard = self.inflight_guard(vkey).await;
        let recheck = self.store.write().await.get_any(vkey);
        if let Some(entry) = recheck {
            if let Some(value) = self.decode_or_evict(vkey, &entry, codec.as_ref()).await {
                self.release_inflight(vkey, guard);
                return Ok(value);
            }
        }

        let value = match produce().await {
            Ok(value) => value,
            Err(e) => {
                self.release_inflight(vkey, guard);
                return Err(CacheError::Produce(e));
            }
        };
        self.write_back(vkey, &value, ttl_ms, &options.version, codec.as_ref())
            .await;
        self.release_inflight(vkey, guard);
        Ok(value)
    }

    /// Fire-and-forget refresh of a stale entry. The original caller already
    /// has its response, so failures have nowhere to surface and are logged.
    fn spawn_revalidation<T, Fut>(
        &self,
        vkey: &str,
        fut: Fut,
        ttl_ms: u64,
        version: &str,
        codec: Arc<dyn Codec<T>>,
    ) where
        T: Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let store = self.store.clone();
        let vkey = vkey.to_string();
        let version = version.to_string();

        tokio::spawn(async move {
            match fut.await {
                Ok(value) => match codec.encode(&value) {
                    Ok(data) => {
                        let entry = CacheEntry::new(data, ttl_ms, version);
                        store.write().await.set_entry(&vkey, entry);
                        debug!("background revalidation refreshed '{}'", vkey);
                    }
                    Err(e) => warn!("background revalidation encode failed for '{}': {}", vkey, e),
                },
                Err(e) => warn!("background revalidation failed for '{}': {}", vkey, e),
            }
        });
    }

    // == Shared Write Path ==
    /// Stores a producer result in both tiers and enforces the memory bound.
    /// An encode failure cannot invalidate the live value the caller is
    /// about to receive, so it is logged and the write skipped.
    async fn write_back<T>(
        &self,
        vkey: &str,
        value: &T,
        ttl_ms: u64,
        version: &str,
        codec: &dyn Codec<T>,
    ) {
        match codec.encode(value) {
            Ok(data) => {
                let entry = CacheEntry::new(data, ttl_ms, version.to_string());
                self.store.write().await.set_entry(vkey, entry);
            }
            Err(e) => warn!("skipping cache write for '{}': encode failed: {}", vkey, e),
        }
    }

    /// Decodes an entry, deleting it from both tiers when the stored text no
    /// longer matches the codec so it cannot poison subsequent reads.
    async fn decode_or_evict<T>(
        &self,
        vkey: &str,
        entry: &CacheEntry,
        codec: &dyn Codec<T>,
    ) -> Option<T> {
        match codec.decode(&entry.data) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("evicting undecodable entry '{}': {}", vkey, e);
                self.store.write().await.delete(vkey);
                None
            }
        }
    }

    // == In-flight Guards ==
    async fn inflight_guard(&self, vkey: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inflight.lock().expect("inflight lock poisoned");
            map.entry(vkey.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    fn release_inflight(&self, vkey: &str, guard: OwnedMutexGuard<()>) {
        drop(guard);
        let mut map = self.inflight.lock().expect("inflight lock poisoned");
        // Drop the map slot once nobody else holds the lock.
        if let Some(lock) = map.get(vkey) {
            if Arc::strong_count(lock) == 1 {
                map.remove(vkey);
            }
        }
    }

    // == Set ==
    /// Stores a value directly, bypassing any strategy. Uses the JSON codec.
    pub async fn set<T>(
        &self,
        key: &str,
        data: &T,
        ttl_ms: Option<u64>,
        version: Option<&str>,
    ) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
    {
        self.set_with_codec(key, data, ttl_ms, version, &JsonCodec).await
    }

    /// Stores a value directly with an explicit codec.
    pub async fn set_with_codec<T>(
        &self,
        key: &str,
        data: &T,
        ttl_ms: Option<u64>,
        version: Option<&str>,
        codec: &dyn Codec<T>,
    ) -> Result<()> {
        let version = version.unwrap_or(DEFAULT_VERSION);
        let vkey = versioned_key(key, version);
        let ttl_ms = ttl_ms.unwrap_or(self.config.default_ttl_ms);

        let encoded = codec.encode(data).map_err(|e| CacheError::Codec {
            key: key.to_string(),
            source: e,
        })?;
        let entry = CacheEntry::new(encoded, ttl_ms, version.to_string());
        self.store.write().await.set_entry(&vkey, entry);
        Ok(())
    }

    // == Delete ==
    /// Removes one cache line (key under one version) from both tiers.
    pub async fn delete(&self, key: &str, version: Option<&str>) {
        let vkey = versioned_key(key, version.unwrap_or(DEFAULT_VERSION));
        self.store.write().await.delete(&vkey);
    }

    // == Clear ==
    /// Empties both tiers, including everything under the durable prefix.
    pub async fn clear(&self) {
        self.store.write().await.clear();
    }

    // == Stats ==
    pub async fn get_stats(&self) -> CacheStats {
        self.store.read().await.stats()
    }

    // == Sweep Now ==
    /// Runs one sweep pass synchronously. Lets tests drive expiry
    /// deterministically instead of waiting on the background interval.
    pub async fn sweep_now(&self) -> (usize, usize) {
        self.store.write().await.sweep_expired()
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        self.dispose();
    }
}
