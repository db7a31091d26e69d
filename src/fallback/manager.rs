//! API Fallback Manager
//!
//! Wraps live HTTP fetches in a retry/timeout envelope and, once every
//! attempt is exhausted, walks an ordered chain of degraded data sources:
//! offline snapshot, prior cached response, locally persisted backup. The
//! public entry point never errors at the function level; failure travels in
//! the response record.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::cache::{current_timestamp_ms, DurableMedium, MemoryMedium};
use crate::config::FallbackConfig;
use crate::fallback::snapshot::{SnapshotProvider, DEFAULT_LOCALE};

/// TTL of the internal response cache.
const RESPONSE_CACHE_TTL_MS: u64 = 300_000;

/// Persisted backups older than this are never served.
const BACKUP_MAX_AGE_HOURS: i64 = 24;

/// Medium prefix namespacing persisted backups.
const BACKUP_PREFIX: &str = "loft-backup-";

// == API Response ==
/// Outcome of one [`ApiFallbackManager::fetch_with_fallback`] call.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    /// Decoded payload; None on total failure
    pub data: Option<T>,
    /// Last network error when no source yielded data
    pub error: Option<String>,
    /// Whether the payload came from a degraded source
    pub is_from_fallback: bool,
    /// Whether the payload came from the internal response cache
    pub is_from_cache: bool,
    /// Total network attempts made (initial call + retries)
    pub retry_count: u32,
    /// Wall time of the whole call in milliseconds
    pub response_time_ms: u64,
}

// == Request Options ==
/// Optional per-call request shaping. The endpoint stays an opaque URL; these
/// only add query pairs and headers to the outgoing request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

// == Endpoint Health ==
/// Classification of one probed endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointStatus {
    Healthy,
    Degraded,
    Down,
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointHealth {
    pub endpoint: String,
    pub status: EndpointStatus,
    pub latency_ms: u64,
}

// == Internal records ==
#[derive(Debug, Clone)]
struct CachedResponse {
    body: String,
    cached_at: u64,
}

impl CachedResponse {
    fn is_fresh(&self) -> bool {
        current_timestamp_ms().saturating_sub(self.cached_at) <= RESPONSE_CACHE_TTL_MS
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedBackup {
    body: String,
    persisted_at: DateTime<Utc>,
}

// == API Fallback Manager ==
/// Resilient fetch layer for the hosted backend's endpoints.
pub struct ApiFallbackManager {
    client: reqwest::Client,
    config: RwLock<FallbackConfig>,
    /// Short-lived response cache keyed by request URL
    responses: Mutex<HashMap<String, CachedResponse>>,
    /// Tier (a): caller-registered offline snapshots
    snapshots: Option<Arc<dyn SnapshotProvider>>,
    /// Tier (c): persisted backups keyed by hex-encoded URL
    backups: Box<dyn DurableMedium>,
}

impl ApiFallbackManager {
    // == Constructor ==
    /// Creates a manager with no snapshot provider and an in-process backup
    /// medium.
    pub fn new(config: FallbackConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config: RwLock::new(config),
            responses: Mutex::new(HashMap::new()),
            snapshots: None,
            backups: Box::new(MemoryMedium::new()),
        }
    }

    /// Registers the offline snapshot provider for fallback tier (a).
    pub fn with_snapshot_provider(mut self, provider: Arc<dyn SnapshotProvider>) -> Self {
        self.snapshots = Some(provider);
        self
    }

    /// Replaces the backup medium for fallback tier (c).
    pub fn with_backup_medium(mut self, medium: Box<dyn DurableMedium>) -> Self {
        self.backups = medium;
        self
    }

    // == Update Config ==
    /// Replaces the module-level defaults for subsequent calls.
    pub async fn update_config(&self, config: FallbackConfig) {
        *self.config.write().await = config;
    }

    // == Fetch With Fallback ==
    /// Fetches `endpoint`, retrying with linear backoff, then walking the
    /// fallback chain. Never returns an error at the function level: a fully
    /// failed call is a response with `data: None` and `error` set.
    pub async fn fetch_with_fallback<T>(
        &self,
        endpoint: &str,
        options: RequestOptions,
        fallback_key: Option<&str>,
        locale: Option<&str>,
    ) -> ApiResponse<T>
    where
        T: DeserializeOwned,
    {
        let started = Instant::now();
        let cache_key = Self::cache_key(endpoint, &options);
        let config = self.config.read().await.clone();

        // Fresh response-cache hit short-circuits everything.
        if let Some(body) = self.cached_response(&cache_key, true) {
            if let Ok(data) = serde_json::from_str::<T>(&body) {
                return ApiResponse {
                    data: Some(data),
                    error: None,
                    is_from_fallback: false,
                    is_from_cache: true,
                    retry_count: 0,
                    response_time_ms: elapsed_ms(started),
                };
            }
        }

        // Live attempts: initial call plus max_retries retries, each bounded
        // by the configured timeout, with linearly increasing delay between.
        let total_attempts = config.max_retries + 1;
        let mut attempts = 0u32;
        let mut last_error = String::new();

        while attempts < total_attempts {
            attempts += 1;
            if attempts > 1 {
                tokio::time::sleep(config.retry_delay * (attempts - 1)).await;
            }

            match timeout(config.timeout, self.attempt(endpoint, &options)).await {
                Ok(Ok(body)) => match serde_json::from_str::<T>(&body) {
                    Ok(data) => {
                        self.store_response(&cache_key, &body);
                        self.store_backup(endpoint, &body);
                        return ApiResponse {
                            data: Some(data),
                            error: None,
                            is_from_fallback: false,
                            is_from_cache: false,
                            retry_count: attempts,
                            response_time_ms: elapsed_ms(started),
                        };
                    }
                    Err(e) => {
                        last_error = format!("malformed response body: {}", e);
                        warn!("attempt {} for '{}' returned {}", attempts, endpoint, last_error);
                    }
                },
                Ok(Err(e)) => {
                    last_error = e.to_string();
                    debug!("attempt {} for '{}' failed: {}", attempts, endpoint, last_error);
                }
                Err(_) => {
                    last_error = format!("request timed out after {:?}", config.timeout);
                    debug!("attempt {} for '{}' timed out", attempts, endpoint);
                }
            }
        }

        if config.enable_fallback {
            // Settling delay: a transient blip should not flip the UI to
            // degraded content.
            tokio::time::sleep(config.fallback_delay).await;

            if let Some(data) = self.try_fallback_sources::<T>(endpoint, &cache_key, fallback_key, locale)
            {
                return ApiResponse {
                    data: Some(data.0),
                    error: None,
                    is_from_fallback: true,
                    is_from_cache: data.1,
                    retry_count: attempts,
                    response_time_ms: elapsed_ms(started),
                };
            }
        }

        warn!(
            "'{}' failed after {} attempts with no usable fallback: {}",
            endpoint, attempts, last_error
        );
        ApiResponse {
            data: None,
            error: Some(last_error),
            is_from_fallback: false,
            is_from_cache: false,
            retry_count: attempts,
            response_time_ms: elapsed_ms(started),
        }
    }

    /// Walks the fallback tiers in order; first one to yield decodable data
    /// wins. Returns the payload and whether it came from the response cache.
    fn try_fallback_sources<T>(
        &self,
        endpoint: &str,
        cache_key: &str,
        fallback_key: Option<&str>,
        locale: Option<&str>,
    ) -> Option<(T, bool)>
    where
        T: DeserializeOwned,
    {
        // (a) offline snapshot for the logical dataset
        if let (Some(provider), Some(key)) = (&self.snapshots, fallback_key) {
            let locale = locale.unwrap_or(DEFAULT_LOCALE);
            if let Some(value) = provider.snapshot(key, locale) {
                match serde_json::from_value::<T>(value) {
                    Ok(data) => {
                        debug!("serving offline snapshot '{}' ({})", key, locale);
                        return Some((data, false));
                    }
                    Err(e) => warn!("snapshot '{}' does not decode: {}", key, e),
                }
            }
        }

        // (b) prior response for the same request, freshness ignored
        if let Some(body) = self.cached_response(cache_key, false) {
            if let Ok(data) = serde_json::from_str::<T>(&body) {
                debug!("serving expired cached response for '{}'", endpoint);
                return Some((data, true));
            }
        }

        // (c) persisted backup, subject to the staleness cutoff
        if let Some(body) = self.read_backup(endpoint) {
            if let Ok(data) = serde_json::from_str::<T>(&body) {
                debug!("serving persisted backup for '{}'", endpoint);
                return Some((data, false));
            }
        }

        None
    }

    // == Live Attempt ==
    async fn attempt(&self, endpoint: &str, options: &RequestOptions) -> anyhow::Result<String> {
        let mut request = self.client.get(endpoint);
        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        for (name, value) in &options.headers {
            request = request.header(name, value);
        }

        let response = request.send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    // == Response Cache ==
    fn cache_key(endpoint: &str, options: &RequestOptions) -> String {
        if options.query.is_empty() {
            return endpoint.to_string();
        }
        let query: Vec<String> = options
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        format!("{}?{}", endpoint, query.join("&"))
    }

    /// Reads the response cache; `require_fresh` distinguishes the normal
    /// short-circuit from fallback tier (b).
    fn cached_response(&self, cache_key: &str, require_fresh: bool) -> Option<String> {
        let responses = self.responses.lock().expect("response cache lock poisoned");
        let cached = responses.get(cache_key)?;
        if require_fresh && !cached.is_fresh() {
            return None;
        }
        Some(cached.body.clone())
    }

    fn store_response(&self, cache_key: &str, body: &str) {
        let mut responses = self.responses.lock().expect("response cache lock poisoned");
        responses.insert(
            cache_key.to_string(),
            CachedResponse {
                body: body.to_string(),
                cached_at: current_timestamp_ms(),
            },
        );
    }

    /// Drops every cached response. Used on logout-equivalent events.
    pub fn clear_response_cache(&self) {
        self.responses
            .lock()
            .expect("response cache lock poisoned")
            .clear();
    }

    // == Persisted Backups ==
    fn backup_key(endpoint: &str) -> String {
        format!("{}{}", BACKUP_PREFIX, hex::encode(endpoint.as_bytes()))
    }

    /// Best-effort write of the latest good body; failures are logged.
    fn store_backup(&self, endpoint: &str, body: &str) {
        let backup = PersistedBackup {
            body: body.to_string(),
            persisted_at: Utc::now(),
        };
        let raw = match serde_json::to_string(&backup) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("backup encode failed for '{}': {}", endpoint, e);
                return;
            }
        };
        if let Err(e) = self.backups.set_item(&Self::backup_key(endpoint), &raw) {
            warn!("backup write failed for '{}': {}", endpoint, e);
        }
    }

    /// Reads the persisted backup, rejecting entries past the staleness
    /// cutoff and self-healing corrupt ones.
    fn read_backup(&self, endpoint: &str) -> Option<String> {
        let key = Self::backup_key(endpoint);
        let raw = match self.backups.get_item(&key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("backup read failed for '{}': {}", endpoint, e);
                return None;
            }
        };

        match serde_json::from_str::<PersistedBackup>(&raw) {
            Ok(backup) => {
                let age = Utc::now().signed_duration_since(backup.persisted_at);
                if age > ChronoDuration::hours(BACKUP_MAX_AGE_HOURS) {
                    debug!("backup for '{}' is past the staleness cutoff", endpoint);
                    return None;
                }
                Some(backup.body)
            }
            Err(e) => {
                warn!("dropping corrupt backup for '{}': {}", endpoint, e);
                let _ = self.backups.remove_item(&key);
                None
            }
        }
    }

    // == Health Check ==
    /// Probes each endpoint concurrently with a HEAD request. An errored
    /// probe is down; a successful one slower than the configured timeout is
    /// degraded.
    pub async fn health_check(&self, endpoints: &[String]) -> Vec<EndpointHealth> {
        let config = self.config.read().await.clone();

        let mut handles = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let client = self.client.clone();
            let endpoint = endpoint.clone();
            let probe_timeout = config.timeout;

            handles.push(tokio::spawn(async move {
                let started = Instant::now();
                let probe = client.head(&endpoint).send();

                let status = match timeout(probe_timeout, probe).await {
                    Ok(Ok(response)) if response.status().is_success() => {
                        if started.elapsed() > probe_timeout {
                            EndpointStatus::Degraded
                        } else {
                            EndpointStatus::Healthy
                        }
                    }
                    Ok(_) => EndpointStatus::Down,
                    Err(_) => EndpointStatus::Degraded,
                };

                EndpointHealth {
                    endpoint,
                    status,
                    latency_ms: elapsed_ms(started),
                }
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(health) = handle.await {
                results.push(health);
            }
        }
        results
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
