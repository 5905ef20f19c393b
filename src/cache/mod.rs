//! Namespaced TTL cache with pluggable backends.
//!
//! The backend (memory, disk, or Redis) is chosen once at bootstrap from
//! configuration, never per call. Backend failures on reads degrade to a
//! miss and failures on writes are logged and swallowed: a broken cache must
//! never fail a request that FRED can still answer.

mod disk;
#[cfg(feature = "redis-cache")]
mod external;
mod memory;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::{CacheBackendKind, Config};
use crate::error::Result;
use crate::telemetry::Telemetry;

pub use disk::DiskBackend;
#[cfg(feature = "redis-cache")]
pub use external::ExternalBackend;
pub use memory::MemoryBackend;

/// Well-known cache namespaces and their default TTLs.
pub mod ns {
    /// Full-text and series-id searches
    pub const SEARCH: &str = "fred:search";
    /// Series metadata
    pub const SERIES: &str = "fred:series";
    /// Series observations
    pub const OBSERVATIONS: &str = "fred:observations";
    /// Category tree lookups
    pub const CATEGORIES: &str = "fred:categories";
    /// Tag lookups
    pub const TAGS: &str = "fred:tags";

    /// Default TTL in seconds for a namespace, if it has one.
    pub fn default_ttl(namespace: &str) -> Option<u64> {
        match namespace {
            SEARCH => Some(300),
            SERIES => Some(3_600),
            OBSERVATIONS | CATEGORIES => Some(86_400),
            TAGS => Some(1_800),
            _ => None,
        }
    }
}

/// One stored cache entry. Not mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    /// The cached payload, byte-for-byte as serialized by the writer
    pub payload: String,
    /// Unix epoch seconds at insert time
    pub inserted_at: u64,
    /// Time to live in seconds
    pub ttl_seconds: u64,
}

impl StoredEntry {
    fn new(payload: String, ttl_seconds: u64) -> Self {
        Self {
            payload,
            inserted_at: epoch_secs(),
            ttl_seconds,
        }
    }

    /// An entry is expired once `now - inserted_at > ttl_seconds`.
    pub fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.inserted_at) > self.ttl_seconds
    }
}

pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Storage backend contract. All backends share these semantics; only
/// durability and process-sharing differ.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch an entry if physically present (expiry is enforced by the front)
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<StoredEntry>>;
    /// Store an entry, overwriting any previous value
    async fn set(&self, namespace: &str, key: &str, entry: StoredEntry) -> Result<()>;
    /// Remove one entry
    async fn delete(&self, namespace: &str, key: &str) -> Result<()>;
    /// Remove everything
    async fn clear(&self) -> Result<()>;
    /// Entries currently stored in a namespace
    async fn len(&self, namespace: &str) -> Result<usize>;
    /// Backend name for the telemetry snapshot
    fn name(&self) -> &'static str;
    /// Whether the backend is currently reachable
    async fn healthy(&self) -> bool;
}

#[derive(Default, Clone, Copy)]
struct HitMiss {
    hits: u64,
    misses: u64,
}

/// Namespaced cache front shared by every tool.
pub struct Cache {
    backend: Box<dyn CacheBackend>,
    default_ttl: u64,
    counters: Mutex<HashMap<String, HitMiss>>,
    telemetry: Arc<Telemetry>,
}

impl Cache {
    /// Construct the backend named by configuration.
    pub async fn from_config(config: &Config, telemetry: Arc<Telemetry>) -> Result<Self> {
        let backend: Box<dyn CacheBackend> = match config.cache_backend {
            CacheBackendKind::Memory => Box::new(MemoryBackend::new()),
            CacheBackendKind::Disk => Box::new(DiskBackend::new(&config.cache_disk_root)?),
            #[cfg(feature = "redis-cache")]
            CacheBackendKind::External => {
                let url = config.cache_external_url.as_deref().unwrap_or_default();
                Box::new(ExternalBackend::connect(url).await?)
            }
            #[cfg(not(feature = "redis-cache"))]
            CacheBackendKind::External => {
                return Err(crate::error::FredQueryError::Config {
                    context: "CACHE_BACKEND=external requires the 'redis-cache' feature"
                        .to_string(),
                });
            }
        };
        Ok(Self::with_backend(backend, config.cache_default_ttl, telemetry))
    }

    /// Construct around an explicit backend (tests, embedders).
    pub fn with_backend(
        backend: Box<dyn CacheBackend>,
        default_ttl: u64,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            backend,
            default_ttl,
            counters: Mutex::new(HashMap::new()),
            telemetry,
        }
    }

    /// Build a cache key from an endpoint and its canonical (sorted) params.
    pub fn key(endpoint: &str, params: &[(String, String)]) -> String {
        if params.is_empty() {
            return endpoint.to_string();
        }
        let joined: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("{}?{}", endpoint, joined.join("&"))
    }

    /// Look up a payload. Expired or unreadable entries report a miss.
    pub async fn get(&self, namespace: &str, key: &str) -> Option<String> {
        let timer = self.telemetry.cache_timer(namespace);
        let result = self.backend.get(namespace, key).await;
        timer.observe();

        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                warn!(namespace = %namespace, key = %key, error = %e, "cache GET error");
                None
            }
        };

        match entry {
            Some(entry) if !entry.is_expired(epoch_secs()) => {
                debug!(namespace = %namespace, key = %key, "cache HIT");
                self.count_hit(namespace);
                Some(entry.payload)
            }
            Some(_) => {
                debug!(namespace = %namespace, key = %key, "cache EXPIRED");
                // Expired entries are removed lazily; failure is irrelevant
                let _ = self.backend.delete(namespace, key).await;
                self.count_miss(namespace);
                None
            }
            None => {
                debug!(namespace = %namespace, key = %key, "cache MISS");
                self.count_miss(namespace);
                None
            }
        }
    }

    /// Store a payload. The namespace default TTL applies unless overridden.
    pub async fn set(&self, namespace: &str, key: &str, payload: String, ttl_override: Option<u64>) {
        let ttl = ttl_override
            .or_else(|| ns::default_ttl(namespace))
            .unwrap_or(self.default_ttl);
        let timer = self.telemetry.cache_timer(namespace);
        let result = self
            .backend
            .set(namespace, key, StoredEntry::new(payload, ttl))
            .await;
        timer.observe();

        match result {
            Ok(()) => {
                debug!(namespace = %namespace, key = %key, ttl = ttl, "cache SET");
                if let Ok(size) = self.backend.len(namespace).await {
                    self.telemetry
                        .cache_size
                        .with_label_values(&[namespace])
                        .set(size as f64);
                }
            }
            Err(e) => {
                warn!(namespace = %namespace, key = %key, error = %e, "cache SET error");
            }
        }
    }

    /// Remove one entry.
    pub async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        self.backend.delete(namespace, key).await
    }

    /// Remove every entry across all namespaces.
    pub async fn clear(&self) -> Result<()> {
        self.backend.clear().await
    }

    /// Per-namespace TTLs and hit/miss counts, plus backend connectivity.
    pub async fn snapshot(&self) -> Value {
        // Guard must drop before the await below
        let namespaces = {
            let counters = self.counters.lock().expect("cache counters poisoned");
            let mut namespaces = serde_json::Map::new();
            for (namespace, hm) in counters.iter() {
                namespaces.insert(
                    namespace.clone(),
                    json!({
                        "ttl": ns::default_ttl(namespace).unwrap_or(self.default_ttl),
                        "hits": hm.hits,
                        "misses": hm.misses,
                    }),
                );
            }
            namespaces
        };
        let healthy = self.backend.healthy().await;
        json!({
            "backend": self.backend.name(),
            "healthy": healthy,
            "namespaces": namespaces,
        })
    }

    fn count_hit(&self, namespace: &str) {
        self.counters
            .lock()
            .expect("cache counters poisoned")
            .entry(namespace.to_string())
            .or_default()
            .hits += 1;
        self.telemetry
            .cache_hits_total
            .with_label_values(&[namespace])
            .inc();
    }

    fn count_miss(&self, namespace: &str) {
        self.counters
            .lock()
            .expect("cache counters poisoned")
            .entry(namespace.to_string())
            .or_default()
            .misses += 1;
        self.telemetry
            .cache_misses_total
            .with_label_values(&[namespace])
            .inc();
    }
}
