//! Redis-backed cache backend for sharing entries across processes.
//!
//! Requires the **`redis-cache`** feature. Entries are stored as JSON with
//! `SETEX` so Redis enforces expiry on its side too; the front still checks
//! `inserted_at + ttl_seconds` so semantics match the other backends.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::info;

use super::{CacheBackend, StoredEntry};
use crate::error::{FredQueryError, Result};

/// Redis key prefix so a shared instance can host other applications
const KEY_PREFIX: &str = "fq:";

/// External (Redis) cache backend.
pub struct ExternalBackend {
    conn: ConnectionManager,
}

impl ExternalBackend {
    /// Connect to Redis at `url`. Connection failure at bootstrap is a
    /// configuration error; once connected, per-operation failures degrade.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| FredQueryError::Config {
            context: format!("invalid CACHE_EXTERNAL_URL: {e}"),
        })?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| FredQueryError::Config {
                context: format!("cannot connect to external cache: {e}"),
            })?;
        info!(url = %url, "external cache connected");
        Ok(Self { conn })
    }

    fn redis_key(namespace: &str, key: &str) -> String {
        format!("{KEY_PREFIX}{namespace}:{key}")
    }

    fn map_err(e: redis::RedisError) -> FredQueryError {
        FredQueryError::ResponseStructureError {
            field: "redis".to_string(),
            context: e.to_string(),
        }
    }
}

#[async_trait]
impl CacheBackend for ExternalBackend {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<StoredEntry>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(Self::redis_key(namespace, key))
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, namespace: &str, key: &str, entry: StoredEntry) -> Result<()> {
        let mut conn = self.conn.clone();
        let data = serde_json::to_string(&entry)?;
        redis::cmd("SETEX")
            .arg(Self::redis_key(namespace, key))
            .arg(entry.ttl_seconds.max(1))
            .arg(data)
            .query_async::<()>(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(Self::redis_key(namespace, key))
            .query_async::<()>(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(format!("{KEY_PREFIX}*"))
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        if !keys.is_empty() {
            redis::cmd("DEL")
                .arg(keys)
                .query_async::<()>(&mut conn)
                .await
                .map_err(Self::map_err)?;
        }
        Ok(())
    }

    async fn len(&self, namespace: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(format!("{KEY_PREFIX}{namespace}:*"))
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(keys.len())
    }

    fn name(&self) -> &'static str {
        "external"
    }

    async fn healthy(&self) -> bool {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_key_layout() {
        assert_eq!(
            ExternalBackend::redis_key("fred:search", "q?text=cpi"),
            "fq:fred:search:q?text=cpi"
        );
    }

    #[tokio::test]
    #[ignore = "requires a running Redis instance"]
    async fn test_round_trip_against_local_redis() {
        let backend = ExternalBackend::connect("redis://127.0.0.1:6379")
            .await
            .unwrap();
        let entry = StoredEntry {
            payload: "{\"x\":1}".to_string(),
            inserted_at: crate::cache::epoch_secs(),
            ttl_seconds: 30,
        };
        backend.set("test", "k", entry).await.unwrap();
        let loaded = backend.get("test", "k").await.unwrap().unwrap();
        assert_eq!(loaded.payload, "{\"x\":1}");
        backend.delete("test", "k").await.unwrap();
        assert!(backend.get("test", "k").await.unwrap().is_none());
    }
}
