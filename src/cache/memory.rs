//! In-process cache backend. No durability, no cross-process sharing.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CacheBackend, StoredEntry, epoch_secs};
use crate::error::Result;

/// Number of writes between stale-entry sweeps.
///
/// Sweeping on every write would make `set` O(n); amortizing keeps the map
/// from accumulating expired entries without a background task.
const SWEEP_INTERVAL: u64 = 256;

/// In-memory backend keyed by `(namespace, key)`.
pub struct MemoryBackend {
    entries: RwLock<HashMap<(String, String), StoredEntry>>,
    writes: std::sync::atomic::AtomicU64,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            writes: std::sync::atomic::AtomicU64::new(0),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<StoredEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(&(namespace.to_string(), key.to_string()))
            .cloned())
    }

    async fn set(&self, namespace: &str, key: &str, entry: StoredEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert((namespace.to_string(), key.to_string()), entry);

        let writes = self
            .writes
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        if writes % SWEEP_INTERVAL == SWEEP_INTERVAL - 1 {
            let now = epoch_secs();
            entries.retain(|_, e| !e.is_expired(now));
        }
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .remove(&(namespace.to_string(), key.to_string()));
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn len(&self, namespace: &str) -> Result<usize> {
        let entries = self.entries.read().await;
        Ok(entries.keys().filter(|(ns, _)| ns == namespace).count())
    }

    fn name(&self) -> &'static str {
        "memory"
    }

    async fn healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(payload: &str) -> StoredEntry {
        StoredEntry {
            payload: payload.to_string(),
            inserted_at: epoch_secs(),
            ttl_seconds: 60,
        }
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let backend = MemoryBackend::new();
        backend.set("ns", "k", entry("v")).await.unwrap();
        assert_eq!(
            backend.get("ns", "k").await.unwrap().unwrap().payload,
            "v"
        );
        backend.delete("ns", "k").await.unwrap();
        assert!(backend.get("ns", "k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_namespaces_are_distinct() {
        let backend = MemoryBackend::new();
        backend.set("a", "k", entry("1")).await.unwrap();
        backend.set("b", "k", entry("2")).await.unwrap();
        assert_eq!(backend.get("a", "k").await.unwrap().unwrap().payload, "1");
        assert_eq!(backend.get("b", "k").await.unwrap().unwrap().payload, "2");
        assert_eq!(backend.len("a").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sweep_drops_expired_entries() {
        let backend = MemoryBackend::new();
        let stale = StoredEntry {
            payload: "old".to_string(),
            inserted_at: epoch_secs() - 1_000,
            ttl_seconds: 1,
        };
        backend.set("ns", "stale", stale).await.unwrap();
        for i in 0..SWEEP_INTERVAL {
            backend
                .set("ns", &format!("k{i}"), entry("v"))
                .await
                .unwrap();
        }
        assert!(backend.get("ns", "stale").await.unwrap().is_none());
    }
}
