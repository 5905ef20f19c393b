//! Disk-persistent cache backend.
//!
//! One payload file per `(namespace, key)` with a JSON sidecar holding
//! `inserted_at` and `ttl_seconds`. Both files are written atomically via a
//! temp file and rename so a crash never leaves a torn entry. A corrupt or
//! missing sidecar is treated as a miss, never an error.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{CacheBackend, StoredEntry};
use crate::error::Result;

#[derive(Serialize, Deserialize)]
struct Sidecar {
    inserted_at: u64,
    ttl_seconds: u64,
}

/// Filesystem-backed cache rooted at a configurable directory.
pub struct DiskBackend {
    root: PathBuf,
}

impl DiskBackend {
    /// Create the backend, ensuring the root directory exists.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Keys carry URL-ish characters; the filename is a sanitized prefix plus
    /// a hash suffix so distinct keys never collide on sanitization.
    fn file_stem(key: &str) -> String {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let sanitized: String = key
            .chars()
            .take(80)
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("{sanitized}-{:016x}", hasher.finish())
    }

    fn namespace_dir(&self, namespace: &str) -> PathBuf {
        self.root.join(Self::file_stem(namespace))
    }

    fn paths(&self, namespace: &str, key: &str) -> (PathBuf, PathBuf) {
        let dir = self.namespace_dir(namespace);
        let stem = Self::file_stem(key);
        (dir.join(format!("{stem}.json")), dir.join(format!("{stem}.meta.json")))
    }

    async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, path).await
    }
}

#[async_trait]
impl CacheBackend for DiskBackend {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<StoredEntry>> {
        let (payload_path, sidecar_path) = self.paths(namespace, key);

        let payload = match tokio::fs::read_to_string(&payload_path).await {
            Ok(p) => p,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let sidecar: Sidecar = match tokio::fs::read_to_string(&sidecar_path).await {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(s) => s,
                Err(e) => {
                    warn!(
                        namespace = %namespace,
                        path = %sidecar_path.display(),
                        error = %e,
                        "corrupt cache sidecar, treating as miss"
                    );
                    return Ok(None);
                }
            },
            Err(_) => {
                warn!(
                    namespace = %namespace,
                    path = %sidecar_path.display(),
                    "missing cache sidecar, treating as miss"
                );
                return Ok(None);
            }
        };

        Ok(Some(StoredEntry {
            payload,
            inserted_at: sidecar.inserted_at,
            ttl_seconds: sidecar.ttl_seconds,
        }))
    }

    async fn set(&self, namespace: &str, key: &str, entry: StoredEntry) -> Result<()> {
        let dir = self.namespace_dir(namespace);
        tokio::fs::create_dir_all(&dir).await?;

        let (payload_path, sidecar_path) = self.paths(namespace, key);
        let sidecar = serde_json::to_vec(&Sidecar {
            inserted_at: entry.inserted_at,
            ttl_seconds: entry.ttl_seconds,
        })?;

        Self::write_atomic(&payload_path, entry.payload.as_bytes()).await?;
        Self::write_atomic(&sidecar_path, &sidecar).await?;
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        let (payload_path, sidecar_path) = self.paths(namespace, key);
        for path in [payload_path, sidecar_path] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut dirs = tokio::fs::read_dir(&self.root).await?;
        while let Some(dir) = dirs.next_entry().await? {
            if dir.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(dir.path()).await?;
            }
        }
        Ok(())
    }

    async fn len(&self, namespace: &str) -> Result<usize> {
        let dir = self.namespace_dir(namespace);
        let mut count = 0usize;
        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(r) => r,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        while let Some(file) = reader.next_entry().await? {
            let name = file.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(".json") && !name.ends_with(".meta.json") {
                count += 1;
            }
        }
        Ok(count)
    }

    fn name(&self) -> &'static str {
        "disk"
    }

    async fn healthy(&self) -> bool {
        tokio::fs::metadata(&self.root).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::epoch_secs;

    fn entry(payload: &str) -> StoredEntry {
        StoredEntry {
            payload: payload.to_string(),
            inserted_at: epoch_secs(),
            ttl_seconds: 60,
        }
    }

    #[tokio::test]
    async fn test_round_trip_preserves_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let backend = DiskBackend::new(dir.path()).unwrap();
        let payload = "{\"observations\":[{\"date\":\"2020-01-01\",\"value\":\"1.5\"}]}";
        backend
            .set("fred:observations", "obs?series_id=GDP", entry(payload))
            .await
            .unwrap();
        let loaded = backend
            .get("fred:observations", "obs?series_id=GDP")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.payload, payload);
        assert_eq!(loaded.ttl_seconds, 60);
    }

    #[tokio::test]
    async fn test_corrupt_sidecar_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let backend = DiskBackend::new(dir.path()).unwrap();
        backend.set("ns", "k", entry("v")).await.unwrap();

        let (_, sidecar_path) = backend.paths("ns", "k");
        tokio::fs::write(&sidecar_path, b"not json at all")
            .await
            .unwrap();

        assert!(backend.get("ns", "k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_distinct_keys_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let backend = DiskBackend::new(dir.path()).unwrap();
        // Same sanitized prefix, different content: hash suffix must differ
        backend.set("ns", "a?x=1", entry("one")).await.unwrap();
        backend.set("ns", "a?x=2", entry("two")).await.unwrap();
        assert_eq!(backend.get("ns", "a?x=1").await.unwrap().unwrap().payload, "one");
        assert_eq!(backend.get("ns", "a?x=2").await.unwrap().unwrap().payload, "two");
        assert_eq!(backend.len("ns").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let backend = DiskBackend::new(dir.path()).unwrap();
        backend.set("ns", "k", entry("v")).await.unwrap();
        backend.delete("ns", "k").await.unwrap();
        assert!(backend.get("ns", "k").await.unwrap().is_none());
        // Deleting a missing key is not an error
        backend.delete("ns", "k").await.unwrap();

        backend.set("ns", "k2", entry("v")).await.unwrap();
        backend.clear().await.unwrap();
        assert_eq!(backend.len("ns").await.unwrap(), 0);
    }
}
