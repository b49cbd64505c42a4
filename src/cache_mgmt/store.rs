//! Storage backends for cache entries

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use super::types::{CacheEntry, CacheError};
use crate::migration::fsutil::sanitize_filename;

/// Key-addressed storage of [`CacheEntry`] records
#[async_trait]
pub trait CacheStore: Send + Sync + fmt::Debug {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Insert or replace the entry stored under `entry.key`
    async fn put(&self, entry: &CacheEntry) -> Result<(), CacheError>;

    /// Returns whether an entry was removed
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    async fn entries(&self) -> Result<Vec<CacheEntry>, CacheError>;
}

/// In-memory store, used in tests and for ephemeral caches
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, CacheEntry>>, CacheError> {
        self.entries
            .lock()
            .map_err(|_| CacheError::Storage("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn put(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        self.lock()?.insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.lock()?.remove(key).is_some())
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        Ok(self.lock()?.values().cloned().collect())
    }
}

/// One JSON document per entry: `<dir>/<key>.json`
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    /// The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_filename(key)))
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = serde_json::to_vec_pretty(entry)?;
        tokio::fs::write(self.path_for(&entry.key), bytes).await?;
        debug!("Stored cache entry {}", entry.key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Unparseable files are skipped with a warning.
    async fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut entries = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<CacheEntry>(&bytes) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Ignoring unreadable cache file {}: {}", path.display(), e),
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_mgmt::types::TokenUsage;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn entry(key: &str) -> CacheEntry {
        let now = Utc::now();
        CacheEntry {
            key: key.to_string(),
            content: "response".to_string(),
            workspace: "ws".to_string(),
            model: "gpt-4o".to_string(),
            usage: TokenUsage::new(10, 20),
            cost: 0.01,
            quality_score: 0.9,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            expires_at: None,
            size_bytes: 8,
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_file_store_crud() {
        let dir = tempdir().unwrap();
        let store = FileCacheStore::new(dir.path().join("cache"));
        assert!(store.entries().await.unwrap().is_empty());

        store.put(&entry("abc")).await.unwrap();
        store.put(&entry("def")).await.unwrap();
        assert_eq!(store.get("abc").await.unwrap().unwrap().content, "response");
        assert_eq!(store.entries().await.unwrap().len(), 2);

        assert!(store.delete("abc").await.unwrap());
        assert!(!store.delete("abc").await.unwrap());
        assert!(store.get("abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_skips_garbage() {
        let dir = tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();
        store.put(&entry("ok")).await.unwrap();
        assert_eq!(store.entries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryCacheStore::new();
        store.put(&entry("k")).await.unwrap();
        assert!(store.get("k").await.unwrap().is_some());
        assert!(store.delete("k").await.unwrap());
        assert!(store.entries().await.unwrap().is_empty());
    }
}
