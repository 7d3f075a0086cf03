//! Key/value backends
//!
//! Records live in named buckets. [`FileStore`] keeps one file per record
//! under the data directory; [`MemoryStore`] is used by tests and as a
//! fallback when the data directory cannot be created.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

use crate::error::StoreError;

/// Logical record namespace
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Bucket {
    /// Cached API document
    Docs,
    /// Environment instance and local variables
    Env,
    /// Per-session records and the ordering record
    Tabs,
    /// Binary attachments
    Files,
}

impl Bucket {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Bucket::Docs => "docs",
            Bucket::Env => "env",
            Bucket::Tabs => "tabs",
            Bucket::Files => "files",
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, bucket: Bucket, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replace the record atomically.
    async fn put(&self, bucket: Bucket, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Removing a missing record is not an error.
    async fn remove(&self, bucket: Bucket, key: &str) -> Result<(), StoreError>;

    async fn keys(&self, bucket: Bucket) -> Result<Vec<String>, StoreError>;

    async fn clear(&self, bucket: Bucket) -> Result<(), StoreError>;
}

/// One file per record: `<root>/<bucket>/<percent-encoded key>.rec`
pub struct FileStore {
    root: PathBuf,
}

const RECORD_EXT: &str = ".rec";

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: Bucket) -> PathBuf {
        self.root.join(bucket.dir_name())
    }

    fn record_path(&self, bucket: Bucket, key: &str) -> PathBuf {
        self.bucket_dir(bucket)
            .join(format!("{}{}", urlencoding::encode(key), RECORD_EXT))
    }

    /// Ensure the bucket directory exists
    async fn ensure_dir(&self, bucket: Bucket) -> Result<PathBuf, StoreError> {
        let dir = self.bucket_dir(bucket);
        if !fs::try_exists(&dir).await? {
            fs::create_dir_all(&dir).await?;
        }
        Ok(dir)
    }
}

#[async_trait]
impl Store for FileStore {
    async fn get(&self, bucket: Bucket, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.record_path(bucket, key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, bucket: Bucket, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let dir = self.ensure_dir(bucket).await?;
        let path = self.record_path(bucket, key);
        let tmp = dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));

        if let Err(e) = fs::write(&tmp, value).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StoreError::from_write(e, key));
        }
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::from_write(e, key))
    }

    async fn remove(&self, bucket: Bucket, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.record_path(bucket, key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self, bucket: Bucket) -> Result<Vec<String>, StoreError> {
        let dir = self.bucket_dir(bucket);
        if !fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(encoded) = name.strip_suffix(RECORD_EXT) {
                if let Ok(key) = urlencoding::decode(encoded) {
                    keys.push(key.into_owned());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn clear(&self, bucket: Bucket) -> Result<(), StoreError> {
        let dir = self.bucket_dir(bucket);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store with an optional byte quota
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<(Bucket, String), Vec<u8>>>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes that would push the total size past `bytes` fail with
    /// [`StoreError::QuotaExceeded`].
    #[cfg(test)]
    pub fn with_quota(bytes: usize) -> Self {
        MemoryStore {
            records: Mutex::new(HashMap::new()),
            quota: Some(bytes),
        }
    }

    #[cfg(test)]
    pub async fn len(&self, bucket: Bucket) -> usize {
        self.records
            .lock()
            .await
            .keys()
            .filter(|(b, _)| *b == bucket)
            .count()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, bucket: Bucket, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .records
            .lock()
            .await
            .get(&(bucket, key.to_string()))
            .cloned())
    }

    async fn put(&self, bucket: Bucket, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        let id = (bucket, key.to_string());

        if let Some(quota) = self.quota {
            let used: usize = records
                .iter()
                .filter(|(k, _)| **k != id)
                .map(|(_, v)| v.len())
                .sum();
            if used + value.len() > quota {
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                });
            }
        }

        records.insert(id, value.to_vec());
        Ok(())
    }

    async fn remove(&self, bucket: Bucket, key: &str) -> Result<(), StoreError> {
        self.records.lock().await.remove(&(bucket, key.to_string()));
        Ok(())
    }

    async fn keys(&self, bucket: Bucket) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self
            .records
            .lock()
            .await
            .keys()
            .filter(|(b, _)| *b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn clear(&self, bucket: Bucket) -> Result<(), StoreError> {
        self.records.lock().await.retain(|(b, _), _| *b != bucket);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_store_round_trips_awkward_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let key = "GET:/users/{id}?x=1";
        assert_eq!(store.get(Bucket::Tabs, key).await.unwrap(), None);

        store.put(Bucket::Tabs, key, b"one").await.unwrap();
        store.put(Bucket::Tabs, key, b"two").await.unwrap();
        assert_eq!(store.get(Bucket::Tabs, key).await.unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.keys(Bucket::Tabs).await.unwrap(), vec![key.to_string()]);
        assert!(store.keys(Bucket::Docs).await.unwrap().is_empty());

        store.remove(Bucket::Tabs, key).await.unwrap();
        store.remove(Bucket::Tabs, key).await.unwrap();
        assert!(store.keys(Bucket::Tabs).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_only_touches_one_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.put(Bucket::Files, "a", b"1").await.unwrap();
        store.put(Bucket::Docs, "doc", b"2").await.unwrap();

        store.clear(Bucket::Files).await.unwrap();
        store.clear(Bucket::Files).await.unwrap();
        assert!(store.keys(Bucket::Files).await.unwrap().is_empty());
        assert!(store.get(Bucket::Docs, "doc").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_memory_quota() {
        let store = MemoryStore::with_quota(4);
        store.put(Bucket::Files, "a", b"123").await.unwrap();
        // replacing a record only counts the new size
        store.put(Bucket::Files, "a", b"1234").await.unwrap();
        let err = store.put(Bucket::Files, "b", b"5").await.unwrap_err();
        assert!(err.is_quota());
    }
}
