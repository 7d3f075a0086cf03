//! Durable storage
//!
//! Typed repositories over a [`Store`] backend. Reads never fail: a missing
//! or unreadable record is logged and reported as absent, so callers fall
//! back to a fresh remote fetch. Writes return [`StoreError`] so quota
//! exhaustion can reach the user.

pub mod attachments;
pub mod backend;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::StoreError;
use crate::models::{ApiDoc, EnvironmentSchema};
use crate::session::{DebounceSink, TabDoc, TabOrderItem};
use crate::variables::ResolvedVariable;

pub use attachments::{Attachment, AttachmentStorage};
pub use backend::{Bucket, FileStore, MemoryStore, Store};

const DOC_KEY: &str = "doc";
const ENV_INSTANCE_KEY: &str = "instance";
const ENV_VARS_KEY: &str = "vars";
const TAB_ORDER_KEY: &str = "ORDER";
const TAB_PREFIX: &str = "TAB::";

async fn read_json<T: DeserializeOwned>(store: &dyn Store, bucket: Bucket, key: &str) -> Option<T> {
    let bytes = match store.get(bucket, key).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(bucket = bucket.dir_name(), key, error = %e, "Storage read failed");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(bucket = bucket.dir_name(), key, error = %e, "Discarding corrupt record");
            None
        }
    }
}

async fn write_json<T: Serialize + ?Sized>(
    store: &dyn Store,
    bucket: Bucket,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec(value)?;
    store.put(bucket, key, &bytes).await
}

/// Last fetched API document
#[derive(Clone)]
pub struct DocStorage {
    store: Arc<dyn Store>,
}

impl DocStorage {
    pub async fn get(&self) -> Option<ApiDoc> {
        read_json(self.store.as_ref(), Bucket::Docs, DOC_KEY).await
    }

    pub async fn save(&self, doc: &ApiDoc) -> Result<(), StoreError> {
        write_json(self.store.as_ref(), Bucket::Docs, DOC_KEY, doc).await
    }
}

/// Environment schema together with the fingerprint it was fetched under
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvInstance {
    pub instance: EnvironmentSchema,
    pub uptime: String,
}

#[derive(Clone)]
pub struct EnvStorage {
    store: Arc<dyn Store>,
}

impl EnvStorage {
    pub async fn instance(&self) -> Option<EnvInstance> {
        read_json(self.store.as_ref(), Bucket::Env, ENV_INSTANCE_KEY).await
    }

    pub async fn save_instance(&self, instance: &EnvInstance) -> Result<(), StoreError> {
        write_json(self.store.as_ref(), Bucket::Env, ENV_INSTANCE_KEY, instance).await
    }

    /// Locally edited variables, as last saved.
    pub async fn local_vars(&self) -> Vec<ResolvedVariable> {
        read_json(self.store.as_ref(), Bucket::Env, ENV_VARS_KEY)
            .await
            .unwrap_or_default()
    }

    pub async fn save_local_vars(&self, vars: &[ResolvedVariable]) -> Result<(), StoreError> {
        write_json(self.store.as_ref(), Bucket::Env, ENV_VARS_KEY, vars).await
    }
}

/// Session records, keyed `TAB::{METHOD}:{path}`, and the ordering record
#[derive(Clone)]
pub struct TabStorage {
    store: Arc<dyn Store>,
}

impl TabStorage {
    fn record_key(key: &str) -> String {
        format!("{}{}", TAB_PREFIX, key)
    }

    pub async fn get(&self, key: &str) -> Option<TabDoc> {
        read_json(self.store.as_ref(), Bucket::Tabs, &Self::record_key(key)).await
    }

    pub async fn put(&self, tab: &TabDoc) -> Result<(), StoreError> {
        write_json(self.store.as_ref(), Bucket::Tabs, &Self::record_key(&tab.key), tab).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.store
            .remove(Bucket::Tabs, &Self::record_key(key))
            .await
    }

    pub async fn all(&self) -> Vec<TabDoc> {
        let keys = match self.store.keys(Bucket::Tabs).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "Listing session records failed");
                return Vec::new();
            }
        };

        let mut tabs = Vec::new();
        for key in keys.iter().filter(|k| k.starts_with(TAB_PREFIX)) {
            if let Some(tab) = read_json(self.store.as_ref(), Bucket::Tabs, key).await {
                tabs.push(tab);
            }
        }
        tabs
    }

    /// Removes every session record but keeps the ordering record.
    pub async fn clear(&self) -> Result<(), StoreError> {
        for key in self.store.keys(Bucket::Tabs).await? {
            if key.starts_with(TAB_PREFIX) {
                self.store.remove(Bucket::Tabs, &key).await?;
            }
        }
        Ok(())
    }

    pub async fn order(&self) -> Vec<TabOrderItem> {
        read_json(self.store.as_ref(), Bucket::Tabs, TAB_ORDER_KEY)
            .await
            .unwrap_or_default()
    }

    pub async fn save_order(&self, items: &[TabOrderItem]) -> Result<(), StoreError> {
        write_json(self.store.as_ref(), Bucket::Tabs, TAB_ORDER_KEY, items).await
    }
}

#[async_trait]
impl DebounceSink<TabDoc> for TabStorage {
    async fn write(&self, _key: &str, payload: &TabDoc) -> Result<(), StoreError> {
        self.put(payload).await
    }
}

/// Every repository, sharing one backend
#[derive(Clone)]
pub struct Storage {
    pub docs: DocStorage,
    pub env: EnvStorage,
    pub tabs: TabStorage,
    pub files: AttachmentStorage,
}

impl Storage {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Storage {
            docs: DocStorage {
                store: Arc::clone(&store),
            },
            env: EnvStorage {
                store: Arc::clone(&store),
            },
            tabs: TabStorage {
                store: Arc::clone(&store),
            },
            files: AttachmentStorage::new(store),
        }
    }

    /// Directory-backed storage under `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileStore::new(dir)))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures;
    use crate::models::HttpMethod;
    use crate::session::build_tab_doc;

    #[tokio::test]
    async fn test_corrupt_record_is_a_cache_miss() {
        let store = Arc::new(MemoryStore::new());
        store.put(Bucket::Docs, DOC_KEY, b"{not json").await.unwrap();
        let storage = Storage::new(store);
        assert!(storage.docs.get().await.is_none());
    }

    #[tokio::test]
    async fn test_tab_records_and_order_are_separate() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path());

        let ep = fixtures::endpoint(HttpMethod::GET, "/users/{id}", "Get user");
        let tab = build_tab_doc(&ep, None);
        storage.tabs.put(&tab).await.unwrap();
        storage
            .tabs
            .save_order(&[TabOrderItem {
                tab_key: tab.key.clone(),
                order: 0,
                name: tab.name.clone(),
            }])
            .await
            .unwrap();

        let all = storage.tabs.all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], tab);

        storage.tabs.clear().await.unwrap();
        assert!(storage.tabs.all().await.is_empty());
        assert_eq!(storage.tabs.order().await.len(), 1);
    }

    #[tokio::test]
    async fn test_doc_and_env_round_trip() {
        let storage = Storage::in_memory();
        let doc = fixtures::doc("17s", Vec::new());
        storage.docs.save(&doc).await.unwrap();
        assert_eq!(storage.docs.get().await, Some(doc));

        let instance = EnvInstance {
            instance: EnvironmentSchema::default(),
            uptime: "17s".into(),
        };
        storage.env.save_instance(&instance).await.unwrap();
        assert_eq!(storage.env.instance().await, Some(instance));
        assert!(storage.env.local_vars().await.is_empty());
    }
}
