//! Binary attachments, addressed by generated id

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::StoreError;
use crate::storage::backend::{Bucket, Store};

/// An uploaded file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub id: String,
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct AttachmentRecord {
    file_name: String,
    mime: String,
    /// base64
    data: String,
}

#[derive(Clone)]
pub struct AttachmentStorage {
    store: Arc<dyn Store>,
}

impl AttachmentStorage {
    pub fn new(store: Arc<dyn Store>) -> Self {
        AttachmentStorage { store }
    }

    /// Store `bytes` and return the new attachment id.
    pub async fn upload(
        &self,
        file_name: &str,
        mime: Option<&str>,
        bytes: &[u8],
    ) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let record = AttachmentRecord {
            file_name: file_name.to_string(),
            mime: mime.unwrap_or("application/octet-stream").to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        };
        let encoded = serde_json::to_vec(&record)?;
        self.store.put(Bucket::Files, &id, &encoded).await?;
        tracing::debug!(id = %id, file_name, size = bytes.len(), "Stored attachment");
        Ok(id)
    }

    /// Missing or unreadable blobs are `None`.
    pub async fn get(&self, id: &str) -> Option<Attachment> {
        let bytes = match self.store.get(Bucket::Files, id).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(id, error = %e, "Reading attachment failed");
                return None;
            }
        };
        let record: AttachmentRecord = serde_json::from_slice(&bytes).ok()?;
        let data = base64::engine::general_purpose::STANDARD
            .decode(record.data)
            .ok()?;
        Some(Attachment {
            id: id.to_string(),
            file_name: record.file_name,
            mime: record.mime,
            bytes: data,
        })
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.store.remove(Bucket::Files, id).await
    }

    pub async fn ids(&self) -> Vec<String> {
        self.store.keys(Bucket::Files).await.unwrap_or_default()
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        self.store.clear(Bucket::Files).await
    }
}
