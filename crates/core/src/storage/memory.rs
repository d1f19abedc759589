use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use blockvault_api::error::{VaultError, VaultResult};
use blockvault_api::storage::{Listing, ObjectMeta, ObjectStore};

use super::assemble_listing;

struct StoredBytes {
    bytes: Vec<u8>,
    content_type: String,
    last_modified: DateTime<Utc>,
}

/// In-memory object store for tests and local development.
///
/// Stricter than a remote store in one way: deleting a missing key is an
/// error, so tests can assert batch-delete outcomes precisely.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, StoredBytes>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    pub async fn content_type_of(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|s| s.content_type.clone())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> VaultResult<()> {
        self.objects.write().await.insert(
            key.to_string(),
            StoredBytes {
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> VaultResult<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|s| s.bytes.clone())
            .ok_or_else(|| VaultError::Storage(format!("no such key: {key}")))
    }

    async fn delete(&self, key: &str) -> VaultResult<()> {
        self.objects
            .write()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| VaultError::Storage(format!("no such key: {key}")))
    }

    async fn list(&self, prefix: &str, delimiter: Option<char>) -> VaultResult<Listing> {
        let objects = self.objects.read().await;
        let metas = objects.iter().map(|(key, stored)| ObjectMeta {
            key: key.clone(),
            size: stored.bytes.len() as u64,
            last_modified: Some(stored.last_modified),
        });
        Ok(assemble_listing(metas, prefix, delimiter))
    }
}
