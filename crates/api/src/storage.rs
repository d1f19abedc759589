use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::VaultResult;

/// One stored object as seen by `list`.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Result of a prefix listing. When a delimiter is given, keys containing it
/// past the prefix are rolled up into `common_prefixes` instead of appearing
/// in `objects`, which gives folder-style browsing over a flat keyspace.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub objects: Vec<ObjectMeta>,
    pub common_prefixes: Vec<String>,
}

/// Narrow byte-level contract over durable object storage.
///
/// Implementations do not retry and do not interpret keys beyond prefix
/// matching; naming conventions, URLs and batch semantics live in the
/// gateway built on top of this.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> VaultResult<()>;

    async fn get(&self, key: &str) -> VaultResult<Vec<u8>>;

    async fn delete(&self, key: &str) -> VaultResult<()>;

    async fn list(&self, prefix: &str, delimiter: Option<char>) -> VaultResult<Listing>;
}
