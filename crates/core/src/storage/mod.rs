//! Object storage gateway and backends.
//!
//! The gateway owns everything above the byte-level `ObjectStore` port: the
//! key-namespacing convention, name sanitization, public URL building, batch
//! deletion and folder-style browsing. It never retries; retry policy
//! belongs to callers.

mod fs;
mod memory;

pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use blockvault_api::models::SaveType;
use blockvault_api::storage::{Listing, ObjectMeta, ObjectStore};

use crate::error::Result;

/// Longest sanitized project name kept in a key.
const MAX_NAME_LEN: usize = 100;

/// Metadata side-file suffixes hidden from browse results.
const HIDDEN_SUFFIXES: &[&str] = &[".json", ".meta.json"];

/// Outcome of one upload.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
    pub size: u64,
}

/// Per-key outcome of a batch delete. Failed keys never abort the batch.
#[derive(Debug, Default)]
pub struct BatchDeleteStats {
    pub deleted: Vec<String>,
    pub errors: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct BrowseEntry {
    pub name: String,
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Folder-style view over one key prefix.
#[derive(Debug, Default)]
pub struct BrowseListing {
    pub folders: Vec<String>,
    pub files: Vec<BrowseEntry>,
}

pub struct StorageGateway {
    store: Arc<dyn ObjectStore>,
    public_base_url: String,
}

impl StorageGateway {
    pub fn new(store: Arc<dyn ObjectStore>, public_base_url: impl Into<String>) -> Self {
        let public_base_url = public_base_url.into().trim_end_matches('/').to_string();
        Self {
            store,
            public_base_url,
        }
    }

    /// `users/{owner}/{platform}/{saveType}/{sanitized}_{timestamp}.{ext}`.
    /// The millisecond timestamp suffix keeps repeated saves under the same
    /// name from ever colliding.
    pub fn object_key(
        owner: &str,
        platform: &str,
        save_type: SaveType,
        name: &str,
        extension: &str,
    ) -> String {
        let timestamp = unique_millis();
        format!(
            "users/{owner}/{platform}/{save_type}/{}_{timestamp}.{extension}",
            sanitize_name(name)
        )
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{key}", self.public_base_url)
    }

    pub async fn upload(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<StoredObject> {
        self.store.put(key, bytes, content_type).await?;
        debug!(key, size = bytes.len(), content_type, "uploaded object");
        Ok(StoredObject {
            key: key.to_string(),
            url: self.public_url(key),
            size: bytes.len() as u64,
        })
    }

    pub async fn download(&self, key: &str) -> Result<Vec<u8>> {
        self.store.get(key).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.store.delete(key).await
    }

    /// Delete every key, collecting per-key outcomes instead of stopping at
    /// the first failure.
    pub async fn delete_many(&self, keys: &[String]) -> BatchDeleteStats {
        let mut stats = BatchDeleteStats::default();
        for key in keys {
            match self.store.delete(key).await {
                Ok(()) => stats.deleted.push(key.clone()),
                Err(err) => {
                    warn!(key, %err, "batch delete failed for key");
                    stats.errors.push((key.clone(), err.to_string()));
                }
            }
        }
        stats
    }

    /// Folder-style browse of one prefix: delimiter-grouped sub-folders plus
    /// visible files, with metadata side-files filtered out.
    pub async fn browse(&self, prefix: &str) -> Result<BrowseListing> {
        let listing = self.store.list(prefix, Some('/')).await?;

        let folders = listing
            .common_prefixes
            .iter()
            .filter_map(|p| {
                let rest = p.strip_prefix(prefix).unwrap_or(p);
                let name = rest.trim_end_matches('/');
                (!name.is_empty()).then(|| name.to_string())
            })
            .collect();

        let files = listing
            .objects
            .into_iter()
            .filter(|obj| obj.key != prefix)
            .filter(|obj| !HIDDEN_SUFFIXES.iter().any(|s| obj.key.ends_with(s)))
            .map(|obj| BrowseEntry {
                name: obj
                    .key
                    .rsplit('/')
                    .next()
                    .unwrap_or(obj.key.as_str())
                    .to_string(),
                key: obj.key,
                size: obj.size,
                last_modified: obj.last_modified,
            })
            .collect();

        Ok(BrowseListing { folders, files })
    }
}

static LAST_KEY_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Millisecond timestamp bumped past the last one issued, so keys minted
/// within the same instant stay distinct.
pub(crate) fn unique_millis() -> i64 {
    let now = Utc::now().timestamp_millis();
    let prev = match LAST_KEY_MILLIS.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
        Some(last.max(now - 1) + 1)
    }) {
        Ok(prev) | Err(prev) => prev,
    };
    prev.max(now - 1) + 1
}

/// Keep ASCII alphanumerics, Hangul syllables, `_` and `-`; everything else
/// becomes `_`. Truncated so keys stay well under backend limits.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' || ('가'..='힣').contains(&c) {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_LEN)
        .collect()
}

/// Roll flat keys up into a `Listing`, grouping keys that contain the
/// delimiter past the prefix under their common prefix. Shared by backends
/// that store keys flat.
pub(crate) fn assemble_listing(
    keys: impl IntoIterator<Item = ObjectMeta>,
    prefix: &str,
    delimiter: Option<char>,
) -> Listing {
    let mut listing = Listing::default();
    let mut seen_prefixes = std::collections::BTreeSet::new();

    for meta in keys {
        if !meta.key.starts_with(prefix) {
            continue;
        }
        match delimiter {
            Some(d) => {
                let rest = &meta.key[prefix.len()..];
                match rest.find(d) {
                    Some(idx) => {
                        let common = format!("{prefix}{}{d}", &rest[..idx]);
                        if seen_prefixes.insert(common.clone()) {
                            listing.common_prefixes.push(common);
                        }
                    }
                    None => listing.objects.push(meta),
                }
            }
            None => listing.objects.push(meta),
        }
    }
    listing
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_the_namespacing_convention() {
        let key = StorageGateway::object_key("u1", "demo", SaveType::Draft, "My Project", "ent");
        let re = regex::Regex::new(r"^users/u1/demo/draft/My_Project_\d+\.ent$").unwrap();
        assert!(re.is_match(&key), "unexpected key: {key}");
    }

    #[test]
    fn keys_minted_in_the_same_instant_stay_distinct() {
        let keys: std::collections::HashSet<String> = (0..64)
            .map(|_| StorageGateway::object_key("u1", "demo", SaveType::Draft, "P", "ent"))
            .collect();
        assert_eq!(keys.len(), 64);
    }

    #[test]
    fn sanitizer_keeps_hangul_and_truncates() {
        assert_eq!(sanitize_name("내 프로젝트!"), "내_프로젝트_");
        assert_eq!(sanitize_name("a/b\\c:d"), "a_b_c_d");
        let long = "x".repeat(500);
        assert_eq!(sanitize_name(&long).chars().count(), MAX_NAME_LEN);
    }

    #[test]
    fn listing_groups_common_prefixes() {
        let metas = ["users/u1/a/k1", "users/u1/a/k2", "users/u1/b", "users/u2/c"]
            .into_iter()
            .map(|k| ObjectMeta {
                key: k.to_string(),
                size: 1,
                last_modified: None,
            });
        let listing = assemble_listing(metas, "users/u1/", Some('/'));
        assert_eq!(listing.common_prefixes, vec!["users/u1/a/"]);
        assert_eq!(listing.objects.len(), 1);
        assert_eq!(listing.objects[0].key, "users/u1/b");
    }

    #[tokio::test]
    async fn browse_hides_metadata_side_files() {
        let store = Arc::new(MemoryObjectStore::default());
        let gateway = StorageGateway::new(store, "https://cdn.example.com");

        for key in [
            "users/u1/entry/draft/p1_1.ent",
            "users/u1/entry/draft/p1_1.meta.json",
            "users/u1/entry/draft/thumbs.json",
            "users/u1/entry/final/p2_2.ent",
        ] {
            gateway.upload(key, b"data", "application/octet-stream").await.unwrap();
        }

        let listing = gateway.browse("users/u1/entry/draft/").await.unwrap();
        assert!(listing.folders.is_empty());
        let names: Vec<_> = listing.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["p1_1.ent"]);

        let top = gateway.browse("users/u1/entry/").await.unwrap();
        assert_eq!(top.folders, vec!["draft", "final"]);
        assert!(top.files.is_empty());
    }

    #[tokio::test]
    async fn delete_many_reports_per_key_outcomes() {
        let store = Arc::new(MemoryObjectStore::default());
        let gateway = StorageGateway::new(store, "https://cdn.example.com");
        gateway.upload("a", b"1", "t").await.unwrap();

        let stats = gateway
            .delete_many(&["a".to_string(), "missing".to_string()])
            .await;
        assert_eq!(stats.deleted, vec!["a"]);
        assert_eq!(stats.errors.len(), 1);
        assert_eq!(stats.errors[0].0, "missing");
    }
}
