use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use blockvault_api::error::{VaultError, VaultResult};
use blockvault_api::storage::{Listing, ObjectMeta, ObjectStore};

use super::assemble_listing;

/// Object store over a local directory: keys map to relative paths under the
/// root. Writes are atomic (temp file then rename) so a crashed upload never
/// leaves a half-written object behind.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> VaultResult<PathBuf> {
        let path = Path::new(key);
        let sane = !key.is_empty()
            && path.is_relative()
            && path.components().all(|c| matches!(c, Component::Normal(_)));
        if !sane {
            return Err(VaultError::Storage(format!("invalid object key: {key}")));
        }
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> VaultResult<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| VaultError::Storage(err.to_string()))?;
        }

        let tmp = PathBuf::from(format!("{}.tmp-upload", path.display()));
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|err| VaultError::Storage(err.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|err| VaultError::Storage(err.to_string()))?;

        debug!(key, size = bytes.len(), content_type, "stored object on disk");
        Ok(())
    }

    async fn get(&self, key: &str) -> VaultResult<Vec<u8>> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|err| VaultError::Storage(format!("get {key}: {err}")))
    }

    async fn delete(&self, key: &str) -> VaultResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            // Deleting a missing object is a no-op, matching remote stores
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(VaultError::Storage(format!("delete {key}: {err}"))),
        }
    }

    async fn list(&self, prefix: &str, delimiter: Option<char>) -> VaultResult<Listing> {
        let root = self.root.clone();
        let prefix = prefix.to_string();

        let metas = tokio::task::spawn_blocking(move || {
            let mut metas = Vec::new();
            for entry in walkdir::WalkDir::new(&root)
                .min_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let Ok(rel) = entry.path().strip_prefix(&root) else {
                    continue;
                };
                let key = rel.to_string_lossy().replace('\\', "/");
                // In-flight uploads are not objects yet
                if key.ends_with(".tmp-upload") {
                    continue;
                }
                let meta = entry.metadata().ok();
                let size = meta.as_ref().map(|m| m.len()).unwrap_or(0);
                let last_modified = meta
                    .and_then(|m| m.modified().ok())
                    .map(DateTime::<Utc>::from);
                metas.push(ObjectMeta {
                    key,
                    size,
                    last_modified,
                });
            }
            metas
        })
        .await
        .map_err(|err| VaultError::Storage(err.to_string()))?;

        Ok(assemble_listing(metas, &prefix, delimiter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_roundtrip_and_missing_delete() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(tmp.path());

        store
            .put("users/u1/demo/draft/p_1.ent", b"bytes", "application/x-entryjs")
            .await
            .unwrap();
        let got = store.get("users/u1/demo/draft/p_1.ent").await.unwrap();
        assert_eq!(got, b"bytes");

        store.delete("users/u1/demo/draft/p_1.ent").await.unwrap();
        store.delete("users/u1/demo/draft/p_1.ent").await.unwrap();
        assert!(store.get("users/u1/demo/draft/p_1.ent").await.is_err());
    }

    #[tokio::test]
    async fn traversal_keys_are_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(tmp.path());
        assert!(store.put("../escape", b"x", "t").await.is_err());
        assert!(store.get("/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn list_groups_by_delimiter() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(tmp.path());
        store.put("users/u1/entry/a.ent", b"1", "t").await.unwrap();
        store.put("users/u1/scratch/b.sb3", b"2", "t").await.unwrap();
        store.put("users/u1/c.ent", b"3", "t").await.unwrap();

        let listing = store.list("users/u1/", Some('/')).await.unwrap();
        assert_eq!(
            listing.common_prefixes,
            vec!["users/u1/entry/", "users/u1/scratch/"]
        );
        assert_eq!(listing.objects.len(), 1);
        assert_eq!(listing.objects[0].key, "users/u1/c.ent");
    }
}
