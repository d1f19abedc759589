//! In-memory metadata store, for tests and single-process deployments.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use blockvault_api::error::VaultResult;
use blockvault_api::metadata::{ActivityEntry, MetadataStore, OwnerRef, SubmissionFilter};
use blockvault_api::models::{SubmissionDraft, SubmissionRecord};

#[derive(Default)]
pub struct MemoryMetadataStore {
    owners: RwLock<HashMap<String, OwnerRef>>,
    submissions: RwLock<BTreeMap<i64, SubmissionRecord>>,
    activities: RwLock<Vec<ActivityEntry>>,
    next_id: AtomicI64,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    pub async fn register_owner(&self, external_id: &str, owner: OwnerRef) {
        self.owners
            .write()
            .await
            .insert(external_id.to_string(), owner);
    }

    /// Recorded activity entries, oldest first.
    pub async fn activities(&self) -> Vec<ActivityEntry> {
        self.activities.read().await.clone()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn resolve_owner(&self, external_id: &str) -> VaultResult<Option<OwnerRef>> {
        Ok(self.owners.read().await.get(external_id).copied())
    }

    async fn insert_submission(&self, draft: SubmissionDraft) -> VaultResult<i64> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).max(1);
        let record = SubmissionRecord::from_draft(id, draft, Utc::now());
        self.submissions.write().await.insert(id, record);
        Ok(id)
    }

    async fn fetch_submission(
        &self,
        record_id: i64,
        owner_id: i64,
    ) -> VaultResult<Option<SubmissionRecord>> {
        Ok(self
            .submissions
            .read()
            .await
            .get(&record_id)
            .filter(|r| r.owner_id == owner_id)
            .cloned())
    }

    async fn list_submissions(
        &self,
        owner_id: i64,
        filter: &SubmissionFilter,
    ) -> VaultResult<Vec<SubmissionRecord>> {
        let submissions = self.submissions.read().await;
        let mut records: Vec<SubmissionRecord> = submissions
            .values()
            .rev() // ids are monotonic, so reverse order is newest first
            .filter(|r| r.owner_id == owner_id)
            .filter(|r| {
                filter
                    .platform
                    .as_ref()
                    .is_none_or(|p| &r.platform == p)
            })
            .filter(|r| filter.save_type.is_none_or(|s| r.save_type == s))
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn delete_submission(&self, record_id: i64, owner_id: i64) -> VaultResult<bool> {
        let mut submissions = self.submissions.write().await;
        match submissions.get(&record_id) {
            Some(record) if record.owner_id == owner_id => {
                submissions.remove(&record_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_activity(&self, entry: ActivityEntry) -> VaultResult<()> {
        self.activities.write().await.push(entry);
        Ok(())
    }
}
