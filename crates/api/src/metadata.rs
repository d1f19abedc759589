use async_trait::async_trait;
use serde_json::Value;

use crate::error::VaultResult;
use crate::models::{SaveType, SubmissionDraft, SubmissionRecord};

/// Internal identity behind an external owner id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerRef {
    pub owner_id: i64,
    pub center_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct SubmissionFilter {
    pub platform: Option<String>,
    pub save_type: Option<SaveType>,
    pub limit: Option<usize>,
}

/// Best-effort activity trail entry. Failures to record one never fail the
/// operation that produced it.
#[derive(Debug, Clone)]
pub struct ActivityEntry {
    pub owner_id: i64,
    pub center_id: Option<i64>,
    pub platform: String,
    pub action: String,
    pub detail: Value,
}

/// Narrow port to the relational metadata store.
///
/// Every submission accessor is scoped by the internal owner id, so a record
/// belonging to someone else is indistinguishable from a missing one.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Translate an external owner id to the internal identity, if known.
    async fn resolve_owner(&self, external_id: &str) -> VaultResult<Option<OwnerRef>>;

    /// Persist a new submission row, returning its assigned id.
    async fn insert_submission(&self, draft: SubmissionDraft) -> VaultResult<i64>;

    async fn fetch_submission(
        &self,
        record_id: i64,
        owner_id: i64,
    ) -> VaultResult<Option<SubmissionRecord>>;

    /// Submissions for one owner, newest first.
    async fn list_submissions(
        &self,
        owner_id: i64,
        filter: &SubmissionFilter,
    ) -> VaultResult<Vec<SubmissionRecord>>;

    /// Returns false when no row matched (unknown id or foreign owner).
    async fn delete_submission(&self, record_id: i64, owner_id: i64) -> VaultResult<bool>;

    async fn record_activity(&self, entry: ActivityEntry) -> VaultResult<()>;
}
