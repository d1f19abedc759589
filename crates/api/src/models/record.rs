use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::asset::AssetWarning;
use super::bundle::Bundle;

/// Why a project was persisted. Part of the storage key, so the lowercase
/// form is load-bearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveType {
    Draft,
    Final,
    Autosave,
    Submission,
}

impl SaveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaveType::Draft => "draft",
            SaveType::Final => "final",
            SaveType::Autosave => "autosave",
            SaveType::Submission => "submission",
        }
    }
}

impl std::fmt::Display for SaveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived metrics persisted alongside a submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    /// Sprite/object count.
    pub objects: u32,
    /// Graph-node ("block") count across all objects.
    pub blocks: u32,
    pub variables: u32,
    pub functions: u32,
    pub scenes: u32,
    /// Bounded 0-5.
    pub complexity: u8,
}

/// Submission fields known before the metadata store assigns an id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionDraft {
    pub owner_id: i64,
    pub center_id: Option<i64>,
    pub platform: String,
    pub project_name: String,
    pub save_type: SaveType,
    pub storage_key: String,
    pub storage_url: String,
    pub size_kb: u64,
    pub analysis: Analysis,
    pub metadata: Value,
}

/// Durable metadata row for one persisted project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: i64,
    pub owner_id: i64,
    pub center_id: Option<i64>,
    pub platform: String,
    pub project_name: String,
    pub save_type: SaveType,
    pub storage_key: String,
    pub storage_url: String,
    pub size_kb: u64,
    pub analysis: Analysis,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl SubmissionRecord {
    pub fn from_draft(id: i64, draft: SubmissionDraft, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            owner_id: draft.owner_id,
            center_id: draft.center_id,
            platform: draft.platform,
            project_name: draft.project_name,
            save_type: draft.save_type,
            storage_key: draft.storage_key,
            storage_url: draft.storage_url,
            size_kb: draft.size_kb,
            analysis: draft.analysis,
            metadata: draft.metadata,
            created_at,
        }
    }
}

/// Result of a successful save.
#[derive(Debug, Clone, Serialize)]
pub struct SaveOutcome {
    pub record_id: i64,
    pub storage_key: String,
    pub storage_url: String,
    pub size_kb: u64,
    pub analysis: Analysis,
}

/// Result of a successful (possibly degraded) load.
#[derive(Debug)]
pub struct LoadOutcome {
    pub bundle: Bundle,
    /// Per-asset recovery notes; empty for a clean load.
    pub warnings: Vec<AssetWarning>,
    /// Session holding extracted assets, when the envelope was a tar archive
    /// or a fresh session was allocated for an inline document.
    pub session: Option<String>,
    pub record: SubmissionRecord,
}
