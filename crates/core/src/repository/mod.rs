//! Project repository façade.
//!
//! `ProjectVault` composes the adapter registry, storage gateway, session
//! store and metadata port behind the four persistence operations. Every
//! operation resolves the external owner id first; record access is scoped
//! by the internal owner id, so a foreign record is indistinguishable from
//! a missing one.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use blockvault_api::error::VaultError;
use blockvault_api::metadata::{ActivityEntry, MetadataStore, OwnerRef, SubmissionFilter};
use blockvault_api::models::{Bundle, LoadOutcome, SaveOutcome, SaveType, SubmissionDraft,
    SubmissionRecord};
use blockvault_api::storage::ObjectStore;

use crate::adapter::{AdapterContext, AdapterRegistry, ArchivePayload, PlatformAdapter};
use crate::config::VaultConfig;
use crate::error::Result;
use crate::session::SessionStore;
use crate::storage::StorageGateway;

/// One save, fully described.
#[derive(Debug)]
pub struct SaveRequest {
    pub platform: String,
    pub owner: String,
    pub project_name: String,
    pub save_type: SaveType,
    pub manifest: Value,
    /// Free-form client metadata persisted verbatim on the record.
    pub metadata: Value,
}

impl SaveRequest {
    pub fn new(
        platform: impl Into<String>,
        owner: impl Into<String>,
        project_name: impl Into<String>,
        save_type: SaveType,
        manifest: Value,
    ) -> Self {
        Self {
            platform: platform.into(),
            owner: owner.into(),
            project_name: project_name.into(),
            save_type,
            manifest,
            metadata: Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

pub struct ProjectVaultBuilder {
    config: VaultConfig,
    object_store: Option<Arc<dyn ObjectStore>>,
    metadata_store: Option<Arc<dyn MetadataStore>>,
    adapters: Vec<PlatformAdapter>,
}

impl ProjectVaultBuilder {
    pub fn new(config: VaultConfig) -> Self {
        Self {
            config,
            object_store: None,
            metadata_store: None,
            adapters: Vec::new(),
        }
    }

    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    pub fn with_metadata_store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.metadata_store = Some(store);
        self
    }

    pub fn with_adapter(mut self, adapter: PlatformAdapter) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn build(self) -> Result<ProjectVault> {
        let object_store = self
            .object_store
            .ok_or_else(|| VaultError::Storage("no object store configured".to_string()))?;
        let metadata = self
            .metadata_store
            .ok_or_else(|| VaultError::Storage("no metadata store configured".to_string()))?;

        let config = Arc::new(self.config);
        let gateway = Arc::new(StorageGateway::new(
            object_store,
            config.public_base_url.clone(),
        ));
        let sessions = Arc::new(SessionStore::new(&config));

        let mut registry = AdapterRegistry::new();
        for adapter in self.adapters {
            registry.register(adapter);
        }

        Ok(ProjectVault {
            ctx: AdapterContext {
                gateway,
                sessions,
                config,
            },
            registry,
            metadata,
            cancel: CancellationToken::new(),
        })
    }
}

pub struct ProjectVault {
    ctx: AdapterContext,
    registry: AdapterRegistry,
    metadata: Arc<dyn MetadataStore>,
    cancel: CancellationToken,
}

impl ProjectVault {
    pub fn builder(config: VaultConfig) -> ProjectVaultBuilder {
        ProjectVaultBuilder::new(config)
    }

    pub fn config(&self) -> &VaultConfig {
        &self.ctx.config
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.ctx.sessions
    }

    pub fn gateway(&self) -> &Arc<StorageGateway> {
        &self.ctx.gateway
    }

    pub fn platforms(&self) -> Vec<String> {
        self.registry.platforms()
    }

    /// Run the session expiry sweeper until `shutdown` or drop of the last
    /// session store handle.
    pub fn start_maintenance(&self) -> tokio::task::JoinHandle<()> {
        self.ctx
            .sessions
            .spawn_sweeper(self.ctx.config.sweep_interval(), self.cancel.child_token())
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub async fn save(&self, request: SaveRequest) -> Result<SaveOutcome> {
        if request.owner.trim().is_empty() {
            return Err(VaultError::Validation("owner must not be empty".to_string()));
        }
        if request.project_name.trim().is_empty() {
            return Err(VaultError::Validation(
                "project name must not be empty".to_string(),
            ));
        }
        let owner_ref = self.resolve_owner(&request.owner).await?;
        let adapter = self.adapter_for(&request.platform)?;

        let mut bundle = Bundle::new(request.manifest);
        adapter.validate(&mut bundle)?;

        let bytes = adapter.process(&bundle, &request.owner, &self.ctx).await?;
        let policy = self.ctx.config.policy_for(&request.platform);
        if bytes.len() as u64 > policy.max_upload_bytes {
            return Err(VaultError::Validation(format!(
                "{} archive is {} bytes, over the {}-byte limit",
                request.platform,
                bytes.len(),
                policy.max_upload_bytes
            )));
        }

        let key = StorageGateway::object_key(
            &request.owner,
            &request.platform,
            request.save_type,
            &request.project_name,
            adapter.extension(),
        );
        let stored = self
            .ctx
            .gateway
            .upload(&key, &bytes, adapter.content_type())
            .await?;

        let analysis = adapter.analyze(&bundle);
        let record_id = self
            .metadata
            .insert_submission(SubmissionDraft {
                owner_id: owner_ref.owner_id,
                center_id: owner_ref.center_id,
                platform: request.platform.clone(),
                project_name: request.project_name.clone(),
                save_type: request.save_type,
                storage_key: stored.key.clone(),
                storage_url: stored.url.clone(),
                size_kb: stored.size.div_ceil(1024),
                analysis,
                metadata: request.metadata,
            })
            .await?;

        self.log_activity(
            owner_ref,
            &request.platform,
            "save",
            json!({
                "record_id": record_id,
                "key": stored.key,
                "save_type": request.save_type.as_str(),
            }),
        )
        .await;

        info!(
            owner = %request.owner,
            platform = %request.platform,
            record_id,
            key = %stored.key,
            blocks = analysis.blocks,
            "project saved"
        );
        Ok(SaveOutcome {
            record_id,
            storage_key: stored.key,
            storage_url: stored.url,
            size_kb: stored.size.div_ceil(1024),
            analysis,
        })
    }

    /// Fetch, download and decode one submission. `session` reuses an
    /// existing session id for the extracted assets instead of minting one.
    pub async fn load(
        &self,
        record_id: i64,
        owner: &str,
        session: Option<&str>,
    ) -> Result<LoadOutcome> {
        let owner_ref = self.resolve_owner(owner).await?;
        let record = self.fetch_owned(record_id, owner_ref.owner_id).await?;
        let adapter = self.adapter_for(&record.platform)?;

        let bytes = self.ctx.gateway.download(&record.storage_key).await?;
        let processed = adapter
            .post_process(ArchivePayload::Raw(bytes), owner, session, &self.ctx)
            .await?;

        self.log_activity(
            owner_ref,
            &record.platform,
            "load",
            json!({ "record_id": record_id }),
        )
        .await;

        info!(
            owner,
            record_id,
            platform = %record.platform,
            warnings = processed.warnings.len(),
            "project loaded"
        );
        Ok(LoadOutcome {
            bundle: processed.bundle,
            warnings: processed.warnings,
            session: processed.session,
            record,
        })
    }

    pub async fn list(
        &self,
        owner: &str,
        filter: &SubmissionFilter,
    ) -> Result<Vec<SubmissionRecord>> {
        let owner_ref = self.resolve_owner(owner).await?;
        self.metadata
            .list_submissions(owner_ref.owner_id, filter)
            .await
    }

    /// Delete the record, then its stored object. A storage deletion failure
    /// is logged and tolerated; the sweep of orphaned objects is an operator
    /// concern.
    pub async fn remove(&self, record_id: i64, owner: &str) -> Result<()> {
        let owner_ref = self.resolve_owner(owner).await?;
        let record = self.fetch_owned(record_id, owner_ref.owner_id).await?;

        if !self
            .metadata
            .delete_submission(record_id, owner_ref.owner_id)
            .await?
        {
            return Err(VaultError::NotFound(format!(
                "submission {record_id} not found"
            )));
        }
        if let Err(err) = self.ctx.gateway.delete(&record.storage_key).await {
            warn!(record_id, key = %record.storage_key, %err, "stored object removal failed");
        }

        self.log_activity(
            owner_ref,
            &record.platform,
            "delete",
            json!({ "record_id": record_id, "key": record.storage_key }),
        )
        .await;

        info!(owner, record_id, "submission removed");
        Ok(())
    }

    async fn resolve_owner(&self, owner: &str) -> Result<OwnerRef> {
        self.metadata
            .resolve_owner(owner)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("unknown owner `{owner}`")))
    }

    async fn fetch_owned(&self, record_id: i64, owner_id: i64) -> Result<SubmissionRecord> {
        self.metadata
            .fetch_submission(record_id, owner_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("submission {record_id} not found")))
    }

    fn adapter_for(&self, platform: &str) -> Result<Arc<PlatformAdapter>> {
        self.registry
            .get(platform)
            .ok_or_else(|| VaultError::UnsupportedPlatform(platform.to_string()))
    }

    async fn log_activity(&self, owner: OwnerRef, platform: &str, action: &str, detail: Value) {
        let entry = ActivityEntry {
            owner_id: owner.owner_id,
            center_id: owner.center_id,
            platform: platform.to_string(),
            action: action.to_string(),
            detail,
        };
        if let Err(err) = self.metadata.record_activity(entry).await {
            warn!(action, %err, "activity log write failed");
        }
    }
}
