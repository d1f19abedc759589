//! Platform adapters.
//!
//! One adapter per visual-programming ecosystem, expressed as tagged
//! variants of a single type and selected through a platform-keyed
//! registry. Validate/process failures are fatal to the enclosing save;
//! per-asset failures inside process/post_process degrade to the
//! placeholder and are reported as warnings on the result, never raised.

mod entry;
mod scratch;

pub use entry::EntryLikeAdapter;
pub use scratch::ScratchLikeAdapter;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use blockvault_api::models::{Analysis, AssetWarning, Bundle};

use crate::archive::{self, EnvelopeKind};
use crate::config::VaultConfig;
use crate::error::Result;
use crate::session::SessionStore;
use crate::storage::StorageGateway;

/// The three input shapes `post_process` accepts: a pre-decoded document or
/// raw bytes, which are classified by their first byte.
#[derive(Debug)]
pub enum ArchivePayload {
    Decoded(Value),
    Raw(Vec<u8>),
}

/// Decode result: the bundle (possibly degraded), per-asset recovery notes,
/// and the session that now holds extracted assets, if any.
#[derive(Debug)]
pub struct ProcessedBundle {
    pub bundle: Bundle,
    pub warnings: Vec<AssetWarning>,
    pub session: Option<String>,
}

/// Everything adapters need to touch the outside world, threaded through
/// calls explicitly.
pub struct AdapterContext {
    pub gateway: Arc<StorageGateway>,
    pub sessions: Arc<SessionStore>,
    pub config: Arc<VaultConfig>,
}

/// Capability set of one platform, dispatched over the variant tag.
pub enum PlatformAdapter {
    EntryLike(EntryLikeAdapter),
    ScratchLike(ScratchLikeAdapter),
}

impl PlatformAdapter {
    /// Archive-bearing adapter in the Entry mold, registered under `platform`.
    pub fn entry_like(platform: impl Into<String>) -> Self {
        PlatformAdapter::EntryLike(EntryLikeAdapter::new(platform))
    }

    /// Pass-through adapter in the Scratch mold, registered under `platform`.
    pub fn scratch_like(platform: impl Into<String>) -> Self {
        PlatformAdapter::ScratchLike(ScratchLikeAdapter::new(platform))
    }

    /// Registry key this adapter is selected by.
    pub fn platform(&self) -> &str {
        match self {
            PlatformAdapter::EntryLike(a) => a.platform(),
            PlatformAdapter::ScratchLike(a) => a.platform(),
        }
    }

    /// Reject a bundle missing a required top-level field; default missing
    /// optional arrays in place, logging each.
    pub fn validate(&self, bundle: &mut Bundle) -> Result<()> {
        match self {
            PlatformAdapter::EntryLike(a) => a.validate(bundle),
            PlatformAdapter::ScratchLike(a) => a.validate(bundle),
        }
    }

    /// Serialize the bundle into the platform's storage envelope.
    pub async fn process(
        &self,
        bundle: &Bundle,
        owner: &str,
        ctx: &AdapterContext,
    ) -> Result<Vec<u8>> {
        match self {
            PlatformAdapter::EntryLike(a) => a.process(bundle, owner, ctx).await,
            PlatformAdapter::ScratchLike(a) => a.process(bundle).await,
        }
    }

    pub fn analyze(&self, bundle: &Bundle) -> Analysis {
        match self {
            PlatformAdapter::EntryLike(a) => a.analyze(bundle),
            PlatformAdapter::ScratchLike(a) => a.analyze(bundle),
        }
    }

    /// Decode a stored envelope back into a bundle, allocating or reusing a
    /// session and normalizing asset locators on the way.
    pub async fn post_process(
        &self,
        payload: ArchivePayload,
        owner: &str,
        session: Option<&str>,
        ctx: &AdapterContext,
    ) -> Result<ProcessedBundle> {
        match self {
            PlatformAdapter::EntryLike(a) => a.post_process(payload, owner, session, ctx).await,
            PlatformAdapter::ScratchLike(a) => a.post_process(payload, owner, session, ctx).await,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            PlatformAdapter::EntryLike(_) => "application/x-entryjs",
            PlatformAdapter::ScratchLike(_) => "application/x-scratch",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            PlatformAdapter::EntryLike(_) => "ent",
            PlatformAdapter::ScratchLike(_) => "sb3",
        }
    }
}

/// Platform-keyed adapter registry.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<PlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: PlatformAdapter) {
        self.adapters
            .insert(adapter.platform().to_string(), Arc::new(adapter));
    }

    pub fn get(&self, platform: &str) -> Option<Arc<PlatformAdapter>> {
        self.adapters.get(platform).cloned()
    }

    pub fn platforms(&self) -> Vec<String> {
        let mut platforms: Vec<String> = self.adapters.keys().cloned().collect();
        platforms.sort();
        platforms
    }
}

/// Node-count bucket (1-5) plus a fixed bonus for any variable or function
/// usage, capped at 5. The same rule applies to every platform.
pub(crate) fn complexity_score(blocks: u32, variables: u32, functions: u32) -> u8 {
    let base = match blocks {
        0..=9 => 1,
        10..=29 => 2,
        30..=49 => 3,
        50..=99 => 4,
        _ => 5,
    };
    let mut score = base;
    if variables > 0 {
        score += 1;
    }
    if functions > 0 {
        score += 1;
    }
    score.min(5)
}

/// Extract a tar envelope into a fresh session for this owner: stage,
/// read the manifest, materialize, schedule expiry. Returns the decoded
/// manifest and the session id now holding the assets.
pub(crate) async fn decode_tar_envelope(
    bytes: Vec<u8>,
    owner: &str,
    session: Option<&str>,
    ctx: &AdapterContext,
) -> Result<(Value, String)> {
    let staging = ctx.sessions.allocate_staging().await?;

    let max_entry_size = ctx.config.max_entry_size;
    let staging_for_unpack = staging.clone();
    let manifest = tokio::task::spawn_blocking(move || {
        archive::extract(&bytes, &staging_for_unpack, max_entry_size)?;
        archive::read_manifest(&staging_for_unpack)
    })
    .await
    .map_err(|err| std::io::Error::other(err.to_string()))?;

    let manifest = match manifest {
        Ok(manifest) => manifest,
        Err(err) => {
            // Keep nothing from a failed extraction
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(err);
        }
    };

    let session = ctx.sessions.allocate(owner, session).await?;
    ctx.sessions
        .materialize(&staging, owner, &session.id)
        .await?;
    if let Err(err) = tokio::fs::remove_dir_all(&staging).await {
        debug!(staging = %staging.display(), %err, "staging cleanup failed, sweep will reclaim");
    }
    ctx.sessions
        .schedule_expiry(owner, &session.id, ctx.config.session_ttl());

    Ok((manifest, session.id))
}

/// Classify raw payload bytes by their first byte.
pub(crate) fn classify_payload(bytes: &[u8]) -> Result<EnvelopeKind> {
    archive::detect(bytes)
}

/// Content type for a migrated asset, by filename extension.
pub(crate) fn content_type_for_name(name: &str) -> &'static str {
    match name.rsplit_once('.').map(|(_, ext)| ext) {
        Some(ext) if ext.eq_ignore_ascii_case("png") => "image/png",
        Some(ext) if ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg") => {
            "image/jpeg"
        }
        Some(ext) if ext.eq_ignore_ascii_case("gif") => "image/gif",
        Some(ext) if ext.eq_ignore_ascii_case("svg") => "image/svg+xml",
        Some(ext) if ext.eq_ignore_ascii_case("webp") => "image/webp",
        Some(ext) if ext.eq_ignore_ascii_case("mp3") => "audio/mpeg",
        Some(ext) if ext.eq_ignore_ascii_case("wav") => "audio/wav",
        Some(ext) if ext.eq_ignore_ascii_case("ogg") => "audio/ogg",
        _ => "application/octet-stream",
    }
}
