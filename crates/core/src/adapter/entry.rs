//! Adapter for Entry-family platforms.
//!
//! Projects arrive as a JSON manifest whose objects reference picture and
//! sound files. Saves pack the manifest plus its session-local assets into
//! a gzipped tar; loads extract into a fresh session and normalize every
//! locator the desktop builds have historically produced. A locator that
//! cannot be normalized or resolved degrades to the 1x1 placeholder with a
//! warning on the result.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use futures::future::join_all;
use serde_json::{Map, Value, json};
use tracing::warn;

use blockvault_api::error::VaultError;
use blockvault_api::models::{
    Analysis, AssetKind, AssetLocator, AssetReference, AssetWarning, Bundle,
};

use crate::archive::{self, ArchiveEntry, EnvelopeKind};
use crate::error::Result;
use crate::rewrite;
use crate::storage::sanitize_name;

use super::{
    AdapterContext, ArchivePayload, ProcessedBundle, classify_payload, complexity_score,
    content_type_for_name, decode_tar_envelope,
};

/// Top-level arrays the format treats as optional. Absent ones are
/// defaulted so downstream counting never branches on shape.
const OPTIONAL_ARRAYS: [&str; 4] = ["objects", "scenes", "variables", "functions"];

pub struct EntryLikeAdapter {
    platform: String,
}

impl EntryLikeAdapter {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
        }
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn validate(&self, bundle: &mut Bundle) -> Result<()> {
        let Some(root) = bundle.manifest.as_object_mut() else {
            return Err(VaultError::Validation(
                "project manifest must be a JSON object".to_string(),
            ));
        };
        for field in OPTIONAL_ARRAYS {
            match root.get(field) {
                None | Some(Value::Null) => {
                    warn!(platform = %self.platform, field, "missing optional array, defaulting to empty");
                    root.insert(field.to_string(), Value::Array(Vec::new()));
                }
                Some(Value::Array(_)) => {}
                Some(_) => {
                    return Err(VaultError::Validation(format!(
                        "field `{field}` must be an array"
                    )));
                }
            }
        }
        bundle.assets = collect_references(&bundle.manifest);
        Ok(())
    }

    /// Pack the manifest and every session-resident asset it references into
    /// a gzipped tar. If archiving itself fails the manifest is stored as
    /// inline JSON instead, losing assets but never the project.
    pub async fn process(
        &self,
        bundle: &Bundle,
        owner: &str,
        ctx: &AdapterContext,
    ) -> Result<Vec<u8>> {
        let manifest = bundle.manifest.clone();

        let mut entries = Vec::new();
        let mut seen = HashSet::new();
        visit_assets(&manifest, |_, item| {
            let Some(fileurl) = item.get("fileurl").and_then(Value::as_str) else {
                return;
            };
            if let AssetLocator::SessionRelative(path) = rewrite::classify(fileurl) {
                let relative = path.trim_start_matches('/').to_string();
                if seen.insert(relative.clone()) {
                    entries.push(ArchiveEntry {
                        source: ctx.sessions.resolve_current(owner, &relative),
                        archive_path: relative,
                    });
                }
            }
        });

        let gzip_level = ctx.config.gzip_level;
        let built =
            tokio::task::spawn_blocking(move || archive::build(&manifest, &entries, gzip_level))
                .await
                .map_err(|err| std::io::Error::other(err.to_string()))?;
        match built {
            Ok(bytes) => Ok(bytes),
            Err(err) => {
                warn!(platform = %self.platform, owner, %err, "archive build failed, storing inline JSON");
                Ok(serde_json::to_vec(&bundle.manifest)?)
            }
        }
    }

    pub fn analyze(&self, bundle: &Bundle) -> Analysis {
        let manifest = &bundle.manifest;
        let objects = array_len(manifest, "objects");
        let scenes = array_len(manifest, "scenes");
        let variables = array_len(manifest, "variables");
        let functions = array_len(manifest, "functions");

        let mut blocks = 0u32;
        if let Some(items) = manifest.get("objects").and_then(Value::as_array) {
            for object in items {
                blocks += script_thread_count(object.get("script"));
            }
        }

        Analysis {
            objects,
            blocks,
            variables,
            functions,
            scenes,
            complexity: complexity_score(blocks, variables, functions),
        }
    }

    pub async fn post_process(
        &self,
        payload: ArchivePayload,
        owner: &str,
        session: Option<&str>,
        ctx: &AdapterContext,
    ) -> Result<ProcessedBundle> {
        match payload {
            ArchivePayload::Decoded(manifest) => self.decode_inline(manifest, owner, ctx).await,
            ArchivePayload::Raw(bytes) => match classify_payload(&bytes)? {
                EnvelopeKind::InlineJson => {
                    let manifest = archive::parse_inline(&bytes)?;
                    self.decode_inline(manifest, owner, ctx).await
                }
                EnvelopeKind::TarArchive => self.decode_archive(bytes, owner, session, ctx).await,
            },
        }
    }

    async fn decode_archive(
        &self,
        bytes: Vec<u8>,
        owner: &str,
        session: Option<&str>,
        ctx: &AdapterContext,
    ) -> Result<ProcessedBundle> {
        let (mut manifest, session_id) = decode_tar_envelope(bytes, owner, session, ctx).await?;

        let mut warnings = normalize_locators(&mut manifest, &ctx.config);
        rewrite_thumbnails(&mut manifest);
        let session_dir = ctx.sessions.session_dir(owner, &session_id);
        warnings.extend(degrade_missing(&mut manifest, &session_dir, &ctx.config).await);

        let mut bundle = Bundle::new(manifest);
        bundle.assets = collect_references(&bundle.manifest);
        Ok(ProcessedBundle {
            bundle,
            warnings,
            session: Some(session_id),
        })
    }

    /// A manifest stored without an archive gets a fresh empty session;
    /// assets it still references in the owner's previous session are
    /// migrated to durable storage so the document survives session expiry.
    async fn decode_inline(
        &self,
        mut manifest: Value,
        owner: &str,
        ctx: &AdapterContext,
    ) -> Result<ProcessedBundle> {
        let session = ctx.sessions.allocate(owner, None).await?;
        ctx.sessions
            .schedule_expiry(owner, &session.id, ctx.config.session_ttl());

        let warnings = self.migrate_ephemeral(&mut manifest, owner, ctx).await;

        let mut bundle = Bundle::new(manifest);
        bundle.assets = collect_references(&bundle.manifest);
        Ok(ProcessedBundle {
            bundle,
            warnings,
            session: Some(session.id),
        })
    }

    /// Upload every session-bound asset to durable storage and point its
    /// reference at the public URL. Failures degrade that one reference to
    /// the placeholder.
    async fn migrate_ephemeral(
        &self,
        manifest: &mut Value,
        owner: &str,
        ctx: &AdapterContext,
    ) -> Vec<AssetWarning> {
        let mut jobs: Vec<MigrationJob> = Vec::new();
        let mut seen = HashSet::new();
        visit_assets(&*manifest, |kind, item| {
            let Some(fileurl) = item.get("fileurl").and_then(Value::as_str) else {
                return;
            };
            // Already-degraded references stay on the placeholder
            if fileurl == ctx.config.placeholder_locator {
                return;
            }
            if !rewrite::classify(fileurl).is_ephemeral() || !seen.insert(fileurl.to_string()) {
                return;
            }
            let name = item
                .get("filename")
                .and_then(Value::as_str)
                .unwrap_or_else(|| fileurl.rsplit('/').next().unwrap_or(fileurl))
                .to_string();
            jobs.push(MigrationJob {
                raw: fileurl.to_string(),
                kind,
                name,
            });
        });
        if jobs.is_empty() {
            return Vec::new();
        }

        let outcomes: HashMap<String, MigrationOutcome> = join_all(jobs.into_iter().map(|job| {
            async move {
                let outcome = self.migrate_one(&job, owner, ctx).await;
                (job.raw, outcome)
            }
        }))
        .await
        .into_iter()
        .collect();

        let mut warnings = Vec::new();
        visit_assets_mut(manifest, |_, item| {
            let Some(fileurl) = item.get("fileurl").and_then(Value::as_str) else {
                return;
            };
            let Some(outcome) = outcomes.get(fileurl) else {
                return;
            };
            match outcome {
                MigrationOutcome::Migrated(url) => {
                    item.insert("fileurl".to_string(), json!(url));
                }
                MigrationOutcome::Placeholder(reason) => {
                    warnings.push(AssetWarning {
                        name: item
                            .get("filename")
                            .and_then(Value::as_str)
                            .unwrap_or(fileurl)
                            .to_string(),
                        locator: fileurl.to_string(),
                        reason: reason.clone(),
                    });
                    item.insert("fileurl".to_string(), json!(ctx.config.placeholder_locator));
                    item.insert("filename".to_string(), json!(ctx.config.placeholder_name));
                }
            }
        });
        warnings
    }

    async fn migrate_one(
        &self,
        job: &MigrationJob,
        owner: &str,
        ctx: &AdapterContext,
    ) -> MigrationOutcome {
        let relative = match rewrite::classify(&job.raw) {
            AssetLocator::LegacyAbsolute(uri) => match rewrite::rewrite_legacy(&uri, job.kind) {
                Some(path) => path.trim_start_matches('/').to_string(),
                None => {
                    return MigrationOutcome::Placeholder(
                        "no content hash in legacy locator".to_string(),
                    );
                }
            },
            AssetLocator::SessionRelative(path) => path.trim_start_matches('/').to_string(),
            // Filtered out before jobs are built
            AssetLocator::Remote(_) => return MigrationOutcome::Migrated(job.raw.clone()),
        };

        let source = ctx.sessions.resolve_current(owner, &relative);
        let bytes = match tokio::fs::read(&source).await {
            Ok(bytes) => bytes,
            Err(err) => {
                return MigrationOutcome::Placeholder(format!("unreadable at {relative}: {err}"));
            }
        };

        let key = format!(
            "{}/assets/{}/{}_{}",
            self.platform,
            owner,
            crate::storage::unique_millis(),
            migrated_file_name(&job.name),
        );
        match ctx
            .gateway
            .upload(&key, &bytes, content_type_for_name(&job.name))
            .await
        {
            Ok(stored) => MigrationOutcome::Migrated(stored.url),
            Err(err) => {
                warn!(platform = %self.platform, owner, key, %err, "asset migration upload failed");
                MigrationOutcome::Placeholder(format!("upload failed: {err}"))
            }
        }
    }
}

struct MigrationJob {
    raw: String,
    kind: AssetKind,
    name: String,
}

enum MigrationOutcome {
    Migrated(String),
    Placeholder(String),
}

/// Storage-safe filename for a migrated asset, keeping the extension intact.
fn migrated_file_name(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            format!("{}.{}", sanitize_name(stem), ext)
        }
        _ => sanitize_name(name),
    }
}

/// Visit every picture and sound reference in the manifest.
fn visit_assets(manifest: &Value, mut visit: impl FnMut(AssetKind, &Map<String, Value>)) {
    let Some(objects) = manifest.get("objects").and_then(Value::as_array) else {
        return;
    };
    for object in objects {
        let Some(sprite) = object.get("sprite") else {
            continue;
        };
        for (field, kind) in [("pictures", AssetKind::Image), ("sounds", AssetKind::Sound)] {
            let Some(items) = sprite.get(field).and_then(Value::as_array) else {
                continue;
            };
            for item in items {
                if let Some(map) = item.as_object() {
                    visit(kind, map);
                }
            }
        }
    }
}

fn visit_assets_mut(manifest: &mut Value, mut visit: impl FnMut(AssetKind, &mut Map<String, Value>)) {
    let Some(objects) = manifest.get_mut("objects").and_then(Value::as_array_mut) else {
        return;
    };
    for object in objects {
        let Some(sprite) = object.get_mut("sprite") else {
            continue;
        };
        for (field, kind) in [("pictures", AssetKind::Image), ("sounds", AssetKind::Sound)] {
            let Some(items) = sprite.get_mut(field).and_then(Value::as_array_mut) else {
                continue;
            };
            for item in items {
                if let Some(map) = item.as_object_mut() {
                    visit(kind, map);
                }
            }
        }
    }
}

/// Rewrite every locator shape the desktop builds produce into a rooted
/// session-relative path. A legacy URI without a recognizable content hash
/// cannot be mapped to an extracted file and degrades immediately.
fn normalize_locators(manifest: &mut Value, config: &crate::config::VaultConfig) -> Vec<AssetWarning> {
    let mut warnings = Vec::new();
    visit_assets_mut(manifest, |kind, item| {
        let filename = item
            .get("filename")
            .and_then(Value::as_str)
            .map(str::to_string);
        let declared_ext = item
            .get("imageType")
            .or_else(|| item.get("ext"))
            .and_then(Value::as_str)
            .map(str::to_string);

        match item.get("fileurl").and_then(Value::as_str).map(str::to_string) {
            Some(fileurl) => match rewrite::classify(&fileurl) {
                AssetLocator::LegacyAbsolute(uri) => match rewrite::rewrite_legacy(&uri, kind) {
                    Some(path) => {
                        item.insert("fileurl".to_string(), json!(path));
                    }
                    None => {
                        warnings.push(AssetWarning {
                            name: filename.clone().unwrap_or_else(|| fileurl.clone()),
                            locator: fileurl.clone(),
                            reason: "no content hash in legacy locator".to_string(),
                        });
                        item.insert("fileurl".to_string(), json!(config.placeholder_locator));
                        item.insert("filename".to_string(), json!(config.placeholder_name));
                    }
                },
                AssetLocator::SessionRelative(path) => {
                    item.insert("fileurl".to_string(), json!(path));
                }
                AssetLocator::Remote(_) => {}
            },
            None => {
                if let Some(name) = &filename {
                    let path = rewrite::expand_bare(name, kind, declared_ext.as_deref());
                    item.insert("fileurl".to_string(), json!(path));
                }
            }
        }
    });
    warnings
}

/// Object thumbnails are plain strings, normalized with the same rules but
/// never degraded: a stale thumbnail renders as a broken image, not a
/// broken project.
fn rewrite_thumbnails(manifest: &mut Value) {
    let Some(objects) = manifest.get_mut("objects").and_then(Value::as_array_mut) else {
        return;
    };
    for object in objects {
        let Some(Value::String(thumbnail)) = object.get_mut("thumbnail") else {
            continue;
        };
        let updated = match rewrite::classify(thumbnail) {
            AssetLocator::LegacyAbsolute(uri) => rewrite::rewrite_legacy(&uri, AssetKind::Image),
            AssetLocator::SessionRelative(path) => Some(path),
            AssetLocator::Remote(_) => None,
        };
        if let Some(updated) = updated {
            *thumbnail = updated;
        }
    }
}

/// Probe each session-relative reference against the extracted tree and
/// degrade the ones whose file never arrived.
async fn degrade_missing(
    manifest: &mut Value,
    session_dir: &Path,
    config: &crate::config::VaultConfig,
) -> Vec<AssetWarning> {
    let mut candidates = HashSet::new();
    visit_assets(&*manifest, |_, item| {
        if let Some(fileurl) = item.get("fileurl").and_then(Value::as_str)
            && let AssetLocator::SessionRelative(path) = rewrite::classify(fileurl)
            && path != config.placeholder_locator
        {
            candidates.insert(path);
        }
    });

    let mut missing = HashSet::new();
    for path in candidates {
        let on_disk = session_dir.join(path.trim_start_matches('/'));
        if !tokio::fs::try_exists(&on_disk).await.unwrap_or(false) {
            missing.insert(path);
        }
    }
    if missing.is_empty() {
        return Vec::new();
    }

    let mut warnings = Vec::new();
    visit_assets_mut(manifest, |_, item| {
        let Some(fileurl) = item.get("fileurl").and_then(Value::as_str) else {
            return;
        };
        let AssetLocator::SessionRelative(rooted) = rewrite::classify(fileurl) else {
            return;
        };
        if !missing.contains(&rooted) {
            return;
        }
        warnings.push(AssetWarning {
            name: item
                .get("filename")
                .and_then(Value::as_str)
                .unwrap_or(fileurl)
                .to_string(),
            locator: fileurl.to_string(),
            reason: "not present in extracted archive".to_string(),
        });
        item.insert("fileurl".to_string(), json!(config.placeholder_locator));
        item.insert("filename".to_string(), json!(config.placeholder_name));
    });
    warnings
}

/// Typed view over the manifest's picture and sound references.
fn collect_references(manifest: &Value) -> Vec<AssetReference> {
    let mut refs = Vec::new();
    visit_assets(manifest, |kind, item| {
        let Some(fileurl) = item.get("fileurl").and_then(Value::as_str) else {
            return;
        };
        let name = item
            .get("filename")
            .and_then(Value::as_str)
            .or_else(|| item.get("name").and_then(Value::as_str))
            .unwrap_or_else(|| fileurl.rsplit('/').next().unwrap_or(fileurl))
            .to_string();
        let dimension = item.get("dimension");
        let side = |axis: &str| {
            dimension
                .and_then(|d| d.get(axis))
                .and_then(Value::as_u64)
                .map(|v| v as u32)
        };
        refs.push(AssetReference {
            kind,
            name,
            locator: rewrite::classify(fileurl),
            width: side("width"),
            height: side("height"),
        });
    });
    refs
}

fn array_len(manifest: &Value, field: &str) -> u32 {
    manifest
        .get(field)
        .and_then(Value::as_array)
        .map(|a| a.len() as u32)
        .unwrap_or(0)
}

/// Script bodies arrive either as a thread array or as the same array
/// serialized to a string by older builds.
fn script_thread_count(script: Option<&Value>) -> u32 {
    match script {
        Some(Value::Array(threads)) => threads.len() as u32,
        Some(Value::String(raw)) => serde_json::from_str::<Value>(raw)
            .ok()
            .and_then(|v| v.as_array().map(|a| a.len() as u32))
            .unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::VaultConfig;
    use crate::session::SessionStore;
    use crate::storage::{MemoryObjectStore, StorageGateway};

    fn context(root: &Path) -> AdapterContext {
        let config = VaultConfig {
            session_root: root.to_path_buf(),
            ..VaultConfig::default()
        };
        AdapterContext {
            gateway: Arc::new(StorageGateway::new(
                Arc::new(MemoryObjectStore::new()),
                "https://storage.local",
            )),
            sessions: Arc::new(SessionStore::new(&config)),
            config: Arc::new(config),
        }
    }

    fn manifest_with_picture(fileurl: &str) -> Value {
        json!({
            "objects": [{
                "sprite": {
                    "pictures": [{
                        "filename": "f185a01b2c3d4e5f6a7b8c9d0e1f2a3b.png",
                        "fileurl": fileurl,
                        "dimension": { "width": 480, "height": 270 }
                    }],
                    "sounds": []
                },
                "script": []
            }],
            "scenes": [{}], "variables": [], "functions": []
        })
    }

    #[test]
    fn validate_defaults_missing_arrays() {
        let adapter = EntryLikeAdapter::new("entry");
        let mut bundle = Bundle::new(json!({ "objects": [] }));
        adapter.validate(&mut bundle).unwrap();
        for field in OPTIONAL_ARRAYS {
            assert!(bundle.manifest[field].is_array(), "{field} not defaulted");
        }
    }

    #[test]
    fn validate_rejects_non_object_and_wrong_types() {
        let adapter = EntryLikeAdapter::new("entry");
        let mut bundle = Bundle::new(json!([1, 2]));
        assert!(matches!(
            adapter.validate(&mut bundle),
            Err(VaultError::Validation(_))
        ));

        let mut bundle = Bundle::new(json!({ "objects": "not-an-array" }));
        assert!(matches!(
            adapter.validate(&mut bundle),
            Err(VaultError::Validation(_))
        ));
    }

    #[test]
    fn analyze_counts_threads_and_string_scripts() {
        let adapter = EntryLikeAdapter::new("entry");
        let bundle = Bundle::new(json!({
            "objects": [
                { "script": [[{"type": "when_run"}], [{"type": "repeat"}]] },
                { "script": "[[{\"type\": \"move\"}]]" },
                { "script": "not json" }
            ],
            "scenes": [{}, {}],
            "variables": [{}],
            "functions": []
        }));
        let analysis = adapter.analyze(&bundle);
        assert_eq!(analysis.objects, 3);
        assert_eq!(analysis.blocks, 3);
        assert_eq!(analysis.scenes, 2);
        assert_eq!(analysis.variables, 1);
        assert_eq!(analysis.functions, 0);
        // 3 blocks bucket to 1, one variable adds one
        assert_eq!(analysis.complexity, 2);
    }

    #[test]
    fn normalize_rewrites_each_locator_shape() {
        let config = VaultConfig::default();
        let mut manifest = json!({
            "objects": [{
                "sprite": {
                    "pictures": [
                        { "fileurl": "file:///C:/entry/f185a01b2c3d4e5f6a7b8c9d0e1f2a3b.png" },
                        { "fileurl": "work/ab/cd/image/pic.png" },
                        { "fileurl": "https://cdn.example.com/pic.png" },
                        { "filename": "0a1b2c3d4e5f60718293a4b5c6d7e8f9", "imageType": "jpg" }
                    ],
                    "sounds": [
                        { "fileurl": "file:///tmp/sound-no-hash.mp3", "filename": "s.mp3" }
                    ]
                }
            }]
        });
        let warnings = normalize_locators(&mut manifest, &config);

        let pictures = &manifest["objects"][0]["sprite"]["pictures"];
        assert_eq!(
            pictures[0]["fileurl"],
            "/work/f1/85/image/f185a01b2c3d4e5f6a7b8c9d0e1f2a3b.png"
        );
        assert_eq!(pictures[1]["fileurl"], "/work/ab/cd/image/pic.png");
        assert_eq!(pictures[2]["fileurl"], "https://cdn.example.com/pic.png");
        assert_eq!(
            pictures[3]["fileurl"],
            "/work/0a/1b/image/0a1b2c3d4e5f60718293a4b5c6d7e8f9.jpg"
        );

        let sound = &manifest["objects"][0]["sprite"]["sounds"][0];
        assert_eq!(sound["fileurl"], config.placeholder_locator);
        assert_eq!(sound["filename"], config.placeholder_name);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].name, "s.mp3");
    }

    #[test]
    fn thumbnails_normalize_but_never_degrade() {
        let mut manifest = json!({
            "objects": [
                { "thumbnail": "file:///tmp/f185a01b2c3d4e5f6a7b8c9d0e1f2a3b.png" },
                { "thumbnail": "work/thumb.png" },
                { "thumbnail": "file:///tmp/no-hash.png" }
            ]
        });
        rewrite_thumbnails(&mut manifest);
        assert_eq!(
            manifest["objects"][0]["thumbnail"],
            "/work/f1/85/image/f185a01b2c3d4e5f6a7b8c9d0e1f2a3b.png"
        );
        assert_eq!(manifest["objects"][1]["thumbnail"], "/work/thumb.png");
        assert_eq!(manifest["objects"][2]["thumbnail"], "file:///tmp/no-hash.png");
    }

    #[test]
    fn references_carry_kind_name_and_dimensions() {
        let refs = collect_references(&manifest_with_picture("work/f1/85/image/a.png"));
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind, AssetKind::Image);
        assert_eq!(refs[0].name, "f185a01b2c3d4e5f6a7b8c9d0e1f2a3b.png");
        assert_eq!(refs[0].width, Some(480));
        assert_eq!(refs[0].height, Some(270));
    }

    #[tokio::test]
    async fn process_emits_gzip_even_without_assets() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path());
        let adapter = EntryLikeAdapter::new("entry");
        let bundle = Bundle::new(json!({ "objects": [], "scenes": [] }));

        let bytes = adapter.process(&bundle, "u1", &ctx).await.unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    }

    #[tokio::test]
    async fn extracted_archive_degrades_unresolvable_assets() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path());
        let adapter = EntryLikeAdapter::new("entry");

        let manifest = manifest_with_picture("/work/f1/85/image/missing.png");
        let bytes = archive::build(&manifest, &[], ctx.config.gzip_level).unwrap();

        let processed = adapter
            .post_process(ArchivePayload::Raw(bytes), "u1", None, &ctx)
            .await
            .unwrap();
        assert_eq!(processed.warnings.len(), 1);
        let degraded = &processed.bundle.manifest["objects"][0]["sprite"]["pictures"][0];
        assert_eq!(degraded["fileurl"], ctx.config.placeholder_locator);
        assert!(processed.session.is_some());
    }

    #[tokio::test]
    async fn inline_manifest_migrates_session_assets_to_storage() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path());
        let adapter = EntryLikeAdapter::new("entry");

        // Seed a materialized session so the current alias resolves
        let staged = tmp.path().join("incoming");
        std::fs::create_dir_all(staged.join("work/f1/85/image")).unwrap();
        std::fs::write(staged.join("work/f1/85/image/pic.png"), b"pixels").unwrap();
        let seeded = ctx.sessions.allocate("u1", None).await.unwrap();
        ctx.sessions
            .materialize(&staged, "u1", &seeded.id)
            .await
            .unwrap();

        let manifest = manifest_with_picture("/work/f1/85/image/pic.png");
        let processed = adapter
            .post_process(ArchivePayload::Decoded(manifest), "u1", None, &ctx)
            .await
            .unwrap();

        assert!(processed.warnings.is_empty(), "{:?}", processed.warnings);
        let migrated = processed.bundle.manifest["objects"][0]["sprite"]["pictures"][0]["fileurl"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(migrated.starts_with("https://storage.local/entry/assets/u1/"));
        assert!(migrated.ends_with(".png"));
    }

    #[tokio::test]
    async fn inline_manifest_with_dead_reference_gets_placeholder() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path());
        let adapter = EntryLikeAdapter::new("entry");

        let manifest = manifest_with_picture("/work/f1/85/image/never-extracted.png");
        let processed = adapter
            .post_process(ArchivePayload::Decoded(manifest), "u1", None, &ctx)
            .await
            .unwrap();

        assert_eq!(processed.warnings.len(), 1);
        let degraded = &processed.bundle.manifest["objects"][0]["sprite"]["pictures"][0];
        assert_eq!(degraded["fileurl"], ctx.config.placeholder_locator);
        assert_eq!(degraded["filename"], ctx.config.placeholder_name);
    }
}
