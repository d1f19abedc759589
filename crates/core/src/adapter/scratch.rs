//! Adapter for Scratch-family platforms.
//!
//! Manifests are self-contained: targets embed their block maps and asset
//! references resolve by content hash against the platform's own asset
//! host. Serialization is therefore a plain JSON pass-through and no
//! locator surgery applies. Archived envelopes still extract through the
//! shared session path so older exports keep loading.

use serde_json::Value;

use blockvault_api::error::VaultError;
use blockvault_api::models::{Analysis, Bundle};

use crate::archive::{self, EnvelopeKind};
use crate::error::Result;

use super::{
    AdapterContext, ArchivePayload, ProcessedBundle, classify_payload, complexity_score,
    decode_tar_envelope,
};

/// Custom-block definitions carry this opcode in the block map.
const PROCEDURE_OPCODE: &str = "procedures_definition";

pub struct ScratchLikeAdapter {
    platform: String,
}

impl ScratchLikeAdapter {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
        }
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn validate(&self, bundle: &mut Bundle) -> Result<()> {
        let Some(root) = bundle.manifest.as_object() else {
            return Err(VaultError::Validation(
                "project manifest must be a JSON object".to_string(),
            ));
        };
        match root.get("targets") {
            Some(Value::Array(_)) => Ok(()),
            Some(_) => Err(VaultError::Validation(
                "field `targets` must be an array".to_string(),
            )),
            None | Some(Value::Null) => Err(VaultError::Validation(
                "missing required field `targets`".to_string(),
            )),
        }
    }

    pub async fn process(&self, bundle: &Bundle) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&bundle.manifest)?)
    }

    pub fn analyze(&self, bundle: &Bundle) -> Analysis {
        let mut analysis = Analysis::default();
        let Some(targets) = bundle.manifest.get("targets").and_then(Value::as_array) else {
            analysis.complexity = complexity_score(0, 0, 0);
            return analysis;
        };

        for target in targets {
            let is_stage = target
                .get("isStage")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if is_stage {
                analysis.scenes += 1;
            } else {
                analysis.objects += 1;
            }

            if let Some(blocks) = target.get("blocks").and_then(Value::as_object) {
                analysis.blocks += blocks.len() as u32;
                analysis.functions += blocks
                    .values()
                    .filter(|block| {
                        block.get("opcode").and_then(Value::as_str) == Some(PROCEDURE_OPCODE)
                    })
                    .count() as u32;
            }
            if let Some(variables) = target.get("variables").and_then(Value::as_object) {
                analysis.variables += variables.len() as u32;
            }
        }

        analysis.complexity =
            complexity_score(analysis.blocks, analysis.variables, analysis.functions);
        analysis
    }

    pub async fn post_process(
        &self,
        payload: ArchivePayload,
        owner: &str,
        session: Option<&str>,
        ctx: &AdapterContext,
    ) -> Result<ProcessedBundle> {
        match payload {
            ArchivePayload::Decoded(manifest) => Ok(passthrough(manifest)),
            ArchivePayload::Raw(bytes) => match classify_payload(&bytes)? {
                EnvelopeKind::InlineJson => Ok(passthrough(archive::parse_inline(&bytes)?)),
                EnvelopeKind::TarArchive => {
                    let (manifest, session_id) =
                        decode_tar_envelope(bytes, owner, session, ctx).await?;
                    Ok(ProcessedBundle {
                        bundle: Bundle::new(manifest),
                        warnings: Vec::new(),
                        session: Some(session_id),
                    })
                }
            },
        }
    }
}

fn passthrough(manifest: Value) -> ProcessedBundle {
    ProcessedBundle {
        bundle: Bundle::new(manifest),
        warnings: Vec::new(),
        session: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    use crate::config::VaultConfig;
    use crate::session::SessionStore;
    use crate::storage::{MemoryObjectStore, StorageGateway};

    fn sample_manifest() -> Value {
        json!({
            "targets": [
                {
                    "isStage": true,
                    "name": "Stage",
                    "blocks": {},
                    "variables": { "v1": ["score", 0] }
                },
                {
                    "isStage": false,
                    "name": "Sprite1",
                    "blocks": {
                        "a": { "opcode": "event_whenflagclicked" },
                        "b": { "opcode": "procedures_definition" },
                        "c": { "opcode": "motion_movesteps" }
                    },
                    "variables": {}
                }
            ]
        })
    }

    #[test]
    fn validate_requires_targets_array() {
        let adapter = ScratchLikeAdapter::new("scratch");

        let mut bundle = Bundle::new(sample_manifest());
        adapter.validate(&mut bundle).unwrap();

        let mut missing = Bundle::new(json!({ "meta": {} }));
        assert!(matches!(
            adapter.validate(&mut missing),
            Err(VaultError::Validation(_))
        ));

        let mut wrong = Bundle::new(json!({ "targets": {} }));
        assert!(matches!(
            adapter.validate(&mut wrong),
            Err(VaultError::Validation(_))
        ));
    }

    #[test]
    fn analyze_separates_sprites_from_stages() {
        let adapter = ScratchLikeAdapter::new("scratch");
        let analysis = adapter.analyze(&Bundle::new(sample_manifest()));

        assert_eq!(analysis.objects, 1);
        assert_eq!(analysis.scenes, 1);
        assert_eq!(analysis.blocks, 3);
        assert_eq!(analysis.variables, 1);
        assert_eq!(analysis.functions, 1);
        // 3 blocks bucket to 1, plus one variable and one custom block
        assert_eq!(analysis.complexity, 3);
    }

    #[tokio::test]
    async fn process_then_post_process_is_a_pure_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let config = VaultConfig {
            session_root: tmp.path().to_path_buf(),
            ..VaultConfig::default()
        };
        let ctx = AdapterContext {
            gateway: Arc::new(StorageGateway::new(
                Arc::new(MemoryObjectStore::new()),
                "https://storage.local",
            )),
            sessions: Arc::new(SessionStore::new(&config)),
            config: Arc::new(config),
        };

        let adapter = ScratchLikeAdapter::new("scratch");
        let bundle = Bundle::new(sample_manifest());
        let bytes = adapter.process(&bundle).await.unwrap();

        let processed = adapter
            .post_process(ArchivePayload::Raw(bytes), "u1", None, &ctx)
            .await
            .unwrap();
        assert_eq!(processed.bundle.manifest, sample_manifest());
        assert!(processed.session.is_none());
        assert!(processed.warnings.is_empty());
    }
}
