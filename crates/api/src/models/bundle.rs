use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::asset::AssetReference;

/// Platform-agnostic in-memory project.
///
/// The manifest is the opaque object graph exactly as the editor serialized
/// it (objects/scenes/variables/functions pass through untouched); `assets`
/// is a projection of the asset references found in it, refreshed by the
/// owning adapter whenever locators are rewritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    pub manifest: Value,
    #[serde(default)]
    pub assets: Vec<AssetReference>,
}

impl Bundle {
    pub fn new(manifest: Value) -> Self {
        Self {
            manifest,
            assets: Vec::new(),
        }
    }
}

impl From<Value> for Bundle {
    fn from(manifest: Value) -> Self {
        Bundle::new(manifest)
    }
}
