use serde::{Deserialize, Serialize};

/// What an asset is, which also decides the shard segment it lives under
/// inside a session directory (`.../image/...` vs `.../sound/...`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Sound,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::Sound => "sound",
        }
    }

    /// Extension assumed when a reference names its file without one.
    pub fn default_extension(&self) -> &'static str {
        match self {
            AssetKind::Image => "png",
            AssetKind::Sound => "mp3",
        }
    }
}

/// The three locator shapes an asset reference can carry.
///
/// `LegacyAbsolute` is a `file:///` URI written by an editor host machine,
/// `SessionRelative` is rooted at a session directory (`/work/...`), and
/// `Remote` is a durable URL in object storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "value", rename_all = "snake_case")]
pub enum AssetLocator {
    LegacyAbsolute(String),
    SessionRelative(String),
    Remote(String),
}

impl AssetLocator {
    pub fn as_str(&self) -> &str {
        match self {
            AssetLocator::LegacyAbsolute(s)
            | AssetLocator::SessionRelative(s)
            | AssetLocator::Remote(s) => s,
        }
    }

    /// True for locators that still point at ephemeral local state and
    /// would dangle once the session directory is gone.
    pub fn is_ephemeral(&self) -> bool {
        matches!(
            self,
            AssetLocator::LegacyAbsolute(_) | AssetLocator::SessionRelative(_)
        )
    }
}

/// One asset referenced by a bundle's manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetReference {
    pub kind: AssetKind,
    /// Filename or content-hash-like identifier, without any directory part.
    pub name: String,
    pub locator: AssetLocator,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Non-fatal recovery note: one asset could not be resolved or migrated and
/// the standard placeholder was substituted. Collected on results instead of
/// being raised, so a degraded load still succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetWarning {
    pub name: String,
    /// The locator as it was before the placeholder substitution.
    pub locator: String,
    pub reason: String,
}
