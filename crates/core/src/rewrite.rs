//! Locator normalization between the three asset locator shapes.
//!
//! All legacy-path surgery lives here, as pure string rules with no
//! filesystem or network access. Adapters own the manifest traversal and
//! call into these rules per reference.

use once_cell::sync::Lazy;
use regex::Regex;

use blockvault_api::models::{AssetKind, AssetLocator};

/// Folder name that roots session-relative asset paths. Archives pack their
/// entries under the same segment, so an extracted tree resolves in place.
pub const SESSION_SEGMENT: &str = "work";

static HASHED_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([a-f0-9]{32})\.(png|jpg|jpeg|gif|svg|webp)$")
        .expect("image hash pattern must compile")
});

static HASHED_SOUND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([a-f0-9]{32})\.(mp3|wav|ogg)$").expect("sound hash pattern must compile")
});

/// Classify a raw locator string into its shape, normalizing a relative
/// session path to be root-relative on the way.
pub fn classify(raw: &str) -> AssetLocator {
    if raw.starts_with("file:///") {
        AssetLocator::LegacyAbsolute(raw.to_string())
    } else if raw.starts_with("http://") || raw.starts_with("https://") {
        AssetLocator::Remote(raw.to_string())
    } else {
        AssetLocator::SessionRelative(ensure_rooted(raw))
    }
}

/// Convert a legacy absolute `file:///` URI to a session-relative path by
/// extracting the content-hash filename and re-expressing it under the
/// sharded folder convention. None when no hash-looking filename is present,
/// in which case the caller substitutes the placeholder.
pub fn rewrite_legacy(uri: &str, kind: AssetKind) -> Option<String> {
    let pattern = match kind {
        AssetKind::Image => &*HASHED_IMAGE,
        AssetKind::Sound => &*HASHED_SOUND,
    };
    let caps = pattern.captures(uri)?;
    let hash = caps.get(1)?.as_str();
    let ext = caps.get(2)?.as_str();
    Some(sharded_path(hash, kind, ext))
}

/// Expand a bare filename (no locator at all) under the sharded convention.
/// A name that already carries an extension keeps it; otherwise the declared
/// type or the kind's default is appended.
pub fn expand_bare(name: &str, kind: AssetKind, declared_ext: Option<&str>) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            sharded_path_named(stem, kind, &format!("{stem}.{ext}"))
        }
        _ => {
            let ext = declared_ext.unwrap_or(kind.default_extension());
            sharded_path_named(name, kind, &format!("{name}.{ext}"))
        }
    }
}

/// Normalize a relative session path to be root-relative (`work/x` ⇒
/// `/work/x`). Already-rooted paths pass through.
pub fn ensure_rooted(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// The piece of a session-relative locator to join onto a session directory.
/// None for shapes that do not resolve against a session.
pub fn strip_root(locator: &AssetLocator) -> Option<&str> {
    match locator {
        AssetLocator::SessionRelative(path) => Some(path.trim_start_matches('/')),
        _ => None,
    }
}

fn sharded_path(hash: &str, kind: AssetKind, ext: &str) -> String {
    sharded_path_named(hash, kind, &format!("{hash}.{ext}"))
}

/// `/work/{n[0..2]}/{n[2..4]}/{kind}/{file}`, tolerating names shorter than
/// four characters by dropping the empty shard segments.
fn sharded_path_named(shard_source: &str, kind: AssetKind, file: &str) -> String {
    let chars: Vec<char> = shard_source.chars().collect();
    let first: String = chars.iter().take(2).collect();
    let second: String = chars.iter().skip(2).take(2).collect();

    let mut path = format!("/{SESSION_SEGMENT}");
    for segment in [first.as_str(), second.as_str(), kind.as_str(), file] {
        if !segment.is_empty() {
            path.push('/');
            path.push_str(segment);
        }
    }
    path
}
