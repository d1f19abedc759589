//! Archive envelope build and parse.
//!
//! An envelope is either a single inline JSON document or a gzip-compressed
//! tar holding the manifest plus asset entries under the sharded session
//! layout. Classification looks at exactly one byte, so decode never needs
//! out-of-band format hints.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, VaultError};
use crate::rewrite::SESSION_SEGMENT;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Manifest filename inside an envelope.
pub const MANIFEST_FILE: &str = "project.json";

/// Conventional manifest locations, tried in order after extraction. The
/// last one is only written by the legacy pipeline but still loadable.
pub const MANIFEST_CANDIDATES: &[&str] = &[
    "work/project.json",
    "project.json",
    "data/project.json",
    "temp/project.json",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    InlineJson,
    TarArchive,
}

/// Classify an envelope by its first byte: `{` or `[` means an inline JSON
/// document, anything else is treated as a tar archive.
pub fn detect(bytes: &[u8]) -> Result<EnvelopeKind> {
    match bytes.first() {
        Some(b'{') | Some(b'[') => Ok(EnvelopeKind::InlineJson),
        Some(_) => Ok(EnvelopeKind::TarArchive),
        None => Err(VaultError::archive("empty payload")),
    }
}

/// One asset destined for an archive under construction.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Path inside the archive, e.g. `work/f1/85/image/<hash>.png`.
    pub archive_path: String,
    /// File to read the bytes from.
    pub source: PathBuf,
}

/// Stream-produce one tar+gzip envelope from a manifest and asset sources.
///
/// Sources that cannot be read or are not regular files are excluded with a
/// debug log; the envelope is still produced. Write failures are fatal.
pub fn build(manifest: &Value, entries: &[ArchiveEntry], gzip_level: u32) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::new(gzip_level));
    let mut builder = tar::Builder::new(encoder);
    let mtime = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let manifest_bytes = serde_json::to_vec_pretty(manifest)?;
    let mut header = tar::Header::new_gnu();
    header.set_size(manifest_bytes.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(mtime);
    header.set_cksum();
    builder.append_data(
        &mut header,
        format!("{SESSION_SEGMENT}/{MANIFEST_FILE}"),
        manifest_bytes.as_slice(),
    )?;

    for entry in entries {
        let meta = match std::fs::metadata(&entry.source) {
            Ok(meta) => meta,
            Err(err) => {
                debug!(source = %entry.source.display(), %err, "skipping unreadable archive source");
                continue;
            }
        };
        if !meta.is_file() {
            debug!(source = %entry.source.display(), "skipping non-regular archive source");
            continue;
        }
        let mut file = match std::fs::File::open(&entry.source) {
            Ok(file) => file,
            Err(err) => {
                debug!(source = %entry.source.display(), %err, "skipping unopenable archive source");
                continue;
            }
        };

        let mut header = tar::Header::new_gnu();
        header.set_size(meta.len());
        header.set_mode(0o644);
        header.set_mtime(mtime);
        header.set_cksum();
        builder.append_data(&mut header, &entry.archive_path, &mut file)?;
    }

    let encoder = builder.into_inner()?;
    Ok(encoder.finish()?)
}

/// Extract a tar envelope (gzip-wrapped or bare) into `dest`.
///
/// Link entries and entries whose declared size exceeds `max_entry_size`
/// are skipped silently, tolerating malformed legacy archives; entries that
/// would escape `dest` are refused.
pub fn extract(bytes: &[u8], dest: &Path, max_entry_size: u64) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    if bytes.len() >= 2 && bytes[..2] == GZIP_MAGIC {
        unpack(GzDecoder::new(bytes), dest, max_entry_size)
    } else {
        unpack(bytes, dest, max_entry_size)
    }
}

fn unpack<R: Read>(reader: R, dest: &Path, max_entry_size: u64) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|err| VaultError::archive(format!("unreadable archive: {err}")))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|err| VaultError::archive(format!("corrupted archive: {err}")))?;
        let entry_type = entry.header().entry_type();
        if !(entry_type.is_file() || entry_type.is_dir()) {
            debug!(kind = ?entry_type, "skipping non-regular archive entry");
            continue;
        }
        let declared = entry.header().size().unwrap_or(u64::MAX);
        if declared > max_entry_size {
            debug!(size = declared, "skipping oversized archive entry");
            continue;
        }
        if !entry.unpack_in(dest)? {
            debug!("refused archive entry escaping the extraction root");
        }
    }
    Ok(())
}

/// Locate the manifest under an extraction root, trying the conventional
/// sub-paths in order. The failure carries a bounded directory listing so a
/// malformed archive can be diagnosed from the error alone.
pub fn find_manifest(root: &Path) -> Result<PathBuf> {
    for candidate in MANIFEST_CANDIDATES {
        let path = root.join(candidate);
        if path.is_file() {
            return Ok(path);
        }
    }
    Err(VaultError::ArchiveFormat {
        message: format!("no manifest found under {}", root.display()),
        entries: crate::util::directory_listing(root, 50),
    })
}

/// Locate, read and decode the manifest under an extraction root.
pub fn read_manifest(root: &Path) -> Result<Value> {
    let path = find_manifest(root)?;
    let bytes = std::fs::read(&path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Decode an inline JSON envelope.
pub fn parse_inline(bytes: &[u8]) -> Result<Value> {
    Ok(serde_json::from_slice(bytes)?)
}
