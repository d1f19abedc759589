use std::path::Path;

/// Bounded recursive listing of a directory tree, relative paths with a
/// trailing `/` on directories. Used for diagnostics when an archive is
/// missing its manifest; never fails, unreadable entries are skipped.
pub fn directory_listing(root: &Path, max_entries: usize) -> Vec<String> {
    let mut entries = Vec::new();
    for entry in walkdir::WalkDir::new(root)
        .min_depth(1)
        .max_depth(4)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if entries.len() >= max_entries {
            entries.push("...".to_string());
            break;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let mut shown = rel.to_string_lossy().replace('\\', "/");
        if entry.file_type().is_dir() {
            shown.push('/');
        }
        entries.push(shown);
    }
    entries
}

/// Recursive copy of a directory tree, skipping symlinks. Synchronous,
/// intended to run inside `spawn_blocking`.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<u64> {
    let mut copied = 0;
    std::fs::create_dir_all(dst)?;
    for entry in walkdir::WalkDir::new(src)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let rel = match entry.path().strip_prefix(src) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        let target = dst.join(rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Normalize permissions to 0755 across a tree so extracted assets are
/// servable regardless of what the archive recorded. No-op off unix.
#[cfg(unix)]
pub fn normalize_permissions(root: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        let perms = std::fs::Permissions::from_mode(0o755);
        std::fs::set_permissions(entry.path(), perms)?;
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn normalize_permissions(_root: &Path) -> std::io::Result<()> {
    Ok(())
}
