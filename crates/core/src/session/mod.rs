//! Session-scoped asset store.
//!
//! Extracted assets live in per-(owner, session) directories under one
//! root: `{root}/users/{owner}_{session}`. Each owner also has a stable
//! `{owner}_current` alias pointing at the most recently materialized
//! session, for callers that assume a single active session. Directories
//! are ephemeral: allocation evicts beyond the per-owner cap and a periodic
//! sweep reclaims anything past its TTL.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::VaultConfig;
use crate::error::Result;
use crate::util;

const SESSIONS_DIR: &str = "users";
const STAGING_DIR: &str = "staging";
const CURRENT_SUFFIX: &str = "current";

/// One allocated session directory.
#[derive(Debug, Clone)]
pub struct Session {
    pub owner: String,
    pub id: String,
    pub dir: PathBuf,
    pub created: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SweepStats {
    pub sessions_removed: usize,
    pub files_removed: usize,
    pub failures: usize,
}

pub struct SessionStore {
    root: PathBuf,
    max_sessions: usize,
    session_ttl: Duration,
    staging_ttl: Duration,
    /// Serializes evict+allocate+materialize per owner. Distinct owners
    /// never contend.
    owner_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionStore {
    pub fn new(config: &VaultConfig) -> Self {
        Self {
            root: config.session_root.clone(),
            max_sessions: config.max_sessions_per_owner,
            session_ttl: config.session_ttl(),
            staging_ttl: config.staging_ttl(),
            owner_locks: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Mint a fresh, collision-resistant session id.
    pub fn mint_session_id() -> String {
        let millis = chrono::Utc::now().timestamp_millis();
        let tail = uuid::Uuid::new_v4().simple().to_string();
        format!("{millis:x}-{}", &tail[..8])
    }

    /// Directory of one (owner, session) pair.
    pub fn session_dir(&self, owner: &str, session: &str) -> PathBuf {
        self.root
            .join(SESSIONS_DIR)
            .join(format!("{}_{}", safe_owner(owner), safe_session(session)))
    }

    /// The owner's stable alias to the most recently materialized session.
    pub fn current_alias(&self, owner: &str) -> PathBuf {
        self.root
            .join(SESSIONS_DIR)
            .join(format!("{}_{}", safe_owner(owner), CURRENT_SUFFIX))
    }

    /// Resolve a session-relative path (as produced by the rewriter) against
    /// the owner's current alias.
    pub fn resolve_current(&self, owner: &str, relative: &str) -> PathBuf {
        self.current_alias(owner).join(relative)
    }

    /// Idempotently create the session directory, evicting this owner's
    /// oldest sessions first so at most `max_sessions` remain afterwards.
    /// Mints a session id when the caller has none.
    pub async fn allocate(&self, owner: &str, session: Option<&str>) -> Result<Session> {
        let lock = self.owner_lock(owner);
        let _guard = lock.lock().await;

        let id = match session {
            // An explicit id may not shadow the alias name
            Some(id) if id != CURRENT_SUFFIX => safe_session(id),
            _ => Self::mint_session_id(),
        };
        self.evict_locked(owner, self.max_sessions.saturating_sub(1))
            .await?;

        let dir = self.session_dir(owner, &id);
        tokio::fs::create_dir_all(&dir).await?;
        debug!(owner, session = %id, dir = %dir.display(), "allocated session");
        Ok(Session {
            owner: owner.to_string(),
            id,
            dir,
            created: chrono::Utc::now(),
        })
    }

    /// Recursively copy a freshly extracted tree into the session directory,
    /// normalize permissions and republish the owner's current alias.
    pub async fn materialize(&self, source: &Path, owner: &str, session: &str) -> Result<u64> {
        let lock = self.owner_lock(owner);
        let _guard = lock.lock().await;

        let dir = self.session_dir(owner, session);
        let alias = self.current_alias(owner);
        let source = source.to_path_buf();
        let target = dir.clone();

        let copied = tokio::task::spawn_blocking(move || -> std::io::Result<u64> {
            let copied = util::copy_dir_recursive(&source, &target)?;
            util::normalize_permissions(&target)?;
            republish_alias(&alias, &target)?;
            Ok(copied)
        })
        .await
        .map_err(|err| std::io::Error::other(err.to_string()))??;

        info!(owner, session, files = copied, "materialized session");
        Ok(copied)
    }

    /// Keep at most `max` sessions for this owner, deleting by oldest
    /// modified time first.
    pub async fn evict_oldest(&self, owner: &str, max: usize) -> Result<usize> {
        let lock = self.owner_lock(owner);
        let _guard = lock.lock().await;
        self.evict_locked(owner, max).await
    }

    async fn evict_locked(&self, owner: &str, max: usize) -> Result<usize> {
        let sessions_root = self.root.join(SESSIONS_DIR);
        let prefix = format!("{}_", safe_owner(owner));

        let mut dirs = match list_owner_sessions(&sessions_root, &prefix) {
            Ok(dirs) => dirs,
            // Nothing allocated yet
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };
        if dirs.len() <= max {
            return Ok(0);
        }

        dirs.sort_by_key(|(_, mtime)| *mtime);
        let excess = dirs.len() - max;
        let mut removed = 0;
        for (path, _) in dirs.into_iter().take(excess) {
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => {
                    debug!(owner, dir = %path.display(), "evicted session");
                    removed += 1;
                }
                Err(err) => warn!(owner, dir = %path.display(), %err, "failed to evict session"),
            }
        }
        Ok(removed)
    }

    /// Best-effort deferred deletion. The timer does not survive a process
    /// restart; `sweep_expired` is the durable backstop.
    pub fn schedule_expiry(&self, owner: &str, session: &str, ttl: Duration) {
        let dir = self.session_dir(owner, session);
        let owner = owner.to_string();
        let session = session.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => info!(owner, session, "expired session removed"),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => debug!(owner, session, %err, "scheduled expiry failed"),
            }
        });
    }

    /// Create a fresh staging directory for an extraction in progress.
    pub async fn allocate_staging(&self) -> Result<PathBuf> {
        let dir = self
            .root
            .join(STAGING_DIR)
            .join(format!("parse_{}", Self::mint_session_id()));
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Idempotent reclaim pass: session directories past the session TTL,
    /// staging leftovers and stray archive files past the staging TTL. One
    /// failed deletion never halts the sweep of the others.
    pub async fn sweep_expired(&self) -> SweepStats {
        let mut stats = SweepStats::default();
        let now = SystemTime::now();

        self.sweep_dir(
            &self.root.join(SESSIONS_DIR),
            self.session_ttl,
            now,
            &mut stats,
        )
        .await;
        self.sweep_dir(
            &self.root.join(STAGING_DIR),
            self.staging_ttl,
            now,
            &mut stats,
        )
        .await;
        self.sweep_loose_files(&self.root, self.staging_ttl, now, &mut stats)
            .await;

        if stats.sessions_removed + stats.files_removed + stats.failures > 0 {
            info!(
                sessions = stats.sessions_removed,
                files = stats.files_removed,
                failures = stats.failures,
                "expiry sweep complete"
            );
        }
        stats
    }

    async fn sweep_dir(&self, root: &Path, ttl: Duration, now: SystemTime, stats: &mut SweepStats) {
        let mut entries = match tokio::fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(_) => return,
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let meta = match tokio::fs::symlink_metadata(&path).await {
                Ok(meta) => meta,
                Err(_) => continue,
            };
            // The current aliases are republished, never swept
            if meta.file_type().is_symlink() {
                continue;
            }
            if !is_older_than(&meta, now, ttl) {
                continue;
            }
            let outcome = if meta.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            match outcome {
                Ok(()) => {
                    if meta.is_dir() {
                        stats.sessions_removed += 1;
                    } else {
                        stats.files_removed += 1;
                    }
                }
                Err(err) => {
                    warn!(path = %path.display(), %err, "sweep failed to remove entry");
                    stats.failures += 1;
                }
            }
        }
    }

    async fn sweep_loose_files(
        &self,
        root: &Path,
        ttl: Duration,
        now: SystemTime,
        stats: &mut SweepStats,
    ) {
        let mut entries = match tokio::fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(_) => return,
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let meta = match tokio::fs::symlink_metadata(&path).await {
                Ok(meta) => meta,
                Err(_) => continue,
            };
            if !meta.is_file() || !is_older_than(&meta, now, ttl) {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => stats.files_removed += 1,
                Err(err) => {
                    warn!(path = %path.display(), %err, "sweep failed to remove file");
                    stats.failures += 1;
                }
            }
        }
    }

    /// Run the sweep on a fixed interval until cancelled or the store is
    /// dropped by everyone else.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        match store.upgrade() {
                            Some(store) => {
                                store.sweep_expired().await;
                            }
                            None => break,
                        }
                    }
                }
            }
            debug!("session sweeper stopped");
        })
    }

    fn owner_lock(&self, owner: &str) -> Arc<Mutex<()>> {
        self.owner_locks
            .entry(owner.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Owner ids become path components; underscores are remapped so the first
/// `_` in a directory name always delimits owner from session.
fn safe_owner(owner: &str) -> String {
    owner
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

fn safe_session(session: &str) -> String {
    session
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn list_owner_sessions(
    sessions_root: &Path,
    prefix: &str,
) -> std::io::Result<Vec<(PathBuf, SystemTime)>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(sessions_root)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(prefix) || name == format!("{prefix}{CURRENT_SUFFIX}") {
            continue;
        }
        let meta = entry.metadata()?;
        if meta.file_type().is_symlink() || !meta.is_dir() {
            continue;
        }
        let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        dirs.push((entry.path(), mtime));
    }
    Ok(dirs)
}

fn is_older_than(meta: &std::fs::Metadata, now: SystemTime, ttl: Duration) -> bool {
    match meta.modified() {
        Ok(mtime) => now.duration_since(mtime).map(|age| age > ttl).unwrap_or(false),
        Err(_) => false,
    }
}

#[cfg(unix)]
fn republish_alias(alias: &Path, target: &Path) -> std::io::Result<()> {
    match std::fs::symlink_metadata(alias) {
        Ok(meta) if meta.file_type().is_symlink() || meta.is_file() => {
            std::fs::remove_file(alias)?;
        }
        Ok(_) => {
            std::fs::remove_dir_all(alias)?;
        }
        Err(_) => {}
    }
    std::os::unix::fs::symlink(target, alias)
}

#[cfg(not(unix))]
fn republish_alias(alias: &Path, _target: &Path) -> std::io::Result<()> {
    tracing::debug!(alias = %alias.display(), "symlink aliases unsupported on this platform");
    Ok(())
}
