use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Sessions retained per owner; older ones are evicted on allocation.
pub const DEFAULT_MAX_SESSIONS: usize = 3;

/// Lifetime of a session directory before the sweep reclaims it.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60;

/// Lifetime of staging leftovers (extraction dirs, stray archive files).
pub const DEFAULT_STAGING_TTL_SECS: u64 = 30 * 60;

/// Interval between expiry sweeps.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10 * 60;

/// Largest single archive entry accepted during extraction (100 MiB).
pub const DEFAULT_MAX_ENTRY_SIZE: u64 = 100 * 1024 * 1024;

/// Largest archive accepted for upload per platform (20 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 20 * 1024 * 1024;

/// gzip compression level for built archives.
pub const DEFAULT_GZIP_LEVEL: u32 = 6;

/// Per-platform upload limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlatformPolicy {
    pub max_upload_bytes: u64,
    /// File extensions this platform may persist; empty means unrestricted.
    pub allowed_extensions: Vec<String>,
}

impl Default for PlatformPolicy {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_extensions: Vec::new(),
        }
    }
}

/// Top-level configuration for the persistence engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Root under which per-owner session directories are created.
    pub session_root: PathBuf,
    /// Bucket directory for the filesystem object store backend.
    pub object_root: PathBuf,
    pub max_sessions_per_owner: usize,
    pub session_ttl_secs: u64,
    pub staging_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub max_entry_size: u64,
    pub gzip_level: u32,
    /// Base of public download URLs; the storage key is appended.
    pub public_base_url: String,
    /// Locator substituted for an unreachable asset reference.
    pub placeholder_locator: String,
    pub placeholder_name: String,
    /// Upload policy keyed by platform; unknown platforms get the default.
    pub policies: HashMap<String, PlatformPolicy>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        let base = dirs::home_dir().unwrap_or_else(std::env::temp_dir);
        let session_root = base.join(".blockvault/sessions");
        let object_root = base.join(".blockvault/objects");

        let mut policies = HashMap::new();
        policies.insert(
            "entry".to_string(),
            PlatformPolicy {
                max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
                allowed_extensions: vec!["ent".to_string()],
            },
        );
        policies.insert(
            "scratch".to_string(),
            PlatformPolicy {
                max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
                allowed_extensions: vec!["sb3".to_string(), "sb2".to_string(), "sb".to_string()],
            },
        );

        Self {
            session_root,
            object_root,
            max_sessions_per_owner: DEFAULT_MAX_SESSIONS,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            staging_ttl_secs: DEFAULT_STAGING_TTL_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
            gzip_level: DEFAULT_GZIP_LEVEL,
            public_base_url: "https://storage.local".to_string(),
            placeholder_locator: "/assets/placeholder/_1x1.png".to_string(),
            placeholder_name: "_1x1.png".to_string(),
            policies,
        }
    }
}

impl VaultConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn staging_ttl(&self) -> Duration {
        Duration::from_secs(self.staging_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Policy for a platform, falling back to the default limits.
    pub fn policy_for(&self, platform: &str) -> PlatformPolicy {
        self.policies.get(platform).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_known_platforms() {
        let config = VaultConfig::default();
        assert_eq!(config.max_sessions_per_owner, 3);
        assert_eq!(config.policy_for("entry").allowed_extensions, vec!["ent"]);
        assert!(config.policy_for("scratch").allowed_extensions.contains(&"sb3".to_string()));
        // Unknown platforms fall back to defaults rather than erroring
        assert_eq!(
            config.policy_for("demo").max_upload_bytes,
            DEFAULT_MAX_UPLOAD_BYTES
        );
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: VaultConfig =
            serde_json::from_str(r#"{ "max_sessions_per_owner": 5 }"#).unwrap();
        assert_eq!(config.max_sessions_per_owner, 5);
        assert_eq!(config.session_ttl_secs, DEFAULT_SESSION_TTL_SECS);
        assert_eq!(config.gzip_level, DEFAULT_GZIP_LEVEL);
    }
}
