#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad archive: {message} (saw entries: {entries:?})")]
    ArchiveFormat {
        message: String,
        entries: Vec<String>,
    },
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VaultError {
    /// Archive failure without a captured directory listing.
    pub fn archive(message: impl Into<String>) -> Self {
        VaultError::ArchiveFormat {
            message: message.into(),
            entries: Vec::new(),
        }
    }
}

pub type VaultResult<T> = std::result::Result<T, VaultError>;
