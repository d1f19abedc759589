use std::sync::Arc;

use blockvault_api::metadata::MetadataStore;
use blockvault_api::storage::ObjectStore;
use blockvault_core::adapter::PlatformAdapter;
use blockvault_core::config::VaultConfig;
use blockvault_core::metadata::MemoryMetadataStore;
use blockvault_core::repository::ProjectVault;
use blockvault_core::storage::FsObjectStore;

/// Assemble a vault over the given backends with the stock platform
/// adapters registered.
pub fn build_vault(
    config: VaultConfig,
    object_store: Arc<dyn ObjectStore>,
    metadata_store: Arc<dyn MetadataStore>,
) -> blockvault_core::Result<ProjectVault> {
    ProjectVault::builder(config)
        .with_object_store(object_store)
        .with_metadata_store(metadata_store)
        .with_adapter(PlatformAdapter::entry_like("entry"))
        .with_adapter(PlatformAdapter::scratch_like("scratch"))
        .build()
}

/// Bootstraps a vault on local backends: filesystem object store under the
/// configured bucket directory, in-memory metadata.
///
/// Must be called within a Tokio runtime; the session expiry sweeper is
/// spawned onto it.
pub fn build_default_vault(config: VaultConfig) -> blockvault_core::Result<ProjectVault> {
    let object_store = Arc::new(FsObjectStore::new(&config.object_root));
    let metadata_store = Arc::new(MemoryMetadataStore::new());

    let vault = build_vault(config, object_store, metadata_store)?;
    vault.start_maintenance();
    tracing::info!(platforms = ?vault.platforms(), "vault assembled");
    Ok(vault)
}

/// Initializes the logging system for a specific component.
/// This delegates to the core logging module.
pub fn init_logging(component: &str, to_stderr: bool) -> impl Drop {
    blockvault_core::logging::init_logging(component, to_stderr)
}
