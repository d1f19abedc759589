pub use blockvault_api::error::{VaultError, VaultResult};

pub type Result<T> = VaultResult<T>;
