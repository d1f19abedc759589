pub mod error;
pub mod metadata;
pub mod models;
pub mod storage;

// Re-export commonly used types
pub use error::{VaultError, VaultResult};
pub use metadata::{ActivityEntry, MetadataStore, OwnerRef, SubmissionFilter};
pub use models::*;
pub use storage::{Listing, ObjectMeta, ObjectStore};
