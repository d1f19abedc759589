pub mod asset;
pub mod bundle;
pub mod record;

pub use asset::{AssetKind, AssetLocator, AssetReference, AssetWarning};
pub use bundle::Bundle;
pub use record::{
    Analysis, LoadOutcome, SaveOutcome, SaveType, SubmissionDraft, SubmissionRecord,
};
