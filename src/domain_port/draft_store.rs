use super::StorageError;
use crate::domain_model::DraftKey;

/// Per-problem, per-language source drafts.
///
/// Drafts belong to the session: clearing the credential store sweeps them
/// along with the tokens.
pub trait DraftStore: Send + Sync {
    fn load(&self, key: &DraftKey) -> Result<Option<String>, StorageError>;

    fn save(&self, key: &DraftKey, code: &str) -> Result<(), StorageError>;
}
