use super::StorageError;
use crate::domain_model::CredentialPair;

/// Owner of the current session's credential pair.
///
/// Readers never observe a half-written pair. `set` and `clear` are the only
/// ways to change it.
pub trait CredentialStore: Send + Sync {
    fn get(&self) -> Option<CredentialPair>;

    fn set(&self, pair: CredentialPair) -> Result<(), StorageError>;

    /// Drop the pair and everything persisted alongside it. The in-memory
    /// pair is gone even when removing the persisted copy fails.
    fn clear(&self) -> Result<(), StorageError>;
}
