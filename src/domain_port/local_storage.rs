#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt state file: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Durable string key/value storage for client-side state.
///
/// Batch operations are all-or-nothing: either every entry is written (or
/// removed) or the storage is left unchanged.
pub trait LocalStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StorageError>;

    fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError>;

    fn keys(&self) -> Result<Vec<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.set_many(&[(key, value)])
    }
}
