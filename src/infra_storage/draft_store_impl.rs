use crate::domain_model::DraftKey;
use crate::domain_port::{DraftStore, LocalStorage, StorageError};
use std::sync::Arc;

pub struct PersistentDraftStore {
    storage: Arc<dyn LocalStorage>,
}

impl PersistentDraftStore {
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        Self { storage }
    }
}

impl DraftStore for PersistentDraftStore {
    fn load(&self, key: &DraftKey) -> Result<Option<String>, StorageError> {
        self.storage.get(&key.storage_key())
    }

    fn save(&self, key: &DraftKey, code: &str) -> Result<(), StorageError> {
        self.storage.set(&key.storage_key(), code)
    }
}
