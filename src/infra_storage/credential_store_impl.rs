use crate::domain_model::CredentialPair;
use crate::domain_port::{CredentialStore, LocalStorage, StorageError};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, warn};

const ACCESS_KEY: &str = "access";
const REFRESH_KEY: &str = "refresh";

/// Credential pair held in memory and mirrored to `LocalStorage`.
///
/// Writers take turns on `writer` and touch storage before swapping the
/// in-memory pair, so readers never wait on I/O and see either the previous
/// pair or the new one.
pub struct PersistentCredentialStore {
    storage: Arc<dyn LocalStorage>,
    current: RwLock<Option<CredentialPair>>,
    writer: Mutex<()>,
    linked_prefixes: Vec<String>,
}

impl PersistentCredentialStore {
    /// Restore a previously persisted pair, if both halves are present.
    pub fn load(storage: Arc<dyn LocalStorage>) -> Result<Self, StorageError> {
        let access = storage.get(ACCESS_KEY)?;
        let refresh = storage.get(REFRESH_KEY)?;

        let current = match (access, refresh) {
            (Some(access), Some(refresh)) => {
                debug!("restored persisted session");
                Some(CredentialPair::new(access, refresh))
            }
            (None, None) => None,
            _ => {
                warn!("persisted session is incomplete, discarding it");
                storage.remove_many(&[ACCESS_KEY, REFRESH_KEY])?;
                None
            }
        };

        Ok(Self {
            storage,
            current: RwLock::new(current),
            writer: Mutex::new(()),
            linked_prefixes: Vec::new(),
        })
    }

    /// Keys starting with `prefix` belong to the session and are removed by
    /// `clear` in the same batch as the tokens.
    pub fn with_linked_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.linked_prefixes.push(prefix.into());
        self
    }

    fn session_keys(&self) -> Result<Vec<String>, StorageError> {
        let mut keys = vec![ACCESS_KEY.to_string(), REFRESH_KEY.to_string()];
        if !self.linked_prefixes.is_empty() {
            keys.extend(self.storage.keys()?.into_iter().filter(|key| {
                self.linked_prefixes
                    .iter()
                    .any(|prefix| key.starts_with(prefix.as_str()))
            }));
        }
        Ok(keys)
    }
}

impl CredentialStore for PersistentCredentialStore {
    fn get(&self) -> Option<CredentialPair> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, pair: CredentialPair) -> Result<(), StorageError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.storage.set_many(&[
            (ACCESS_KEY, pair.access.0.as_str()),
            (REFRESH_KEY, pair.refresh.0.as_str()),
        ])?;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(pair);
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        // the session is gone even if removing it from storage fails
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;

        let keys = self.session_keys()?;
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        self.storage.remove_many(&keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra_storage::MemoryStorage;
    use std::sync::mpsc;

    fn create_test_store() -> (Arc<MemoryStorage>, PersistentCredentialStore) {
        let storage = Arc::new(MemoryStorage::new());
        let store = PersistentCredentialStore::load(storage.clone())
            .unwrap()
            .with_linked_prefix("code_");
        (storage, store)
    }

    #[test]
    fn test_empty_storage_has_no_session() {
        let (_, store) = create_test_store();
        assert!(store.get().is_none());
    }

    #[test]
    fn test_set_persists_both_tokens() {
        let (storage, store) = create_test_store();
        store.set(CredentialPair::new("a1", "r1")).unwrap();

        assert_eq!(store.get(), Some(CredentialPair::new("a1", "r1")));
        assert_eq!(storage.get("access").unwrap().as_deref(), Some("a1"));
        assert_eq!(storage.get("refresh").unwrap().as_deref(), Some("r1"));
    }

    #[test]
    fn test_load_restores_persisted_pair() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_many(&[("access", "a1"), ("refresh", "r1")]).unwrap();

        let store = PersistentCredentialStore::load(storage).unwrap();
        assert_eq!(store.get(), Some(CredentialPair::new("a1", "r1")));
    }

    #[test]
    fn test_load_discards_half_a_pair() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set("access", "a1").unwrap();

        let store = PersistentCredentialStore::load(storage.clone()).unwrap();
        assert!(store.get().is_none());
        assert!(storage.get("access").unwrap().is_none());
    }

    #[test]
    fn test_clear_removes_tokens_and_linked_keys_only() {
        let (storage, store) = create_test_store();
        store.set(CredentialPair::new("a1", "r1")).unwrap();
        storage.set("code_python_A", "print(1)").unwrap();
        storage.set("theme", "dark").unwrap();

        store.clear().unwrap();

        assert!(store.get().is_none());
        assert_eq!(storage.keys().unwrap(), vec!["theme".to_string()]);
    }

    #[test]
    fn test_concurrent_readers_never_see_mixed_pairs() {
        let (_, store) = create_test_store();
        let store = Arc::new(store);
        store.set(CredentialPair::new("a0", "r0")).unwrap();

        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 1..500 {
                    store
                        .set(CredentialPair::new(format!("a{i}"), format!("r{i}")))
                        .unwrap();
                }
            })
        };

        for _ in 0..2000 {
            let pair = store.get().unwrap();
            assert_eq!(pair.access.0[1..], pair.refresh.0[1..]);
        }
        writer.join().unwrap();
    }

    /// Parks the first `set_many` until the test releases it.
    struct GatedStorage {
        inner: MemoryStorage,
        entered: Mutex<Option<mpsc::Sender<()>>>,
        release: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl LocalStorage for GatedStorage {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key)
        }

        fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StorageError> {
            if let Some(entered) = self.entered.lock().unwrap().take() {
                entered.send(()).unwrap();
                let release = self.release.lock().unwrap().take().unwrap();
                release.recv().unwrap();
            }
            self.inner.set_many(entries)
        }

        fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError> {
            self.inner.remove_many(keys)
        }

        fn keys(&self) -> Result<Vec<String>, StorageError> {
            self.inner.keys()
        }
    }

    #[test]
    fn test_readers_are_not_blocked_by_a_slow_write() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let storage = GatedStorage {
            inner: MemoryStorage::new(),
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(Some(release_rx)),
        };
        storage
            .inner
            .set_many(&[("access", "a0"), ("refresh", "r0")])
            .unwrap();
        let store = Arc::new(PersistentCredentialStore::load(Arc::new(storage)).unwrap());

        let writer = {
            let store = store.clone();
            std::thread::spawn(move || store.set(CredentialPair::new("a1", "r1")).unwrap())
        };
        entered_rx.recv().unwrap();

        assert_eq!(store.get(), Some(CredentialPair::new("a0", "r0")));

        release_tx.send(()).unwrap();
        writer.join().unwrap();
        assert_eq!(store.get(), Some(CredentialPair::new("a1", "r1")));
    }

    struct ReadOnlyStorage(MemoryStorage);

    impl LocalStorage for ReadOnlyStorage {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.0.get(key)
        }

        fn set_many(&self, _: &[(&str, &str)]) -> Result<(), StorageError> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
        }

        fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError> {
            self.0.remove_many(keys)
        }

        fn keys(&self) -> Result<Vec<String>, StorageError> {
            self.0.keys()
        }
    }

    #[test]
    fn test_failed_write_keeps_previous_pair() {
        let inner = MemoryStorage::new();
        inner.set_many(&[("access", "a0"), ("refresh", "r0")]).unwrap();
        let store = PersistentCredentialStore::load(Arc::new(ReadOnlyStorage(inner))).unwrap();

        assert!(store.set(CredentialPair::new("a1", "r1")).is_err());
        assert_eq!(store.get(), Some(CredentialPair::new("a0", "r0")));
    }
}
