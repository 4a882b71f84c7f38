//! In-memory session store.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use super::{SessionKey, SessionStore, StoreError};

/// In-memory store for testing, simulation, and hosts that persist
/// elsewhere.
///
/// Blobs live in a `HashMap` guarded by one mutex; each session key
/// additionally owns an entry mutex handed out by `with_lock`. Entry mutexes
/// no longer held by any caller are pruned on the next acquisition, so the
/// registry tracks only keys currently locked. Clones share all state via
/// `Arc`. Poisoned mutexes are recovered rather than propagated: a blob map
/// is valid after any partial mutation because every write replaces a whole
/// value.
#[derive(Clone, Default)]
pub struct MemoryStore {
    blobs: Arc<Mutex<HashMap<SessionKey, Vec<u8>>>>,
    locks: Arc<Mutex<HashMap<SessionKey, Arc<Mutex<()>>>>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions. Useful in tests.
    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True if no sessions are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch (or create) the entry mutex for `key`.
    ///
    /// Entries whose `Arc` is held only by the registry belong to no active
    /// `with_lock` call and are dropped here, keeping the registry from
    /// growing with every key ever touched.
    fn entry_lock(&self, key: &SessionKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl SessionStore for MemoryStore {
    fn load(&self, key: &SessionKey) -> Result<Option<Vec<u8>>, StoreError> {
        let blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(blobs.get(key).cloned())
    }

    fn save(&self, key: &SessionKey, blob: Vec<u8>) -> Result<(), StoreError> {
        let mut blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        blobs.insert(key.clone(), blob);
        Ok(())
    }

    fn delete(&self, key: &SessionKey) -> Result<(), StoreError> {
        let mut blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        blobs.remove(key);
        Ok(())
    }

    fn with_lock<T, E, F>(&self, key: &SessionKey, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<StoreError>,
    {
        let entry = self.entry_lock(key);
        let _guard = entry.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use sealbox_proto::SessionId;

    use super::*;
    use crate::ids::DeviceId;

    fn key(n: u8) -> SessionKey {
        SessionKey::Pairwise {
            device: DeviceId::from("peer"),
            session: SessionId::from_bytes([n; 16]),
        }
    }

    #[test]
    fn load_missing_returns_none() {
        let store = MemoryStore::new();
        assert_eq!(store.load(&key(1)).unwrap(), None);
    }

    #[test]
    fn save_then_load_roundtrips() {
        let store = MemoryStore::new();
        store.save(&key(1), vec![1, 2, 3]).unwrap();
        assert_eq!(store.load(&key(1)).unwrap(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn save_overwrites() {
        let store = MemoryStore::new();
        store.save(&key(1), vec![1]).unwrap();
        store.save(&key(1), vec![2]).unwrap();
        assert_eq!(store.load(&key(1)).unwrap(), Some(vec![2]));
    }

    #[test]
    fn delete_removes_and_is_idempotent() {
        let store = MemoryStore::new();
        store.save(&key(1), vec![1]).unwrap();
        store.delete(&key(1)).unwrap();
        assert_eq!(store.load(&key(1)).unwrap(), None);
        store.delete(&key(1)).unwrap();
    }

    #[test]
    fn clones_share_state() {
        let store = MemoryStore::new();
        let clone = store.clone();
        store.save(&key(1), vec![9]).unwrap();
        assert_eq!(clone.load(&key(1)).unwrap(), Some(vec![9]));
    }

    #[test]
    fn with_lock_serializes_same_key() {
        let store = MemoryStore::new();
        store.save(&key(1), vec![0]).unwrap();

        // Each thread does a read-modify-write of the same counter byte
        // under the key lock; with serialization, no increment is lost.
        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..30 {
                    store
                        .with_lock::<_, StoreError, _>(&key(1), || {
                            let current = store.load(&key(1))?.unwrap_or_default();
                            let value = current.first().copied().unwrap_or(0);
                            store.save(&key(1), vec![value + 1])?;
                            Ok(())
                        })
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.load(&key(1)).unwrap(), Some(vec![120]));
    }

    #[test]
    fn identity_blob_persists_under_identity_key() {
        use rand::{SeedableRng, rngs::StdRng};

        use crate::{config::EngineConfig, identity::IdentityStore};

        // Hosts that keep everything in one place store the identity blob
        // under its dedicated key, next to the session blobs.
        let identities = IdentityStore::new(EngineConfig::default());
        let mut rng = StdRng::seed_from_u64(11);
        identities.create_identity(&mut rng).unwrap();
        let bundle = identities.generate_prekeys(&mut rng, 3).unwrap();

        let store = MemoryStore::new();
        store.save(&SessionKey::Identity, identities.to_blob().unwrap()).unwrap();

        let blob = store.load(&SessionKey::Identity).unwrap().unwrap();
        let restored = IdentityStore::from_blob(EngineConfig::default(), &blob).unwrap();
        assert_eq!(restored.key_bundle().unwrap(), bundle);
    }

    #[test]
    fn lock_registry_is_pruned_after_release() {
        let store = MemoryStore::new();

        for n in 0..100 {
            store
                .with_lock::<_, StoreError, _>(&key(n), || store.save(&key(n), vec![n]))
                .unwrap();
        }

        // Each acquisition drops entries no caller still holds, so only the
        // most recent key can linger.
        assert!(store.lock_count() <= 1);
        assert_eq!(store.len(), 100);
    }

    #[test]
    fn distinct_keys_do_not_block_each_other() {
        let store = MemoryStore::new();

        // Hold the lock for key 1 on another thread, then verify key 2 is
        // still immediately usable.
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let holder = {
            let store = store.clone();
            thread::spawn(move || {
                store
                    .with_lock::<_, StoreError, _>(&key(1), || {
                        started_tx.send(()).ok();
                        release_rx.recv().ok();
                        Ok(())
                    })
                    .unwrap();
            })
        };

        started_rx.recv().unwrap();
        store
            .with_lock::<_, StoreError, _>(&key(2), || store.save(&key(2), vec![7]))
            .unwrap();
        assert_eq!(store.load(&key(2)).unwrap(), Some(vec![7]));

        release_tx.send(()).unwrap();
        holder.join().unwrap();
    }
}
