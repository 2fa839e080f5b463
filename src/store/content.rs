//! Content store module
//!
//! Key-value store over content hashes with last-writer-wins conflict
//! resolution. All operations are short critical sections over one lock and
//! never touch the network.

use crate::kademlia::id::KademliaId;
use crate::store::backend::{MemoryBackend, StorageBackend};
use crate::store::value::StoredValue;
use std::sync::Mutex;
use tracing::debug;

/// The node's local value store
pub struct ContentStore {
    backend: Mutex<Box<dyn StorageBackend>>,
}

impl ContentStore {
    /// Create a content store over the in-memory backend
    pub fn new() -> Self {
        Self::with_backend(Box::new(MemoryBackend::new()))
    }

    /// Create a content store over a custom backend
    pub fn with_backend(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            backend: Mutex::new(backend),
        }
    }

    /// Store a value under its content hash
    ///
    /// Returns true if the value was inserted. A value for an existing key is
    /// inserted only when its timestamp is strictly newer than the stored
    /// one; otherwise the store is left unchanged.
    pub fn store(&self, value: StoredValue) -> bool {
        let key = value.key();
        let mut backend = self.backend.lock().expect("content store lock poisoned");
        match backend.get(&key) {
            Some(current) => {
                if value.is_newer_than(&current) {
                    backend.set(key, value);
                    true
                } else {
                    debug!("Rejected stale value for {}", key);
                    false
                }
            }
            None => {
                backend.set(key, value);
                true
            }
        }
    }

    /// Remove a value (addressed by its data) if present
    pub fn remove(&self, value: &StoredValue) {
        let key = value.key();
        let mut backend = self.backend.lock().expect("content store lock poisoned");
        backend.unset(&key);
    }

    /// Look up a value by content key
    pub fn get(&self, key: &KademliaId) -> Option<StoredValue> {
        let backend = self.backend.lock().expect("content store lock poisoned");
        backend.get(key)
    }
}

impl Default for ContentStore {
    fn default() -> Self {
        Self::new()
    }
}
