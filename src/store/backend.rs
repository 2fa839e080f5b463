//! Storage backend abstraction for the content store
//!
//! This module provides a trait-based abstraction over where values are
//! held, so the content store's conflict-resolution logic is independent of
//! the map implementation behind it.

use crate::kademlia::id::KademliaId;
use crate::store::value::StoredValue;
use std::collections::HashMap;

/// Narrow get/set/unset capability behind the content store
///
/// Implementations hold data only; locking and conflict resolution are the
/// owning [`ContentStore`](crate::store::ContentStore)'s responsibility, so
/// the trait is deliberately synchronous.
pub trait StorageBackend: Send {
    /// Look up a value by its content key
    fn get(&self, key: &KademliaId) -> Option<StoredValue>;

    /// Insert or replace the value for a key
    fn set(&mut self, key: KademliaId, value: StoredValue);

    /// Remove the value for a key, if present
    fn unset(&mut self, key: &KademliaId);
}

/// In-memory backend over a hash map
#[derive(Debug, Default)]
pub struct MemoryBackend {
    values: HashMap<KademliaId, StoredValue>,
}

impl MemoryBackend {
    /// Create an empty in-memory backend
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &KademliaId) -> Option<StoredValue> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: KademliaId, value: StoredValue) {
        self.values.insert(key, value);
    }

    fn unset(&mut self, key: &KademliaId) {
        self.values.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_backend_round_trip() {
        let mut backend = MemoryBackend::new();
        let value = StoredValue::new(false, &b"payload"[..]);
        let key = value.key();

        assert!(backend.get(&key).is_none());
        backend.set(key, value.clone());
        assert_eq!(backend.get(&key), Some(value));
        backend.unset(&key);
        assert!(backend.get(&key).is_none());
    }

    #[test]
    fn test_unset_missing_key_is_noop() {
        let mut backend = MemoryBackend::new();
        backend.unset(&KademliaId::hash(b"missing"));
    }
}
