//! Stored value module
//!
//! The unit of content held by the store and pushed between nodes.

use crate::kademlia::id::KademliaId;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A content-addressed value with its conflict-resolution timestamp
///
/// Two values with the same data have the same key; the one with the later
/// timestamp wins. `pinned` exempts the value from expiry and travels with
/// the value itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredValue {
    /// Value payload
    pub data: Bytes,
    /// Milliseconds since the Unix epoch at the last store/update
    pub timestamp: u64,
    /// Whether this value is exempt from expiry
    pub pinned: bool,
}

impl StoredValue {
    /// Create a new value stamped with the current time
    pub fn new(pinned: bool, data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            timestamp: now_millis(),
            pinned,
        }
    }

    /// The content address of this value
    pub fn key(&self) -> KademliaId {
        KademliaId::hash(&self.data)
    }

    /// Whether this value wins over `other` (strictly newer timestamp)
    pub fn is_newer_than(&self, other: &StoredValue) -> bool {
        self.timestamp > other.timestamp
    }

    /// Bump the timestamp to the current time
    ///
    /// Always strictly later than the previous timestamp, so a touched value
    /// beats its predecessor even within the same millisecond.
    pub fn touch(&mut self) {
        self.timestamp = now_millis().max(self.timestamp + 1);
    }
}

/// Current time in milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
