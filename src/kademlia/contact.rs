//! Contact module
//!
//! A contact is a peer known to the routing layer: its identifier plus the
//! address its transport can be reached at.

use crate::kademlia::id::KademliaId;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// A peer in the DHT network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    /// Peer identifier
    pub id: KademliaId,
    /// Peer address
    pub address: SocketAddr,
    /// Distance to the target of the current lookup; transient, never sent
    #[serde(skip)]
    distance: Option<KademliaId>,
}

impl Contact {
    /// Create a new contact
    pub fn new(id: KademliaId, address: SocketAddr) -> Self {
        Self {
            id,
            address,
            distance: None,
        }
    }

    /// Compute and remember the distance to `target`
    pub fn calc_distance(&mut self, target: &KademliaId) {
        self.distance = Some(self.id.distance(target));
    }

    /// The distance computed by the last `calc_distance` call
    pub fn distance(&self) -> Option<KademliaId> {
        self.distance
    }

    /// Compare by the stored distance; contacts without one sort last
    pub fn less(&self, other: &Contact) -> bool {
        match (self.distance, other.distance) {
            (Some(a), Some(b)) => a < b,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

impl PartialEq for Contact {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Contact {}

impl std::hash::Hash for Contact {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for Contact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "contact({}, {})", self.id, self.address)
    }
}

/// Sort contacts in place by ascending distance to `target`
pub fn sort_by_distance(contacts: &mut [Contact], target: &KademliaId) {
    for c in contacts.iter_mut() {
        c.calc_distance(target);
    }
    contacts.sort_by(|a, b| {
        if a.less(b) {
            std::cmp::Ordering::Less
        } else if b.less(a) {
            std::cmp::Ordering::Greater
        } else {
            std::cmp::Ordering::Equal
        }
    });
}
