//! Routing table module
//!
//! 160 k-buckets indexed by the shared-prefix length between a contact and
//! this node's own id. Adding a contact to a full bucket liveness-probes the
//! least-recently-seen entry before anything is evicted.

use crate::error::KadfsError;
use crate::events::{EventKind, EventScheduler};
use crate::kademlia::bucket::{AddOutcome, Bucket};
use crate::kademlia::contact::{sort_by_distance, Contact};
use crate::kademlia::id::{KademliaId, ID_BITS};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Liveness probe used before evicting a bucket entry
///
/// One attempt, bounded by the transport timeout; an error means the contact
/// is treated as unresponsive.
#[async_trait]
pub trait Pinger: Send + Sync {
    async fn ping(&self, contact: &Contact) -> Result<(), KadfsError>;
}

/// The node's routing table
///
/// Every known contact lives in exactly one bucket, determined by the
/// position of the highest set bit of its XOR distance to this node. The
/// bucket array is guarded by one lock, never held across a probe await.
pub struct RoutingTable {
    me: Contact,
    k: usize,
    buckets: Mutex<Vec<Bucket>>,
    pinger: Arc<dyn Pinger>,
    events: Arc<EventScheduler>,
    refresh_interval: Duration,
}

impl RoutingTable {
    /// Create a routing table for the node `me`
    pub fn new(
        me: Contact,
        k: usize,
        pinger: Arc<dyn Pinger>,
        events: Arc<EventScheduler>,
        refresh_interval: Duration,
    ) -> Self {
        let buckets = (0..ID_BITS).map(|_| Bucket::new(k)).collect();
        Self {
            me,
            k,
            buckets: Mutex::new(buckets),
            pinger,
            events,
            refresh_interval,
        }
    }

    /// This node's own contact
    pub fn me(&self) -> &Contact {
        &self.me
    }

    /// The bucket index for an id: the shared-prefix length with this node
    ///
    /// Equivalently, the position of the highest set bit of the XOR distance.
    /// This node's own id maps to the last bucket.
    pub fn bucket_index(&self, id: &KademliaId) -> usize {
        let distance = self.me.id.distance(id);
        distance.leading_zeros().min(ID_BITS - 1)
    }

    /// Add (or refresh) a contact
    ///
    /// Routes the contact to its bucket; a full bucket triggers a liveness
    /// probe of its least-recently-seen entry, and only a failed probe evicts
    /// it. The bucket's refresh timer is reset either way, since the bucket
    /// has just seen traffic.
    pub async fn add_contact(&self, contact: Contact) {
        if contact.id == self.me.id {
            return;
        }
        let index = self.bucket_index(&contact.id);

        let outcome = {
            let mut buckets = self.buckets.lock().await;
            buckets[index].add(contact.clone())
        };

        if let AddOutcome::Full { least_recent } = outcome {
            let alive = self.pinger.ping(&least_recent).await.is_ok();
            if !alive {
                debug!("Evicting unresponsive contact {}", least_recent);
            }
            let mut buckets = self.buckets.lock().await;
            buckets[index].apply_probe(&least_recent.id, alive, contact);
        }

        self.events
            .reset_event(self.me.id, EventKind::BucketRefresh(index), self.refresh_interval);
    }

    /// The up-to-`count` known contacts closest to `target`
    ///
    /// Starts at the target's bucket and expands symmetrically outward until
    /// enough candidates are collected or the array is exhausted, then sorts
    /// by distance and truncates. Returned contacts carry their distance to
    /// `target`.
    pub async fn find_closest_contacts(&self, target: &KademliaId, count: usize) -> Vec<Contact> {
        let buckets = self.buckets.lock().await;
        let index = self.bucket_index(target);

        let mut candidates = buckets[index].contacts_with_distance(target);
        let mut i = 1;
        while (i <= index || index + i < ID_BITS) && candidates.len() < count {
            if i <= index {
                candidates.extend(buckets[index - i].contacts_with_distance(target));
            }
            if index + i < ID_BITS {
                candidates.extend(buckets[index + i].contacts_with_distance(target));
            }
            i += 1;
        }
        drop(buckets);

        sort_by_distance(&mut candidates, target);
        candidates.truncate(count);
        candidates
    }

    /// The up-to-K known contacts closest to `target`
    pub async fn find_k_closest_contacts(&self, target: &KademliaId) -> Vec<Contact> {
        self.find_closest_contacts(target, self.k).await
    }

    /// Total number of contacts across all buckets
    pub async fn contact_count(&self) -> usize {
        let buckets = self.buckets.lock().await;
        buckets.iter().map(|b| b.len()).sum()
    }

    /// Whether any bucket holds this id
    pub async fn contains(&self, id: &KademliaId) -> bool {
        let buckets = self.buckets.lock().await;
        buckets[self.bucket_index(id)].contains(id)
    }
}
