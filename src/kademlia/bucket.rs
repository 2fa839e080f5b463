//! K-bucket module
//!
//! A bucket holds the contacts for one shared-prefix-length region of the
//! identifier space, ordered most-recently-seen first.

use crate::kademlia::contact::Contact;
use crate::kademlia::id::KademliaId;

/// Result of attempting to add a contact to a bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// The contact was inserted at the front
    Inserted,
    /// The contact was already present and moved to the front
    Refreshed,
    /// The bucket is full; the least-recently-seen contact must be probed
    /// before the newcomer can displace it
    Full { least_recent: Contact },
}

/// A fixed-capacity, recency-ordered list of distinct contacts
///
/// Index 0 is the most recently seen contact, the last index the least
/// recently seen. Invariants: no duplicate ids, `len() <= capacity`.
#[derive(Debug, Clone)]
pub struct Bucket {
    contacts: Vec<Contact>,
    capacity: usize,
}

impl Bucket {
    /// Create a new bucket with the given capacity (K)
    pub fn new(capacity: usize) -> Self {
        Self {
            contacts: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a contact, or report what must happen before it can be added
    ///
    /// A contact that is already present is moved to the front. A new contact
    /// is inserted at the front if there is room. If the bucket is full the
    /// caller must liveness-probe the returned least-recently-seen contact
    /// and commit the result with [`Bucket::apply_probe`]; the bucket is left
    /// unchanged until then.
    pub fn add(&mut self, contact: Contact) -> AddOutcome {
        if let Some(pos) = self.contacts.iter().position(|c| c.id == contact.id) {
            let existing = self.contacts.remove(pos);
            self.contacts.insert(0, existing);
            return AddOutcome::Refreshed;
        }

        if self.contacts.len() < self.capacity {
            self.contacts.insert(0, contact);
            return AddOutcome::Inserted;
        }

        AddOutcome::Full {
            least_recent: self.contacts[self.contacts.len() - 1].clone(),
        }
    }

    /// Commit the result of a liveness probe started from [`Bucket::add`]
    ///
    /// If the probed contact answered, it is moved to the front and the
    /// newcomer is discarded: a known-live contact is never displaced by one
    /// we have no history with. If it did not answer, it is evicted and the
    /// newcomer takes its place at the front.
    ///
    /// The bucket may have changed while the probe was in flight, so the
    /// current state is re-checked before committing.
    pub fn apply_probe(&mut self, probed: &KademliaId, alive: bool, newcomer: Contact) {
        if let Some(pos) = self.contacts.iter().position(|c| c.id == newcomer.id) {
            // Someone added the newcomer concurrently; just refresh it
            let existing = self.contacts.remove(pos);
            self.contacts.insert(0, existing);
            return;
        }

        let probed_pos = self.contacts.iter().position(|c| c.id == *probed);
        if alive {
            if let Some(pos) = probed_pos {
                let existing = self.contacts.remove(pos);
                self.contacts.insert(0, existing);
            }
            return;
        }

        if let Some(pos) = probed_pos {
            self.contacts.remove(pos);
        }
        if self.contacts.len() < self.capacity {
            self.contacts.insert(0, newcomer);
        }
    }

    /// All held contacts annotated with their distance to `target`
    pub fn contacts_with_distance(&self, target: &KademliaId) -> Vec<Contact> {
        self.contacts
            .iter()
            .map(|c| {
                let mut c = c.clone();
                c.calc_distance(target);
                c
            })
            .collect()
    }

    /// Whether the bucket holds a contact with this id
    pub fn contains(&self, id: &KademliaId) -> bool {
        self.contacts.iter().any(|c| c.id == *id)
    }

    /// Number of contacts in the bucket
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    /// Whether the bucket is empty
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }
}
