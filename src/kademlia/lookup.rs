//! Iterative lookup module
//!
//! The convergence algorithm shared by node lookup and value lookup: rounds
//! of up to ALPHA concurrent RPCs walk the candidate set toward the target
//! until no closer contact appears, then a drain phase collects responses
//! from the full K-wide result set.

use crate::error::KadfsError;
use crate::kademlia::contact::Contact;
use crate::kademlia::id::KademliaId;
use crate::store::value::StoredValue;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::{debug, trace};

/// Reply to a value probe: the value itself, or contacts closer to it
#[derive(Debug, Clone)]
pub enum FindValueReply {
    Value(StoredValue),
    Contacts(Vec<Contact>),
}

/// The RPC surface a lookup drives
///
/// One attempt per call, bounded by the transport timeout; implementations
/// fold each response's sender into the routing table as a side effect.
#[async_trait]
pub trait LookupTransport: Send + Sync {
    async fn find_node(
        &self,
        contact: &Contact,
        target: &KademliaId,
    ) -> Result<Vec<Contact>, KadfsError>;

    async fn find_value(
        &self,
        contact: &Contact,
        target: &KademliaId,
    ) -> Result<FindValueReply, KadfsError>;
}

/// Which RPC the lookup issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Node,
    Value,
}

/// Final state of a lookup
#[derive(Debug, Clone)]
pub enum LookupOutcome {
    /// The closest contacts found (node lookup, or a value lookup miss)
    Contacts(Vec<Contact>),
    /// The value itself (value lookup short-circuit)
    Value(StoredValue),
}

/// Candidate state shared by the driver and in-flight RPC tasks
struct LookupState {
    /// Distinct candidates sorted by ascending distance to the target
    candidates: Vec<Contact>,
    /// Every id ever merged, including evicted ones; never re-merged
    seen: HashSet<KademliaId>,
    /// Contacts an RPC has been issued to
    queried: HashSet<KademliaId>,
    /// Contacts that answered
    responded: HashSet<KademliaId>,
    /// Value carried by a FindValue response, if any
    found: Option<StoredValue>,
}

impl LookupState {
    fn new() -> Self {
        Self {
            candidates: Vec::new(),
            seen: HashSet::new(),
            queried: HashSet::new(),
            responded: HashSet::new(),
            found: None,
        }
    }

    /// Merge contacts not already seen and re-sort by distance to `target`
    fn merge(&mut self, contacts: Vec<Contact>, target: &KademliaId, me: &KademliaId) {
        let mut added = false;
        for mut contact in contacts {
            if contact.id == *me || !self.seen.insert(contact.id) {
                continue;
            }
            contact.calc_distance(target);
            self.candidates.push(contact);
            added = true;
        }
        if added {
            self.candidates.sort_by_key(|c| c.id.distance(target));
        }
    }

    /// Drop a contact that proved unreachable; it is never retried
    fn evict(&mut self, id: &KademliaId) {
        self.candidates.retain(|c| c.id != *id);
    }

    fn closest(&self) -> Option<KademliaId> {
        self.candidates.first().map(|c| c.id)
    }

    /// Up to `alpha` of the `k` closest candidates not yet queried,
    /// marking them queried
    fn next_batch(&mut self, k: usize, alpha: usize) -> Vec<Contact> {
        let batch: Vec<Contact> = self
            .candidates
            .iter()
            .take(k)
            .filter(|c| !self.queried.contains(&c.id))
            .take(alpha)
            .cloned()
            .collect();
        for c in &batch {
            self.queried.insert(c.id);
        }
        batch
    }

    /// Up to `alpha` of the `k` closest candidates that have not responded,
    /// marking them queried
    fn drain_batch(&mut self, k: usize, alpha: usize) -> Vec<Contact> {
        let batch: Vec<Contact> = self
            .candidates
            .iter()
            .take(k)
            .filter(|c| !self.responded.contains(&c.id) && !self.queried.contains(&c.id))
            .take(alpha)
            .cloned()
            .collect();
        for c in &batch {
            self.queried.insert(c.id);
        }
        batch
    }
}

/// One invocation of the iterative lookup algorithm
pub struct LookupEngine {
    kind: LookupKind,
    target: KademliaId,
    me: KademliaId,
    alpha: usize,
    k: usize,
    transport: Arc<dyn LookupTransport>,
    state: Arc<Mutex<LookupState>>,
    found_notify: Arc<Notify>,
}

impl LookupEngine {
    /// Set up a lookup for `target` on behalf of node `me`
    pub fn new(
        kind: LookupKind,
        target: KademliaId,
        me: KademliaId,
        alpha: usize,
        k: usize,
        transport: Arc<dyn LookupTransport>,
    ) -> Self {
        Self {
            kind,
            target,
            me,
            alpha,
            k,
            transport,
            state: Arc::new(Mutex::new(LookupState::new())),
            found_notify: Arc::new(Notify::new()),
        }
    }

    /// Run the lookup to completion, starting from `seeds`
    ///
    /// Seeds come from the caller's routing table. Returns the value for a
    /// successful value lookup, otherwise the up-to-K closest contacts that
    /// responded (empty when no path to the target exists).
    pub async fn run(&self, seeds: Vec<Contact>) -> LookupOutcome {
        trace!("Starting {:?} lookup for {}", self.kind, self.target);

        // Seed round: one RPC per seed, concurrently
        let seed_batch = {
            let mut state = self.state.lock().expect("lookup state lock poisoned");
            state.merge(seeds, &self.target, &self.me);
            state.next_batch(self.alpha, self.alpha)
        };
        self.issue_round(seed_batch).await;
        if let Some(value) = self.take_found() {
            return LookupOutcome::Value(value);
        }

        // Convergence rounds: stop when a full round brings nothing closer
        loop {
            let (closest_before, batch) = {
                let mut state = self.state.lock().expect("lookup state lock poisoned");
                (state.closest(), state.next_batch(self.k, self.alpha))
            };
            if closest_before.is_none() || batch.is_empty() {
                break;
            }
            self.issue_round(batch).await;
            if let Some(value) = self.take_found() {
                return LookupOutcome::Value(value);
            }

            let closest_after = {
                let state = self.state.lock().expect("lookup state lock poisoned");
                state.closest()
            };
            match closest_after {
                None => break,
                after if after == closest_before => break,
                _ => {}
            }
        }

        // Drain: let the slower members of the final K-set answer too
        loop {
            let batch = {
                let mut state = self.state.lock().expect("lookup state lock poisoned");
                state.drain_batch(self.k, self.alpha)
            };
            if batch.is_empty() {
                break;
            }
            self.issue_round(batch).await;
            if let Some(value) = self.take_found() {
                return LookupOutcome::Value(value);
            }
        }

        let state = self.state.lock().expect("lookup state lock poisoned");
        let closest: Vec<Contact> = state.candidates.iter().take(self.k).cloned().collect();
        debug!(
            "{:?} lookup for {} finished with {} contacts",
            self.kind,
            self.target,
            closest.len()
        );
        LookupOutcome::Contacts(closest)
    }

    /// Issue one RPC per contact and wait for all of them (the round
    /// barrier), or return early on a found value. In-flight RPCs are left
    /// to finish on their own; their results are merged and then discarded.
    async fn issue_round(&self, batch: Vec<Contact>) {
        let mut handles = Vec::with_capacity(batch.len());
        for contact in batch {
            let transport = self.transport.clone();
            let state = self.state.clone();
            let notify = self.found_notify.clone();
            let kind = self.kind;
            let target = self.target;
            let me = self.me;

            handles.push(tokio::spawn(async move {
                let result = match kind {
                    LookupKind::Node => transport.find_node(&contact, &target).await,
                    LookupKind::Value => match transport.find_value(&contact, &target).await {
                        Ok(FindValueReply::Value(value)) => {
                            let mut state = state.lock().expect("lookup state lock poisoned");
                            state.responded.insert(contact.id);
                            if state.found.is_none() {
                                state.found = Some(value);
                            }
                            drop(state);
                            notify.notify_one();
                            return;
                        }
                        Ok(FindValueReply::Contacts(contacts)) => Ok(contacts),
                        Err(e) => Err(e),
                    },
                };

                let mut state = state.lock().expect("lookup state lock poisoned");
                match result {
                    Ok(contacts) => {
                        state.responded.insert(contact.id);
                        state.merge(contacts, &target, &me);
                    }
                    Err(e) => {
                        debug!("Dropping unreachable contact {}: {}", contact, e);
                        state.evict(&contact.id);
                    }
                }
            }));
        }

        let barrier = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        tokio::select! {
            _ = self.found_notify.notified() => {}
            _ = barrier => {}
        }
    }

    fn take_found(&self) -> Option<StoredValue> {
        let state = self.state.lock().expect("lookup state lock poisoned");
        state.found.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kademlia::contact::sort_by_distance;
    use std::collections::HashMap;

    /// A fully-connected scripted network: every node knows every other node
    /// and answers with the k closest to the target.
    struct MockNet {
        k: usize,
        contacts: Vec<Contact>,
        values: HashMap<KademliaId, StoredValue>,
        holder: Option<KademliaId>,
        dead: HashSet<KademliaId>,
        queries: Mutex<Vec<KademliaId>>,
    }

    impl MockNet {
        fn new(k: usize, n: usize) -> Self {
            let contacts = (0..n)
                .map(|i| {
                    Contact::new(
                        KademliaId::random(),
                        format!("127.0.0.1:{}", 8000 + i).parse().unwrap(),
                    )
                })
                .collect();
            Self {
                k,
                contacts,
                values: HashMap::new(),
                holder: None,
                dead: HashSet::new(),
                queries: Mutex::new(Vec::new()),
            }
        }

        fn closest_to(&self, target: &KademliaId) -> Vec<Contact> {
            let mut all = self.contacts.clone();
            sort_by_distance(&mut all, target);
            all.truncate(self.k);
            all
        }

        fn seeds(&self, target: &KademliaId, alpha: usize) -> Vec<Contact> {
            let mut all = self.contacts.clone();
            sort_by_distance(&mut all, target);
            all.truncate(alpha);
            all
        }
    }

    #[async_trait]
    impl LookupTransport for MockNet {
        async fn find_node(
            &self,
            contact: &Contact,
            target: &KademliaId,
        ) -> Result<Vec<Contact>, KadfsError> {
            self.queries.lock().unwrap().push(contact.id);
            if self.dead.contains(&contact.id) {
                return Err(KadfsError::rpc_error_with_peer(
                    "RPC timed out",
                    contact.address.to_string(),
                ));
            }
            Ok(self.closest_to(target))
        }

        async fn find_value(
            &self,
            contact: &Contact,
            target: &KademliaId,
        ) -> Result<FindValueReply, KadfsError> {
            self.queries.lock().unwrap().push(contact.id);
            if self.dead.contains(&contact.id) {
                return Err(KadfsError::rpc_error_with_peer(
                    "RPC timed out",
                    contact.address.to_string(),
                ));
            }
            if Some(contact.id) == self.holder {
                if let Some(value) = self.values.get(target) {
                    return Ok(FindValueReply::Value(value.clone()));
                }
            }
            Ok(FindValueReply::Contacts(self.closest_to(target)))
        }
    }

    fn engine(kind: LookupKind, target: KademliaId, net: Arc<MockNet>) -> LookupEngine {
        LookupEngine::new(kind, target, KademliaId::random(), 3, net.k, net)
    }

    #[tokio::test]
    async fn test_node_lookup_finds_true_k_closest() {
        let net = Arc::new(MockNet::new(8, 40));
        let target = KademliaId::random();
        let seeds = net.seeds(&target, 3);

        let lookup = engine(LookupKind::Node, target, net.clone());
        let outcome = lookup.run(seeds).await;

        let expected: Vec<KademliaId> = net.closest_to(&target).iter().map(|c| c.id).collect();
        match outcome {
            LookupOutcome::Contacts(contacts) => {
                let got: Vec<KademliaId> = contacts.iter().map(|c| c.id).collect();
                assert_eq!(got, expected);
            }
            other => panic!("expected contacts, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_contact_is_queried_twice() {
        let net = Arc::new(MockNet::new(8, 40));
        let target = KademliaId::random();
        let seeds = net.seeds(&target, 3);

        let lookup = engine(LookupKind::Node, target, net.clone());
        lookup.run(seeds).await;

        let queries = net.queries.lock().unwrap();
        let unique: HashSet<KademliaId> = queries.iter().copied().collect();
        assert_eq!(unique.len(), queries.len());
    }

    #[tokio::test]
    async fn test_unreachable_contacts_are_evicted_not_retried() {
        let mut net = MockNet::new(8, 20);
        let target = KademliaId::random();
        let seeds = net.seeds(&target, 3);
        // Kill the two closest nodes
        let closest = net.closest_to(&target);
        net.dead.insert(closest[0].id);
        net.dead.insert(closest[1].id);
        let net = Arc::new(net);

        let lookup = engine(LookupKind::Node, target, net.clone());
        let outcome = lookup.run(seeds).await;

        match outcome {
            LookupOutcome::Contacts(contacts) => {
                assert!(contacts.iter().all(|c| !net.dead.contains(&c.id)));
                assert!(!contacts.is_empty());
            }
            other => panic!("expected contacts, got {:?}", other),
        }
        let queries = net.queries.lock().unwrap();
        for dead in &net.dead {
            assert!(queries.iter().filter(|q| *q == dead).count() <= 1);
        }
    }

    #[tokio::test]
    async fn test_value_lookup_short_circuits() {
        let mut net = MockNet::new(8, 30);
        let value = StoredValue::new(false, &b"the payload"[..]);
        let target = value.key();
        net.values.insert(target, value.clone());
        // The closest node to the target holds the value
        net.holder = Some(net.closest_to(&target)[0].id);
        let net = Arc::new(net);
        let seeds = net.seeds(&target, 3);

        let lookup = engine(LookupKind::Value, target, net.clone());
        match lookup.run(seeds).await {
            LookupOutcome::Value(found) => assert_eq!(found, value),
            other => panic!("expected value, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_value_lookup_miss_reports_contacts() {
        let net = Arc::new(MockNet::new(8, 30));
        let target = KademliaId::hash(b"nobody has this");
        let seeds = net.seeds(&target, 3);

        let lookup = engine(LookupKind::Value, target, net.clone());
        match lookup.run(seeds).await {
            LookupOutcome::Contacts(contacts) => assert!(!contacts.is_empty()),
            other => panic!("expected contacts, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_seed_set_fails_cleanly() {
        let net = Arc::new(MockNet::new(8, 10));
        let lookup = engine(LookupKind::Node, KademliaId::random(), net);
        match lookup.run(Vec::new()).await {
            LookupOutcome::Contacts(contacts) => assert!(contacts.is_empty()),
            other => panic!("expected empty contacts, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_all_seeds_dead_yields_empty_result() {
        let mut net = MockNet::new(4, 4);
        for c in &net.contacts {
            net.dead.insert(c.id);
        }
        let target = KademliaId::random();
        let seeds = net.seeds(&target, 3);
        let net = Arc::new(net);

        let lookup = engine(LookupKind::Node, target, net);
        match lookup.run(seeds).await {
            LookupOutcome::Contacts(contacts) => assert!(contacts.is_empty()),
            other => panic!("expected empty contacts, got {:?}", other),
        }
    }
}
