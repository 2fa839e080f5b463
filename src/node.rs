//! Node module
//!
//! Ties the routing table, content store, event scheduler and UDP transport
//! together into one running DHT node, and exposes the content operations:
//! store, cat, pin, unpin and join.

use crate::cli::config::Config;
use crate::error::KadfsError;
use crate::events::{callback, EventCallback, EventKind, EventScheduler};
use crate::kademlia::contact::Contact;
use crate::kademlia::id::{KademliaId, ID_BITS};
use crate::kademlia::lookup::{FindValueReply, LookupEngine, LookupKind, LookupOutcome, LookupTransport};
use crate::kademlia::routing::RoutingTable;
use crate::rpc::client::RpcClient;
use crate::rpc::message::RpcMessage;
use crate::rpc::server;
use crate::store::content::ContentStore;
use crate::store::value::StoredValue;
use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, info, trace};

/// Lookup transport backed by the RPC client
///
/// Every response's declared sender is folded into the routing table, so
/// lookups double as table maintenance.
struct RoutingLookupTransport {
    client: Arc<RpcClient>,
    routing: Arc<RoutingTable>,
}

#[async_trait]
impl LookupTransport for RoutingLookupTransport {
    async fn find_node(
        &self,
        contact: &Contact,
        target: &KademliaId,
    ) -> Result<Vec<Contact>, KadfsError> {
        let (sender, contacts) = self.client.find_node(contact, target).await?;
        self.routing.add_contact(sender).await;
        Ok(contacts)
    }

    async fn find_value(
        &self,
        contact: &Contact,
        target: &KademliaId,
    ) -> Result<FindValueReply, KadfsError> {
        let (sender, value, contacts) = self.client.find_value(contact, target).await?;
        self.routing.add_contact(sender).await;
        match value {
            Some(value) => Ok(FindValueReply::Value(value)),
            None => Ok(FindValueReply::Contacts(contacts)),
        }
    }
}

/// One running DHT node
///
/// Cheap to clone; clones share all state. RPC handlers and event callbacks
/// each run on their own task against a clone.
#[derive(Clone)]
pub struct Node {
    me: Contact,
    config: Arc<Config>,
    socket: Arc<UdpSocket>,
    routing: Arc<RoutingTable>,
    content: Arc<ContentStore>,
    events: Arc<EventScheduler>,
    client: Arc<RpcClient>,
    transport: Arc<dyn LookupTransport>,
}

impl Node {
    /// Bind a node to `bind_addr`
    ///
    /// The bound address (with the resolved port, when binding to port 0)
    /// becomes the contact address this node declares to its peers.
    pub async fn new(id: KademliaId, bind_addr: SocketAddr, config: Config) -> Result<Self, KadfsError> {
        let socket = UdpSocket::bind(bind_addr).await.map_err(|e| {
            KadfsError::network_error_full("Failed to bind node socket", bind_addr.to_string(), e.to_string())
        })?;
        let address = socket.local_addr().map_err(|e| {
            KadfsError::network_error_full("Failed to read bound address", bind_addr.to_string(), e.to_string())
        })?;

        let me = Contact::new(id, address);
        let events = Arc::new(EventScheduler::new());
        let client = Arc::new(RpcClient::new(me.clone(), config.rpc_timeout));
        let routing = Arc::new(RoutingTable::new(
            me.clone(),
            config.k,
            client.clone(),
            events.clone(),
            config.bucket_refresh_interval,
        ));
        let transport = Arc::new(RoutingLookupTransport {
            client: client.clone(),
            routing: routing.clone(),
        });

        Ok(Self {
            me,
            config: Arc::new(config),
            socket: Arc::new(socket),
            routing,
            content: Arc::new(ContentStore::new()),
            events,
            client,
            transport,
        })
    }

    /// Start serving inbound RPCs and arm the bucket refresh timers
    pub fn start(&self) {
        tokio::spawn(server::serve(self.socket.clone(), self.clone()));
        for index in 0..ID_BITS {
            self.events.insert_event(
                self.me.id,
                EventKind::BucketRefresh(index),
                self.config.bucket_refresh_interval,
                self.refresh_callback(index),
            );
        }
        info!("Node {} listening on {}", self.me.id, self.me.address);
    }

    /// This node's id
    pub fn id(&self) -> KademliaId {
        self.me.id
    }

    /// The address this node declares to its peers
    pub fn address(&self) -> SocketAddr {
        self.me.address
    }

    /// This node's own contact
    pub fn me(&self) -> &Contact {
        &self.me
    }

    /// Number of contacts currently in the routing table
    pub async fn known_contacts(&self) -> usize {
        self.routing.contact_count().await
    }

    /// Join the network through a node listening at `bootstrap`
    ///
    /// Pings the bootstrap node to learn its id, looks up this node's own id
    /// to populate the table from the wider network, then eagerly refreshes
    /// every bucket at or beyond the nearest neighbor's index instead of
    /// waiting for the refresh timers.
    pub async fn join(&self, bootstrap: SocketAddr) -> Result<(), KadfsError> {
        info!("Joining network via {}", bootstrap);
        let sender = self.client.ping_address(bootstrap).await?;
        self.routing.add_contact(sender).await;

        let own_id = self.me.id;
        let found = self.lookup_nodes(&own_id).await;
        for contact in found {
            self.routing.add_contact(contact).await;
        }

        let neighbors = self.routing.find_closest_contacts(&own_id, 1).await;
        if let Some(nearest) = neighbors.first() {
            let nearest_index = self.routing.bucket_index(&nearest.id);
            let mut refreshes = Vec::with_capacity(ID_BITS - nearest_index);
            for index in nearest_index..ID_BITS {
                let node = self.clone();
                refreshes.push(tokio::spawn(async move { node.refresh_bucket(index).await }));
            }
            for refresh in refreshes {
                let _ = refresh.await;
            }
        }

        debug!("Join complete, {} contacts known", self.known_contacts().await);
        Ok(())
    }

    /// Store `data` on the network; returns its content key
    ///
    /// The value is kept locally, pushed to the K closest nodes and
    /// re-published periodically for as long as this node holds it.
    pub async fn store(&self, data: impl Into<Bytes>) -> KademliaId {
        let value = StoredValue::new(false, data);
        let key = value.key();
        info!("Storing {} ({} bytes)", key, value.data.len());

        self.content.store(value.clone());
        let closest = self.lookup_nodes(&key).await;
        self.push_value(&closest, &value).await;

        self.events.insert_event(
            key,
            EventKind::Publish,
            self.config.publish_interval,
            self.publish_callback(key),
        );
        key
    }

    /// Fetch the value stored under `key`, locally or from the network
    pub async fn cat(&self, key: &KademliaId) -> Result<Bytes, KadfsError> {
        if let Some(value) = self.content.get(key) {
            return Ok(value.data);
        }
        match self.lookup_value(key).await {
            Some(value) => Ok(value.data),
            None => Err(KadfsError::not_found(key.to_hex())),
        }
    }

    /// Exempt the value under `key` from expiry, network-wide
    pub async fn pin(&self, key: &KademliaId) -> Result<(), KadfsError> {
        self.set_pinned(key, true).await
    }

    /// Re-subject the value under `key` to expiry, network-wide
    pub async fn unpin(&self, key: &KademliaId) -> Result<(), KadfsError> {
        self.set_pinned(key, false).await
    }

    /// Look up a fresh random id inside bucket `index` and fold the results in
    pub async fn refresh_bucket(&self, index: usize) {
        let target = KademliaId::random_with_common_prefix(&self.me.id, index);
        let contacts = self.lookup_nodes(&target).await;
        for contact in contacts {
            self.routing.add_contact(contact).await;
        }
        trace!("Refreshed bucket {}", index);
    }

    /// Handle one inbound RPC; the reply, if any, goes back to `from`
    pub(crate) async fn handle_rpc(&self, message: RpcMessage, from: SocketAddr) -> Option<RpcMessage> {
        let kind = message.kind();
        let sender = message.sender().clone();

        let reply = match message {
            RpcMessage::Ping { .. } => Some(RpcMessage::Pong {
                sender: self.me.clone(),
            }),
            RpcMessage::FindNode { target, .. } => Some(RpcMessage::FindNodeReply {
                sender: self.me.clone(),
                contacts: self.routing.find_k_closest_contacts(&target).await,
            }),
            RpcMessage::FindValue { target, .. } => {
                let (value, contacts) = match self.content.get(&target) {
                    Some(value) => (Some(value), Vec::new()),
                    None => (None, self.routing.find_k_closest_contacts(&target).await),
                };
                Some(RpcMessage::FindValueReply {
                    sender: self.me.clone(),
                    value,
                    contacts,
                })
            }
            RpcMessage::Store { value, .. } => {
                self.apply_store(value);
                None
            }
            RpcMessage::Pong { .. }
            | RpcMessage::FindNodeReply { .. }
            | RpcMessage::FindValueReply { .. } => {
                debug!("Ignoring unsolicited {} from {}", kind, from);
                None
            }
        };

        // Folding the sender in may probe a full bucket, so it runs off this
        // task and never delays the reply.
        let routing = self.routing.clone();
        tokio::spawn(async move { routing.add_contact(sender).await });

        reply
    }

    /// Iterative node lookup seeded from the routing table
    pub async fn lookup_nodes(&self, target: &KademliaId) -> Vec<Contact> {
        let seeds = self.routing.find_closest_contacts(target, self.config.alpha).await;
        let engine = LookupEngine::new(
            LookupKind::Node,
            *target,
            self.me.id,
            self.config.alpha,
            self.config.k,
            self.transport.clone(),
        );
        match engine.run(seeds).await {
            LookupOutcome::Contacts(contacts) => contacts,
            LookupOutcome::Value(_) => Vec::new(),
        }
    }

    /// Iterative value lookup seeded from the routing table
    async fn lookup_value(&self, target: &KademliaId) -> Option<StoredValue> {
        let seeds = self.routing.find_closest_contacts(target, self.config.alpha).await;
        let engine = LookupEngine::new(
            LookupKind::Value,
            *target,
            self.me.id,
            self.config.alpha,
            self.config.k,
            self.transport.clone(),
        );
        match engine.run(seeds).await {
            LookupOutcome::Value(value) => Some(value),
            LookupOutcome::Contacts(_) => None,
        }
    }

    async fn set_pinned(&self, key: &KademliaId, pinned: bool) -> Result<(), KadfsError> {
        let mut value = match self.content.get(key) {
            Some(value) => value,
            None => self
                .lookup_value(key)
                .await
                .ok_or_else(|| KadfsError::not_found(key.to_hex()))?,
        };
        value.pinned = pinned;
        value.touch();

        // A node already holding the value updates its copy; a holder's
        // expiry timer follows the pin flag. Nodes that only relayed the pin
        // do not become holders.
        if self.content.get(key).is_some() {
            self.content.store(value.clone());
            if self.events.contains(*key, EventKind::Republish) {
                if pinned {
                    self.events.delete_event(*key, EventKind::Expire);
                } else {
                    self.events.insert_event(
                        *key,
                        EventKind::Expire,
                        self.config.expire_interval,
                        self.expire_callback(*key),
                    );
                }
            }
        }

        let closest = self.lookup_nodes(key).await;
        self.push_value(&closest, &value).await;
        debug!("Set pinned={} on {} across {} contacts", pinned, key, closest.len());
        Ok(())
    }

    /// Accept a value pushed by a peer
    ///
    /// A value is taken only when strictly newer than the held copy. Taking
    /// an unpinned value arms (or re-arms) its expiry; taking a pinned one
    /// cancels it. A stale push still proves the network is replicating the
    /// key, so the republish timer is pushed back either way.
    fn apply_store(&self, value: StoredValue) {
        let key = value.key();
        let pinned = value.pinned;
        if self.content.store(value) {
            debug!("Holding value {}", key);
            self.events.insert_event(
                key,
                EventKind::Republish,
                self.config.republish_interval,
                self.republish_callback(key),
            );
            if pinned {
                self.events.delete_event(key, EventKind::Expire);
            } else {
                self.events.insert_event(
                    key,
                    EventKind::Expire,
                    self.config.expire_interval,
                    self.expire_callback(key),
                );
            }
        } else {
            self.events
                .reset_event(key, EventKind::Republish, self.config.republish_interval);
        }
    }

    /// Push `value` to every contact concurrently, best effort
    async fn push_value(&self, contacts: &[Contact], value: &StoredValue) {
        let mut pushes = Vec::with_capacity(contacts.len());
        for contact in contacts {
            let client = self.client.clone();
            let contact = contact.clone();
            let value = value.clone();
            pushes.push(tokio::spawn(async move {
                if let Err(e) = client.store(&contact, &value).await {
                    debug!("Failed to push value to {}: {}", contact, e);
                }
            }));
        }
        for push in pushes {
            let _ = push.await;
        }
    }

    /// Periodic re-publish of a value this node originated
    ///
    /// The owner's local copy can be displaced (a peer's push winning
    /// last-writer-wins, then expiring), so a local miss falls back to a
    /// value lookup. Only a value gone everywhere ends the publish cycle.
    async fn publish(&self, key: KademliaId) {
        let held = match self.content.get(&key) {
            Some(value) => Some(value),
            None => self.lookup_value(&key).await,
        };
        let Some(mut value) = held else {
            self.events.delete_event(key, EventKind::Publish);
            return;
        };
        value.touch();
        self.content.store(value.clone());

        let closest = self.lookup_nodes(&key).await;
        self.push_value(&closest, &value).await;
        debug!("Published {} to {} contacts", key, closest.len());
    }

    /// Periodic re-push of a value this node merely holds
    async fn republish(&self, key: KademliaId) {
        let Some(value) = self.content.get(&key) else {
            self.events.delete_event(key, EventKind::Republish);
            return;
        };
        let closest = self.lookup_nodes(&key).await;
        self.push_value(&closest, &value).await;
        debug!("Republished {} to {} contacts", key, closest.len());
    }

    /// Drop a held value whose lease lapsed, unless it was pinned meanwhile
    fn expire(&self, key: KademliaId) {
        self.events.delete_event(key, EventKind::Expire);
        if let Some(value) = self.content.get(&key) {
            if value.pinned {
                return;
            }
            debug!("Expiring {}", key);
            self.content.remove(&value);
        }
        self.events.delete_event(key, EventKind::Republish);
    }

    fn refresh_callback(&self, index: usize) -> EventCallback {
        let node = self.clone();
        callback(move || {
            let node = node.clone();
            async move { node.refresh_bucket(index).await }
        })
    }

    fn publish_callback(&self, key: KademliaId) -> EventCallback {
        let node = self.clone();
        callback(move || {
            let node = node.clone();
            async move { node.publish(key).await }
        })
    }

    fn republish_callback(&self, key: KademliaId) -> EventCallback {
        let node = self.clone();
        callback(move || {
            let node = node.clone();
            async move { node.republish(key).await }
        })
    }

    fn expire_callback(&self, key: KademliaId) -> EventCallback {
        let node = self.clone();
        callback(move || {
            let node = node.clone();
            async move { node.expire(key) }
        })
    }
}
