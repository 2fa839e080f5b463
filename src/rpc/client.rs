//! RPC client module
//!
//! Outbound RPCs over UDP: one ephemeral socket per call, one attempt, one
//! response bounded by the configured timeout. There is no retry; a timeout
//! means the peer is treated as unreachable by the caller.

use crate::error::KadfsError;
use crate::kademlia::contact::Contact;
use crate::kademlia::id::KademliaId;
use crate::kademlia::routing::Pinger;
use crate::rpc::message::RpcMessage;
use crate::rpc::MAX_DATAGRAM;
use crate::store::value::StoredValue;
use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, trace};

/// Outbound RPC endpoint for one node
pub struct RpcClient {
    me: Contact,
    timeout: Duration,
}

impl RpcClient {
    /// Create a client sending on behalf of `me`
    pub fn new(me: Contact, timeout: Duration) -> Self {
        Self { me, timeout }
    }

    /// Send one request and await one response within the timeout
    async fn call(&self, address: SocketAddr, request: RpcMessage) -> Result<RpcMessage, KadfsError> {
        let bind_ip: IpAddr = if address.is_ipv4() {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        };
        let socket = UdpSocket::bind(SocketAddr::new(bind_ip, 0)).await.map_err(|e| {
            KadfsError::network_error_full("Failed to bind RPC socket", address.to_string(), e.to_string())
        })?;

        let bytes = request
            .to_bytes()
            .map_err(|e| KadfsError::parse_error_with_source("Failed to encode RPC", e.to_string()))?;
        socket.send_to(&bytes, address).await.map_err(|e| {
            KadfsError::network_error_full("Failed to send RPC", address.to_string(), e.to_string())
        })?;
        trace!("Sent {} to {}", request.kind(), address);

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (len, _) = tokio::time::timeout(self.timeout, socket.recv_from(&mut buf))
            .await
            .map_err(|_| KadfsError::rpc_error_with_peer("RPC timed out", address.to_string()))?
            .map_err(|e| {
                KadfsError::network_error_full("Failed to receive RPC reply", address.to_string(), e.to_string())
            })?;

        RpcMessage::from_bytes(&buf[..len])
            .map_err(|e| KadfsError::parse_error_with_source("Failed to decode RPC reply", e.to_string()))
    }

    /// Probe an address for liveness; returns the responder's contact
    ///
    /// Used both as the bucket-eviction probe and to learn a bootstrap
    /// node's identifier during join.
    pub async fn ping_address(&self, address: SocketAddr) -> Result<Contact, KadfsError> {
        let request = RpcMessage::Ping { sender: self.me.clone() };
        match self.call(address, request).await? {
            RpcMessage::Pong { sender } => Ok(sender),
            other => Err(KadfsError::rpc_error_full(
                "Unexpected reply to ping",
                address.to_string(),
                other.kind(),
            )),
        }
    }

    /// Ask `contact` for its K closest contacts to `target`
    ///
    /// Returns the responder's declared contact along with the contacts.
    pub async fn find_node(
        &self,
        contact: &Contact,
        target: &KademliaId,
    ) -> Result<(Contact, Vec<Contact>), KadfsError> {
        let request = RpcMessage::FindNode {
            sender: self.me.clone(),
            target: *target,
        };
        match self.call(contact.address, request).await? {
            RpcMessage::FindNodeReply { sender, contacts } => Ok((sender, contacts)),
            other => Err(KadfsError::rpc_error_full(
                "Unexpected reply to find_node",
                contact.address.to_string(),
                other.kind(),
            )),
        }
    }

    /// Ask `contact` for the value under `target`, or its closest contacts
    pub async fn find_value(
        &self,
        contact: &Contact,
        target: &KademliaId,
    ) -> Result<(Contact, Option<StoredValue>, Vec<Contact>), KadfsError> {
        let request = RpcMessage::FindValue {
            sender: self.me.clone(),
            target: *target,
        };
        match self.call(contact.address, request).await? {
            RpcMessage::FindValueReply { sender, value, contacts } => Ok((sender, value, contacts)),
            other => Err(KadfsError::rpc_error_full(
                "Unexpected reply to find_value",
                contact.address.to_string(),
                other.kind(),
            )),
        }
    }

    /// Push a value to `contact`; fire-and-forget, no reply is expected
    pub async fn store(&self, contact: &Contact, value: &StoredValue) -> Result<(), KadfsError> {
        let request = RpcMessage::Store {
            sender: self.me.clone(),
            value: value.clone(),
        };
        let bytes = request
            .to_bytes()
            .map_err(|e| KadfsError::parse_error_with_source("Failed to encode RPC", e.to_string()))?;

        let bind_ip: IpAddr = if contact.address.is_ipv4() {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        };
        let socket = UdpSocket::bind(SocketAddr::new(bind_ip, 0)).await.map_err(|e| {
            KadfsError::network_error_full(
                "Failed to bind RPC socket",
                contact.address.to_string(),
                e.to_string(),
            )
        })?;
        socket.send_to(&bytes, contact.address).await.map_err(|e| {
            KadfsError::network_error_full(
                "Failed to send store",
                contact.address.to_string(),
                e.to_string(),
            )
        })?;
        debug!("Pushed value {} to {}", value.key(), contact.address);
        Ok(())
    }
}

#[async_trait]
impl Pinger for RpcClient {
    async fn ping(&self, contact: &Contact) -> Result<(), KadfsError> {
        self.ping_address(contact.address).await.map(|_| ())
    }
}
