//! RPC message module
//!
//! The wire envelope exchanged between nodes. Every message declares its
//! sender so the receiver can fold it into the routing table.

use crate::kademlia::contact::Contact;
use crate::kademlia::id::KademliaId;
use crate::store::value::StoredValue;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// DHT RPC messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RpcMessage {
    /// Liveness probe
    Ping { sender: Contact },
    /// Reply to a ping
    Pong { sender: Contact },
    /// Ask for the K closest contacts to `target`
    FindNode { sender: Contact, target: KademliaId },
    /// Reply to a FindNode
    FindNodeReply { sender: Contact, contacts: Vec<Contact> },
    /// Ask for the value stored under `target`, or the closest contacts
    FindValue { sender: Contact, target: KademliaId },
    /// Reply to a FindValue: the value if held, contacts otherwise
    FindValueReply {
        sender: Contact,
        value: Option<StoredValue>,
        contacts: Vec<Contact>,
    },
    /// Push a value to the receiver; no reply is sent
    Store { sender: Contact, value: StoredValue },
}

impl RpcMessage {
    /// The declared sender of this message
    pub fn sender(&self) -> &Contact {
        match self {
            RpcMessage::Ping { sender }
            | RpcMessage::Pong { sender }
            | RpcMessage::FindNode { sender, .. }
            | RpcMessage::FindNodeReply { sender, .. }
            | RpcMessage::FindValue { sender, .. }
            | RpcMessage::FindValueReply { sender, .. }
            | RpcMessage::Store { sender, .. } => sender,
        }
    }

    /// Short name of the message kind, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            RpcMessage::Ping { .. } => "ping",
            RpcMessage::Pong { .. } => "pong",
            RpcMessage::FindNode { .. } => "find_node",
            RpcMessage::FindNodeReply { .. } => "find_node_reply",
            RpcMessage::FindValue { .. } => "find_value",
            RpcMessage::FindValueReply { .. } => "find_value_reply",
            RpcMessage::Store { .. } => "store",
        }
    }

    /// Serialize the message to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize RPC message: {}", e))
    }

    /// Deserialize a message from bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data)
            .map_err(|e| anyhow::anyhow!("Failed to deserialize RPC message: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kademlia::id::ID_LENGTH;

    fn sender() -> Contact {
        Contact::new(KademliaId::new([7u8; ID_LENGTH]), "127.0.0.1:7400".parse().unwrap())
    }

    #[test]
    fn test_round_trip_find_node() {
        let msg = RpcMessage::FindNode {
            sender: sender(),
            target: KademliaId::hash(b"target"),
        };
        let decoded = RpcMessage::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        match decoded {
            RpcMessage::FindNode { sender: s, target } => {
                assert_eq!(s.id, sender().id);
                assert_eq!(target, KademliaId::hash(b"target"));
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_round_trip_store_with_value() {
        let value = StoredValue::new(true, &b"file bytes"[..]);
        let msg = RpcMessage::Store {
            sender: sender(),
            value: value.clone(),
        };
        let decoded = RpcMessage::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        match decoded {
            RpcMessage::Store { value: v, .. } => assert_eq!(v, value),
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_round_trip_find_value_reply_miss() {
        let msg = RpcMessage::FindValueReply {
            sender: sender(),
            value: None,
            contacts: vec![sender()],
        };
        let decoded = RpcMessage::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        match decoded {
            RpcMessage::FindValueReply { value, contacts, .. } => {
                assert!(value.is_none());
                assert_eq!(contacts.len(), 1);
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(RpcMessage::from_bytes(b"not json at all").is_err());
        assert!(RpcMessage::from_bytes(b"{\"type\":\"unknown\"}").is_err());
    }

    #[test]
    fn test_sender_and_kind() {
        let msg = RpcMessage::Ping { sender: sender() };
        assert_eq!(msg.sender().id, sender().id);
        assert_eq!(msg.kind(), "ping");
    }
}
