//! kadfs
//!
//! A content-addressed distributed hash table node built on Kademlia, with
//! pinning, leases and periodic re-publication.

pub mod cli;
pub mod error;
pub mod events;
pub mod kademlia;
pub mod node;
pub mod rpc;
pub mod store;

pub use error::KadfsError;

pub use cli::{CliArgs, Config};
pub use events::{EventKind, EventScheduler};
pub use kademlia::{Contact, KademliaId, LookupEngine, LookupKind, LookupOutcome, RoutingTable, ID_BITS, ID_LENGTH};
pub use node::Node;
pub use rpc::{RpcClient, RpcMessage};
pub use store::{ContentStore, MemoryBackend, StorageBackend, StoredValue};
