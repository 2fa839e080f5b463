//! Kademlia module
//!
//! The DHT engine: identifiers, contacts, k-buckets, the routing table and
//! the iterative lookup algorithm.

pub mod bucket;
pub mod contact;
pub mod id;
pub mod lookup;
pub mod routing;

pub use contact::{sort_by_distance, Contact};
pub use id::{KademliaId, ID_BITS, ID_LENGTH};
pub use lookup::{LookupEngine, LookupKind, LookupOutcome, LookupTransport};
pub use routing::{Pinger, RoutingTable};
