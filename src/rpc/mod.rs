//! UDP RPC transport: wire messages, outbound client and inbound server

pub mod client;
pub mod message;
pub mod server;

pub use client::RpcClient;
pub use message::RpcMessage;

/// Largest datagram either side will read
pub const MAX_DATAGRAM: usize = 64 * 1024;
