//! RPC server module
//!
//! The inbound side of the UDP transport: one receive loop on the node's
//! bound socket, one spawned task per datagram. Malformed datagrams are
//! logged and dropped; the loop itself never fails on a bad peer.

use crate::node::Node;
use crate::rpc::message::RpcMessage;
use crate::rpc::MAX_DATAGRAM;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, error, trace, warn};

/// Serve inbound RPCs on `socket` until the task is dropped
pub async fn serve(socket: Arc<UdpSocket>, node: Node) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Failed to receive datagram: {}", e);
                continue;
            }
        };

        match RpcMessage::from_bytes(&buf[..len]) {
            Ok(message) => {
                trace!("Received {} from {}", message.kind(), from);
                let node = node.clone();
                let socket = socket.clone();
                tokio::spawn(async move {
                    let Some(reply) = node.handle_rpc(message, from).await else {
                        return;
                    };
                    match reply.to_bytes() {
                        Ok(bytes) => {
                            if let Err(e) = socket.send_to(&bytes, from).await {
                                warn!("Failed to send {} to {}: {}", reply.kind(), from, e);
                            }
                        }
                        Err(e) => error!("Failed to encode {}: {}", reply.kind(), e),
                    }
                });
            }
            Err(e) => debug!("Dropping malformed datagram from {}: {}", from, e),
        }
    }
}
