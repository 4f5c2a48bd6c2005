//! UDP transport: one datagram in, at most one datagram out.
//!
//! Datagrams are dispatched concurrently; each request gets its own
//! task so a slow filesystem call does not stall the receive loop.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::task;
use tracing::{debug, warn};

use crate::protocol::rpc::{handle_call, Registry};
use crate::server::Transport;

/// Largest datagram accepted; the protocol caps payloads well below
/// this, the slack just avoids truncating garbage input.
const MAX_DATAGRAM: usize = 64 * 1024;

pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    registry: Arc<Registry>,
}

impl UdpTransport {
    pub async fn bind(addr: &str, registry: Arc<Registry>) -> io::Result<UdpTransport> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        Ok(UdpTransport { socket, registry })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    async fn serve(&self) -> io::Result<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (length, peer) = self.socket.recv_from(&mut buf).await?;
            let request = buf[..length].to_vec();
            let socket = self.socket.clone();
            let registry = self.registry.clone();
            task::spawn(async move {
                let reply =
                    match task::spawn_blocking(move || handle_call(&registry, &request)).await {
                        Ok(reply) => reply,
                        Err(e) => {
                            warn!("dispatch task failed: {e}");
                            return;
                        }
                    };
                if let Some(reply) = reply {
                    if let Err(e) = socket.send_to(&reply, peer).await {
                        debug!("cannot send reply to {peer}: {e}");
                    }
                }
            });
        }
    }
}
