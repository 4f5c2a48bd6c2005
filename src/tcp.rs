//! TCP transport with RPC record marking (RFC 1057 section 10).
//!
//! Each connection gets its own task and is serviced sequentially:
//! read one record, dispatch it on the blocking pool, write the reply
//! record. Replies are always written as a single fragment.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task;
use tracing::{debug, info};

use crate::protocol::rpc::{handle_call, Registry, MAX_RECORD_LENGTH};
use crate::server::Transport;

/// Top bit of a fragment header marks the last fragment of a record.
const LAST_FRAGMENT: u32 = 1 << 31;

pub struct TcpTransport {
    listener: TcpListener,
    registry: Arc<Registry>,
}

impl TcpTransport {
    pub async fn bind(addr: &str, registry: Arc<Registry>) -> io::Result<TcpTransport> {
        let listener = TcpListener::bind(addr).await?;
        Ok(TcpTransport { listener, registry })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    async fn serve(&self) -> io::Result<()> {
        loop {
            let (socket, peer) = self.listener.accept().await?;
            let registry = self.registry.clone();
            info!("accepting connection from {peer}");
            task::spawn(async move {
                if let Err(e) = handle_connection(socket, registry).await {
                    debug!("connection from {peer} closed: {e:?}");
                }
            });
        }
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    registry: Arc<Registry>,
) -> anyhow::Result<()> {
    let _ = socket.set_nodelay(true);
    loop {
        let record = read_record(&mut socket).await?;
        let registry = registry.clone();
        let reply = task::spawn_blocking(move || handle_call(&registry, &record))
            .await
            .map_err(|e| anyhow!("dispatch task failed: {e}"))?;
        if let Some(reply) = reply {
            write_record(&mut socket, &reply).await?;
        }
    }
}

/// Reads one complete record, reassembling fragments. Ends with an
/// I/O error when the peer closes the connection.
pub async fn read_record(socket: &mut TcpStream) -> anyhow::Result<Vec<u8>> {
    let mut record = Vec::new();
    loop {
        let header = socket.read_u32().await?;
        let length = (header & !LAST_FRAGMENT) as usize;
        if record.len() + length > MAX_RECORD_LENGTH {
            bail!("record length {} exceeds maximum", record.len() + length);
        }
        let start = record.len();
        record.resize(start + length, 0);
        socket.read_exact(&mut record[start..]).await?;
        if header & LAST_FRAGMENT != 0 {
            return Ok(record);
        }
    }
}

/// Writes one record as a single final fragment.
pub async fn write_record(socket: &mut TcpStream, record: &[u8]) -> anyhow::Result<()> {
    if record.len() > MAX_RECORD_LENGTH {
        bail!("record length {} exceeds maximum", record.len());
    }
    socket.write_u32(record.len() as u32 | LAST_FRAGMENT).await?;
    socket.write_all(record).await?;
    socket.flush().await?;
    Ok(())
}
