//! Server assembly: export directory + bind address + transport kind
//! in, running service task out.

use std::io;
use std::net::SocketAddr;
#[cfg(unix)]
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::info;

#[cfg(unix)]
use crate::fs::LocalFile;
#[cfg(unix)]
use crate::handler::Handler;
use crate::protocol::rpc::Registry;
use crate::tcp::TcpTransport;
use crate::udp::UdpTransport;

/// A bound listening socket serving the RPC dispatch loop.
#[async_trait]
pub trait Transport: Send + Sync {
    fn local_addr(&self) -> io::Result<SocketAddr>;
    /// Accepts and services requests until failure or abort.
    async fn serve(&self) -> io::Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    Tcp,
    Udp,
}

/// A file server exporting one local directory. Binding happens at
/// construction; [`Server::start`] spawns the service loop.
pub struct Server {
    transport: Option<Arc<dyn Transport>>,
    task: Option<JoinHandle<io::Result<()>>>,
}

impl Server {
    /// Binds a server exporting the directory at `export` over the
    /// local filesystem.
    #[cfg(unix)]
    pub async fn bind(
        export: impl AsRef<Path>,
        addr: &str,
        kind: TransportKind,
    ) -> anyhow::Result<Server> {
        let root = LocalFile::open(&export)?;
        info!("serving {}", root.path().display());
        let handler = Handler::for_root(root, 0);
        Server::with_registry(Arc::new(handler.registry()), addr, kind).await
    }

    /// Binds a server around an already assembled routing table.
    pub async fn with_registry(
        registry: Arc<Registry>,
        addr: &str,
        kind: TransportKind,
    ) -> anyhow::Result<Server> {
        let transport: Arc<dyn Transport> = match kind {
            TransportKind::Tcp => Arc::new(TcpTransport::bind(addr, registry).await?),
            TransportKind::Udp => Arc::new(UdpTransport::bind(addr, registry).await?),
        };
        info!("listening on {}", transport.local_addr()?);
        Ok(Server { transport: Some(transport), task: None })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match &self.transport {
            Some(transport) => transport.local_addr(),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "server is shut down")),
        }
    }

    /// Spawns the service loop. Idempotent while running.
    pub fn start(&mut self) {
        if self.task.is_some() {
            return;
        }
        if let Some(transport) = self.transport.clone() {
            self.task = Some(tokio::spawn(async move { transport.serve().await }));
        }
    }

    /// Waits for the service loop to end.
    pub async fn join(&mut self) -> io::Result<()> {
        match self.task.take() {
            Some(task) => task.await.unwrap_or(Ok(())),
            None => Ok(()),
        }
    }

    /// Aborts the service loop and releases the listening socket.
    /// In-flight per-request workers run to completion on their own.
    pub fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.transport = None;
    }
}
