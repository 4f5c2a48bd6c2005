//! A user-space file server speaking NFS version 2 over SUNRPC, with
//! an XDR codec driven by runtime type descriptors.
//!
//! The layers, bottom up:
//!
//! - [`protocol::xdr`]: descriptor-based XDR encoding and decoding
//! - [`protocol::rpc`]: RPC envelopes, the program registry and the
//!   per-message dispatch pipeline
//! - [`protocol::nfs2`] and [`protocol::mount`]: the type catalogs
//!   and program definitions of RFC 1094
//! - [`handler`]: procedure bodies over a pluggable [`vfs::FileNode`]
//! - [`tcp`] / [`udp`]: transports feeding records to the dispatcher
//! - [`server`]: puts it together around a local export directory
//!
//! ```no_run
//! use nfs_burrow::server::{Server, TransportKind};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut server = Server::bind("/srv/export", "0.0.0.0:2049", TransportKind::Tcp).await?;
//! server.start();
//! server.join().await?;
//! # Ok(())
//! # }
//! ```

pub mod filehandle;
#[cfg(unix)]
pub mod fs;
pub mod handler;
pub mod protocol;
pub mod server;
pub mod tcp;
pub mod udp;
pub mod vfs;

pub use handler::Handler;
pub use server::{Server, TransportKind};
