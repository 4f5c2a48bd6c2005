//! RPC (Remote Procedure Call) protocol implementation as specified
//! in RFC 1057.
//!
//! The RPC layer identifies a remote operation by program number,
//! version number and procedure number, and wraps every exchange in a
//! call/reply envelope built from XDR descriptors. This module
//! provides:
//!
//! 1. The message envelope types ([`msg`])
//! 2. The program / version / procedure routing table ([`registry`])
//! 3. The per-message dispatch state machine ([`dispatch`])
//! 4. Client-side call construction ([`client`])
//!
//! Transports hand complete request records to [`handle_call`] and
//! write back whatever bytes it returns.

pub mod client;
pub mod dispatch;
pub mod msg;
pub mod registry;

pub use client::{decode_reply, Caller, Reply};
pub use dispatch::handle_call;
pub use registry::{Callback, Procedure, Program, Registry, RpcError, Version};

/// Ceiling on a single request record; a fragment header promising
/// more than this is treated as a protocol error.
pub const MAX_RECORD_LENGTH: usize = 8 * 1024 * 1024;
