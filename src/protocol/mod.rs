//! Protocol module implementing the NFS version 2 suite from the wire
//! up.
//!
//! Three layers, leaf to root:
//!
//! - `xdr`: External Data Representation (RFC 4506) as runtime type
//!   descriptors with a dynamic value tree.
//!
//! - `rpc`: the SUNRPC envelope, program/version/procedure registry
//!   and dispatch state machine (RFC 1057).
//!
//! - `nfs2` and `mount`: the NFS v2 and MOUNT v1 type catalogs
//!   (RFC 1094), plain descriptor compositions with their program
//!   definitions.

pub mod mount;
pub mod nfs2;
pub mod rpc;
pub mod xdr;
