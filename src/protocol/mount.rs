//! The MOUNT protocol type catalog and program definition, version 1,
//! as specified in RFC 1094 appendix A.
//!
//! The mount protocol is how a client obtains the initial filehandle
//! for an exported directory; everything after that goes through the
//! NFS program. Filehandles here are the NFS protocol's own handle
//! type.

use std::sync::{Arc, LazyLock};

use crate::protocol::nfs2;
use crate::protocol::rpc::{Program, Version};
use crate::protocol::xdr::{
    enumeration, optional, string, structure, union, void, Slot, Value, Xdr,
};

pub const PROGRAM: u32 = 100005;
pub const VERSION: u32 = 1;

/// Maximum bytes in a pathname argument.
pub const MNTPATHLEN: usize = 1024;
/// Maximum bytes in a name argument.
pub const MNTNAMLEN: usize = 255;

/// A status of zero means the call succeeded and a filehandle for the
/// directory follows; non-zero status corresponds to UNIX error
/// numbers, so the NFS status enumeration is reused.
pub static FH_STATUS: LazyLock<Arc<Xdr>> = LazyLock::new(|| {
    union(
        enumeration(nfs2::NFS_STAT),
        vec![(Value::Name("NFS_OK"), vec![("fhs_fhandle", nfs2::NFS_FH.clone())])],
        Some(vec![]),
    )
});

/// The pathname of a directory.
pub static DIR_PATH: LazyLock<Arc<Xdr>> = LazyLock::new(|| string(MNTPATHLEN));

/// Arbitrary names: hostnames, groupnames.
pub static NAME: LazyLock<Arc<Xdr>> = LazyLock::new(|| string(MNTNAMLEN));

/// A node in the list of who has what mounted.
pub static MOUNT_BODY: LazyLock<Arc<Xdr>> = LazyLock::new(|| {
    let slot = Slot::new();
    let body = structure(vec![
        ("ml_hostname", NAME.clone()),
        ("ml_directory", DIR_PATH.clone()),
        ("ml_next", optional(slot.forward())),
    ]);
    slot.bind(body.clone());
    body
});

pub static MOUNT_LIST: LazyLock<Arc<Xdr>> = LazyLock::new(|| optional(MOUNT_BODY.clone()));

/// A node in a list of netgroups.
pub static GROUP_NODE: LazyLock<Arc<Xdr>> = LazyLock::new(|| {
    let slot = Slot::new();
    let node = structure(vec![("gr_name", NAME.clone()), ("gr_next", optional(slot.forward()))]);
    slot.bind(node.clone());
    node
});

pub static GROUPS: LazyLock<Arc<Xdr>> = LazyLock::new(|| optional(GROUP_NODE.clone()));

/// A node in the list of what is exported and to whom.
pub static EXPORT_NODE: LazyLock<Arc<Xdr>> = LazyLock::new(|| {
    let slot = Slot::new();
    let node = structure(vec![
        ("ex_dir", DIR_PATH.clone()),
        ("ex_groups", GROUPS.clone()),
        ("ex_next", optional(slot.forward())),
    ]);
    slot.bind(node.clone());
    node
});

pub static EXPORTS: LazyLock<Arc<Xdr>> = LazyLock::new(|| optional(EXPORT_NODE.clone()));

/// The mount service program.
pub fn program() -> Program {
    let mut program = Program::new(PROGRAM);
    program.version(VERSION, |v: &mut Version| {
        // Returns the filehandle for an exported directory and adds a
        // mount-list entry for the client.
        v.procedure(FH_STATUS.clone(), "MNT", 1, DIR_PATH.clone());
        // Returns the list of remotely mounted filesystems.
        v.procedure(MOUNT_LIST.clone(), "DUMP", 2, void());
        // Removes the mount-list entry for the directory.
        v.procedure(void(), "UMNT", 3, DIR_PATH.clone());
        // Removes all mount-list entries for this client.
        v.procedure(void(), "UMNTALL", 4, void());
        // Lists exported filesystems and who may import them.
        v.procedure(EXPORTS.clone(), "EXPORT", 5, void());
        // Identical to EXPORT.
        v.procedure(EXPORTS.clone(), "EXPORTALL", 6, void());
    });
    program
}
