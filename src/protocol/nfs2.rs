//! The NFS version 2 type catalog and program definition, as
//! specified in RFC 1094.
//!
//! Everything here is ordinary descriptor composition; the procedure
//! bodies live in the handler, which binds callbacks onto the program
//! returned by [`program`].

use std::sync::{Arc, LazyLock};

use crate::protocol::rpc::{Program, Version};
use crate::protocol::xdr::{
    boolean, enumeration, fixed_opaque, opaque, optional, string, structure, uint, union,
    EnumTable, Slot, Value, Xdr,
};

/// Conventional NFS port.
pub const PORT: u16 = 2049;
pub const PROGRAM: u32 = 100003;
pub const VERSION: u32 = 2;

/// Maximum bytes in a READ or WRITE request.
pub const MAXDATA: usize = 8192;
pub const MAXPATHLEN: usize = 1024;
pub const MAXNAMELEN: usize = 255;
/// Size of an NFS v2 filehandle.
pub const FHSIZE: usize = 32;

// File-type bits carried in the mode word.
pub const MODE_FMT: u32 = 0o170000; // type of file
pub const MODE_DIR: u32 = 0o040000; // directory
pub const MODE_CHR: u32 = 0o020000; // character special
pub const MODE_BLK: u32 = 0o060000; // block special
pub const MODE_REG: u32 = 0o100000; // regular
pub const MODE_LNK: u32 = 0o120000; // symbolic link
pub const MODE_SOCK: u32 = 0o140000; // socket
pub const MODE_FIFO: u32 = 0o010000; // fifo

pub const NFS_STAT: EnumTable = &[
    ("NFS_OK", 0),               // no error
    ("NFSERR_PERM", 1),          // Not owner
    ("NFSERR_NOENT", 2),         // No such file or directory
    ("NFSERR_IO", 5),            // I/O error
    ("NFSERR_NXIO", 6),          // No such device or address
    ("NFSERR_ACCES", 13),        // Permission denied
    ("NFSERR_EXIST", 17),        // File exists
    ("NFSERR_NODEV", 19),        // No such device
    ("NFSERR_NOTDIR", 20),       // Not a directory
    ("NFSERR_ISDIR", 21),        // Is a directory
    ("NFSERR_INVAL", 22),        // Invalid argument
    ("NFSERR_FBIG", 27),         // File too large
    ("NFSERR_NOSPC", 28),        // No space left on device
    ("NFSERR_ROFS", 30),         // Read-only file system
    ("NFSERR_NAMETOOLONG", 63),  // File name too long
    ("NFSERR_NOTEMPTY", 66),     // Directory not empty
    ("NFSERR_DQUOT", 69),        // Disc quota exceeded
    ("NFSERR_STALE", 70),        // Stale NFS file handle
    ("NFSERR_WFLUSH", 99),       // Write cache flushed
];

pub const FTYPE: EnumTable = &[
    ("NFNON", 0),  // non-file
    ("NFREG", 1),  // regular file
    ("NFDIR", 2),  // directory
    ("NFBLK", 3),  // block special
    ("NFCHR", 4),  // character special
    ("NFLNK", 5),  // symbolic link
    ("NFSOCK", 6), // unix domain sockets
    ("NFBAD", 7),  // unused
    ("NFFIFO", 8), // named pipe
];

pub static NFS_FH: LazyLock<Arc<Xdr>> =
    LazyLock::new(|| structure(vec![("data", fixed_opaque(FHSIZE))]));

pub static NFS_TIME: LazyLock<Arc<Xdr>> =
    LazyLock::new(|| structure(vec![("seconds", uint()), ("useconds", uint())]));

pub static FATTR: LazyLock<Arc<Xdr>> = LazyLock::new(|| {
    structure(vec![
        ("type", enumeration(FTYPE)), // file type
        ("mode", uint()),             // protection mode bits
        ("nlink", uint()),            // number of hard links
        ("uid", uint()),              // owner user id
        ("gid", uint()),              // owner group id
        ("size", uint()),             // file size in bytes
        ("blocksize", uint()),        // preferred block size
        ("rdev", uint()),             // special device number
        ("blocks", uint()),           // Kb of disk used by file
        ("fsid", uint()),             // device number
        ("fileid", uint()),           // inode number
        ("atime", NFS_TIME.clone()),  // time of last access
        ("mtime", NFS_TIME.clone()),  // time of last modification
        ("ctime", NFS_TIME.clone()),  // time of last change
    ])
});

/// Settable attributes; a field of all ones means "leave unchanged".
pub static SATTR: LazyLock<Arc<Xdr>> = LazyLock::new(|| {
    structure(vec![
        ("mode", uint()),
        ("uid", uint()),
        ("gid", uint()),
        ("size", uint()),
        ("atime", NFS_TIME.clone()),
        ("mtime", NFS_TIME.clone()),
    ])
});

pub static FILENAME: LazyLock<Arc<Xdr>> = LazyLock::new(|| string(MAXNAMELEN));
pub static NFS_PATH: LazyLock<Arc<Xdr>> = LazyLock::new(|| string(MAXPATHLEN));

fn status_union(ok_arm: Vec<(&'static str, Arc<Xdr>)>) -> Arc<Xdr> {
    union(
        enumeration(NFS_STAT),
        vec![(Value::Name("NFS_OK"), ok_arm)],
        Some(vec![]),
    )
}

pub static ATTR_STAT: LazyLock<Arc<Xdr>> =
    LazyLock::new(|| status_union(vec![("attributes", FATTR.clone())]));

pub static SATTR_ARGS: LazyLock<Arc<Xdr>> = LazyLock::new(|| {
    structure(vec![("file", NFS_FH.clone()), ("attributes", SATTR.clone())])
});

pub static DIROP_ARGS: LazyLock<Arc<Xdr>> =
    LazyLock::new(|| structure(vec![("dir", NFS_FH.clone()), ("name", FILENAME.clone())]));

pub static DIROP_RES: LazyLock<Arc<Xdr>> = LazyLock::new(|| {
    status_union(vec![(
        "diropres",
        structure(vec![("file", NFS_FH.clone()), ("attributes", FATTR.clone())]),
    )])
});

pub static READLINK_RES: LazyLock<Arc<Xdr>> =
    LazyLock::new(|| status_union(vec![("data", NFS_PATH.clone())]));

pub static READ_ARGS: LazyLock<Arc<Xdr>> = LazyLock::new(|| {
    structure(vec![
        ("file", NFS_FH.clone()),
        ("offset", uint()),     // byte offset in file
        ("count", uint()),      // immediate read count
        ("totalcount", uint()), // read count from offset
    ])
});

pub static READ_RES: LazyLock<Arc<Xdr>> = LazyLock::new(|| {
    status_union(vec![(
        "reply",
        structure(vec![("attributes", FATTR.clone()), ("data", opaque(MAXDATA))]),
    )])
});

pub static WRITE_ARGS: LazyLock<Arc<Xdr>> = LazyLock::new(|| {
    structure(vec![
        ("file", NFS_FH.clone()),
        ("beginoffset", uint()),
        ("offset", uint()),
        ("totalcount", uint()),
        ("data", opaque(MAXDATA)),
    ])
});

pub static CREATE_ARGS: LazyLock<Arc<Xdr>> = LazyLock::new(|| {
    structure(vec![("where", DIROP_ARGS.clone()), ("attributes", SATTR.clone())])
});

pub static RENAME_ARGS: LazyLock<Arc<Xdr>> =
    LazyLock::new(|| structure(vec![("from", DIROP_ARGS.clone()), ("to", DIROP_ARGS.clone())]));

pub static LINK_ARGS: LazyLock<Arc<Xdr>> =
    LazyLock::new(|| structure(vec![("from", NFS_FH.clone()), ("to", DIROP_ARGS.clone())]));

pub static SYMLINK_ARGS: LazyLock<Arc<Xdr>> = LazyLock::new(|| {
    structure(vec![
        ("from", DIROP_ARGS.clone()),
        ("to", NFS_PATH.clone()),
        ("attributes", SATTR.clone()),
    ])
});

pub static READDIR_ARGS: LazyLock<Arc<Xdr>> = LazyLock::new(|| {
    structure(vec![
        ("dir", NFS_FH.clone()),
        ("cookie", uint()),
        ("count", uint()), // directory bytes to read
    ])
});

/// A directory entry node; `nextentry` refers back to this type,
/// forming the linked entry chain of a READDIR reply.
pub static ENTRY: LazyLock<Arc<Xdr>> = LazyLock::new(|| {
    let slot = Slot::new();
    let entry = structure(vec![
        ("fileid", uint()),
        ("name", FILENAME.clone()),
        ("cookie", uint()),
        ("nextentry", optional(slot.forward())),
    ]);
    slot.bind(entry.clone());
    entry
});

pub static DIR_LIST: LazyLock<Arc<Xdr>> = LazyLock::new(|| {
    structure(vec![("entries", optional(ENTRY.clone())), ("eof", boolean())])
});

pub static READDIR_RES: LazyLock<Arc<Xdr>> =
    LazyLock::new(|| status_union(vec![("reply", DIR_LIST.clone())]));

pub static STATFS_RES: LazyLock<Arc<Xdr>> = LazyLock::new(|| {
    status_union(vec![(
        "reply",
        structure(vec![
            ("tsize", uint()),  // preferred xfer size in bytes
            ("bsize", uint()),  // file system block size
            ("blocks", uint()), // total blocks in file system
            ("bfree", uint()),  // free blocks in fs
            ("bavail", uint()), // free blocks avail to non-root
        ]),
    )])
});

/// The remote file service program, all 17 procedures of RFC 1094.
pub fn program() -> Program {
    let mut program = Program::new(PROGRAM);
    program.version(VERSION, |v: &mut Version| {
        v.procedure(ATTR_STAT.clone(), "GETATTR", 1, NFS_FH.clone());
        v.procedure(ATTR_STAT.clone(), "SETATTR", 2, SATTR_ARGS.clone());
        v.procedure(crate::protocol::xdr::void(), "ROOT", 3, crate::protocol::xdr::void());
        v.procedure(DIROP_RES.clone(), "LOOKUP", 4, DIROP_ARGS.clone());
        v.procedure(READLINK_RES.clone(), "READLINK", 5, NFS_FH.clone());
        v.procedure(READ_RES.clone(), "READ", 6, READ_ARGS.clone());
        v.procedure(
            crate::protocol::xdr::void(),
            "WRITECACHE",
            7,
            crate::protocol::xdr::void(),
        );
        v.procedure(ATTR_STAT.clone(), "WRITE", 8, WRITE_ARGS.clone());
        v.procedure(DIROP_RES.clone(), "CREATE", 9, CREATE_ARGS.clone());
        v.procedure(enumeration(NFS_STAT), "REMOVE", 10, DIROP_ARGS.clone());
        v.procedure(enumeration(NFS_STAT), "RENAME", 11, RENAME_ARGS.clone());
        v.procedure(enumeration(NFS_STAT), "LINK", 12, LINK_ARGS.clone());
        v.procedure(enumeration(NFS_STAT), "SYMLINK", 13, SYMLINK_ARGS.clone());
        v.procedure(DIROP_RES.clone(), "MKDIR", 14, CREATE_ARGS.clone());
        v.procedure(enumeration(NFS_STAT), "RMDIR", 15, DIROP_ARGS.clone());
        v.procedure(READDIR_RES.clone(), "READDIR", 16, READDIR_ARGS.clone());
        v.procedure(STATFS_RES.clone(), "STATFS", 17, NFS_FH.clone());
    });
    program
}
