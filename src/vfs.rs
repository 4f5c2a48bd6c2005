//! The filesystem collaborator interface consumed by the NFS handler.
//!
//! A [`FileNode`] names one file or directory. All operations are
//! expressed relative to a node, fail with ordinary `std::io::Error`
//! values, and are translated to protocol status codes by the
//! handler; nothing in this module knows about NFS.
//!
//! Implementations must give nodes value identity (`Eq` + `Hash`):
//! the filehandle table relies on two lookups of the same underlying
//! object comparing equal so they share one handle.

use std::hash::Hash;
use std::io;

/// Second/microsecond timestamp pair, the protocol's time resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timestamp {
    pub seconds: u32,
    pub useconds: u32,
}

/// What kind of object a node names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    BlockDevice,
    CharDevice,
    Socket,
    Fifo,
    Other,
}

/// A stat result. `mode` carries the platform's raw mode word; the
/// handler folds the protocol's file-type bits on top.
#[derive(Clone, Copy, Debug)]
pub struct FileAttr {
    pub kind: FileKind,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
    pub blocksize: u32,
    pub rdev: u32,
    pub blocks: u32,
    pub fileid: u32,
    pub atime: Timestamp,
    pub mtime: Timestamp,
    pub ctime: Timestamp,
}

/// One exported file or directory and the operations the protocol
/// needs on it. Directory-shaped operations take a child name;
/// `rename` and `link` additionally take the destination directory
/// node.
pub trait FileNode: Sized + Eq + Hash + Send + Sync {
    /// Human-readable name for log lines.
    fn display(&self) -> String;

    fn create(&self, name: &str, mode: u32, uid: u32, gid: u32) -> io::Result<(Self, FileAttr)>;
    fn lookup(&self, name: &str) -> io::Result<Self>;
    fn unlink(&self, name: &str) -> io::Result<()>;
    fn rename(&self, from_name: &str, to_dir: &Self, to_name: &str) -> io::Result<()>;
    /// Creates a hard link to this node at `dir`/`name`.
    fn link(&self, dir: &Self, name: &str) -> io::Result<()>;
    /// Creates a symlink at `name` under this directory, pointing at
    /// `target`.
    fn symlink(&self, name: &str, target: &str) -> io::Result<()>;
    fn read_link(&self) -> io::Result<String>;
    fn make_directory(
        &self,
        name: &str,
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> io::Result<(Self, FileAttr)>;
    fn remove_directory(&self, name: &str) -> io::Result<()>;
    /// Child names in a stable order, including `.` and `..`.
    fn list_entries(&self) -> io::Result<Vec<String>>;
    fn set_times(&self, atime: Timestamp, mtime: Timestamp) -> io::Result<()>;
    fn stat(&self) -> io::Result<FileAttr>;
    fn truncate(&self, size: u32) -> io::Result<()>;
    fn change_mode(&self, mode: u32) -> io::Result<()>;
    fn change_owner(&self, uid: u32, gid: u32) -> io::Result<()>;
    fn read(&self, offset: u32, count: u32) -> io::Result<Vec<u8>>;
    fn write(&self, offset: u32, data: &[u8]) -> io::Result<()>;
}
