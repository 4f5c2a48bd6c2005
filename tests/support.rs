//! Shared test fixtures: an in-memory filesystem implementing the
//! handler's file interface, and helpers for driving procedures
//! through the dispatcher.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::io;
use std::sync::{Arc, Mutex};

use nfs_burrow::vfs::{FileAttr, FileKind, FileNode, Timestamp};

#[derive(Clone)]
enum Data {
    File(Vec<u8>),
    Dir,
    Link(String),
}

struct Node {
    data: Data,
    mode: u32,
    uid: u32,
    gid: u32,
    atime: Timestamp,
    mtime: Timestamp,
    fileid: u32,
}

#[derive(Default)]
pub struct StubFs {
    nodes: Mutex<HashMap<String, Node>>,
}

impl StubFs {
    /// A filesystem containing only the root directory; returns the
    /// root node.
    pub fn root() -> StubNode {
        let fs = Arc::new(StubFs::default());
        fs.insert("/", Data::Dir, 0o755);
        StubNode { fs, path: "/".to_string() }
    }

    fn insert(&self, path: &str, data: Data, mode: u32) {
        let mut nodes = self.nodes.lock().unwrap();
        let fileid = nodes.len() as u32 + 100;
        nodes.insert(
            path.to_string(),
            Node {
                data,
                mode,
                uid: 1000,
                gid: 1000,
                atime: Timestamp { seconds: 1, useconds: 0 },
                mtime: Timestamp { seconds: 2, useconds: 0 },
                fileid,
            },
        );
    }
}

/// A path into a [`StubFs`]. Equality is path equality, matching how
/// the server expects repeated lookups to collapse to one handle.
#[derive(Clone)]
pub struct StubNode {
    fs: Arc<StubFs>,
    path: String,
}

impl StubNode {
    /// Seeds a regular file without going through the protocol.
    pub fn add_file(&self, name: &str, content: &[u8]) {
        self.fs.insert(&self.child_path(name), Data::File(content.to_vec()), 0o644);
    }

    /// Seeds a subdirectory without going through the protocol.
    pub fn add_dir(&self, name: &str) {
        self.fs.insert(&self.child_path(name), Data::Dir, 0o755);
    }

    fn child_path(&self, name: &str) -> String {
        match name {
            "." => self.path.clone(),
            ".." => match self.path.rfind('/') {
                Some(0) | None => "/".to_string(),
                Some(idx) => self.path[..idx].to_string(),
            },
            _ if self.path == "/" => format!("/{name}"),
            _ => format!("{}/{name}", self.path),
        }
    }

    fn with_node<T>(&self, f: impl FnOnce(&mut Node) -> io::Result<T>) -> io::Result<T> {
        let mut nodes = self.fs.nodes.lock().unwrap();
        let node = nodes
            .get_mut(&self.path)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        f(node)
    }
}

impl PartialEq for StubNode {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for StubNode {}

impl Hash for StubNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

fn attrs_of(node: &Node) -> FileAttr {
    let (kind, size) = match &node.data {
        Data::File(content) => (FileKind::Regular, content.len() as u32),
        Data::Dir => (FileKind::Directory, 0),
        Data::Link(target) => (FileKind::Symlink, target.len() as u32),
    };
    FileAttr {
        kind,
        mode: node.mode,
        nlink: 1,
        uid: node.uid,
        gid: node.gid,
        size,
        blocksize: 4096,
        rdev: 0,
        blocks: 1,
        fileid: node.fileid,
        atime: node.atime,
        mtime: node.mtime,
        ctime: node.mtime,
    }
}

impl FileNode for StubNode {
    fn display(&self) -> String {
        self.path.clone()
    }

    fn create(&self, name: &str, mode: u32, _uid: u32, _gid: u32) -> io::Result<(Self, FileAttr)> {
        let path = self.child_path(name);
        self.fs.insert(&path, Data::File(Vec::new()), mode & 0o7777);
        let node = StubNode { fs: self.fs.clone(), path };
        let attrs = node.stat()?;
        Ok((node, attrs))
    }

    fn lookup(&self, name: &str) -> io::Result<Self> {
        let path = self.child_path(name);
        let nodes = self.fs.nodes.lock().unwrap();
        if !nodes.contains_key(&path) {
            return Err(io::ErrorKind::NotFound.into());
        }
        Ok(StubNode { fs: self.fs.clone(), path })
    }

    fn unlink(&self, name: &str) -> io::Result<()> {
        let path = self.child_path(name);
        let mut nodes = self.fs.nodes.lock().unwrap();
        match nodes.get(&path) {
            Some(Node { data: Data::Dir, .. }) => Err(io::ErrorKind::IsADirectory.into()),
            Some(_) => {
                nodes.remove(&path);
                Ok(())
            }
            None => Err(io::ErrorKind::NotFound.into()),
        }
    }

    fn rename(&self, from_name: &str, to_dir: &Self, to_name: &str) -> io::Result<()> {
        let from = self.child_path(from_name);
        let to = to_dir.child_path(to_name);
        let mut nodes = self.fs.nodes.lock().unwrap();
        let node = nodes.remove(&from).ok_or(io::ErrorKind::NotFound)?;
        nodes.insert(to, node);
        Ok(())
    }

    fn link(&self, dir: &Self, name: &str) -> io::Result<()> {
        let content = self.with_node(|node| match &node.data {
            Data::File(content) => Ok(content.clone()),
            _ => Err(io::ErrorKind::PermissionDenied.into()),
        })?;
        self.fs.insert(&dir.child_path(name), Data::File(content), 0o644);
        Ok(())
    }

    fn symlink(&self, name: &str, target: &str) -> io::Result<()> {
        self.fs.insert(&self.child_path(name), Data::Link(target.to_string()), 0o777);
        Ok(())
    }

    fn read_link(&self) -> io::Result<String> {
        self.with_node(|node| match &node.data {
            Data::Link(target) => Ok(target.clone()),
            _ => Err(io::ErrorKind::InvalidInput.into()),
        })
    }

    fn make_directory(
        &self,
        name: &str,
        mode: u32,
        _uid: u32,
        _gid: u32,
    ) -> io::Result<(Self, FileAttr)> {
        let path = self.child_path(name);
        {
            let nodes = self.fs.nodes.lock().unwrap();
            if nodes.contains_key(&path) {
                return Err(io::ErrorKind::AlreadyExists.into());
            }
        }
        self.fs.insert(&path, Data::Dir, mode & 0o7777);
        let node = StubNode { fs: self.fs.clone(), path };
        let attrs = node.stat()?;
        Ok((node, attrs))
    }

    fn remove_directory(&self, name: &str) -> io::Result<()> {
        let path = self.child_path(name);
        let mut nodes = self.fs.nodes.lock().unwrap();
        match nodes.get(&path) {
            Some(Node { data: Data::Dir, .. }) => {}
            Some(_) => return Err(io::ErrorKind::NotADirectory.into()),
            None => return Err(io::ErrorKind::NotFound.into()),
        }
        let prefix = if path == "/" { path.clone() } else { format!("{path}/") };
        if nodes.keys().any(|k| k.starts_with(&prefix) && *k != path) {
            return Err(io::ErrorKind::DirectoryNotEmpty.into());
        }
        nodes.remove(&path);
        Ok(())
    }

    fn list_entries(&self) -> io::Result<Vec<String>> {
        let nodes = self.fs.nodes.lock().unwrap();
        if !matches!(nodes.get(&self.path).map(|n| &n.data), Some(Data::Dir)) {
            return Err(io::ErrorKind::NotADirectory.into());
        }
        let prefix = if self.path == "/" { "/".to_string() } else { format!("{}/", self.path) };
        let mut names = vec![".".to_string(), "..".to_string()];
        let mut children: Vec<String> = nodes
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(str::to_string)
            .collect();
        children.sort();
        names.extend(children);
        Ok(names)
    }

    fn set_times(&self, atime: Timestamp, mtime: Timestamp) -> io::Result<()> {
        self.with_node(|node| {
            node.atime = atime;
            node.mtime = mtime;
            Ok(())
        })
    }

    fn stat(&self) -> io::Result<FileAttr> {
        self.with_node(|node| Ok(attrs_of(node)))
    }

    fn truncate(&self, size: u32) -> io::Result<()> {
        self.with_node(|node| match &mut node.data {
            Data::File(content) => {
                content.resize(size as usize, 0);
                Ok(())
            }
            _ => Err(io::ErrorKind::IsADirectory.into()),
        })
    }

    fn change_mode(&self, mode: u32) -> io::Result<()> {
        self.with_node(|node| {
            node.mode = (node.mode & !0o7777) | (mode & 0o7777);
            Ok(())
        })
    }

    fn change_owner(&self, uid: u32, gid: u32) -> io::Result<()> {
        self.with_node(|node| {
            node.uid = uid;
            node.gid = gid;
            Ok(())
        })
    }

    fn read(&self, offset: u32, count: u32) -> io::Result<Vec<u8>> {
        self.with_node(|node| match &node.data {
            Data::File(content) => {
                let start = (offset as usize).min(content.len());
                let end = (start + count as usize).min(content.len());
                Ok(content[start..end].to_vec())
            }
            _ => Err(io::ErrorKind::IsADirectory.into()),
        })
    }

    fn write(&self, offset: u32, data: &[u8]) -> io::Result<()> {
        self.with_node(|node| match &mut node.data {
            Data::File(content) => {
                let end = offset as usize + data.len();
                if content.len() < end {
                    content.resize(end, 0);
                }
                content[offset as usize..end].copy_from_slice(data);
                Ok(())
            }
            _ => Err(io::ErrorKind::IsADirectory.into()),
        })
    }
}
