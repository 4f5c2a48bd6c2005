//! Local-disk [`FileNode`] implementation.
//!
//! A [`LocalFile`] is a path inside the exported directory. Identity
//! is path identity, so repeated lookups of the same child collapse to
//! one filehandle. Unix-only: attribute handling goes through the
//! platform metadata extensions.

use std::fs::{DirBuilder, File, Metadata, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{
    chown, symlink, DirBuilderExt, FileTypeExt, MetadataExt, OpenOptionsExt, PermissionsExt,
};
use std::path::{Path, PathBuf};
use std::{fs, io};

use crate::vfs::{FileAttr, FileKind, FileNode, Timestamp};
use filetime::FileTime;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LocalFile {
    path: PathBuf,
}

impl LocalFile {
    /// Opens the export root. The directory must already exist; the
    /// path is canonicalized so later joins stay inside one spelling
    /// of it.
    pub fn open(path: impl AsRef<Path>) -> io::Result<LocalFile> {
        let path = fs::canonicalize(path)?;
        if !fs::metadata(&path)?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("export root {} is not a directory", path.display()),
            ));
        }
        Ok(LocalFile { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn child(&self, name: &str) -> LocalFile {
        LocalFile {
            path: self.path.join(name),
        }
    }
}

fn kind_of(meta: &Metadata) -> FileKind {
    let ftype = meta.file_type();
    if ftype.is_dir() {
        FileKind::Directory
    } else if ftype.is_symlink() {
        FileKind::Symlink
    } else if ftype.is_block_device() {
        FileKind::BlockDevice
    } else if ftype.is_char_device() {
        FileKind::CharDevice
    } else if ftype.is_socket() {
        FileKind::Socket
    } else if ftype.is_fifo() {
        FileKind::Fifo
    } else if ftype.is_file() {
        FileKind::Regular
    } else {
        FileKind::Other
    }
}

fn timestamp(seconds: i64, nanoseconds: i64) -> Timestamp {
    Timestamp {
        seconds: seconds as u32,
        useconds: (nanoseconds / 1_000) as u32,
    }
}

fn attrs_of(meta: &Metadata) -> FileAttr {
    FileAttr {
        kind: kind_of(meta),
        mode: meta.mode(),
        nlink: meta.nlink() as u32,
        uid: meta.uid(),
        gid: meta.gid(),
        size: meta.len() as u32,
        blocksize: meta.blksize() as u32,
        rdev: meta.rdev() as u32,
        blocks: meta.blocks() as u32,
        fileid: meta.ino() as u32,
        atime: timestamp(meta.atime(), meta.atime_nsec()),
        mtime: timestamp(meta.mtime(), meta.mtime_nsec()),
        ctime: timestamp(meta.ctime(), meta.ctime_nsec()),
    }
}

/// Attribute values of all ones mean "leave unchanged" on the wire;
/// map those to `None` for `chown`.
fn owner_id(id: u32) -> Option<u32> {
    (id != u32::MAX).then_some(id)
}

/// Sub-second part of a wire timestamp as nanoseconds. The protocol
/// field is a plain unsigned integer, so a caller can send more than
/// a second's worth of microseconds; that is rejected rather than
/// wrapped.
fn nanos_of(t: Timestamp) -> io::Result<u32> {
    if t.useconds >= 1_000_000 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("useconds {} out of range", t.useconds),
        ));
    }
    Ok(t.useconds * 1_000)
}

impl FileNode for LocalFile {
    fn display(&self) -> String {
        self.path.display().to_string()
    }

    fn create(&self, name: &str, mode: u32, uid: u32, gid: u32) -> io::Result<(Self, FileAttr)> {
        let node = self.child(name);
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode & 0o7777)
            .open(&node.path)?;
        if uid != u32::MAX || gid != u32::MAX {
            chown(&node.path, owner_id(uid), owner_id(gid))?;
        }
        let attrs = node.stat()?;
        Ok((node, attrs))
    }

    fn lookup(&self, name: &str) -> io::Result<Self> {
        let node = self.child(name);
        fs::symlink_metadata(&node.path)?;
        Ok(node)
    }

    fn unlink(&self, name: &str) -> io::Result<()> {
        fs::remove_file(self.child(name).path)
    }

    fn rename(&self, from_name: &str, to_dir: &Self, to_name: &str) -> io::Result<()> {
        fs::rename(self.child(from_name).path, to_dir.child(to_name).path)
    }

    fn link(&self, dir: &Self, name: &str) -> io::Result<()> {
        fs::hard_link(&self.path, dir.child(name).path)
    }

    fn symlink(&self, name: &str, target: &str) -> io::Result<()> {
        symlink(target, self.child(name).path)
    }

    fn read_link(&self) -> io::Result<String> {
        Ok(fs::read_link(&self.path)?.to_string_lossy().into_owned())
    }

    fn make_directory(
        &self,
        name: &str,
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> io::Result<(Self, FileAttr)> {
        let node = self.child(name);
        DirBuilder::new().mode(mode & 0o7777).create(&node.path)?;
        if uid != u32::MAX || gid != u32::MAX {
            chown(&node.path, owner_id(uid), owner_id(gid))?;
        }
        let attrs = node.stat()?;
        Ok((node, attrs))
    }

    fn remove_directory(&self, name: &str) -> io::Result<()> {
        fs::remove_dir(self.child(name).path)
    }

    fn list_entries(&self) -> io::Result<Vec<String>> {
        let mut names = vec![".".to_string(), "..".to_string()];
        let mut children = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            children.push(entry?.file_name().to_string_lossy().into_owned());
        }
        // Sorted so directory cookies index a stable listing across
        // successive READDIR calls.
        children.sort();
        names.extend(children);
        Ok(names)
    }

    fn set_times(&self, atime: Timestamp, mtime: Timestamp) -> io::Result<()> {
        filetime::set_file_times(
            &self.path,
            FileTime::from_unix_time(atime.seconds as i64, nanos_of(atime)?),
            FileTime::from_unix_time(mtime.seconds as i64, nanos_of(mtime)?),
        )
    }

    fn stat(&self) -> io::Result<FileAttr> {
        Ok(attrs_of(&fs::symlink_metadata(&self.path)?))
    }

    fn truncate(&self, size: u32) -> io::Result<()> {
        OpenOptions::new()
            .write(true)
            .open(&self.path)?
            .set_len(size as u64)
    }

    fn change_mode(&self, mode: u32) -> io::Result<()> {
        fs::set_permissions(&self.path, fs::Permissions::from_mode(mode & 0o7777))
    }

    fn change_owner(&self, uid: u32, gid: u32) -> io::Result<()> {
        chown(&self.path, owner_id(uid), owner_id(gid))
    }

    fn read(&self, offset: u32, count: u32) -> io::Result<Vec<u8>> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset as u64))?;
        let mut data = Vec::with_capacity(count as usize);
        file.take(count as u64).read_to_end(&mut data)?;
        Ok(data)
    }

    fn write(&self, offset: u32, data: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.seek(SeekFrom::Start(offset as u64))?;
        file.write_all(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("nfs-burrow-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn set_times_rejects_more_than_a_second_of_useconds() {
        let dir = scratch_dir("set-times");
        let root = LocalFile::open(&dir).unwrap();
        let (file, _) = root.create("stamped", 0o644, u32::MAX, u32::MAX).unwrap();

        let bad = Timestamp { seconds: 1, useconds: 5_000_000 };
        let err = file.set_times(bad, bad).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let fine = Timestamp { seconds: 5, useconds: 250_000 };
        file.set_times(fine, fine).unwrap();
        assert_eq!(file.stat().unwrap().mtime, fine);

        let _ = fs::remove_dir_all(&dir);
    }
}
