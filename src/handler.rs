//! Procedure bodies for the NFS and MOUNT programs.
//!
//! [`Handler`] owns the export table and the filehandle table, and
//! produces a [`Registry`] whose procedures operate on any
//! [`FileNode`] implementation. I/O failures inside a procedure are
//! translated to protocol status codes here; the dispatcher only ever
//! sees a successfully produced result value.

use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex};

use tracing::{error, info};

use crate::filehandle::{Filehandle, HandleTable};
use crate::protocol::rpc::{Callback, Program, Registry, RpcError};
use crate::protocol::xdr::{invalid_data, Value};
use crate::protocol::{mount, nfs2};
use crate::vfs::{FileAttr, FileKind, FileNode, Timestamp};

/// Wire sentinel in settable attributes meaning "leave unchanged"
/// (-1 as an unsigned integer).
const UNCHANGED: u32 = u32::MAX;

pub struct Handler<F: FileNode + 'static> {
    state: Arc<State<F>>,
}

struct State<F: FileNode> {
    exports: Mutex<BTreeMap<String, Filehandle>>,
    table: HandleTable<F>,
    fsid: u32,
}

impl<F: FileNode + 'static> Handler<F> {
    pub fn new(fsid: u32) -> Handler<F> {
        Handler {
            state: Arc::new(State {
                exports: Mutex::new(BTreeMap::new()),
                table: HandleTable::new(),
                fsid,
            }),
        }
    }

    /// Creates a handler exporting `root` at the path `/`.
    pub fn for_root(root: F, fsid: u32) -> Handler<F> {
        let handler = Handler::new(fsid);
        handler.export("/", root);
        handler
    }

    /// Registers `file` as the export named `path` in the mount
    /// protocol. The first export receives the all-zeroes filehandle.
    pub fn export(&self, path: impl Into<String>, file: F) {
        let path = path.into();
        let fh = self.state.table.handle_for(Arc::new(file));
        info!("exporting {path}");
        self.state.exports().insert(path, fh);
    }

    /// Builds the routing table with every procedure bound. The
    /// returned registry is self-contained and can be shared with the
    /// transports.
    pub fn registry(&self) -> Registry {
        let mut registry = Registry::new();
        registry.register(self.nfs_program());
        registry.register(self.mount_program());
        registry
    }

    fn nfs_program(&self) -> Program {
        use nfs2::VERSION;

        let mut program = nfs2::program();
        let state = self.state.clone();
        program.on_call(VERSION, "GETATTR", Box::new(move |arg, _, _| {
            reply(getattr(&state, &arg))
        }));
        let state = self.state.clone();
        program.on_call(VERSION, "SETATTR", Box::new(move |arg, _, _| {
            reply(setattr(&state, &arg))
        }));
        program.on_call(VERSION, "ROOT", Box::new(move |_, _, _| {
            info!("ROOT");
            // obsolete
            Ok(Value::Void)
        }));
        let state = self.state.clone();
        program.on_call(VERSION, "LOOKUP", Box::new(move |arg, _, _| {
            reply(lookup(&state, &arg))
        }));
        let state = self.state.clone();
        program.on_call(VERSION, "READLINK", Box::new(move |arg, _, _| {
            reply(readlink(&state, &arg))
        }));
        let state = self.state.clone();
        program.on_call(VERSION, "READ", Box::new(move |arg, _, _| {
            reply(read(&state, &arg))
        }));
        program.on_call(VERSION, "WRITECACHE", Box::new(move |_, _, _| {
            info!("WRITECACHE");
            Ok(Value::Void)
        }));
        let state = self.state.clone();
        program.on_call(VERSION, "WRITE", Box::new(move |arg, _, _| {
            reply(write(&state, &arg))
        }));
        let state = self.state.clone();
        program.on_call(VERSION, "CREATE", Box::new(move |arg, _, _| {
            reply(create(&state, &arg))
        }));
        let state = self.state.clone();
        program.on_call(VERSION, "REMOVE", Box::new(move |arg, _, _| {
            status_reply(remove(&state, &arg))
        }));
        let state = self.state.clone();
        program.on_call(VERSION, "RENAME", Box::new(move |arg, _, _| {
            status_reply(rename(&state, &arg))
        }));
        let state = self.state.clone();
        program.on_call(VERSION, "LINK", Box::new(move |arg, _, _| {
            status_reply(link(&state, &arg))
        }));
        let state = self.state.clone();
        program.on_call(VERSION, "SYMLINK", Box::new(move |arg, _, _| {
            status_reply(symlink(&state, &arg))
        }));
        let state = self.state.clone();
        program.on_call(VERSION, "MKDIR", Box::new(move |arg, _, _| {
            reply(mkdir(&state, &arg))
        }));
        let state = self.state.clone();
        program.on_call(VERSION, "RMDIR", Box::new(move |arg, _, _| {
            status_reply(rmdir(&state, &arg))
        }));
        let state = self.state.clone();
        program.on_call(VERSION, "READDIR", Box::new(move |arg, _, _| {
            reply(readdir(&state, &arg))
        }));
        program.on_call(VERSION, "STATFS", Box::new(move |_, _, _| {
            reply(statfs())
        }));
        program
    }

    fn mount_program(&self) -> Program {
        use mount::VERSION;

        let mut program = mount::program();
        let state = self.state.clone();
        program.on_call(VERSION, "MNT", Box::new(move |arg, _, _| {
            reply(mnt(&state, &arg))
        }));
        program.on_call(VERSION, "DUMP", Box::new(move |_, _, _| {
            info!("DUMP");
            // No mount bookkeeping, so the list is always empty.
            Ok(Value::Void)
        }));
        program.on_call(VERSION, "UMNT", Box::new(move |arg, _, _| {
            info!("UMNT {}", arg.as_str().unwrap_or(""));
            Ok(Value::Void)
        }));
        program.on_call(VERSION, "UMNTALL", Box::new(move |_, _, _| {
            info!("UMNTALL");
            Ok(Value::Void)
        }));
        let state = self.state.clone();
        let export_list: Callback = Box::new(move |_, _, _| {
            info!("EXPORT");
            let mut result = Value::Void;
            for name in state.exports().keys().rev() {
                result = Value::record(vec![
                    ("ex_dir", Value::text(name.clone())),
                    ("ex_groups", Value::Void),
                    ("ex_next", result),
                ]);
            }
            Ok(result)
        });
        program.on_call(VERSION, "EXPORT", export_list);
        let state = self.state.clone();
        program.on_call(VERSION, "EXPORTALL", Box::new(move |_, _, _| {
            info!("EXPORT");
            let mut result = Value::Void;
            for name in state.exports().keys().rev() {
                result = Value::record(vec![
                    ("ex_dir", Value::text(name.clone())),
                    ("ex_groups", Value::Void),
                    ("ex_next", result),
                ]);
            }
            Ok(result)
        }));
        program
    }
}

impl<F: FileNode> State<F> {
    fn exports(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Filehandle>> {
        self.exports.lock().expect("export table lock poisoned")
    }

    /// Resolves a filehandle structure back to its file object.
    /// Unknown or malformed handles are stale: the token never came
    /// from this table.
    fn resolve(&self, fh: &Value) -> io::Result<Arc<F>> {
        fh.field("data")
            .and_then(Value::as_bytes)
            .and_then(|bytes| self.table.resolve(bytes))
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::StaleNetworkFileHandle, "unknown filehandle")
            })
    }

    fn fh_value(&self, file: Arc<F>) -> Value {
        let fh = self.table.handle_for(file);
        Value::record(vec![("data", Value::Bytes(fh.as_bytes().to_vec()))])
    }

    fn fattr(&self, attrs: &FileAttr) -> Value {
        let (ftype, fmt) = match attrs.kind {
            FileKind::Regular => ("NFREG", nfs2::MODE_REG),
            FileKind::Directory => ("NFDIR", nfs2::MODE_DIR),
            FileKind::BlockDevice => ("NFBLK", nfs2::MODE_BLK),
            FileKind::CharDevice => ("NFCHR", nfs2::MODE_CHR),
            FileKind::Symlink => ("NFLNK", nfs2::MODE_LNK),
            FileKind::Socket => ("NFSOCK", nfs2::MODE_SOCK),
            FileKind::Fifo => ("NFFIFO", nfs2::MODE_FIFO),
            FileKind::Other => ("NFNON", 0),
        };
        Value::record(vec![
            ("type", Value::Name(ftype)),
            ("mode", Value::Uint(attrs.mode | fmt)),
            ("nlink", attrs.nlink.into()),
            ("uid", attrs.uid.into()),
            ("gid", attrs.gid.into()),
            ("size", attrs.size.into()),
            ("blocksize", attrs.blocksize.into()),
            ("rdev", attrs.rdev.into()),
            ("blocks", attrs.blocks.into()),
            ("fsid", self.fsid.into()),
            ("fileid", attrs.fileid.into()),
            ("atime", time_value(attrs.atime)),
            ("mtime", time_value(attrs.mtime)),
            ("ctime", time_value(attrs.ctime)),
        ])
    }
}

/// Maps an I/O failure to its protocol status name. Errors with no
/// defined counterpart become the generic I/O status and are logged
/// in full.
fn status_of(err: &io::Error) -> &'static str {
    use io::ErrorKind;
    match err.kind() {
        ErrorKind::NotFound => "NFSERR_NOENT",
        ErrorKind::PermissionDenied => "NFSERR_ACCES",
        ErrorKind::AlreadyExists => "NFSERR_EXIST",
        ErrorKind::NotADirectory => "NFSERR_NOTDIR",
        ErrorKind::IsADirectory => "NFSERR_ISDIR",
        ErrorKind::InvalidInput => "NFSERR_INVAL",
        ErrorKind::FileTooLarge => "NFSERR_FBIG",
        ErrorKind::StorageFull => "NFSERR_NOSPC",
        ErrorKind::ReadOnlyFilesystem => "NFSERR_ROFS",
        ErrorKind::InvalidFilename => "NFSERR_NAMETOOLONG",
        ErrorKind::DirectoryNotEmpty => "NFSERR_NOTEMPTY",
        ErrorKind::StaleNetworkFileHandle => "NFSERR_STALE",
        _ => {
            error!("unmapped I/O error: {err}");
            "NFSERR_IO"
        }
    }
}

/// Wraps a union-returning procedure body; failures collapse to a
/// bare status discriminant.
fn reply(result: io::Result<Value>) -> Result<Value, RpcError> {
    Ok(result.unwrap_or_else(|err| Value::status(status_of(&err))))
}

/// Wraps a procedure whose whole result is the status enumeration.
fn status_reply(result: io::Result<()>) -> Result<Value, RpcError> {
    Ok(Value::Name(match result {
        Ok(()) => "NFS_OK",
        Err(err) => status_of(&err),
    }))
}

fn ok(fields: Vec<(&'static str, Value)>) -> Value {
    Value::union(Value::Name("NFS_OK"), fields)
}

fn time_value(t: Timestamp) -> Value {
    Value::record(vec![("seconds", t.seconds.into()), ("useconds", t.useconds.into())])
}

// Decoded arguments always match their descriptor, so a missing or
// mistyped component is a wiring bug; it surfaces as the generic I/O
// status rather than a panic.

fn want<'a>(value: &'a Value, name: &str) -> io::Result<&'a Value> {
    value.field(name).ok_or_else(|| invalid_data(format!("missing argument field {name}")))
}

fn want_u32(value: &Value, name: &str) -> io::Result<u32> {
    want(value, name)?
        .as_u32()
        .ok_or_else(|| invalid_data(format!("argument field {name} is not an integer")))
}

fn want_str<'a>(value: &'a Value, name: &str) -> io::Result<&'a str> {
    want(value, name)?
        .as_str()
        .ok_or_else(|| invalid_data(format!("argument field {name} is not a string")))
}

fn want_time(value: &Value, name: &str) -> io::Result<Timestamp> {
    let t = want(value, name)?;
    Ok(Timestamp { seconds: want_u32(t, "seconds")?, useconds: want_u32(t, "useconds")? })
}

fn getattr<F: FileNode>(state: &State<F>, arg: &Value) -> io::Result<Value> {
    let file = state.resolve(arg)?;
    let attrs = file.stat()?;
    info!("GETATTR {}", file.display());
    Ok(ok(vec![("attributes", state.fattr(&attrs))]))
}

fn setattr<F: FileNode>(state: &State<F>, arg: &Value) -> io::Result<Value> {
    let file = state.resolve(want(arg, "file")?)?;
    let sattr = want(arg, "attributes")?;
    let mut attrs = file.stat()?;
    let mut changes = Vec::new();

    // Changing the type of a file is not possible here, and some
    // clients do not fill in the type bits, so those are masked out
    // and keep their current value.
    let mode = want_u32(sattr, "mode")?;
    if mode != UNCHANGED {
        let mode = mode & 0o7777;
        file.change_mode(mode)?;
        attrs.mode = (attrs.mode & !0o7777) | mode;
        changes.push(format!("mode: {mode:05o}"));
    }

    let uid = want_u32(sattr, "uid")?;
    let gid = want_u32(sattr, "gid")?;
    if uid != UNCHANGED || gid != UNCHANGED {
        let uid = if uid == UNCHANGED { attrs.uid } else { uid };
        let gid = if gid == UNCHANGED { attrs.gid } else { gid };
        file.change_owner(uid, gid)?;
        attrs.uid = uid;
        attrs.gid = gid;
        changes.push(format!("uid: {uid}"));
        changes.push(format!("gid: {gid}"));
    }

    let size = want_u32(sattr, "size")?;
    if size != UNCHANGED {
        file.truncate(size)?;
        attrs.size = size;
        changes.push(format!("size: {size}"));
    }

    let atime = want_time(sattr, "atime")?;
    let mtime = want_time(sattr, "mtime")?;
    if atime.seconds != UNCHANGED || mtime.seconds != UNCHANGED {
        let atime = if atime.seconds == UNCHANGED { attrs.atime } else { atime };
        let mtime = if mtime.seconds == UNCHANGED { attrs.mtime } else { mtime };
        file.set_times(atime, mtime)?;
        attrs.atime = atime;
        attrs.mtime = mtime;
        changes.push(format!("atime: {}", atime.seconds));
        changes.push(format!("mtime: {}", mtime.seconds));
    }

    info!("SETATTR {} {}", file.display(), changes.join(", "));
    Ok(ok(vec![("attributes", state.fattr(&attrs))]))
}

fn lookup<F: FileNode>(state: &State<F>, arg: &Value) -> io::Result<Value> {
    let dir = state.resolve(want(arg, "dir")?)?;
    let name = want_str(arg, "name")?;
    let file = dir.lookup(name)?;
    info!("LOOKUP {}", file.display());
    let attrs = file.stat()?;
    Ok(ok(vec![(
        "diropres",
        Value::record(vec![
            ("file", state.fh_value(Arc::new(file))),
            ("attributes", state.fattr(&attrs)),
        ]),
    )]))
}

fn readlink<F: FileNode>(state: &State<F>, arg: &Value) -> io::Result<Value> {
    let file = state.resolve(arg)?;
    info!("READLINK {}", file.display());
    let target = file.read_link()?;
    Ok(ok(vec![("data", Value::text(target))]))
}

fn read<F: FileNode>(state: &State<F>, arg: &Value) -> io::Result<Value> {
    let file = state.resolve(want(arg, "file")?)?;
    info!("READ {}", file.display());
    let attrs = file.stat()?;
    let offset = want_u32(arg, "offset")?;
    // The reply cannot carry more than MAXDATA bytes, so the read is
    // capped before the collaborator sizes a buffer for it.
    let count = want_u32(arg, "count")?.min(nfs2::MAXDATA as u32);
    let data = file.read(offset, count)?;
    Ok(ok(vec![(
        "reply",
        Value::record(vec![("attributes", state.fattr(&attrs)), ("data", Value::Bytes(data))]),
    )]))
}

fn write<F: FileNode>(state: &State<F>, arg: &Value) -> io::Result<Value> {
    let file = state.resolve(want(arg, "file")?)?;
    info!("WRITE {}", file.display());
    let offset = want_u32(arg, "offset")?;
    let data = want(arg, "data")?
        .as_bytes()
        .ok_or_else(|| invalid_data("argument field data is not opaque"))?;
    file.write(offset, data)?;
    let attrs = file.stat()?;
    Ok(ok(vec![("attributes", state.fattr(&attrs))]))
}

fn create<F: FileNode>(state: &State<F>, arg: &Value) -> io::Result<Value> {
    let dirop = want(arg, "where")?;
    let dir = state.resolve(want(dirop, "dir")?)?;
    let name = want_str(dirop, "name")?;
    let sattr = want(arg, "attributes")?;
    info!("CREATE {name}");
    let (file, attrs) = dir.create(
        name,
        want_u32(sattr, "mode")?,
        want_u32(sattr, "uid")?,
        want_u32(sattr, "gid")?,
    )?;
    Ok(ok(vec![(
        "diropres",
        Value::record(vec![
            ("file", state.fh_value(Arc::new(file))),
            ("attributes", state.fattr(&attrs)),
        ]),
    )]))
}

fn remove<F: FileNode>(state: &State<F>, arg: &Value) -> io::Result<()> {
    let dir = state.resolve(want(arg, "dir")?)?;
    let name = want_str(arg, "name")?;
    info!("REMOVE {name}");
    dir.unlink(name)
}

fn rename<F: FileNode>(state: &State<F>, arg: &Value) -> io::Result<()> {
    let from = want(arg, "from")?;
    let to = want(arg, "to")?;
    let from_dir = state.resolve(want(from, "dir")?)?;
    let from_name = want_str(from, "name")?;
    let to_dir = state.resolve(want(to, "dir")?)?;
    let to_name = want_str(to, "name")?;
    info!("RENAME {}/{from_name} to {}/{to_name}", from_dir.display(), to_dir.display());
    from_dir.rename(from_name, &to_dir, to_name)
}

fn link<F: FileNode>(state: &State<F>, arg: &Value) -> io::Result<()> {
    let from = state.resolve(want(arg, "from")?)?;
    let to = want(arg, "to")?;
    let to_dir = state.resolve(want(to, "dir")?)?;
    let to_name = want_str(to, "name")?;
    info!("LINK {} to {}/{to_name}", from.display(), to_dir.display());
    from.link(&to_dir, to_name)
}

fn symlink<F: FileNode>(state: &State<F>, arg: &Value) -> io::Result<()> {
    let from = want(arg, "from")?;
    let dir = state.resolve(want(from, "dir")?)?;
    let name = want_str(from, "name")?;
    let target = want_str(arg, "to")?;
    // The attributes argument is accepted and ignored; symlink modes
    // are meaningless on every target platform.
    info!("SYMLINK {}/{name} to {target}", dir.display());
    dir.symlink(name, target)
}

fn mkdir<F: FileNode>(state: &State<F>, arg: &Value) -> io::Result<Value> {
    let dirop = want(arg, "where")?;
    let dir = state.resolve(want(dirop, "dir")?)?;
    let name = want_str(dirop, "name")?;
    let sattr = want(arg, "attributes")?;
    info!("MKDIR {name}");
    let (file, attrs) = dir.make_directory(
        name,
        want_u32(sattr, "mode")?,
        want_u32(sattr, "uid")?,
        want_u32(sattr, "gid")?,
    )?;
    Ok(ok(vec![(
        "diropres",
        Value::record(vec![
            ("file", state.fh_value(Arc::new(file))),
            ("attributes", state.fattr(&attrs)),
        ]),
    )]))
}

fn rmdir<F: FileNode>(state: &State<F>, arg: &Value) -> io::Result<()> {
    let dir = state.resolve(want(arg, "dir")?)?;
    let name = want_str(arg, "name")?;
    info!("RMDIR {name}");
    dir.remove_directory(name)
}

fn readdir<F: FileNode>(state: &State<F>, arg: &Value) -> io::Result<Value> {
    let dir = state.resolve(want(arg, "dir")?)?;
    info!("READDIR {}", dir.display());
    let mut cookie = want_u32(arg, "cookie")? as usize;
    let count = want_u32(arg, "count")? as usize;

    let names = dir.list_entries()?;

    // Walk the listing from the cookie forward, budgeting the reply
    // against the caller's byte count: a fixed amount of framing up
    // front, then each entry's encoded name plus its fixed fields.
    let mut need_bytes = 16 + 12;
    let mut taken = Vec::new();
    while cookie < names.len() && need_bytes < count {
        let name = &names[cookie];
        need_bytes += nfs2::FILENAME.encode_to_vec(&Value::text(name.clone()))?.len();
        taken.push((name.clone(), cookie as u32));
        cookie += 1;
        need_bytes += 16;
    }
    let eof = if need_bytes > count { "FALSE" } else { "TRUE" };

    // The linked entry chain is built innermost first.
    let mut entries = Value::Void;
    for (name, cookie) in taken.into_iter().rev() {
        entries = Value::record(vec![
            // Some clients reject a zero fileid, so a constant
            // placeholder inode number is reported.
            ("fileid", Value::Uint(1)),
            ("name", Value::text(name)),
            ("cookie", Value::Uint(cookie)),
            ("nextentry", entries),
        ]);
    }

    Ok(ok(vec![(
        "reply",
        Value::record(vec![("entries", entries), ("eof", Value::Name(eof))]),
    )]))
}

fn statfs() -> io::Result<Value> {
    info!("STATFS");
    // Fixed figures; the protocol has no way to say "unknown" and
    // clients only use these for progress reporting.
    Ok(ok(vec![(
        "reply",
        Value::record(vec![
            ("tsize", Value::Uint(1024)),
            ("bsize", Value::Uint(1024)),
            ("blocks", Value::Uint(100)),
            ("bfree", Value::Uint(100)),
            ("bavail", Value::Uint(100)),
        ]),
    )]))
}

fn mnt<F: FileNode>(state: &State<F>, arg: &Value) -> io::Result<Value> {
    let path = arg.as_str().ok_or_else(|| invalid_data("mount argument is not a path"))?;
    let exports = state.exports();
    match exports.get(path) {
        Some(fh) => {
            info!("MNT {path}");
            Ok(ok(vec![(
                "fhs_fhandle",
                Value::record(vec![("data", Value::Bytes(fh.as_bytes().to_vec()))]),
            )]))
        }
        // Unknown paths are a permission failure, not a lookup
        // failure: the reply must not reveal what exists.
        None => Ok(Value::status("NFSERR_ACCES")),
    }
}
