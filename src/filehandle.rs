//! Filehandle generation and the bidirectional handle table.
//!
//! A filehandle is a 32-byte opaque token. Handles are generated by a
//! byte-array counter: byte 0 increments first and carries into the
//! following bytes on overflow, so the sequence never repeats within
//! a process lifetime.
//!
//! The table is the single source of truth for handle <-> file
//! mappings. Entries are created lazily on first export or lookup of
//! an object and are never evicted; a long-running server accumulates
//! memory proportional to the number of distinct files ever
//! referenced. That is a known bound on deployment lifetime, kept
//! deliberately.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use crate::protocol::nfs2::FHSIZE;

/// A fixed-size opaque filehandle token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Filehandle(pub [u8; FHSIZE]);

impl Filehandle {
    /// Advances the counter by one, carrying across bytes.
    pub fn increment(&mut self) {
        for byte in &mut self.0 {
            *byte = byte.wrapping_add(1);
            if *byte != 0 {
                break;
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Filehandle> {
        let data: [u8; FHSIZE] = bytes.try_into().ok()?;
        Some(Filehandle(data))
    }
}

struct Tables<F> {
    by_handle: HashMap<Filehandle, Arc<F>>,
    by_file: HashMap<Arc<F>, Filehandle>,
    next: Filehandle,
}

/// Bidirectional handle table. The lock covers lookup-or-insert, so
/// two concurrent first-time lookups of one object cannot mint two
/// handles.
pub struct HandleTable<F> {
    tables: Mutex<Tables<F>>,
}

impl<F: Eq + Hash> HandleTable<F> {
    pub fn new() -> Self {
        HandleTable {
            tables: Mutex::new(Tables {
                by_handle: HashMap::new(),
                by_file: HashMap::new(),
                next: Filehandle::default(),
            }),
        }
    }

    /// Returns the handle for `file`, minting one on first reference.
    pub fn handle_for(&self, file: Arc<F>) -> Filehandle {
        let mut tables = self.tables.lock().expect("handle table lock poisoned");
        if let Some(fh) = tables.by_file.get(&file) {
            return *fh;
        }
        let fh = tables.next;
        tables.next.increment();
        tables.by_handle.insert(fh, file.clone());
        tables.by_file.insert(file, fh);
        fh
    }

    /// Resolves raw handle bytes back to the file object.
    pub fn resolve(&self, bytes: &[u8]) -> Option<Arc<F>> {
        let fh = Filehandle::from_bytes(bytes)?;
        let tables = self.tables.lock().expect("handle table lock poisoned");
        tables.by_handle.get(&fh).cloned()
    }
}

impl<F: Eq + Hash> Default for HandleTable<F> {
    fn default() -> Self {
        HandleTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_carries_across_bytes() {
        let mut fh = Filehandle::default();
        fh.0[0] = 255;
        fh.increment();
        assert_eq!(fh.0[0], 0);
        assert_eq!(fh.0[1], 1);

        let mut fh = Filehandle::default();
        fh.0[0] = 255;
        fh.0[1] = 255;
        fh.increment();
        assert_eq!(&fh.0[..3], &[0, 0, 1]);
    }

    #[test]
    fn first_handle_is_all_zeroes() {
        let table = HandleTable::new();
        let fh = table.handle_for(Arc::new("root".to_string()));
        assert_eq!(fh.as_bytes(), &[0u8; FHSIZE]);
    }

    #[test]
    fn same_object_same_handle() {
        let table = HandleTable::new();
        let file = Arc::new("a".to_string());
        let first = table.handle_for(file.clone());
        let second = table.handle_for(file);
        assert_eq!(first, second);
    }

    #[test]
    fn distinct_objects_distinct_handles() {
        let table = HandleTable::new();
        let mut seen = std::collections::HashSet::new();
        for i in 0..300 {
            let fh = table.handle_for(Arc::new(format!("file-{i}")));
            assert!(seen.insert(fh), "duplicate handle at {i}");
        }
        // 300 allocations saturate byte 0 once, exercising the carry.
        let tables = table.tables.lock().unwrap();
        assert_eq!(u32::from(tables.next.0[0]), 300 % 256);
        assert_eq!(tables.next.0[1], 1);
    }

    #[test]
    fn resolve_round_trips() {
        let table = HandleTable::new();
        let file = Arc::new("a".to_string());
        let fh = table.handle_for(file.clone());
        assert_eq!(table.resolve(fh.as_bytes()), Some(file));
        assert_eq!(table.resolve(&[7u8; FHSIZE]), None);
        assert_eq!(table.resolve(&[0u8; 4]), None);
    }
}
