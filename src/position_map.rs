//! Position map (C7): the scanned entry table, owning the bytes it was
//! built from so a map can safely outlive the call that built it.
use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::Error;
use crate::policy::{DuplicateKeyPolicy, Policy};
use crate::scanner::{self, Entry};

/// An index-addressed, read-only view over a decoded document: the entry
/// table produced by [`scanner::scan`] plus the byte buffer it was built
/// from. Every node is an index into this table; subtree sizes make
/// `index + subtree_size` the next sibling in O(1).
///
/// Not `Sync`: the lazily-built object key-lookup cache uses interior
/// mutability and is not safe to query from multiple threads at once.
pub struct PositionMap {
    pub(crate) bytes: Vec<u8>,
    pub(crate) entries: Vec<Entry>,
    pub(crate) duplicate_key_policy: DuplicateKeyPolicy,
    /// Object entry index -> (key -> value entry index), built on first
    /// `object_lookup` for objects past the linear-scan threshold.
    pub(crate) key_cache: RefCell<HashMap<usize, HashMap<String, usize>>>,
}

impl PositionMap {
    /// Scan `bytes` under `policy`, producing the full entry table. Fails
    /// with the same errors [`scanner::scan`] can raise; no partial map is
    /// ever returned.
    pub fn build_from_bytes(bytes: &[u8], policy: Policy) -> Result<PositionMap, Error> {
        let duplicate_key_policy = policy.duplicate_key_policy();
        let entries = scanner::scan(bytes, &policy)?;
        Ok(PositionMap {
            bytes: bytes.to_vec(),
            entries,
            duplicate_key_policy,
            key_cache: RefCell::new(HashMap::new()),
        })
    }

    /// The root value's entry index — always `0` for a non-empty map.
    pub fn root_index(&self) -> usize {
        0
    }

    /// Total number of entries in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn entry(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    /// The entry index immediately following the subtree rooted at
    /// `index`, i.e. its next sibling (or one past the end of the table
    /// for the last node at the root level).
    pub(crate) fn next_sibling(&self, index: usize) -> usize {
        index + self.entries[index].subtree_size
    }
}
