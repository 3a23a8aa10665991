//! Ordered-table contract the posting-list store is built on.
//!
//! The store is generic over any ordered byte-key/byte-value map that can
//! answer exact lookups and two seek queries: the largest entry at or below
//! a key, and the smallest entry above a key. A `BTreeMap`-backed
//! implementation is provided for in-memory use and tests; a disk-backed
//! B-tree drops in behind the same trait.

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::error::Result;

/// An ordered map from byte keys to byte tags.
///
/// Keys compare lexicographically. All operations may touch storage, so all
/// of them are fallible; the in-memory implementation never fails.
pub trait Table {
    /// Tag stored under exactly `key`, if any.
    fn get_exact(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn key_exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get_exact(key)?.is_some())
    }

    /// Insert or replace the tag under `key`.
    fn add(&mut self, key: &[u8], tag: &[u8]) -> Result<()>;

    /// Remove `key`; removing an absent key is a no-op.
    fn del(&mut self, key: &[u8]) -> Result<()>;

    /// Entry with the largest key `<= key`.
    fn seek_floor(&self, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>>;

    /// Entry with the smallest key `> key`.
    fn seek_next(&self, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>>;
}

/// In-memory reference [`Table`].
#[derive(Debug, Default, Clone)]
pub struct MemTable {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate all entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }
}

impl Table for MemTable {
    fn get_exact(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn add(&mut self, key: &[u8], tag: &[u8]) -> Result<()> {
        self.entries.insert(key.to_vec(), tag.to_vec());
        Ok(())
    }

    fn del(&mut self, key: &[u8]) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn seek_floor(&self, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .entries
            .range::<[u8], _>((Bound::Unbounded, Bound::Included(key)))
            .next_back()
            .map(|(k, v)| (k.clone(), v.clone())))
    }

    fn seek_next(&self, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .entries
            .range::<[u8], _>((Bound::Excluded(key), Bound::Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), v.clone())))
    }
}
