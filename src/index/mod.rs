//! Sorted index: ordered mapping from byte-string keys to value records.
//!
//! The range-query engine only needs an "ordered snapshot read" capability,
//! expressed by [`SortedIndex`]. Two backends implement it:
//!
//! - [`SkipListIndex`]: a lock-free concurrent skip list. Range iteration is
//!   fail-safe under concurrent writes: keys are always yielded in ascending
//!   order, and an entry written while a scan is running may or may not be
//!   observed.
//! - [`SnapshotIndex`]: a copy-on-write sorted array. A scan pins the array
//!   that was current when it started, so it never observes later writes.
//!
//! Both store values behind `Arc`, so an entry is always observed whole.

mod skiplist;
mod snapshot;

pub use skiplist::{SkipListCursor, SkipListIndex};
pub use snapshot::{SnapshotCursor, SnapshotIndex};

use bytes::Bytes;
use std::sync::Arc;

/// Opaque payload stored under a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueRecord {
    pub flags: u32,
    pub data: Bytes,
}

impl ValueRecord {
    pub fn new(flags: u32, data: impl Into<Bytes>) -> Self {
        Self {
            flags,
            data: data.into(),
        }
    }
}

/// A key together with the record stored under it at the time it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Bytes,
    pub value: Arc<ValueRecord>,
}

impl Entry {
    pub fn new(key: impl Into<Bytes>, value: ValueRecord) -> Self {
        Self {
            key: key.into(),
            value: Arc::new(value),
        }
    }
}

pub trait SortedIndex: Send + Sync {
    /// Ascending iterator returned by lower_bound().
    type Cursor<'a>: Iterator<Item = Entry> + 'a
    where
        Self: 'a;

    /// Returns a cursor positioned at the first entry whose key is >= `key`.
    fn lower_bound<'a>(&'a self, key: &[u8]) -> Self::Cursor<'a>;

    /// Iterates over every entry in key order.
    fn iter<'a>(&'a self) -> Self::Cursor<'a> {
        self.lower_bound(&[])
    }

    /// Retrieves the record for a given key.
    fn get(&self, key: &[u8]) -> Option<Arc<ValueRecord>>;

    /// Inserts or replaces the record stored under `key`.
    fn insert(&self, key: Bytes, value: ValueRecord);

    /// Removes `key`, returning whether it was present.
    fn remove(&self, key: &[u8]) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shared tests run against every backend.
#[cfg(test)]
pub(crate) mod conformance {
    use super::*;

    pub fn keys<I: SortedIndex>(cursor: I::Cursor<'_>) -> Vec<Bytes> {
        cursor.map(|entry| entry.key).collect()
    }

    pub fn test_iterates_in_key_order<I: SortedIndex>(index: I) {
        for key in ["key3", "key1", "key2"] {
            index.insert(Bytes::from(key), ValueRecord::new(0, key.as_bytes().to_vec()));
        }

        assert_eq!(
            keys::<I>(index.iter()),
            vec![
                Bytes::from("key1"),
                Bytes::from("key2"),
                Bytes::from("key3")
            ]
        );
    }

    pub fn test_lower_bound<I: SortedIndex>(index: I) {
        for key in ["b", "d", "f"] {
            index.insert(Bytes::from(key), ValueRecord::new(0, Bytes::new()));
        }

        // Exact hit starts at the key itself
        assert_eq!(
            keys::<I>(index.lower_bound(b"d")),
            vec![Bytes::from("d"), Bytes::from("f")]
        );
        // Missing key starts at its successor
        assert_eq!(
            keys::<I>(index.lower_bound(b"c")),
            vec![Bytes::from("d"), Bytes::from("f")]
        );
        // Below everything / above everything
        assert_eq!(keys::<I>(index.lower_bound(b"a")).len(), 3);
        assert!(keys::<I>(index.lower_bound(b"g")).is_empty());
        // A longer key sorts after its prefix
        assert_eq!(keys::<I>(index.lower_bound(b"d\x00")), vec![Bytes::from("f")]);
    }

    pub fn test_insert_get_remove<I: SortedIndex>(index: I) {
        assert!(index.is_empty());

        index.insert(Bytes::from("key1"), ValueRecord::new(7, "value1"));
        index.insert(Bytes::from("key2"), ValueRecord::new(0, "value2"));
        assert_eq!(index.len(), 2);
        assert_eq!(
            index.get(b"key1").as_deref(),
            Some(&ValueRecord::new(7, "value1"))
        );

        // Overwrite keeps a single entry per key
        index.insert(Bytes::from("key1"), ValueRecord::new(9, "other"));
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(b"key1").map(|v| v.flags), Some(9));

        assert!(index.remove(b"key1"));
        assert!(!index.remove(b"key1"));
        assert_eq!(index.get(b"key1"), None);
        assert_eq!(index.len(), 1);
    }
}
