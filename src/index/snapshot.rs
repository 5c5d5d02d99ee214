//! Copy-on-write sorted array.
//!
//! Readers clone the `Arc` of the current array under a read lock that is
//! released immediately; the clone is the scan's snapshot. Writers take the
//! write lock, and `Arc::make_mut` copies the array only if a scan still
//! holds the old one. Lookups are binary searches; a cursor step is an
//! index increment.

use super::{Entry, SortedIndex, ValueRecord};
use bytes::Bytes;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct SnapshotIndex {
    entries: RwLock<Arc<Vec<Entry>>>,
}

impl SnapshotIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// The array current at the time of the call.
    pub fn snapshot(&self) -> Arc<Vec<Entry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn search(entries: &[Entry], key: &[u8]) -> Result<usize, usize> {
        entries.binary_search_by(|entry| entry.key.as_ref().cmp(key))
    }
}

/// Cursor over a pinned snapshot.
pub struct SnapshotCursor {
    entries: Arc<Vec<Entry>>,
    pos: usize,
}

impl Iterator for SnapshotCursor {
    type Item = Entry;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entries.get(self.pos)?.clone();
        self.pos += 1;
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.entries.len().saturating_sub(self.pos);
        (remaining, Some(remaining))
    }
}

impl SortedIndex for SnapshotIndex {
    type Cursor<'a> = SnapshotCursor;

    fn lower_bound<'a>(&'a self, key: &[u8]) -> Self::Cursor<'a> {
        let entries = self.snapshot();
        let pos = entries.partition_point(|entry| entry.key.as_ref() < key);
        SnapshotCursor { entries, pos }
    }

    fn get(&self, key: &[u8]) -> Option<Arc<ValueRecord>> {
        let entries = self.snapshot();
        Self::search(&entries, key)
            .ok()
            .map(|pos| entries[pos].value.clone())
    }

    fn insert(&self, key: Bytes, value: ValueRecord) {
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entries = Arc::make_mut(&mut guard);
        let entry = Entry {
            key,
            value: Arc::new(value),
        };
        match Self::search(entries, &entry.key) {
            Ok(pos) => entries[pos] = entry,
            Err(pos) => entries.insert(pos, entry),
        }
    }

    fn remove(&self, key: &[u8]) -> bool {
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match Self::search(&guard, key) {
            Ok(pos) => {
                Arc::make_mut(&mut guard).remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
