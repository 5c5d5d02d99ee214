//! Sorted index backed by a concurrent skip list.
//!
//! `crossbeam-skiplist::SkipMap` gives us what the range engine needs
//! without any lock:
//!
//! - **Ordered traversal** in byte-lexicographic key order
//! - **O(log n) seeks** for the lower bound of a scan
//! - **Concurrent reads and writes**: a range iterator keeps walking the
//!   list while other threads insert or remove, and never goes backwards
//!
//! Records are stored as `Arc<ValueRecord>` and replaced wholesale on
//! overwrite, so a reader clones a complete record or none at all.

use super::{Entry, SortedIndex, ValueRecord};
use bytes::Bytes;
use crossbeam_skiplist::SkipMap;
use std::ops::Bound;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct SkipListIndex {
    data: SkipMap<Bytes, Arc<ValueRecord>>,
}

impl SkipListIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

type SkipMapRange<'a> = crossbeam_skiplist::map::Range<
    'a,
    Bytes,
    (Bound<Bytes>, Bound<Bytes>),
    Bytes,
    Arc<ValueRecord>,
>;

/// Cursor over a live skip list.
pub struct SkipListCursor<'a> {
    inner: SkipMapRange<'a>,
}

impl Iterator for SkipListCursor<'_> {
    type Item = Entry;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|entry| Entry {
            key: entry.key().clone(),
            value: entry.value().clone(),
        })
    }
}

impl SortedIndex for SkipListIndex {
    type Cursor<'a> = SkipListCursor<'a>;

    fn lower_bound<'a>(&'a self, key: &[u8]) -> Self::Cursor<'a> {
        let range = (Bound::Included(Bytes::copy_from_slice(key)), Bound::Unbounded);
        SkipListCursor {
            inner: self.data.range(range),
        }
    }

    fn get(&self, key: &[u8]) -> Option<Arc<ValueRecord>> {
        self.data.get(key).map(|entry| entry.value().clone())
    }

    fn insert(&self, key: Bytes, value: ValueRecord) {
        self.data.insert(key, Arc::new(value));
    }

    fn remove(&self, key: &[u8]) -> bool {
        self.data.remove(key).is_some()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::conformance;
    use std::thread;

    #[test]
    fn test_iterates_in_key_order() {
        conformance::test_iterates_in_key_order(SkipListIndex::new());
    }

    #[test]
    fn test_lower_bound() {
        conformance::test_lower_bound(SkipListIndex::new());
    }

    #[test]
    fn test_insert_get_remove() {
        conformance::test_insert_get_remove(SkipListIndex::new());
    }

    #[test]
    fn test_cursor_stays_ascending_under_concurrent_writes() {
        let index = Arc::new(SkipListIndex::new());
        for i in (0..1000).step_by(2) {
            index.insert(
                Bytes::from(format!("key{:05}", i)),
                ValueRecord::new(0, "even"),
            );
        }

        let writer = {
            let index = index.clone();
            thread::spawn(move || {
                for i in (1..1000).step_by(2) {
                    index.insert(
                        Bytes::from(format!("key{:05}", i)),
                        ValueRecord::new(1, "odd"),
                    );
                    if i % 3 == 0 {
                        index.remove(format!("key{:05}", i - 1).as_bytes());
                    }
                }
            })
        };

        for _ in 0..20 {
            let keys: Vec<_> = index.iter().map(|entry| entry.key).collect();
            assert!(keys.windows(2).all(|w| w[0] < w[1]), "keys went backwards");
        }

        writer.join().expect("writer thread panicked");
        // Writer inserted 500 odd keys and removed one even key per multiple of 3.
        let removed = (1..1000).step_by(2).filter(|i| i % 3 == 0).count();
        assert_eq!(index.len(), 1000 - removed);
    }

    #[test]
    fn test_overwritten_record_is_seen_whole() {
        let index = Arc::new(SkipListIndex::new());
        index.insert(Bytes::from("k"), ValueRecord::new(0, vec![b'a'; 64]));

        let writer = {
            let index = index.clone();
            thread::spawn(move || {
                for round in 0..500u32 {
                    let fill = if round % 2 == 0 { b'b' } else { b'a' };
                    index.insert(Bytes::from("k"), ValueRecord::new(round, vec![fill; 64]));
                }
            })
        };

        for _ in 0..500 {
            let record = index.get(b"k").expect("key must stay present");
            let first = record.data[0];
            assert!(record.data.iter().all(|b| *b == first), "torn record");
        }

        writer.join().expect("writer thread panicked");
    }
}
