//! Range-query engine.
//!
//! A [`RangeDescriptor`] names two boundary keys, whether each is open, and
//! a result cap. [`scan`] resolves it against any [`SortedIndex`] into a lazy
//! [`RangeScan`]:
//!
//! 1. Seek to the first entry with `key >= left_key`; if `left_open` and that
//!    key equals `left_key`, skip it.
//! 2. Yield entries in ascending order until one is past `right_key` (or
//!    equal to it with `right_open`), the index ends, or `max_results`
//!    entries have been yielded.
//!
//! Boundary keys do not have to exist in the index. Only exact key equality
//! triggers open/closed exclusion.
//!
//! # Pagination
//!
//! The engine keeps no cursor between calls. To enumerate a large range,
//! re-issue the query with the last returned key as an open lower bound
//! ([`RangeDescriptor::next_page`]). A page shorter than the page size is the
//! last one. [`Pager`] does exactly that over an in-process index.
//!
//! [`SortedIndex`]: crate::index::SortedIndex

mod descriptor;
mod pager;
mod scan;

pub use descriptor::RangeDescriptor;
pub use pager::Pager;
pub use scan::{scan, RangeScan};
