use super::RangeDescriptor;
use crate::index::{Entry, SortedIndex};

/// Resolves `desc` against `index` into a lazy, capped, ascending scan.
///
/// A cap of zero returns an empty scan without consulting the index.
pub fn scan<'a, I>(index: &'a I, desc: &RangeDescriptor) -> RangeScan<I::Cursor<'a>>
where
    I: SortedIndex + ?Sized,
{
    if desc.max_results == 0 {
        return RangeScan::exhausted(desc);
    }
    RangeScan::new(index.lower_bound(&desc.left_key), desc)
}

/// An iterator adapter that turns a cursor positioned at the lower bound of
/// `left_key` into the entries of one range query.
///
/// ```ignore
/// let desc = RangeDescriptor::new("foo", "fop").right_open(true).max_results(100);
/// for entry in scan(&index, &desc) {
///     // entries with "foo" <= key < "fop", at most 100 of them
/// }
/// ```
pub struct RangeScan<C> {
    /// Dropped once the scan ends, releasing whatever the cursor pins.
    inner: Option<C>,
    desc: RangeDescriptor,
    /// Only the first entry can sit on the left boundary.
    at_start: bool,
    remaining: usize,
}

impl<C> RangeScan<C>
where
    C: Iterator<Item = Entry>,
{
    /// Wraps a cursor already positioned at the first key >= `desc.left_key`.
    pub fn new(inner: C, desc: &RangeDescriptor) -> Self {
        Self {
            inner: Some(inner),
            desc: desc.clone(),
            at_start: true,
            remaining: desc.max_results,
        }
    }

    fn exhausted(desc: &RangeDescriptor) -> Self {
        Self {
            inner: None,
            desc: desc.clone(),
            at_start: false,
            remaining: 0,
        }
    }

    fn finish(&mut self) -> Option<Entry> {
        self.inner = None;
        self.remaining = 0;
        None
    }
}

impl<C> Iterator for RangeScan<C>
where
    C: Iterator<Item = Entry>,
{
    type Item = Entry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return self.finish();
        }
        let inner = self.inner.as_mut()?;

        let mut next = inner.next();
        if std::mem::take(&mut self.at_start) {
            if let Some(entry) = &next {
                if self.desc.excludes_left(&entry.key) {
                    next = inner.next();
                }
            }
        }

        let Some(entry) = next else {
            return self.finish();
        };
        if self.desc.is_past_end(&entry.key) {
            return self.finish();
        }

        self.remaining -= 1;
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.inner {
            Some(inner) => {
                let upper = inner
                    .size_hint()
                    .1
                    .map_or(self.remaining, |n| n.min(self.remaining));
                (0, Some(upper))
            }
            None => (0, Some(0)),
        }
    }
}
