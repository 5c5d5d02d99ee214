use super::{scan, RangeDescriptor};
use crate::index::{Entry, SortedIndex};

/// Iterates over a range one page at a time.
///
/// Each page is an independent query: the first uses the descriptor as
/// given, every following one starts just after the last key of the
/// previous page. Iteration ends after the first page shorter than
/// `page_size`, or on an empty page.
pub struct Pager<'a, I: ?Sized> {
    index: &'a I,
    desc: RangeDescriptor,
    done: bool,
}

impl<'a, I> Pager<'a, I>
where
    I: SortedIndex + ?Sized,
{
    /// `desc.max_results` is overwritten with `page_size`.
    pub fn new(index: &'a I, desc: RangeDescriptor, page_size: usize) -> Self {
        Self {
            index,
            done: page_size == 0,
            desc: desc.max_results(page_size),
        }
    }
}

impl<I> Iterator for Pager<'_, I>
where
    I: SortedIndex + ?Sized,
{
    type Item = Vec<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let page: Vec<Entry> = scan(self.index, &self.desc).collect();
        match page.last() {
            None => {
                self.done = true;
                return None;
            }
            Some(last) => {
                self.done = page.len() < self.desc.max_results;
                self.desc = self.desc.next_page(last.key.clone());
            }
        }
        Some(page)
    }
}
