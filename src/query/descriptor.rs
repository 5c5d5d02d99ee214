use bytes::Bytes;

/// Boundaries and cap of a single range query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeDescriptor {
    pub left_key: Bytes,
    pub right_key: Bytes,
    /// Exclude an entry whose key equals `left_key`.
    pub left_open: bool,
    /// Exclude an entry whose key equals `right_key`.
    pub right_open: bool,
    pub max_results: usize,
}

impl RangeDescriptor {
    /// A closed range `[left, right]` without a cap.
    pub fn new(left_key: impl Into<Bytes>, right_key: impl Into<Bytes>) -> Self {
        Self {
            left_key: left_key.into(),
            right_key: right_key.into(),
            left_open: false,
            right_open: false,
            max_results: usize::MAX,
        }
    }

    pub fn left_open(mut self, open: bool) -> Self {
        self.left_open = open;
        self
    }

    pub fn right_open(mut self, open: bool) -> Self {
        self.right_open = open;
        self
    }

    pub fn max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    /// The descriptor for the page following one that ended at `last_key`.
    pub fn next_page(&self, last_key: impl Into<Bytes>) -> Self {
        Self {
            left_key: last_key.into(),
            left_open: true,
            ..self.clone()
        }
    }

    /// Whether `key` lies past the right boundary and therefore ends a scan.
    pub fn is_past_end(&self, key: &[u8]) -> bool {
        if self.right_open {
            key >= &self.right_key[..]
        } else {
            key > &self.right_key[..]
        }
    }

    /// Whether an entry with `key` is dropped by an open left boundary.
    pub fn excludes_left(&self, key: &[u8]) -> bool {
        self.left_open && key == &self.left_key[..]
    }
}
