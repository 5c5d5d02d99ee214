//! Printable rendering of raw keys and values for log output.

use std::fmt;

use itertools::Itertools as _;

/// Displays raw bytes as an escaped, quoted ASCII string.
///
/// Used in tracing fields so binary keys never end up verbatim in logs.
pub struct Raw<'a>(pub &'a [u8]);

impl Raw<'_> {
    /// Values longer than this are truncated with a trailing `..`.
    const MAX_SHOWN: usize = 64;
}

impl fmt::Display for Raw<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = &self.0[..self.0.len().min(Self::MAX_SHOWN)];
        let escaped = shown
            .iter()
            .copied()
            .flat_map(std::ascii::escape_default)
            .collect_vec();
        write!(f, "\"{}\"", String::from_utf8_lossy(&escaped))?;
        if self.0.len() > Self::MAX_SHOWN {
            write!(f, "..")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Raw<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
