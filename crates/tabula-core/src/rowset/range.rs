//! Row ranges with independently open, closed, or unbounded ends.

use crate::row::RowKey;
use std::fmt;
use std::ops::Bound;

/// A contiguous interval of row-key space.
///
/// A range whose start lies after its end is empty and selects no rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRange {
    pub start: Bound<RowKey>,
    pub end: Bound<RowKey>,
}

impl RowRange {
    /// Half-open range `[start, end)`.
    pub fn new(start: impl Into<RowKey>, end: impl Into<RowKey>) -> Self {
        Self {
            start: Bound::Included(start.into()),
            end: Bound::Excluded(end.into()),
        }
    }

    /// Closed range `[start, end]`.
    pub fn closed(start: impl Into<RowKey>, end: impl Into<RowKey>) -> Self {
        Self {
            start: Bound::Included(start.into()),
            end: Bound::Included(end.into()),
        }
    }

    /// Open range `(start, end)`.
    pub fn open(start: impl Into<RowKey>, end: impl Into<RowKey>) -> Self {
        Self {
            start: Bound::Excluded(start.into()),
            end: Bound::Excluded(end.into()),
        }
    }

    /// Range `(start, end]`.
    pub fn open_closed(start: impl Into<RowKey>, end: impl Into<RowKey>) -> Self {
        Self {
            start: Bound::Excluded(start.into()),
            end: Bound::Included(end.into()),
        }
    }

    /// Every row of the table.
    pub fn infinite() -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Unbounded,
        }
    }

    /// `[start, end of table)`.
    pub fn starting_at(start: impl Into<RowKey>) -> Self {
        Self {
            start: Bound::Included(start.into()),
            end: Bound::Unbounded,
        }
    }

    /// `[beginning of table, end)`.
    pub fn ending_before(end: impl Into<RowKey>) -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Excluded(end.into()),
        }
    }

    /// Every row whose key starts with `prefix`.
    pub fn prefix(prefix: impl Into<RowKey>) -> Self {
        let prefix = prefix.into();
        let end = match prefix_successor(prefix.as_bytes()) {
            Some(end) => Bound::Excluded(end),
            None => Bound::Unbounded,
        };
        Self {
            start: Bound::Included(prefix),
            end,
        }
    }

    pub fn contains(&self, key: &RowKey) -> bool {
        let after_start = match &self.start {
            Bound::Unbounded => true,
            Bound::Included(s) => key >= s,
            Bound::Excluded(s) => key > s,
        };
        let before_end = match &self.end {
            Bound::Unbounded => true,
            Bound::Included(e) => key <= e,
            Bound::Excluded(e) => key < e,
        };
        after_start && before_end
    }

    /// True when no key satisfies both bounds.
    pub fn is_empty(&self) -> bool {
        match (&self.start, &self.end) {
            (_, Bound::Excluded(e)) if e.is_empty() => true,
            (Bound::Unbounded, _) | (_, Bound::Unbounded) => false,
            (Bound::Included(s), Bound::Included(e)) => s > e,
            (Bound::Included(s), Bound::Excluded(e)) => s >= e,
            (Bound::Excluded(s), Bound::Included(e)) => s >= e,
            // (s, e) holds nothing when e is at or before the key right after s.
            (Bound::Excluded(s), Bound::Excluded(e)) => *e <= s.successor(),
        }
    }

    /// The part of this range strictly after `key`.
    ///
    /// The result may be empty; a start already past `key` is kept as is.
    pub fn retain_rows_after(&self, key: &RowKey) -> RowRange {
        let start = match &self.start {
            Bound::Included(s) if s > key => Bound::Included(s.clone()),
            Bound::Excluded(s) if s >= key => Bound::Excluded(s.clone()),
            _ => Bound::Excluded(key.clone()),
        };
        RowRange {
            start,
            end: self.end.clone(),
        }
    }

    /// The part of this range strictly before `key`.
    pub fn retain_rows_before(&self, key: &RowKey) -> RowRange {
        let end = match &self.end {
            Bound::Included(e) if e < key => Bound::Included(e.clone()),
            Bound::Excluded(e) if e <= key => Bound::Excluded(e.clone()),
            _ => Bound::Excluded(key.clone()),
        };
        RowRange {
            start: self.start.clone(),
            end,
        }
    }
}

/// Smallest key greater than every key with this prefix, or `None` if the
/// prefix is all `0xff` (the range then runs to the end of the table).
fn prefix_successor(prefix: &[u8]) -> Option<RowKey> {
    let mut bytes = prefix.to_vec();
    while let Some(last) = bytes.pop() {
        if last != 0xff {
            bytes.push(last + 1);
            return Some(RowKey::new(bytes));
        }
    }
    None
}

impl fmt::Display for RowRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.start {
            Bound::Unbounded => write!(f, "(-inf")?,
            Bound::Included(s) => write!(f, "[{}", s)?,
            Bound::Excluded(s) => write!(f, "({}", s)?,
        }
        write!(f, ",")?;
        match &self.end {
            Bound::Unbounded => write!(f, "+inf)"),
            Bound::Included(e) => write!(f, "{}]", e),
            Bound::Excluded(e) => write!(f, "{})", e),
        }
    }
}
