//! Row selections for scans and the resumption narrowing applied between
//! scan attempts.
//!
//! Narrowing is a pure transformation: given the selection a scan started
//! with and the last key it confirmed (delivered or reported scanned), it
//! returns the selection that still has to be visited, with an exclusive
//! boundary at that key so the row is never delivered twice.

mod range;

pub use range::RowRange;

use crate::row::RowKey;

/// Order in which a scan visits rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanDirection {
    #[default]
    Forward,
    Reverse,
}

impl ScanDirection {
    /// True if `next` may follow `prev` in a scan in this direction.
    pub fn is_after(self, prev: &RowKey, next: &RowKey) -> bool {
        match self {
            ScanDirection::Forward => next > prev,
            ScanDirection::Reverse => next < prev,
        }
    }
}

/// Explicit row keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowList(pub Vec<RowKey>);

impl RowList {
    /// Keys strictly after `key`, in their original order.
    pub fn retain_rows_after(&self, key: &RowKey) -> RowList {
        RowList(self.0.iter().filter(|k| *k > key).cloned().collect())
    }

    /// Keys strictly before `key`, in their original order.
    pub fn retain_rows_before(&self, key: &RowKey) -> RowList {
        RowList(self.0.iter().filter(|k| *k < key).cloned().collect())
    }
}

impl<K: Into<RowKey>> FromIterator<K> for RowList {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        RowList(iter.into_iter().map(Into::into).collect())
    }
}

/// Ordered ranges of rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowRangeList(pub Vec<RowRange>);

impl RowRangeList {
    /// Drops ranges entirely at or before `key`, opens the range straddling
    /// it at `key`, and leaves later ranges untouched.
    pub fn retain_rows_after(&self, key: &RowKey) -> RowRangeList {
        RowRangeList(
            self.0
                .iter()
                .map(|r| r.retain_rows_after(key))
                .filter(|r| !r.is_empty())
                .collect(),
        )
    }

    /// Mirror of `retain_rows_after` for reverse scans.
    pub fn retain_rows_before(&self, key: &RowKey) -> RowRangeList {
        RowRangeList(
            self.0
                .iter()
                .map(|r| r.retain_rows_before(key))
                .filter(|r| !r.is_empty())
                .collect(),
        )
    }
}

impl FromIterator<RowRange> for RowRangeList {
    fn from_iter<I: IntoIterator<Item = RowRange>>(iter: I) -> Self {
        RowRangeList(iter.into_iter().collect())
    }
}

/// The rows a scan should (still) visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowSet {
    List(RowList),
    Ranges(RowRangeList),
}

impl RowSet {
    /// Every row of the table.
    pub fn all() -> Self {
        RowSet::Ranges(RowRangeList(vec![RowRange::infinite()]))
    }

    pub fn keys<K: Into<RowKey>>(keys: impl IntoIterator<Item = K>) -> Self {
        RowSet::List(keys.into_iter().collect())
    }

    pub fn ranges(ranges: impl IntoIterator<Item = RowRange>) -> Self {
        RowSet::Ranges(ranges.into_iter().collect())
    }

    /// True when the selection cannot match any row.
    pub fn is_empty(&self) -> bool {
        match self {
            RowSet::List(list) => list.0.is_empty(),
            RowSet::Ranges(ranges) => ranges.0.iter().all(RowRange::is_empty),
        }
    }

    pub fn contains(&self, key: &RowKey) -> bool {
        match self {
            RowSet::List(list) => list.0.contains(key),
            RowSet::Ranges(ranges) => ranges.0.iter().any(|r| r.contains(key)),
        }
    }

    pub fn retain_rows_after(&self, key: &RowKey) -> RowSet {
        match self {
            RowSet::List(list) => RowSet::List(list.retain_rows_after(key)),
            RowSet::Ranges(ranges) => RowSet::Ranges(ranges.retain_rows_after(key)),
        }
    }

    pub fn retain_rows_before(&self, key: &RowKey) -> RowSet {
        match self {
            RowSet::List(list) => RowSet::List(list.retain_rows_before(key)),
            RowSet::Ranges(ranges) => RowSet::Ranges(ranges.retain_rows_before(key)),
        }
    }

    /// Selection left to visit once a scan in `direction` has confirmed `key`.
    pub fn narrow(&self, key: &RowKey, direction: ScanDirection) -> RowSet {
        match direction {
            ScanDirection::Forward => self.retain_rows_after(key),
            ScanDirection::Reverse => self.retain_rows_before(key),
        }
    }
}

impl From<RowRange> for RowSet {
    fn from(range: RowRange) -> Self {
        RowSet::Ranges(RowRangeList(vec![range]))
    }
}

impl From<RowList> for RowSet {
    fn from(list: RowList) -> Self {
        RowSet::List(list)
    }
}

impl From<RowRangeList> for RowSet {
    fn from(ranges: RowRangeList) -> Self {
        RowSet::Ranges(ranges)
    }
}

/// Remaining row budget after `delivered` rows of a `limit` (0 = unbounded).
///
/// Returns `None` when a bounded scan has nothing left to deliver.
pub fn remaining_limit(limit: u64, delivered: u64) -> Option<u64> {
    if limit == 0 {
        return Some(0);
    }
    match limit.saturating_sub(delivered) {
        0 => None,
        left => Some(left),
    }
}
