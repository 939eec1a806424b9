//! Row keys and the rows delivered to scan visitors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque row identifier. Ordering is lexicographic over the raw bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowKey(Vec<u8>);

impl RowKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The smallest key strictly greater than `self` (`self` followed by a zero byte).
    pub fn successor(&self) -> RowKey {
        let mut next = self.0.clone();
        next.push(0);
        RowKey(next)
    }
}

impl From<&str> for RowKey {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<String> for RowKey {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<Vec<u8>> for RowKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for RowKey {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// One cell version of a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub family: String,
    pub qualifier: Vec<u8>,
    pub timestamp_micros: i64,
    pub value: Vec<u8>,
}

/// A fully committed row as handed to a scan visitor.
///
/// Cells are ordered by family, then qualifier, then timestamp (newest first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub key: RowKey,
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn key(&self) -> &RowKey {
        &self.key
    }

    /// Cells belonging to `family`, in row order.
    pub fn family<'a>(&'a self, family: &'a str) -> impl Iterator<Item = &'a Cell> + 'a {
        self.cells.iter().filter(move |c| c.family == family)
    }

    /// Newest value of `family:qualifier`, if present.
    pub fn latest(&self, family: &str, qualifier: &[u8]) -> Option<&[u8]> {
        self.cells
            .iter()
            .filter(|c| c.family == family && c.qualifier == qualifier)
            .max_by_key(|c| c.timestamp_micros)
            .map(|c| c.value.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_order_bytewise() {
        assert!(RowKey::from("a") < RowKey::from("b"));
        assert!(RowKey::from("a") < RowKey::from("aa"));
        assert!(RowKey::from("Z") < RowKey::from("a"));
        assert!(RowKey::from(vec![0xff]) > RowKey::from("zzz"));
    }

    #[test]
    fn successor_is_immediately_after() {
        let k = RowKey::from("b");
        let next = k.successor();
        assert!(next > k);
        assert!(next < RowKey::from("b\u{1}"));
        assert!(next < RowKey::from("c"));
    }

    #[test]
    fn latest_picks_newest_version() {
        let row = Row {
            key: "r".into(),
            cells: vec![
                Cell {
                    family: "cf".into(),
                    qualifier: b"col".to_vec(),
                    timestamp_micros: 2000,
                    value: b"new".to_vec(),
                },
                Cell {
                    family: "cf".into(),
                    qualifier: b"col".to_vec(),
                    timestamp_micros: 1000,
                    value: b"old".to_vec(),
                },
            ],
        };
        assert_eq!(row.latest("cf", b"col"), Some(&b"new"[..]));
        assert_eq!(row.latest("cf", b"other"), None);
        assert_eq!(row.family("cf").count(), 2);
    }
}
