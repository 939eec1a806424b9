//! Row filters: read-side cell selection and conditional-write predicates.
//!
//! Filters are evaluated server side; the engine only carries them. The
//! emulator evaluates them with `keeps`.

use crate::row::Cell;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Keep every cell.
    PassAll,
    /// Drop every cell.
    BlockAll,
    /// Keep cells of this column family.
    Family(String),
    /// Keep cells with this qualifier.
    Qualifier(Vec<u8>),
    /// Keep cells whose value equals this one.
    ValueEquals(Vec<u8>),
    /// Keep cells accepted by every filter in the chain.
    Chain(Vec<Filter>),
}

impl Filter {
    /// True if `cell` survives this filter.
    pub fn keeps(&self, cell: &Cell) -> bool {
        match self {
            Filter::PassAll => true,
            Filter::BlockAll => false,
            Filter::Family(family) => cell.family == *family,
            Filter::Qualifier(qualifier) => cell.qualifier == *qualifier,
            Filter::ValueEquals(value) => cell.value == *value,
            Filter::Chain(filters) => filters.iter().all(|f| f.keeps(cell)),
        }
    }

    /// True if any of `cells` survives; this is how a conditional write's
    /// predicate "matches" a row.
    pub fn matches_any<'a>(&self, cells: impl IntoIterator<Item = &'a Cell>) -> bool {
        cells.into_iter().any(|c| self.keeps(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(family: &str, qualifier: &str, value: &str) -> Cell {
        Cell {
            family: family.to_string(),
            qualifier: qualifier.as_bytes().to_vec(),
            timestamp_micros: 1,
            value: value.as_bytes().to_vec(),
        }
    }

    #[test]
    fn chain_requires_every_filter() {
        let f = Filter::Chain(vec![
            Filter::Family("cf".into()),
            Filter::Qualifier(b"col".to_vec()),
        ]);
        assert!(f.keeps(&cell("cf", "col", "v")));
        assert!(!f.keeps(&cell("cf", "other", "v")));
        assert!(!f.keeps(&cell("meta", "col", "v")));
    }

    #[test]
    fn matches_any_over_row_cells() {
        let cells = [cell("cf", "a", "x"), cell("cf", "b", "y")];
        assert!(Filter::ValueEquals(b"y".to_vec()).matches_any(&cells));
        assert!(!Filter::BlockAll.matches_any(&cells));
        assert!(!Filter::PassAll.matches_any(&[]));
    }
}
