//! Row storage behind the emulator.

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::filter::Filter;
use crate::mutation::{Edit, Mutation, Timestamp};
use crate::row::{Cell, Row, RowKey};
use crate::rowset::{RowSet, ScanDirection};

/// A row as seen by a scan: either delivered with its surviving cells, or
/// scanned and dropped entirely by the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scanned {
    Row(Row),
    FilteredOut(RowKey),
}

/// Table contents, ordered by key. Rows without cells do not exist.
#[derive(Debug, Clone, Default)]
pub struct Store {
    rows: BTreeMap<RowKey, Vec<Cell>>,
}

impl Store {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, key: &RowKey) -> Option<Row> {
        self.rows.get(key).map(|cells| Row {
            key: key.clone(),
            cells: cells.clone(),
        })
    }

    pub fn insert_cell(&mut self, key: RowKey, cell: Cell) {
        let cells = self.rows.entry(key).or_default();
        put_cell(cells, cell);
    }

    /// Apply every edit of `mutation` to `key`, stamping server-time cells with `now_micros`.
    pub fn apply(&mut self, key: &RowKey, mutation: &Mutation, now_micros: i64) {
        let mut cells = self.rows.remove(key).unwrap_or_default();
        for edit in mutation.edits() {
            apply_edit(&mut cells, edit, now_micros);
        }
        if !cells.is_empty() {
            self.rows.insert(key.clone(), cells);
        }
    }

    /// Rows of `set` in scan order, with `filter` applied to their cells.
    pub fn scan(&self, set: &RowSet, direction: ScanDirection, filter: Option<&Filter>) -> Vec<Scanned> {
        let selected = self.rows.iter().filter(|(key, _)| set.contains(key));
        let rows: Vec<(&RowKey, &Vec<Cell>)> = match direction {
            ScanDirection::Forward => selected.collect(),
            ScanDirection::Reverse => selected.rev().collect(),
        };
        rows.into_iter()
            .map(|(key, cells)| {
                let kept: Vec<Cell> = match filter {
                    Some(f) => cells.iter().filter(|c| f.keeps(c)).cloned().collect(),
                    None => cells.clone(),
                };
                if kept.is_empty() {
                    Scanned::FilteredOut(key.clone())
                } else {
                    Scanned::Row(Row {
                        key: key.clone(),
                        cells: kept,
                    })
                }
            })
            .collect()
    }

    pub fn from_seed(seed: Seed) -> Self {
        let mut store = Store::default();
        for row in seed.rows {
            let key = RowKey::from(row.key);
            for cell in row.cells {
                store.insert_cell(
                    key.clone(),
                    Cell {
                        family: cell.family,
                        qualifier: cell.qualifier.into_bytes(),
                        timestamp_micros: cell.timestamp_micros,
                        value: cell.value.into_bytes(),
                    },
                );
            }
        }
        store
    }
}

/// JSON seed: `{"rows": [{"key": "a", "cells": [{"family": "cf", "qualifier": "c", "value": "v"}]}]}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub rows: Vec<SeedRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedRow {
    pub key: String,
    #[serde(default)]
    pub cells: Vec<SeedCell>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedCell {
    pub family: String,
    pub qualifier: String,
    #[serde(default)]
    pub timestamp_micros: i64,
    #[serde(default)]
    pub value: String,
}

/// Cells stay sorted by family, qualifier, then newest timestamp first; a
/// write to an existing (family, qualifier, timestamp) replaces its value.
fn put_cell(cells: &mut Vec<Cell>, cell: Cell) {
    let position = cells.binary_search_by(|c| {
        (&c.family, &c.qualifier, std::cmp::Reverse(c.timestamp_micros)).cmp(&(
            &cell.family,
            &cell.qualifier,
            std::cmp::Reverse(cell.timestamp_micros),
        ))
    });
    match position {
        Ok(i) => cells[i] = cell,
        Err(i) => cells.insert(i, cell),
    }
}

fn resolve(timestamp: Timestamp, now_micros: i64) -> i64 {
    match timestamp {
        Timestamp::ServerTime => now_micros,
        Timestamp::Micros(micros) => micros,
    }
}

fn apply_edit(cells: &mut Vec<Cell>, edit: &Edit, now_micros: i64) {
    match edit {
        Edit::SetCell {
            family,
            qualifier,
            timestamp,
            value,
        } => put_cell(
            cells,
            Cell {
                family: family.clone(),
                qualifier: qualifier.clone(),
                timestamp_micros: resolve(*timestamp, now_micros),
                value: value.clone(),
            },
        ),
        Edit::DeleteCellsInColumn {
            family,
            qualifier,
            time_range,
        } => cells.retain(|c| {
            let in_column = c.family == *family && c.qualifier == *qualifier;
            let in_range = time_range
                .map_or(true, |(start, end)| c.timestamp_micros >= start && c.timestamp_micros < end);
            !(in_column && in_range)
        }),
        Edit::DeleteFamily { family } => cells.retain(|c| c.family != *family),
        Edit::DeleteRow => cells.clear(),
        Edit::AddToCell {
            family,
            qualifier,
            timestamp,
            delta,
        } => {
            let current = cells
                .iter()
                .find(|c| c.family == *family && c.qualifier == *qualifier)
                .map_or(0, |c| decode_counter(&c.value));
            put_cell(
                cells,
                Cell {
                    family: family.clone(),
                    qualifier: qualifier.clone(),
                    timestamp_micros: resolve(*timestamp, now_micros),
                    value: current.wrapping_add(*delta).to_be_bytes().to_vec(),
                },
            );
        }
    }
}

/// Counter cells hold a big-endian i64; anything else counts as zero.
fn decode_counter(value: &[u8]) -> i64 {
    <[u8; 8]>::try_from(value).map_or(0, i64::from_be_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rowset::RowRange;

    fn store_with(keys: &[&str]) -> Store {
        let mut store = Store::default();
        for k in keys {
            let mut m = Mutation::new();
            m.set("cf", "col", 1, *k);
            store.apply(&RowKey::from(*k), &m, 0);
        }
        store
    }

    fn keys(scanned: &[Scanned]) -> Vec<String> {
        scanned
            .iter()
            .map(|s| match s {
                Scanned::Row(r) => r.key.to_string(),
                Scanned::FilteredOut(k) => format!("-{}", k),
            })
            .collect()
    }

    #[test]
    fn set_replaces_same_version_and_orders_newest_first() {
        let mut store = Store::default();
        let key = RowKey::from("r");
        let mut m = Mutation::new();
        m.set("cf", "col", 1, "old").set("cf", "col", 2, "new").set("cf", "col", 1, "again");
        store.apply(&key, &m, 0);
        let row = store.row(&key).unwrap();
        assert_eq!(row.cells.len(), 2);
        assert_eq!(row.cells[0].timestamp_micros, 2);
        assert_eq!(row.cells[1].value, b"again".to_vec());
    }

    #[test]
    fn server_time_uses_now() {
        let mut store = Store::default();
        let key = RowKey::from("r");
        let mut m = Mutation::new();
        m.set("cf", "col", Timestamp::ServerTime, "v");
        store.apply(&key, &m, 42);
        assert_eq!(store.row(&key).unwrap().cells[0].timestamp_micros, 42);
    }

    #[test]
    fn deletes_remove_cells_and_empty_rows() {
        let mut store = store_with(&["a"]);
        let key = RowKey::from("a");
        let mut m = Mutation::new();
        m.set("cf", "other", 5, "x").set("meta", "m", 5, "y");
        store.apply(&key, &m, 0);

        let mut del = Mutation::new();
        del.delete_timestamp_range("cf", "other", 0, 5);
        store.apply(&key, &del, 0);
        assert_eq!(store.row(&key).unwrap().cells.len(), 3);

        let mut del = Mutation::new();
        del.delete_family("cf");
        store.apply(&key, &del, 0);
        assert_eq!(store.row(&key).unwrap().cells.len(), 1);

        let mut del = Mutation::new();
        del.delete_row();
        store.apply(&key, &del, 0);
        assert!(store.row(&key).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn add_to_cell_accumulates() {
        let mut store = Store::default();
        let key = RowKey::from("counter");
        let mut m = Mutation::new();
        m.add_to_cell("cf", "n", 0, 5);
        store.apply(&key, &m, 0);
        store.apply(&key, &m, 0);
        let row = store.row(&key).unwrap();
        assert_eq!(decode_counter(row.latest("cf", b"n").unwrap()), 10);
    }

    #[test]
    fn scan_respects_set_and_direction() {
        let store = store_with(&["a", "b", "c", "d"]);
        let set = RowSet::from(RowRange::new("b", "d"));
        assert_eq!(keys(&store.scan(&set, ScanDirection::Forward, None)), ["b", "c"]);
        assert_eq!(keys(&store.scan(&set, ScanDirection::Reverse, None)), ["c", "b"]);
        let list = RowSet::keys(["d", "a", "x"]);
        assert_eq!(keys(&store.scan(&list, ScanDirection::Forward, None)), ["a", "d"]);
    }

    #[test]
    fn filtered_rows_are_reported_as_scanned() {
        let store = store_with(&["a", "b"]);
        let filter = Filter::ValueEquals(b"b".to_vec());
        let scanned = store.scan(&RowSet::all(), ScanDirection::Forward, Some(&filter));
        assert_eq!(keys(&scanned), ["-a", "b"]);
    }

    #[test]
    fn seed_parses_json() {
        let seed: Seed = serde_json::from_str(
            r#"{"rows": [{"key": "a", "cells": [{"family": "cf", "qualifier": "c", "value": "v"}]}]}"#,
        )
        .unwrap();
        let store = Store::from_seed(seed);
        assert_eq!(store.len(), 1);
        assert_eq!(store.row(&"a".into()).unwrap().latest("cf", b"c"), Some(&b"v"[..]));
    }
}
