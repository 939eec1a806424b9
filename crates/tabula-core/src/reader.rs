//! Assembles streamed cell chunks into committed rows.
//!
//! One reader lives for one response stream. Rows are only handed out once
//! the server commits them; a row still being assembled when the stream
//! fails is dropped and re-read by the next attempt.

use crate::retry::TableError;
use crate::row::{Cell, Row, RowKey};
use crate::rowset::ScanDirection;
use crate::transport::{CellChunk, RowStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    NewRow,
    RowInProgress,
    CellInProgress,
}

#[derive(Debug)]
pub struct ChunkReader {
    direction: ScanDirection,
    state: ReaderState,
    last_key: Option<RowKey>,
    row_key: Option<RowKey>,
    family: Option<String>,
    qualifier: Option<Vec<u8>>,
    timestamp_micros: i64,
    value: Vec<u8>,
    cells: Vec<Cell>,
}

impl ChunkReader {
    pub fn new(direction: ScanDirection) -> Self {
        Self {
            direction,
            state: ReaderState::NewRow,
            last_key: None,
            row_key: None,
            family: None,
            qualifier: None,
            timestamp_micros: 0,
            value: Vec::new(),
            cells: Vec::new(),
        }
    }

    /// Feed the chunks of one response; returns the rows they committed.
    pub fn process(&mut self, chunks: Vec<CellChunk>) -> Result<Vec<Row>, TableError> {
        let mut rows = Vec::new();
        for chunk in chunks {
            if let Some(row) = self.process_chunk(chunk)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    /// Call at end of stream; a half-assembled row means the server broke off mid-row.
    pub fn close(&self) -> Result<(), TableError> {
        if self.state != ReaderState::NewRow {
            return Err(invalid("stream ended in the middle of a row"));
        }
        Ok(())
    }

    fn process_chunk(&mut self, chunk: CellChunk) -> Result<Option<Row>, TableError> {
        if chunk.row_status == RowStatus::Reset {
            return self.reset(&chunk).map(|_| None);
        }
        match self.state {
            ReaderState::NewRow => self.begin_row(&chunk)?,
            ReaderState::RowInProgress => self.begin_cell(&chunk)?,
            ReaderState::CellInProgress => self.continue_cell(&chunk)?,
        }
        self.value.extend_from_slice(&chunk.value);
        if chunk.value_size > 0 {
            self.state = ReaderState::CellInProgress;
        } else {
            self.finish_cell();
            self.state = ReaderState::RowInProgress;
        }
        if chunk.row_status == RowStatus::Commit {
            if self.state == ReaderState::CellInProgress {
                return Err(invalid("commit while a split cell value is incomplete"));
            }
            return Ok(Some(self.commit()));
        }
        Ok(None)
    }

    fn begin_row(&mut self, chunk: &CellChunk) -> Result<(), TableError> {
        let key = match &chunk.row_key {
            Some(key) if !key.is_empty() => key.clone(),
            _ => return Err(invalid("new row is missing a row key")),
        };
        if chunk.family.is_none() || chunk.qualifier.is_none() {
            return Err(invalid(format!("row {} starts without family and qualifier", key)));
        }
        if let Some(last) = &self.last_key {
            if !self.direction.is_after(last, &key) {
                return Err(invalid(format!(
                    "row {} is out of order after {}",
                    key, last
                )));
            }
        }
        self.row_key = Some(key);
        self.family = None;
        self.qualifier = None;
        self.begin_cell(chunk)
    }

    fn begin_cell(&mut self, chunk: &CellChunk) -> Result<(), TableError> {
        if let (Some(key), Some(current)) = (&chunk.row_key, &self.row_key) {
            if key != current {
                return Err(invalid(format!(
                    "row key changed from {} to {} without a commit",
                    current, key
                )));
            }
        }
        if let Some(family) = &chunk.family {
            if chunk.qualifier.is_none() {
                return Err(invalid("family changed without a qualifier"));
            }
            self.family = Some(family.clone());
        }
        if let Some(qualifier) = &chunk.qualifier {
            self.qualifier = Some(qualifier.clone());
        }
        if self.family.is_none() || self.qualifier.is_none() {
            return Err(invalid("cell has no family or qualifier"));
        }
        self.timestamp_micros = chunk.timestamp_micros;
        self.value.clear();
        Ok(())
    }

    fn continue_cell(&self, chunk: &CellChunk) -> Result<(), TableError> {
        if chunk.row_key.is_some() || chunk.family.is_some() || chunk.qualifier.is_some() {
            return Err(invalid("split cell continuation carries new cell coordinates"));
        }
        Ok(())
    }

    fn reset(&mut self, chunk: &CellChunk) -> Result<(), TableError> {
        if self.state == ReaderState::NewRow {
            return Err(invalid("reset with no row in progress"));
        }
        if chunk.row_key.is_some()
            || chunk.family.is_some()
            || chunk.qualifier.is_some()
            || !chunk.value.is_empty()
        {
            return Err(invalid("reset chunk carries data"));
        }
        self.clear_row();
        Ok(())
    }

    fn finish_cell(&mut self) {
        // begin_cell guarantees both are set before any value is accepted.
        if let (Some(family), Some(qualifier)) = (&self.family, &self.qualifier) {
            self.cells.push(Cell {
                family: family.clone(),
                qualifier: qualifier.clone(),
                timestamp_micros: self.timestamp_micros,
                value: std::mem::take(&mut self.value),
            });
        }
    }

    fn commit(&mut self) -> Row {
        let key = self.row_key.take().unwrap_or_default();
        let row = Row {
            key: key.clone(),
            cells: std::mem::take(&mut self.cells),
        };
        self.last_key = Some(key);
        self.clear_row();
        row
    }

    fn clear_row(&mut self) {
        self.state = ReaderState::NewRow;
        self.row_key = None;
        self.family = None;
        self.qualifier = None;
        self.timestamp_micros = 0;
        self.value.clear();
        self.cells.clear();
    }
}

fn invalid(msg: impl Into<String>) -> TableError {
    TableError::InvalidResponse(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_chunk(key: &str, qualifier: &str, value: &str, status: RowStatus) -> CellChunk {
        CellChunk {
            row_key: Some(key.into()),
            family: Some("cf".to_string()),
            qualifier: Some(qualifier.as_bytes().to_vec()),
            timestamp_micros: 10,
            value: value.as_bytes().to_vec(),
            value_size: 0,
            row_status: status,
        }
    }

    #[test]
    fn single_cell_rows_commit() {
        let mut r = ChunkReader::new(ScanDirection::Forward);
        let rows = r
            .process(vec![
                first_chunk("a", "col", "1", RowStatus::Commit),
                first_chunk("b", "col", "2", RowStatus::Commit),
            ])
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, RowKey::from("a"));
        assert_eq!(rows[1].cells[0].value, b"2".to_vec());
        r.close().unwrap();
    }

    #[test]
    fn multi_cell_row_inherits_family() {
        let mut r = ChunkReader::new(ScanDirection::Forward);
        let second = CellChunk {
            qualifier: Some(b"other".to_vec()),
            value: b"y".to_vec(),
            row_status: RowStatus::Commit,
            ..CellChunk::default()
        };
        let rows = r
            .process(vec![first_chunk("a", "col", "x", RowStatus::InProgress), second])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cells.len(), 2);
        assert_eq!(rows[0].cells[1].family, "cf");
        assert_eq!(rows[0].cells[1].qualifier, b"other".to_vec());
    }

    #[test]
    fn split_value_is_joined() {
        let mut r = ChunkReader::new(ScanDirection::Forward);
        let mut head = first_chunk("a", "col", "hel", RowStatus::InProgress);
        head.value_size = 5;
        let tail = CellChunk {
            value: b"lo".to_vec(),
            row_status: RowStatus::Commit,
            ..CellChunk::default()
        };
        let rows = r.process(vec![head, tail]).unwrap();
        assert_eq!(rows[0].cells[0].value, b"hello".to_vec());
    }

    #[test]
    fn reset_discards_row_in_progress() {
        let mut r = ChunkReader::new(ScanDirection::Forward);
        let reset = CellChunk {
            row_status: RowStatus::Reset,
            ..CellChunk::default()
        };
        let rows = r
            .process(vec![
                first_chunk("a", "col", "stale", RowStatus::InProgress),
                reset,
                first_chunk("a", "col", "fresh", RowStatus::Commit),
            ])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cells.len(), 1);
        assert_eq!(rows[0].cells[0].value, b"fresh".to_vec());
    }

    #[test]
    fn out_of_order_rows_rejected() {
        let mut r = ChunkReader::new(ScanDirection::Forward);
        let err = r
            .process(vec![
                first_chunk("b", "col", "", RowStatus::Commit),
                first_chunk("a", "col", "", RowStatus::Commit),
            ])
            .unwrap_err();
        assert!(matches!(err, TableError::InvalidResponse(_)));
    }

    #[test]
    fn reverse_reader_expects_descending_keys() {
        let mut r = ChunkReader::new(ScanDirection::Reverse);
        let rows = r
            .process(vec![
                first_chunk("g", "col", "", RowStatus::Commit),
                first_chunk("f", "col", "", RowStatus::Commit),
            ])
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(r
            .process(vec![first_chunk("z", "col", "", RowStatus::Commit)])
            .is_err());
    }

    #[test]
    fn close_mid_row_is_an_error() {
        let mut r = ChunkReader::new(ScanDirection::Forward);
        r.process(vec![first_chunk("a", "col", "x", RowStatus::InProgress)])
            .unwrap();
        assert!(r.close().is_err());
    }

    #[test]
    fn new_row_without_key_rejected() {
        let mut r = ChunkReader::new(ScanDirection::Forward);
        let chunk = CellChunk {
            family: Some("cf".into()),
            qualifier: Some(b"c".to_vec()),
            row_status: RowStatus::Commit,
            ..CellChunk::default()
        };
        assert!(r.process(vec![chunk]).is_err());
    }

    #[test]
    fn key_change_without_commit_rejected() {
        let mut r = ChunkReader::new(ScanDirection::Forward);
        let err = r.process(vec![
            first_chunk("a", "col", "", RowStatus::InProgress),
            first_chunk("b", "col", "", RowStatus::Commit),
        ]);
        assert!(err.is_err());
    }
}
