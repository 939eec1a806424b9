//! Request and response messages exchanged with the transport.
//!
//! These mirror the wire messages field for field; encoding them is the
//! transport's business.

use crate::filter::Filter;
use crate::mutation::Mutation;
use crate::row::RowKey;
use crate::rowset::RowSet;
use crate::status::Status;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutateRowRequest {
    pub table_name: String,
    pub row_key: RowKey,
    pub mutation: Mutation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckAndMutateRowRequest {
    pub table_name: String,
    pub row_key: RowKey,
    pub predicate: Filter,
    pub true_mutation: Option<Mutation>,
    pub false_mutation: Option<Mutation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutateRowsEntry {
    pub row_key: RowKey,
    pub mutation: Mutation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutateRowsRequest {
    pub table_name: String,
    pub entries: Vec<MutateRowsEntry>,
}

/// Outcome of one entry; `index` points into the request's `entries`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutateRowsEntryStatus {
    pub index: usize,
    pub status: Status,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutateRowsResponse {
    pub entries: Vec<MutateRowsEntryStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRowsRequest {
    pub table_name: String,
    pub rows: RowSet,
    pub filter: Option<Filter>,
    /// 0 = unbounded.
    pub rows_limit: u64,
    pub reversed: bool,
}

/// Whether a chunk ends the row it belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RowStatus {
    /// More chunks of this row follow.
    #[default]
    InProgress,
    /// The row is complete.
    Commit,
    /// Discard everything received for the row so far.
    Reset,
}

/// A piece of a row: usually one cell, or part of a large cell value.
///
/// `row_key`, `family` and `qualifier` are only set when they change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellChunk {
    pub row_key: Option<RowKey>,
    pub family: Option<String>,
    pub qualifier: Option<Vec<u8>>,
    pub timestamp_micros: i64,
    pub value: Vec<u8>,
    /// Total size of a value split across chunks; 0 on the last piece.
    pub value_size: usize,
    pub row_status: RowStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadRowsResponse {
    pub chunks: Vec<CellChunk>,
    /// The server has scanned up to this key even if it returned no row for it.
    pub last_scanned_row_key: Option<RowKey>,
}
