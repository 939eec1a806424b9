//! Transport seam: the RPCs the drivers issue.
//!
//! Implementations deliver unary responses and streamed messages in order
//! and may fail at any point with a `Status`. Connection setup, security and
//! wire encoding live behind this trait.

mod messages;

pub use messages::{
    CellChunk, CheckAndMutateRowRequest, MutateRowRequest, MutateRowsEntry,
    MutateRowsEntryStatus, MutateRowsRequest, MutateRowsResponse, ReadRowsRequest,
    ReadRowsResponse, RowStatus,
};

use crate::status::Status;
use std::future::Future;

/// Server-streamed responses of one call.
pub trait ResponseStream: Send {
    type Item: Send;

    /// Next message; `None` once the server closed the stream cleanly.
    fn receive(&mut self) -> impl Future<Output = Option<Result<Self::Item, Status>>> + Send;
}

/// The data-plane RPCs of a table.
pub trait DataTransport: Send + Sync {
    type MutateRowsStream: ResponseStream<Item = MutateRowsResponse>;
    type ReadRowsStream: ResponseStream<Item = ReadRowsResponse>;

    fn mutate_row(
        &self,
        request: MutateRowRequest,
    ) -> impl Future<Output = Result<(), Status>> + Send;

    /// Returns whether the predicate matched.
    fn check_and_mutate_row(
        &self,
        request: CheckAndMutateRowRequest,
    ) -> impl Future<Output = Result<bool, Status>> + Send;

    fn mutate_rows(
        &self,
        request: MutateRowsRequest,
    ) -> impl Future<Output = Result<Self::MutateRowsStream, Status>> + Send;

    fn read_rows(
        &self,
        request: ReadRowsRequest,
    ) -> impl Future<Output = Result<Self::ReadRowsStream, Status>> + Send;
}
