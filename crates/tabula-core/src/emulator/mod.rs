//! In-memory single-table server implementing `DataTransport`.
//!
//! Used by the integration tests and by `tabula simulate`/`tabula scan`.
//! Faults are scripted per method and consumed one per call; calls without a
//! pending fault are served normally from the store. Every request is
//! recorded so tests can check what the drivers actually sent.

mod fault;
mod store;

pub use fault::{Fault, Method};
pub use store::{Scanned, Seed, SeedCell, SeedRow, Store};

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::mutation::Mutation;
use crate::row::{Row, RowKey};
use crate::rowset::ScanDirection;
use crate::status::Status;
use crate::transport::{
    CellChunk, CheckAndMutateRowRequest, DataTransport, MutateRowRequest, MutateRowsEntryStatus,
    MutateRowsRequest, MutateRowsResponse, ReadRowsRequest, ReadRowsResponse, ResponseStream,
    RowStatus,
};

/// A request as received by the emulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedRequest {
    MutateRow(MutateRowRequest),
    CheckAndMutateRow(CheckAndMutateRowRequest),
    MutateRows(MutateRowsRequest),
    ReadRows(ReadRowsRequest),
}

impl RecordedRequest {
    pub fn method(&self) -> Method {
        match self {
            RecordedRequest::MutateRow(_) => Method::MutateRow,
            RecordedRequest::CheckAndMutateRow(_) => Method::CheckAndMutateRow,
            RecordedRequest::MutateRows(_) => Method::MutateRows,
            RecordedRequest::ReadRows(_) => Method::ReadRows,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    store: Store,
    faults: HashMap<Method, VecDeque<Fault>>,
    requests: Vec<RecordedRequest>,
    /// Split cell values longer than this across several chunks.
    split_values_at: Option<usize>,
}

/// Cheap to clone; clones share the same table, faults and request log.
#[derive(Debug, Clone, Default)]
pub struct Emulator {
    inner: Arc<Mutex<Inner>>,
}

impl Emulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: Seed) -> Self {
        let emulator = Self::new();
        emulator.lock().store = Store::from_seed(seed);
        emulator
    }

    pub fn from_seed_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::from_seed(serde_json::from_str(json)?))
    }

    /// Serve cell values in pieces of at most `size` bytes.
    pub fn split_values_at(&self, size: usize) {
        self.lock().split_values_at = Some(size.max(1));
    }

    pub fn push_fault(&self, method: Method, fault: Fault) {
        self.lock().faults.entry(method).or_default().push_back(fault);
    }

    pub fn push_faults(&self, method: Method, faults: impl IntoIterator<Item = Fault>) {
        self.lock().faults.entry(method).or_default().extend(faults);
    }

    /// Faults not yet consumed for `method`.
    pub fn pending_faults(&self, method: Method) -> usize {
        self.lock().faults.get(&method).map_or(0, VecDeque::len)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn call_count(&self, method: Method) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.method() == method)
            .count()
    }

    pub fn read_requests(&self) -> Vec<ReadRowsRequest> {
        self.lock()
            .requests
            .iter()
            .filter_map(|r| match r {
                RecordedRequest::ReadRows(req) => Some(req.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn mutate_rows_requests(&self) -> Vec<MutateRowsRequest> {
        self.lock()
            .requests
            .iter()
            .filter_map(|r| match r {
                RecordedRequest::MutateRows(req) => Some(req.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn row(&self, key: &RowKey) -> Option<Row> {
        self.lock().store.row(key)
    }

    pub fn row_count(&self) -> usize {
        self.lock().store.len()
    }

    /// Write directly to the store, bypassing faults and the request log.
    pub fn put(&self, key: impl Into<RowKey>, mutation: &Mutation) {
        self.lock().store.apply(&key.into(), mutation, now_micros());
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }
}

fn lock(shared: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_micros() as i64)
}

/// What the emulator decided to answer, computed under the lock.
enum Reply<T> {
    Ready(T),
    Stall,
}

impl<T> Reply<T> {
    async fn resolve(self) -> T {
        match self {
            Reply::Ready(value) => value,
            Reply::Stall => std::future::pending().await,
        }
    }
}

impl Inner {
    fn next_fault(&mut self, method: Method) -> Option<Fault> {
        self.faults.get_mut(&method).and_then(VecDeque::pop_front)
    }

    fn mutate_row(&mut self, request: MutateRowRequest) -> Reply<Result<(), Status>> {
        self.requests.push(RecordedRequest::MutateRow(request.clone()));
        match self.next_fault(Method::MutateRow) {
            Some(Fault::Reject(status)) => return Reply::Ready(Err(status)),
            Some(Fault::Stall) => return Reply::Stall,
            Some(other) => tracing::warn!(fault = ?other, "fault does not apply to mutate_row"),
            None => {}
        }
        self.store
            .apply(&request.row_key, &request.mutation, now_micros());
        Reply::Ready(Ok(()))
    }

    fn check_and_mutate_row(&mut self, request: CheckAndMutateRowRequest) -> Reply<Result<bool, Status>> {
        self.requests
            .push(RecordedRequest::CheckAndMutateRow(request.clone()));
        match self.next_fault(Method::CheckAndMutateRow) {
            Some(Fault::Reject(status)) => return Reply::Ready(Err(status)),
            Some(Fault::Stall) => return Reply::Stall,
            Some(other) => {
                tracing::warn!(fault = ?other, "fault does not apply to check_and_mutate_row")
            }
            None => {}
        }
        let matched = self
            .store
            .row(&request.row_key)
            .is_some_and(|row| request.predicate.matches_any(&row.cells));
        let branch = if matched {
            &request.true_mutation
        } else {
            &request.false_mutation
        };
        if let Some(mutation) = branch {
            self.store.apply(&request.row_key, mutation, now_micros());
        }
        Reply::Ready(Ok(matched))
    }

    fn mutate_rows(
        &mut self,
        request: MutateRowsRequest,
    ) -> Reply<Result<EmulatorStream<MutateRowsResponse>, Status>> {
        self.requests.push(RecordedRequest::MutateRows(request.clone()));
        let now = now_micros();
        let (statuses, failure) = match self.next_fault(Method::MutateRows) {
            Some(Fault::Reject(status)) => return Reply::Ready(Err(status)),
            Some(Fault::Stall) => return Reply::Ready(Ok(EmulatorStream::stalled())),
            Some(Fault::EntryStatuses(statuses)) => (statuses, None),
            Some(Fault::FailStreamAfter { entries, status }) => {
                let n = entries.min(request.entries.len());
                (vec![Status::ok(); n], Some(status))
            }
            Some(other) => {
                tracing::warn!(fault = ?other, "fault does not apply to mutate_rows");
                (vec![Status::ok(); request.entries.len()], None)
            }
            None => (vec![Status::ok(); request.entries.len()], None),
        };

        let mut reported = Vec::with_capacity(statuses.len());
        for (index, (entry, status)) in request.entries.iter().zip(statuses).enumerate() {
            if status.is_ok() {
                self.store.apply(&entry.row_key, &entry.mutation, now);
            }
            reported.push(MutateRowsEntryStatus { index, status });
        }
        let mut items = vec![Ok(MutateRowsResponse { entries: reported })];
        if let Some(status) = failure {
            items.push(Err(status));
        }
        Reply::Ready(Ok(EmulatorStream::new(items)))
    }

    fn read_rows(
        &mut self,
        request: ReadRowsRequest,
    ) -> Reply<Result<EmulatorStream<ReadRowsResponse>, Status>> {
        self.requests.push(RecordedRequest::ReadRows(request.clone()));
        let (interrupt_after, failure) = match self.next_fault(Method::ReadRows) {
            Some(Fault::Reject(status)) => return Reply::Ready(Err(status)),
            Some(Fault::Stall) => return Reply::Ready(Ok(EmulatorStream::stalled())),
            Some(Fault::InterruptAfter { rows, status }) => (Some(rows), Some(status)),
            Some(Fault::LastScanned { key, status }) => {
                let marker = ReadRowsResponse {
                    chunks: Vec::new(),
                    last_scanned_row_key: Some(key),
                };
                return Reply::Ready(Ok(EmulatorStream::new(vec![Ok(marker), Err(status)])));
            }
            Some(other) => {
                tracing::warn!(fault = ?other, "fault does not apply to read_rows");
                (None, None)
            }
            None => (None, None),
        };

        let direction = if request.reversed {
            ScanDirection::Reverse
        } else {
            ScanDirection::Forward
        };
        let mut items = Vec::new();
        let mut delivered = 0u64;
        for scanned in self
            .store
            .scan(&request.rows, direction, request.filter.as_ref())
        {
            if request.rows_limit > 0 && delivered >= request.rows_limit {
                break;
            }
            if interrupt_after.is_some_and(|n| delivered >= n as u64) {
                break;
            }
            match scanned {
                Scanned::Row(row) => {
                    items.push(Ok(ReadRowsResponse {
                        chunks: row_chunks(&row, self.split_values_at),
                        last_scanned_row_key: None,
                    }));
                    delivered += 1;
                }
                Scanned::FilteredOut(key) => items.push(Ok(ReadRowsResponse {
                    chunks: Vec::new(),
                    last_scanned_row_key: Some(key),
                })),
            }
        }
        if let Some(status) = failure {
            items.push(Err(status));
        }
        Reply::Ready(Ok(EmulatorStream::new(items)))
    }
}

/// Encode one row as chunks: the key on the first chunk, the family only
/// when it changes, and long values split when `split_at` is set.
fn row_chunks(row: &Row, split_at: Option<usize>) -> Vec<CellChunk> {
    let mut chunks = Vec::new();
    let mut prev_family: Option<&str> = None;
    for (i, cell) in row.cells.iter().enumerate() {
        let head = CellChunk {
            row_key: (i == 0).then(|| row.key.clone()),
            family: (prev_family != Some(cell.family.as_str())).then(|| cell.family.clone()),
            qualifier: Some(cell.qualifier.clone()),
            timestamp_micros: cell.timestamp_micros,
            ..CellChunk::default()
        };
        let pieces: Vec<&[u8]> = match split_at {
            Some(n) if cell.value.len() > n => cell.value.chunks(n).collect(),
            _ => vec![cell.value.as_slice()],
        };
        let last = pieces.len() - 1;
        for (j, piece) in pieces.into_iter().enumerate() {
            let mut chunk = if j == 0 {
                head.clone()
            } else {
                CellChunk::default()
            };
            chunk.value = piece.to_vec();
            chunk.value_size = if j < last { cell.value.len() } else { 0 };
            chunks.push(chunk);
        }
        prev_family = Some(cell.family.as_str());
    }
    if let Some(last) = chunks.last_mut() {
        last.row_status = RowStatus::Commit;
    }
    chunks
}

/// Pre-computed response stream.
#[derive(Debug)]
pub struct EmulatorStream<I> {
    items: VecDeque<Result<I, Status>>,
    stall_at_end: bool,
}

impl<I> EmulatorStream<I> {
    fn new(items: Vec<Result<I, Status>>) -> Self {
        Self {
            items: items.into(),
            stall_at_end: false,
        }
    }

    fn stalled() -> Self {
        Self {
            items: VecDeque::new(),
            stall_at_end: true,
        }
    }
}

impl<I: Send> ResponseStream for EmulatorStream<I> {
    type Item = I;

    fn receive(&mut self) -> impl Future<Output = Option<Result<I, Status>>> + Send {
        async move {
            if let Some(item) = self.items.pop_front() {
                return Some(item);
            }
            if self.stall_at_end {
                std::future::pending::<()>().await;
            }
            None
        }
    }
}

impl DataTransport for Emulator {
    type MutateRowsStream = EmulatorStream<MutateRowsResponse>;
    type ReadRowsStream = EmulatorStream<ReadRowsResponse>;

    fn mutate_row(
        &self,
        request: MutateRowRequest,
    ) -> impl Future<Output = Result<(), Status>> + Send {
        let shared = Arc::clone(&self.inner);
        async move {
            let reply = lock(&shared).mutate_row(request);
            reply.resolve().await
        }
    }

    fn check_and_mutate_row(
        &self,
        request: CheckAndMutateRowRequest,
    ) -> impl Future<Output = Result<bool, Status>> + Send {
        let shared = Arc::clone(&self.inner);
        async move {
            let reply = lock(&shared).check_and_mutate_row(request);
            reply.resolve().await
        }
    }

    fn mutate_rows(
        &self,
        request: MutateRowsRequest,
    ) -> impl Future<Output = Result<Self::MutateRowsStream, Status>> + Send {
        let shared = Arc::clone(&self.inner);
        async move {
            let reply = lock(&shared).mutate_rows(request);
            reply.resolve().await
        }
    }

    fn read_rows(
        &self,
        request: ReadRowsRequest,
    ) -> impl Future<Output = Result<Self::ReadRowsStream, Status>> + Send {
        let shared = Arc::clone(&self.inner);
        async move {
            let reply = lock(&shared).read_rows(request);
            reply.resolve().await
        }
    }
}
