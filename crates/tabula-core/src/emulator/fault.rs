//! Scripted faults, consumed one per call in FIFO order per method.

use crate::row::RowKey;
use crate::status::Status;

/// RPC a fault applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    MutateRow,
    CheckAndMutateRow,
    MutateRows,
    ReadRows,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Fail the call with this status before doing anything.
    Reject(Status),
    /// `MutateRows`: report these statuses for the request's entries in
    /// order. Entries reported OK are applied; entries past the end of the
    /// list get no status at all.
    EntryStatuses(Vec<Status>),
    /// `MutateRows`: report the first `entries` entries normally, then fail
    /// the stream.
    FailStreamAfter { entries: usize, status: Status },
    /// `ReadRows`: deliver `rows` rows, then fail the stream.
    InterruptAfter { rows: usize, status: Status },
    /// `ReadRows`: send a last-scanned marker for `key`, then fail the stream.
    LastScanned { key: RowKey, status: Status },
    /// Never answer.
    Stall,
}

impl Fault {
    pub fn reject(status: Status) -> Self {
        Fault::Reject(status)
    }

    pub fn interrupt_after(rows: usize, status: Status) -> Self {
        Fault::InterruptAfter { rows, status }
    }

    pub fn last_scanned(key: impl Into<RowKey>, status: Status) -> Self {
        Fault::LastScanned {
            key: key.into(),
            status,
        }
    }
}
