//! Errors surfaced by the write and read drivers.

use crate::status::{Code, Status};
use thiserror::Error;

/// Failure of a table operation after the retry policy has had its say.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TableError {
    /// The server (or transport) reported a status the policy would not retry.
    #[error("{0}")]
    Status(Status),
    /// The caller's deadline elapsed, either before an attempt could start or
    /// while one was in flight.
    #[error("deadline exceeded")]
    DeadlineExceeded,
    /// The caller cancelled the call.
    #[error("call cancelled")]
    Cancelled,
    /// Invalid arguments or options; reported before any RPC is issued.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The response stream violated the chunk protocol.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl TableError {
    /// The status code this error corresponds to.
    pub fn code(&self) -> Code {
        match self {
            TableError::Status(s) => s.code,
            TableError::DeadlineExceeded => Code::DeadlineExceeded,
            TableError::Cancelled => Code::Cancelled,
            TableError::Config(_) => Code::InvalidArgument,
            TableError::InvalidResponse(_) => Code::Internal,
        }
    }

    /// Status view of this error, for per-entry error lists.
    pub fn to_status(&self) -> Status {
        match self {
            TableError::Status(s) => s.clone(),
            other => Status::new(other.code(), other.to_string()),
        }
    }
}

impl From<Status> for TableError {
    fn from(status: Status) -> Self {
        TableError::Status(status)
    }
}
