//! RPC status codes and the `Status` value returned by the transport.

use std::fmt;
use std::time::Duration;

/// Canonical RPC status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl Code {
    /// Numeric value as carried on the wire.
    pub fn as_i32(self) -> i32 {
        match self {
            Code::Ok => 0,
            Code::Cancelled => 1,
            Code::Unknown => 2,
            Code::InvalidArgument => 3,
            Code::DeadlineExceeded => 4,
            Code::NotFound => 5,
            Code::AlreadyExists => 6,
            Code::PermissionDenied => 7,
            Code::ResourceExhausted => 8,
            Code::FailedPrecondition => 9,
            Code::Aborted => 10,
            Code::OutOfRange => 11,
            Code::Unimplemented => 12,
            Code::Internal => 13,
            Code::Unavailable => 14,
            Code::DataLoss => 15,
            Code::Unauthenticated => 16,
        }
    }

    /// Maps a wire value back to a code; unknown values become `Unknown`.
    pub fn from_i32(value: i32) -> Code {
        match value {
            0 => Code::Ok,
            1 => Code::Cancelled,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            5 => Code::NotFound,
            6 => Code::AlreadyExists,
            7 => Code::PermissionDenied,
            8 => Code::ResourceExhausted,
            9 => Code::FailedPrecondition,
            10 => Code::Aborted,
            11 => Code::OutOfRange,
            12 => Code::Unimplemented,
            13 => Code::Internal,
            14 => Code::Unavailable,
            15 => Code::DataLoss,
            16 => Code::Unauthenticated,
            _ => Code::Unknown,
        }
    }

    /// Parses a code name such as `unavailable` or `FAILED_PRECONDITION`.
    pub fn from_name(name: &str) -> Option<Code> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        let code = match normalized.as_str() {
            "ok" => Code::Ok,
            "cancelled" | "canceled" => Code::Cancelled,
            "unknown" => Code::Unknown,
            "invalidargument" => Code::InvalidArgument,
            "deadlineexceeded" => Code::DeadlineExceeded,
            "notfound" => Code::NotFound,
            "alreadyexists" => Code::AlreadyExists,
            "permissiondenied" => Code::PermissionDenied,
            "resourceexhausted" => Code::ResourceExhausted,
            "failedprecondition" => Code::FailedPrecondition,
            "aborted" => Code::Aborted,
            "outofrange" => Code::OutOfRange,
            "unimplemented" => Code::Unimplemented,
            "internal" => Code::Internal,
            "unavailable" => Code::Unavailable,
            "dataloss" => Code::DataLoss,
            "unauthenticated" => Code::Unauthenticated,
            _ => return None,
        };
        Some(code)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Outcome of an RPC (or of one entry inside a bulk response).
///
/// `retry_delay` carries the server's retry hint when it attached one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: Code,
    pub message: String,
    pub retry_delay: Option<Duration>,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retry_delay: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(Code::Ok, "")
    }

    /// Attach a server-supplied retry hint.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rpc error: code = {} desc = {}", self.code, self.message)
    }
}

impl std::error::Error for Status {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_roundtrip_for_known_codes() {
        for value in 0..=16 {
            assert_eq!(Code::from_i32(value).as_i32(), value);
        }
        assert_eq!(Code::from_i32(99), Code::Unknown);
    }

    #[test]
    fn code_names_parse_loosely() {
        assert_eq!(Code::from_name("unavailable"), Some(Code::Unavailable));
        assert_eq!(
            Code::from_name("FAILED_PRECONDITION"),
            Some(Code::FailedPrecondition)
        );
        assert_eq!(Code::from_name("deadline-exceeded"), Some(Code::DeadlineExceeded));
        assert_eq!(Code::from_name("bogus"), None);
    }

    #[test]
    fn status_display() {
        let s = Status::new(Code::Aborted, "try again");
        assert_eq!(s.to_string(), "rpc error: code = Aborted desc = try again");
    }
}
