//! Classify RPC statuses into retry policy error kinds.

use crate::retry::policy::ErrorKind;
use crate::status::{Code, Status};

/// Internal-error messages known to describe transient server conditions.
pub const DEFAULT_RETRYABLE_INTERNAL_MESSAGES: &[&str] =
    &["rst_stream", "unexpected eof", "connection reset"];

/// Maps a status to an `ErrorKind`.
///
/// `Internal` is retryable only when its message contains (ignoring case) one
/// of the allow-listed fragments; the list is policy and comes from config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorClassifier {
    retryable_internal: Vec<String>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_RETRYABLE_INTERNAL_MESSAGES.iter().copied())
    }
}

impl ErrorClassifier {
    pub fn new<S: AsRef<str>>(retryable_internal: impl IntoIterator<Item = S>) -> Self {
        Self {
            retryable_internal: retryable_internal
                .into_iter()
                .map(|s| s.as_ref().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn classify(&self, status: &Status) -> ErrorKind {
        match status.code {
            Code::Unavailable => ErrorKind::Unavailable,
            Code::Aborted => ErrorKind::Aborted,
            Code::DeadlineExceeded => ErrorKind::TransportDeadline,
            Code::Internal if self.is_transient_internal(&status.message) => {
                ErrorKind::TransientInternal
            }
            _ => ErrorKind::Other,
        }
    }

    pub fn is_retryable(&self, status: &Status) -> bool {
        self.classify(status).is_retryable()
    }

    fn is_transient_internal(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.retryable_internal
            .iter()
            .any(|fragment| message.contains(fragment.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_aborted_deadline_retryable() {
        let c = ErrorClassifier::default();
        assert_eq!(c.classify(&Status::new(Code::Unavailable, "")), ErrorKind::Unavailable);
        assert_eq!(c.classify(&Status::new(Code::Aborted, "")), ErrorKind::Aborted);
        assert_eq!(
            c.classify(&Status::new(Code::DeadlineExceeded, "")),
            ErrorKind::TransportDeadline
        );
    }

    #[test]
    fn internal_retryable_only_on_allow_list() {
        let c = ErrorClassifier::default();
        let rst = Status::new(Code::Internal, "stream terminated by RST_STREAM with error code: 2");
        assert_eq!(c.classify(&rst), ErrorKind::TransientInternal);
        let eof = Status::new(Code::Internal, "Received unexpected EOF on DATA frame");
        assert!(c.is_retryable(&eof));
        let other = Status::new(Code::Internal, "Placeholder message");
        assert_eq!(c.classify(&other), ErrorKind::Other);
    }

    #[test]
    fn precondition_and_argument_not_retryable() {
        let c = ErrorClassifier::default();
        assert!(!c.is_retryable(&Status::new(Code::FailedPrecondition, "")));
        assert!(!c.is_retryable(&Status::new(Code::InvalidArgument, "")));
        assert!(!c.is_retryable(&Status::new(Code::NotFound, "")));
    }

    #[test]
    fn custom_allow_list_replaces_default() {
        let c = ErrorClassifier::new(["goaway"]);
        assert!(c.is_retryable(&Status::new(Code::Internal, "received GOAWAY")));
        assert!(!c.is_retryable(&Status::new(Code::Internal, "RST_STREAM")));
    }

    #[test]
    fn empty_fragments_are_ignored() {
        let c = ErrorClassifier::new([""]);
        assert!(!c.is_retryable(&Status::new(Code::Internal, "anything")));
    }
}
