//! Retry and backoff policy.
//!
//! This module encapsulates status classification (unavailable, aborted,
//! transport deadlines, transient internal errors) and exponential backoff
//! decisions so that the write and read drivers share a consistent policy.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{ErrorClassifier, DEFAULT_RETRYABLE_INTERNAL_MESSAGES};
pub use error::TableError;
pub use policy::{Backoff, ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
