use rand::Rng;
use std::time::Duration;

use super::classify::ErrorClassifier;
use crate::status::Status;

/// High-level classification of a status for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Server or link temporarily unavailable.
    Unavailable,
    /// Server aborted the operation (e.g. contention).
    Aborted,
    /// The transport gave up on the attempt; distinct from the caller's own deadline.
    TransportDeadline,
    /// `Internal` status whose message is on the transient allow-list.
    TransientInternal,
    /// Any other status (never retried).
    Other,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorKind::Other)
    }
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Exponential backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Growth factor applied per attempt.
    pub multiplier: f64,
    /// Upper bound on any single delay.
    pub max: Duration,
    /// Pick a uniformly random delay in `[0, computed]` instead of the exact value.
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            multiplier: 1.3,
            max: Duration::from_secs(2),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (1-based), before jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(64) as i32;
        let factor = self.multiplier.max(1.0).powi(exp);
        let secs = self.initial.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(secs).min(self.max)
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if !self.jitter || base.is_zero() {
            return base;
        }
        let nanos = base.as_nanos().min(u64::MAX as u128) as u64;
        Duration::from_nanos(rand::thread_rng().gen_range(0..=nanos))
    }
}

/// Retry policy shared by every driver: which statuses to retry, how long to
/// wait, and whether the server's retry hints win over client backoff.
///
/// Built once per table from config; the drivers never mutate it.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub classifier: ErrorClassifier,
    pub backoff: Backoff,
    /// Maximum number of attempts (including the first); `None` leaves the
    /// caller's deadline as the only bound.
    pub max_attempts: Option<u32>,
    /// Use `Status::retry_delay` when the server supplies one.
    pub honor_retry_info: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            classifier: ErrorClassifier::default(),
            backoff: Backoff::default(),
            max_attempts: None,
            honor_retry_info: true,
        }
    }
}

impl RetryPolicy {
    /// Decide what to do after attempt number `attempt` (1-based) failed with `status`.
    pub fn decide(&self, attempt: u32, status: &Status) -> RetryDecision {
        if let Some(max) = self.max_attempts {
            if attempt >= max {
                return RetryDecision::NoRetry;
            }
        }
        if !self.classifier.is_retryable(status) {
            return RetryDecision::NoRetry;
        }
        RetryDecision::RetryAfter(self.delay_for(attempt, status.retry_delay))
    }

    /// Backoff before the next round, honoring a server hint if allowed.
    pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        match hint {
            Some(hint) if self.honor_retry_info => hint,
            _ => self.backoff.delay_for_attempt(attempt),
        }
    }

    /// True if another attempt is permitted after `attempt` attempts.
    pub fn attempts_left(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }
}
