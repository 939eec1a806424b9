//! Streaming-read driver with resumption.
//!
//! A scan moves through `ScanState`:
//!
//! ```text
//! Idle -> Streaming -> Done
//!            |  ^
//!            v  |
//!         Narrowing -> Done
//!            |
//! Streaming -+-> Failed
//! ```
//!
//! While streaming, committed rows go to the visitor and advance
//! `ScanProgress`. A retryable stream failure moves to `Narrowing`, which
//! cuts the row set past the last confirmed key and shrinks the row limit by
//! what was delivered, so the next attempt neither repeats nor skips rows.

use std::time::Duration;

use crate::control::CallContext;
use crate::filter::Filter;
use crate::reader::ChunkReader;
use crate::retry::{RetryDecision, RetryPolicy, TableError};
use crate::row::{Row, RowKey};
use crate::rowset::{remaining_limit, RowSet, ScanDirection};
use crate::status::Status;
use crate::transport::{DataTransport, ReadRowsRequest, ResponseStream};

/// Caller-facing read options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOption {
    /// Deliver at most this many rows; 0 means unbounded.
    Limit(i64),
    /// Visit rows in descending key order.
    Reverse,
    /// Server-side cell filter.
    Filter(Filter),
}

/// Validated read options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadSettings {
    pub limit: u64,
    pub direction: ScanDirection,
    pub filter: Option<Filter>,
}

impl ReadSettings {
    /// Validate options before any RPC: negative limits and options given
    /// twice with different values are configuration errors.
    pub fn from_options(options: &[ReadOption]) -> Result<Self, TableError> {
        let mut limit: Option<i64> = None;
        let mut filter: Option<Filter> = None;
        let mut reverse = false;
        for option in options {
            match option {
                ReadOption::Limit(n) => {
                    if *n < 0 {
                        return Err(TableError::Config(format!("negative row limit {}", n)));
                    }
                    if limit.is_some_and(|prev| prev != *n) {
                        return Err(TableError::Config("conflicting row limits".to_string()));
                    }
                    limit = Some(*n);
                }
                ReadOption::Reverse => reverse = true,
                ReadOption::Filter(f) => {
                    if filter.as_ref().is_some_and(|prev| prev != f) {
                        return Err(TableError::Config(
                            "conflicting filters; combine them with Filter::Chain".to_string(),
                        ));
                    }
                    filter = Some(f.clone());
                }
            }
        }
        Ok(Self {
            limit: limit.unwrap_or(0) as u64,
            direction: if reverse {
                ScanDirection::Reverse
            } else {
                ScanDirection::Forward
            },
            filter,
        })
    }
}

/// Progress of the current scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanProgress {
    /// Last key delivered to the visitor or reported scanned by the server.
    pub last_key: Option<RowKey>,
    /// Rows delivered in the current attempt.
    pub delivered_this_attempt: u64,
    /// Rows delivered over the whole scan.
    pub delivered_total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Streaming,
    /// A retryable failure interrupted the stream; `delay` is the backoff
    /// chosen when the failure was classified.
    Narrowing { status: Status, delay: Duration },
    Done,
    Failed(TableError),
}

/// How one streaming attempt ended.
enum AttemptEnd {
    /// Server closed the stream cleanly.
    Exhausted,
    /// Visitor asked to stop, or the row limit was reached.
    Stopped,
    Interrupted(Status),
}

pub struct ScanDriver<'a, T> {
    transport: &'a T,
    policy: &'a RetryPolicy,
    ctx: &'a CallContext,
    table_name: &'a str,
    rows: RowSet,
    filter: Option<Filter>,
    direction: ScanDirection,
    /// Remaining row budget for the next attempt; 0 = unbounded.
    limit: u64,
    progress: ScanProgress,
    state: ScanState,
    attempt: u32,
}

impl<'a, T: DataTransport> ScanDriver<'a, T> {
    pub fn new(
        transport: &'a T,
        policy: &'a RetryPolicy,
        ctx: &'a CallContext,
        table_name: &'a str,
        rows: RowSet,
        settings: ReadSettings,
    ) -> Self {
        Self {
            transport,
            policy,
            ctx,
            table_name,
            rows,
            filter: settings.filter,
            direction: settings.direction,
            limit: settings.limit,
            progress: ScanProgress::default(),
            state: ScanState::Idle,
            attempt: 0,
        }
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    pub fn progress(&self) -> &ScanProgress {
        &self.progress
    }

    /// Run the scan, handing each committed row to `visitor` until it
    /// returns false, the rows run out, or the scan fails.
    pub async fn run<V>(&mut self, mut visitor: V) -> Result<(), TableError>
    where
        V: FnMut(Row) -> bool,
    {
        loop {
            let next = match std::mem::replace(&mut self.state, ScanState::Done) {
                ScanState::Idle => {
                    if self.rows.is_empty() {
                        ScanState::Done
                    } else {
                        ScanState::Streaming
                    }
                }
                ScanState::Streaming => match self.stream_once(&mut visitor).await {
                    Ok(AttemptEnd::Exhausted) | Ok(AttemptEnd::Stopped) => ScanState::Done,
                    Ok(AttemptEnd::Interrupted(status)) => self.on_interrupted(status),
                    Err(e) => ScanState::Failed(e),
                },
                ScanState::Narrowing { status, delay } => self.narrow(status, delay).await,
                ScanState::Done => {
                    self.state = ScanState::Done;
                    return Ok(());
                }
                ScanState::Failed(e) => {
                    self.state = ScanState::Failed(e.clone());
                    return Err(e);
                }
            };
            self.state = next;
        }
    }

    fn on_interrupted(&self, status: Status) -> ScanState {
        match self.policy.decide(self.attempt, &status) {
            RetryDecision::NoRetry => {
                tracing::debug!(attempt = self.attempt, code = %status.code, "scan failed");
                ScanState::Failed(TableError::Status(status))
            }
            RetryDecision::RetryAfter(delay) => ScanState::Narrowing { status, delay },
        }
    }

    /// Cut the row set and limit down to what is still owed, then back off.
    async fn narrow(&mut self, status: Status, delay: Duration) -> ScanState {
        if let Some(last) = &self.progress.last_key {
            self.rows = self.rows.narrow(last, self.direction);
        }
        match remaining_limit(self.limit, self.progress.delivered_this_attempt) {
            Some(left) => self.limit = left,
            None => return ScanState::Done,
        }
        self.progress.delivered_this_attempt = 0;
        if self.rows.is_empty() {
            return ScanState::Done;
        }

        tracing::debug!(
            attempt = self.attempt,
            code = %status.code,
            delay_ms = delay.as_millis() as u64,
            resume_after = ?self.progress.last_key.as_ref().map(|k| k.to_string()),
            rows_limit = self.limit,
            "resuming interrupted scan"
        );
        match self.ctx.sleep(delay).await {
            Ok(()) => ScanState::Streaming,
            Err(e) => ScanState::Failed(e),
        }
    }

    async fn stream_once<V>(&mut self, visitor: &mut V) -> Result<AttemptEnd, TableError>
    where
        V: FnMut(Row) -> bool,
    {
        self.attempt += 1;
        let request = ReadRowsRequest {
            table_name: self.table_name.to_string(),
            rows: self.rows.clone(),
            filter: self.filter.clone(),
            rows_limit: self.limit,
            reversed: self.direction == ScanDirection::Reverse,
        };
        let mut stream = match self.ctx.run(self.transport.read_rows(request)).await? {
            Ok(stream) => stream,
            Err(status) => return Ok(AttemptEnd::Interrupted(status)),
        };
        let mut reader = ChunkReader::new(self.direction);
        loop {
            let response = match self.ctx.run(stream.receive()).await? {
                None => {
                    reader.close()?;
                    return Ok(AttemptEnd::Exhausted);
                }
                Some(Err(status)) => return Ok(AttemptEnd::Interrupted(status)),
                Some(Ok(response)) => response,
            };
            for row in reader.process(response.chunks)? {
                self.progress.last_key = Some(row.key.clone());
                self.progress.delivered_this_attempt += 1;
                self.progress.delivered_total += 1;
                if !visitor(row) {
                    return Ok(AttemptEnd::Stopped);
                }
                if self.limit > 0 && self.progress.delivered_this_attempt >= self.limit {
                    return Ok(AttemptEnd::Stopped);
                }
            }
            if let Some(scanned) = response.last_scanned_row_key {
                self.mark_scanned(scanned);
            }
        }
    }

    /// Scanned-but-filtered rows still move the resume point forward.
    fn mark_scanned(&mut self, key: RowKey) {
        let advances = match &self.progress.last_key {
            Some(last) => self.direction.is_after(last, &key),
            None => true,
        };
        if advances {
            self.progress.last_key = Some(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::Emulator;
    use crate::status::Code;

    #[test]
    fn default_settings_are_unbounded_forward() {
        let s = ReadSettings::from_options(&[]).unwrap();
        assert_eq!(s.limit, 0);
        assert_eq!(s.direction, ScanDirection::Forward);
        assert!(s.filter.is_none());
    }

    #[test]
    fn limit_and_reverse_parse() {
        let s = ReadSettings::from_options(&[ReadOption::Limit(3), ReadOption::Reverse]).unwrap();
        assert_eq!(s.limit, 3);
        assert_eq!(s.direction, ScanDirection::Reverse);
    }

    #[test]
    fn negative_limit_is_config_error() {
        let err = ReadSettings::from_options(&[ReadOption::Limit(-1)]).unwrap_err();
        assert!(matches!(err, TableError::Config(_)));
    }

    #[test]
    fn conflicting_limits_rejected() {
        let err =
            ReadSettings::from_options(&[ReadOption::Limit(3), ReadOption::Limit(4)]).unwrap_err();
        assert!(matches!(err, TableError::Config(_)));
        assert!(ReadSettings::from_options(&[ReadOption::Limit(3), ReadOption::Limit(3)]).is_ok());
    }

    #[test]
    fn conflicting_filters_rejected() {
        let err = ReadSettings::from_options(&[
            ReadOption::Filter(Filter::PassAll),
            ReadOption::Filter(Filter::BlockAll),
        ])
        .unwrap_err();
        assert!(matches!(err, TableError::Config(_)));
    }

    fn exact_policy(initial_ms: u64) -> RetryPolicy {
        RetryPolicy {
            backoff: crate::retry::Backoff {
                initial: Duration::from_millis(initial_ms),
                multiplier: 1.0,
                max: Duration::from_secs(1),
                jitter: false,
            },
            ..RetryPolicy::default()
        }
    }

    fn driver<'a>(
        emulator: &'a Emulator,
        policy: &'a RetryPolicy,
        ctx: &'a CallContext,
    ) -> ScanDriver<'a, Emulator> {
        ScanDriver::new(
            emulator,
            policy,
            ctx,
            "t",
            RowSet::keys(["a"]),
            ReadSettings::default(),
        )
    }

    #[test]
    fn interruption_carries_the_decided_delay() {
        let emulator = Emulator::new();
        let policy = exact_policy(7);
        let ctx = CallContext::background();
        let d = driver(&emulator, &policy, &ctx);

        let status = Status::new(Code::Unavailable, "");
        assert_eq!(
            d.on_interrupted(status.clone()),
            ScanState::Narrowing {
                status,
                delay: Duration::from_millis(7),
            }
        );

        let hinted = Status::new(Code::Unavailable, "").with_retry_delay(Duration::from_millis(3));
        assert_eq!(
            d.on_interrupted(hinted.clone()),
            ScanState::Narrowing {
                status: hinted,
                delay: Duration::from_millis(3),
            }
        );
    }

    #[test]
    fn unretryable_interruption_fails() {
        let emulator = Emulator::new();
        let policy = exact_policy(7);
        let ctx = CallContext::background();
        let d = driver(&emulator, &policy, &ctx);

        let status = Status::new(Code::PermissionDenied, "");
        assert_eq!(
            d.on_interrupted(status.clone()),
            ScanState::Failed(TableError::Status(status))
        );
    }
}
