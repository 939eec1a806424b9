//! Per-call deadline and cancellation.
//!
//! Every driver runs its attempts and its backoff sleeps through a
//! `CallContext`, so a deadline or a cancel request interrupts whichever
//! suspension point the call is blocked in.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::retry::TableError;

/// Cancellation signal shared between the caller and a running call.
///
/// Cloning yields another handle to the same signal.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation. The call stops at its next suspension point.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Deadline and cancellation for one call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: Option<CancelToken>,
}

impl CallContext {
    /// No deadline, no cancellation.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::default().deadline(Instant::now() + timeout)
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Keep an existing deadline, otherwise apply `timeout` from now.
    pub fn or_timeout(&self, timeout: Duration) -> Self {
        let mut ctx = self.clone();
        if ctx.deadline.is_none() {
            ctx.deadline = Some(Instant::now() + timeout);
        }
        ctx
    }

    pub fn get_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    /// Time left before the deadline; `None` means unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fails fast if the call is already cancelled or past its deadline.
    pub fn check(&self) -> Result<(), TableError> {
        if self.is_cancelled() {
            return Err(TableError::Cancelled);
        }
        if self.is_expired() {
            return Err(TableError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Drive `fut` to completion unless the deadline or a cancel request comes first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, TableError> {
        self.check()?;
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        let cancelled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            out = fut => Ok(out),
            _ = expired => Err(TableError::DeadlineExceeded),
            _ = cancelled => Err(TableError::Cancelled),
        }
    }

    /// Sleep for `delay`, cut short by the deadline (reported as
    /// `DeadlineExceeded`) or by cancellation.
    pub async fn sleep(&self, delay: Duration) -> Result<(), TableError> {
        self.run(tokio::time::sleep(delay)).await?;
        self.check()
    }
}
