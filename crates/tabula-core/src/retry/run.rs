//! Retry loop: run an attempt until success, a final error, or the deadline.

use std::future::Future;

use super::error::TableError;
use super::policy::{RetryDecision, RetryPolicy};
use crate::control::CallContext;
use crate::status::Status;

/// Runs `attempt` until it succeeds or the retry policy says to stop.
///
/// Each attempt runs under the call's deadline and cancellation; between
/// attempts the loop sleeps for the policy's backoff, and a deadline that
/// elapses during that sleep ends the call with `DeadlineExceeded` instead
/// of starting another attempt.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    ctx: &CallContext,
    operation: &str,
    mut attempt: F,
) -> Result<T, TableError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Status>>,
{
    let mut n = 1u32;
    loop {
        match ctx.run(attempt()).await? {
            Ok(value) => return Ok(value),
            Err(status) => match policy.decide(n, &status) {
                RetryDecision::NoRetry => {
                    tracing::debug!(operation, attempt = n, code = %status.code, "not retrying");
                    return Err(TableError::Status(status));
                }
                RetryDecision::RetryAfter(delay) => {
                    tracing::debug!(
                        operation,
                        attempt = n,
                        code = %status.code,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after transient failure"
                    );
                    ctx.sleep(delay).await?;
                    n += 1;
                }
            },
        }
    }
}
