//! Single-row write driver.
//!
//! Plain mutations are retried only when idempotent; conditional writes are
//! always sent exactly once.

use crate::control::CallContext;
use crate::mutation::{ConditionalMutation, Mutation, WriteOp};
use crate::retry::{run_with_retry, RetryPolicy, TableError};
use crate::row::RowKey;
use crate::transport::{CheckAndMutateRowRequest, DataTransport, MutateRowRequest};

/// Result of a successful single-row write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// Conditional write; `matched` tells which branch the server took.
    Conditional { matched: bool },
}

/// Apply one write to one row.
pub async fn apply_write<T: DataTransport>(
    transport: &T,
    policy: &RetryPolicy,
    ctx: &CallContext,
    table_name: &str,
    row_key: RowKey,
    op: WriteOp,
) -> Result<WriteOutcome, TableError> {
    match op {
        WriteOp::Plain(mutation) => {
            apply_mutation(transport, policy, ctx, table_name, row_key, mutation).await?;
            Ok(WriteOutcome::Applied)
        }
        WriteOp::Conditional(cond) => {
            let matched =
                apply_conditional(transport, ctx, table_name, row_key, cond).await?;
            Ok(WriteOutcome::Conditional { matched })
        }
    }
}

async fn apply_mutation<T: DataTransport>(
    transport: &T,
    policy: &RetryPolicy,
    ctx: &CallContext,
    table_name: &str,
    row_key: RowKey,
    mutation: Mutation,
) -> Result<(), TableError> {
    if mutation.is_empty() {
        return Err(TableError::Config("mutation has no edits".to_string()));
    }
    let request = MutateRowRequest {
        table_name: table_name.to_string(),
        row_key,
        mutation,
    };
    if !request.mutation.is_idempotent() {
        tracing::debug!(row = %request.row_key, "non-idempotent mutation, single attempt");
        return ctx
            .run(transport.mutate_row(request))
            .await?
            .map_err(TableError::Status);
    }
    run_with_retry(policy, ctx, "mutate_row", || transport.mutate_row(request.clone())).await
}

/// Sends a conditional write once, whatever status comes back: the
/// predicate may already have been evaluated and a branch committed.
pub async fn apply_conditional<T: DataTransport>(
    transport: &T,
    ctx: &CallContext,
    table_name: &str,
    row_key: RowKey,
    cond: ConditionalMutation,
) -> Result<bool, TableError> {
    if cond.on_match.is_none() && cond.on_no_match.is_none() {
        return Err(TableError::Config(
            "conditional mutation has no branch to apply".to_string(),
        ));
    }
    let request = CheckAndMutateRowRequest {
        table_name: table_name.to_string(),
        row_key,
        predicate: cond.predicate,
        true_mutation: cond.on_match,
        false_mutation: cond.on_no_match,
    };
    ctx.run(transport.check_and_mutate_row(request))
        .await?
        .map_err(TableError::Status)
}
