//! Table handle: the entry point callers use for writes and scans.

use std::time::Duration;

use crate::bulk::{BulkDriver, BulkErrors, DEFAULT_MAX_MUTATIONS_PER_REQUEST};
use crate::config::TabulaConfig;
use crate::control::CallContext;
use crate::mutation::{ConditionalMutation, Mutation, WriteOp};
use crate::retry::{RetryPolicy, TableError};
use crate::row::{Row, RowKey};
use crate::rowset::RowSet;
use crate::scan::{ReadOption, ReadSettings, ScanDriver};
use crate::transport::DataTransport;
use crate::write::{self, apply_write, WriteOutcome};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// One table reached through `transport`.
///
/// Every call runs under the caller's `CallContext`; when that context has
/// no deadline the table's default timeout applies, so no call retries forever.
#[derive(Debug)]
pub struct Table<T> {
    transport: T,
    name: String,
    policy: RetryPolicy,
    max_mutations_per_request: usize,
    default_timeout: Duration,
}

impl<T: DataTransport> Table<T> {
    pub fn new(transport: T, name: impl Into<String>, config: &TabulaConfig) -> Self {
        Self {
            transport,
            name: name.into(),
            policy: config.retry_policy(),
            max_mutations_per_request: config.bulk.max_mutations_per_request,
            default_timeout: config.default_timeout(),
        }
    }

    pub fn with_policy(transport: T, name: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            name: name.into(),
            policy,
            max_mutations_per_request: DEFAULT_MAX_MUTATIONS_PER_REQUEST,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn max_mutations_per_request(mut self, max: usize) -> Self {
        self.max_mutations_per_request = max.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn call_context(&self, ctx: &CallContext) -> CallContext {
        ctx.or_timeout(self.default_timeout)
    }

    pub async fn apply(
        &self,
        ctx: &CallContext,
        row_key: impl Into<RowKey>,
        mutation: Mutation,
    ) -> Result<(), TableError> {
        self.apply_write(ctx, row_key, WriteOp::Plain(mutation))
            .await
            .map(|_| ())
    }

    /// Conditional write; returns whether the predicate matched.
    pub async fn apply_conditional(
        &self,
        ctx: &CallContext,
        row_key: impl Into<RowKey>,
        cond: ConditionalMutation,
    ) -> Result<bool, TableError> {
        let ctx = self.call_context(ctx);
        write::apply_conditional(&self.transport, &ctx, &self.name, row_key.into(), cond).await
    }

    pub async fn apply_write(
        &self,
        ctx: &CallContext,
        row_key: impl Into<RowKey>,
        op: WriteOp,
    ) -> Result<WriteOutcome, TableError> {
        let ctx = self.call_context(ctx);
        apply_write(
            &self.transport,
            &self.policy,
            &ctx,
            &self.name,
            row_key.into(),
            op,
        )
        .await
    }

    /// Write many rows. `Ok(None)` when all were written; `Ok(Some(errors))`
    /// carries one slot per input, `None` for rows written.
    pub async fn apply_bulk(
        &self,
        ctx: &CallContext,
        row_keys: Vec<RowKey>,
        mutations: Vec<Mutation>,
    ) -> Result<Option<BulkErrors>, TableError> {
        let ctx = self.call_context(ctx);
        BulkDriver::new(
            &self.transport,
            &self.policy,
            &ctx,
            &self.name,
            row_keys,
            mutations,
        )?
        .max_mutations_per_request(self.max_mutations_per_request)
        .run()
        .await
    }

    /// Scan `rows`, handing each row to `visitor` until it returns false.
    pub async fn read_rows<V>(
        &self,
        ctx: &CallContext,
        rows: impl Into<RowSet>,
        visitor: V,
        options: &[ReadOption],
    ) -> Result<(), TableError>
    where
        V: FnMut(Row) -> bool,
    {
        let settings = ReadSettings::from_options(options)?;
        let ctx = self.call_context(ctx);
        let mut driver = ScanDriver::new(
            &self.transport,
            &self.policy,
            &ctx,
            &self.name,
            rows.into(),
            settings,
        );
        driver.run(visitor).await
    }

    pub async fn read_row(
        &self,
        ctx: &CallContext,
        row_key: impl Into<RowKey>,
        options: &[ReadOption],
    ) -> Result<Option<Row>, TableError> {
        let mut found = None;
        self.read_rows(
            ctx,
            RowSet::keys([row_key]),
            |row| {
                found = Some(row);
                false
            },
            options,
        )
        .await?;
        Ok(found)
    }
}
