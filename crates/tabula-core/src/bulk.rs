//! Bulk-write driver: sends a batch, splits per-entry outcomes into
//! succeeded / retryable / failed, and resends only the retryable entries.
//!
//! Entry state lives in one `BulkEntry` per original input index. Each round
//! sends the entries still `Pending`; the server's per-entry statuses move
//! them to `Succeeded`, keep them `Pending` (retryable and idempotent), or
//! move them to `Failed` for good.

use crate::control::CallContext;
use crate::mutation::Mutation;
use crate::retry::{ErrorClassifier, RetryPolicy, TableError};
use crate::row::RowKey;
use crate::status::{Code, Status};
use crate::transport::{DataTransport, MutateRowsEntry, MutateRowsRequest, ResponseStream};

/// Per original index: `None` for rows written, the final status otherwise.
pub type BulkErrors = Vec<Option<Status>>;

/// Default cap on edits carried by one request.
pub const DEFAULT_MAX_MUTATIONS_PER_REQUEST: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryState {
    /// Not yet written; `last_error` is the status of the previous attempt.
    Pending { last_error: Option<Status> },
    Succeeded,
    Failed(Status),
}

#[derive(Debug, Clone)]
pub struct BulkEntry {
    pub row_key: RowKey,
    pub mutation: Mutation,
    pub idempotent: bool,
    pub state: EntryState,
}

impl BulkEntry {
    fn new(row_key: RowKey, mutation: Mutation) -> Self {
        let idempotent = mutation.is_idempotent();
        Self {
            row_key,
            mutation,
            idempotent,
            state: EntryState::Pending { last_error: None },
        }
    }

    fn is_pending(&self) -> bool {
        matches!(self.state, EntryState::Pending { .. })
    }
}

/// State an entry moves to after the server reported `status` for it.
pub fn next_state(classifier: &ErrorClassifier, idempotent: bool, status: Status) -> EntryState {
    if status.is_ok() {
        EntryState::Succeeded
    } else if idempotent && classifier.is_retryable(&status) {
        EntryState::Pending {
            last_error: Some(status),
        }
    } else {
        EntryState::Failed(status)
    }
}

/// Splits entries into request groups of at most `max_mutations` edits.
/// An entry larger than the cap travels alone.
pub fn plan_groups(entries: &[BulkEntry], max_mutations: usize) -> Vec<Vec<usize>> {
    let max_mutations = max_mutations.max(1);
    let mut groups = Vec::new();
    let mut current = Vec::new();
    let mut current_size = 0usize;
    for (index, entry) in entries.iter().enumerate() {
        let size = entry.mutation.len().max(1);
        if !current.is_empty() && current_size + size > max_mutations {
            groups.push(std::mem::take(&mut current));
            current_size = 0;
        }
        current.push(index);
        current_size += size;
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

enum RoundEnd {
    /// The stream closed cleanly; every entry of the round has a status.
    Completed,
    /// The call failed before reporting every entry.
    StreamFailed(Status),
}

pub struct BulkDriver<'a, T> {
    transport: &'a T,
    policy: &'a RetryPolicy,
    ctx: &'a CallContext,
    table_name: &'a str,
    max_mutations_per_request: usize,
    entries: Vec<BulkEntry>,
}

impl<'a, T: DataTransport> BulkDriver<'a, T> {
    pub fn new(
        transport: &'a T,
        policy: &'a RetryPolicy,
        ctx: &'a CallContext,
        table_name: &'a str,
        row_keys: Vec<RowKey>,
        mutations: Vec<Mutation>,
    ) -> Result<Self, TableError> {
        if row_keys.len() != mutations.len() {
            return Err(TableError::Config(format!(
                "mismatched row keys and mutations: {} != {}",
                row_keys.len(),
                mutations.len()
            )));
        }
        if let Some(i) = mutations.iter().position(Mutation::is_empty) {
            return Err(TableError::Config(format!("mutation {} has no edits", i)));
        }
        let entries = row_keys
            .into_iter()
            .zip(mutations)
            .map(|(k, m)| BulkEntry::new(k, m))
            .collect();
        Ok(Self {
            transport,
            policy,
            ctx,
            table_name,
            max_mutations_per_request: DEFAULT_MAX_MUTATIONS_PER_REQUEST,
            entries,
        })
    }

    pub fn max_mutations_per_request(mut self, max: usize) -> Self {
        self.max_mutations_per_request = max.max(1);
        self
    }

    pub fn entries(&self) -> &[BulkEntry] {
        &self.entries
    }

    /// Drive every group to completion.
    ///
    /// `Ok(None)`: every entry was written. `Ok(Some(errors))`: at least one
    /// entry failed for good. `Err(_)`: the call as a whole could not finish
    /// (deadline before any round of a group completed, or cancellation).
    pub async fn run(mut self) -> Result<Option<BulkErrors>, TableError> {
        for group in plan_groups(&self.entries, self.max_mutations_per_request) {
            self.run_group(&group).await?;
        }
        Ok(self.into_errors())
    }

    async fn run_group(&mut self, group: &[usize]) -> Result<(), TableError> {
        let mut round = 1u32;
        let mut completed_rounds = 0u32;
        loop {
            let pending = self.pending_in(group);
            if pending.is_empty() {
                return Ok(());
            }
            tracing::debug!(round, pending = pending.len(), "sending bulk round");
            let hint = match self.send_round(&pending).await {
                Ok(RoundEnd::Completed) => {
                    completed_rounds += 1;
                    None
                }
                Ok(RoundEnd::StreamFailed(status)) => {
                    tracing::debug!(round, code = %status.code, "bulk stream failed");
                    status.retry_delay
                }
                Err(TableError::DeadlineExceeded) => return self.expire(group, completed_rounds),
                Err(e) => return Err(e),
            };

            if self.pending_in(group).is_empty() {
                return Ok(());
            }
            if !self.policy.attempts_left(round) {
                self.fail_pending(group);
                return Ok(());
            }
            let delay = self.policy.delay_for(round, hint);
            tracing::debug!(
                round,
                delay_ms = delay.as_millis() as u64,
                "retrying pending bulk entries"
            );
            match self.ctx.sleep(delay).await {
                Ok(()) => {}
                Err(TableError::DeadlineExceeded) => return self.expire(group, completed_rounds),
                Err(e) => return Err(e),
            }
            round += 1;
        }
    }

    async fn send_round(&mut self, pending: &[usize]) -> Result<RoundEnd, TableError> {
        let request = MutateRowsRequest {
            table_name: self.table_name.to_string(),
            entries: pending
                .iter()
                .map(|&i| MutateRowsEntry {
                    row_key: self.entries[i].row_key.clone(),
                    mutation: self.entries[i].mutation.clone(),
                })
                .collect(),
        };
        let mut reported = vec![false; pending.len()];

        let mut stream = match self.ctx.run(self.transport.mutate_rows(request)).await? {
            Ok(stream) => stream,
            Err(status) => {
                self.fail_unreported(pending, &reported, &status);
                return Ok(RoundEnd::StreamFailed(status));
            }
        };
        loop {
            match self.ctx.run(stream.receive()).await? {
                None => break,
                Some(Ok(response)) => {
                    for entry in response.entries {
                        let Some(&index) = pending.get(entry.index) else {
                            tracing::warn!(index = entry.index, "bulk response for unknown entry");
                            continue;
                        };
                        reported[entry.index] = true;
                        self.record(index, entry.status);
                    }
                }
                Some(Err(status)) => {
                    self.fail_unreported(pending, &reported, &status);
                    return Ok(RoundEnd::StreamFailed(status));
                }
            }
        }

        for (pos, &index) in pending.iter().enumerate() {
            if !reported[pos] {
                self.record(
                    index,
                    Status::new(Code::Internal, "server returned no status for entry"),
                );
            }
        }
        Ok(RoundEnd::Completed)
    }

    fn record(&mut self, index: usize, status: Status) {
        let entry = &mut self.entries[index];
        entry.state = next_state(&self.policy.classifier, entry.idempotent, status);
    }

    /// Entries the failed stream never reported on: idempotent ones stay
    /// pending if the stream error is retryable, the rest fail with it.
    fn fail_unreported(&mut self, pending: &[usize], reported: &[bool], status: &Status) {
        for (pos, &index) in pending.iter().enumerate() {
            if !reported[pos] {
                self.record(index, status.clone());
            }
        }
    }

    fn fail_pending(&mut self, group: &[usize]) {
        for &index in group {
            let entry = &mut self.entries[index];
            if let EntryState::Pending { last_error } = &mut entry.state {
                let status = last_error
                    .take()
                    .unwrap_or_else(|| TableError::DeadlineExceeded.to_status());
                entry.state = EntryState::Failed(status);
            }
        }
    }

    /// Deadline hit: an overall error if no round of the group finished,
    /// otherwise the still-pending entries fail individually.
    fn expire(&mut self, group: &[usize], completed_rounds: u32) -> Result<(), TableError> {
        if completed_rounds == 0 {
            return Err(TableError::DeadlineExceeded);
        }
        self.fail_pending(group);
        Ok(())
    }

    fn pending_in(&self, group: &[usize]) -> Vec<usize> {
        group
            .iter()
            .copied()
            .filter(|&i| self.entries[i].is_pending())
            .collect()
    }

    fn into_errors(self) -> Option<BulkErrors> {
        if self
            .entries
            .iter()
            .all(|e| e.state == EntryState::Succeeded)
        {
            return None;
        }
        Some(
            self.entries
                .into_iter()
                .map(|e| match e.state {
                    EntryState::Succeeded => None,
                    EntryState::Failed(status) => Some(status),
                    EntryState::Pending { last_error } => Some(
                        last_error.unwrap_or_else(|| TableError::DeadlineExceeded.to_status()),
                    ),
                })
                .collect(),
        )
    }
}
