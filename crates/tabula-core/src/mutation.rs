//! Row mutations and the idempotency rules that decide whether a failed
//! write may be sent again.

use crate::filter::Filter;

/// Cell timestamp: explicit microseconds, or assigned by the server when the
/// write lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    ServerTime,
    Micros(i64),
}

impl From<i64> for Timestamp {
    fn from(micros: i64) -> Self {
        Timestamp::Micros(micros)
    }
}

impl From<i32> for Timestamp {
    fn from(micros: i32) -> Self {
        Timestamp::Micros(i64::from(micros))
    }
}

/// A single edit inside a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    SetCell {
        family: String,
        qualifier: Vec<u8>,
        timestamp: Timestamp,
        value: Vec<u8>,
    },
    /// Delete versions of one column, optionally only those in
    /// `[start_micros, end_micros)`.
    DeleteCellsInColumn {
        family: String,
        qualifier: Vec<u8>,
        time_range: Option<(i64, i64)>,
    },
    DeleteFamily {
        family: String,
    },
    DeleteRow,
    /// Add `delta` to a 64-bit big-endian counter cell.
    AddToCell {
        family: String,
        qualifier: Vec<u8>,
        timestamp: Timestamp,
        delta: i64,
    },
}

impl Edit {
    /// True if applying this edit twice leaves the same state as applying it once.
    pub fn is_idempotent(&self) -> bool {
        match self {
            Edit::SetCell { timestamp, .. } => *timestamp != Timestamp::ServerTime,
            Edit::DeleteCellsInColumn { .. } | Edit::DeleteFamily { .. } | Edit::DeleteRow => true,
            Edit::AddToCell { .. } => false,
        }
    }
}

/// Ordered edits applied atomically to one row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mutation {
    edits: Vec<Edit>,
}

impl Mutation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(
        &mut self,
        family: impl Into<String>,
        qualifier: impl Into<Vec<u8>>,
        timestamp: impl Into<Timestamp>,
        value: impl Into<Vec<u8>>,
    ) -> &mut Self {
        self.edits.push(Edit::SetCell {
            family: family.into(),
            qualifier: qualifier.into(),
            timestamp: timestamp.into(),
            value: value.into(),
        });
        self
    }

    pub fn delete_cells_in_column(
        &mut self,
        family: impl Into<String>,
        qualifier: impl Into<Vec<u8>>,
    ) -> &mut Self {
        self.edits.push(Edit::DeleteCellsInColumn {
            family: family.into(),
            qualifier: qualifier.into(),
            time_range: None,
        });
        self
    }

    pub fn delete_timestamp_range(
        &mut self,
        family: impl Into<String>,
        qualifier: impl Into<Vec<u8>>,
        start_micros: i64,
        end_micros: i64,
    ) -> &mut Self {
        self.edits.push(Edit::DeleteCellsInColumn {
            family: family.into(),
            qualifier: qualifier.into(),
            time_range: Some((start_micros, end_micros)),
        });
        self
    }

    pub fn delete_family(&mut self, family: impl Into<String>) -> &mut Self {
        self.edits.push(Edit::DeleteFamily {
            family: family.into(),
        });
        self
    }

    pub fn delete_row(&mut self) -> &mut Self {
        self.edits.push(Edit::DeleteRow);
        self
    }

    pub fn add_to_cell(
        &mut self,
        family: impl Into<String>,
        qualifier: impl Into<Vec<u8>>,
        timestamp: impl Into<Timestamp>,
        delta: i64,
    ) -> &mut Self {
        self.edits.push(Edit::AddToCell {
            family: family.into(),
            qualifier: qualifier.into(),
            timestamp: timestamp.into(),
            delta,
        });
        self
    }

    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// A mutation may be retried only if every edit is idempotent: no
    /// server-assigned timestamps and no increments.
    pub fn is_idempotent(&self) -> bool {
        self.edits.iter().all(Edit::is_idempotent)
    }
}

/// Predicate plus the mutation to apply when it matches and when it does not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalMutation {
    pub predicate: Filter,
    pub on_match: Option<Mutation>,
    pub on_no_match: Option<Mutation>,
}

impl ConditionalMutation {
    pub fn new(predicate: Filter, on_match: Option<Mutation>, on_no_match: Option<Mutation>) -> Self {
        Self {
            predicate,
            on_match,
            on_no_match,
        }
    }
}

/// A single-row write as accepted by the single-write driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Plain(Mutation),
    Conditional(ConditionalMutation),
}

impl WriteOp {
    /// Whether a failed attempt may be sent again. Conditional writes never
    /// are: predicate evaluation and branch commit cannot be observed
    /// separately by the client.
    pub fn is_retry_safe(&self) -> bool {
        match self {
            WriteOp::Plain(m) => m.is_idempotent(),
            WriteOp::Conditional(_) => false,
        }
    }
}

impl From<Mutation> for WriteOp {
    fn from(m: Mutation) -> Self {
        WriteOp::Plain(m)
    }
}

impl From<ConditionalMutation> for WriteOp {
    fn from(m: ConditionalMutation) -> Self {
        WriteOp::Conditional(m)
    }
}
