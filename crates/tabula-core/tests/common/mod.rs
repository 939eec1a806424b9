//! Shared helpers for the emulator-backed integration tests.

#![allow(dead_code)]

use std::time::Duration;

use tabula_core::emulator::Emulator;
use tabula_core::mutation::Mutation;
use tabula_core::retry::{Backoff, ErrorClassifier, RetryPolicy};
use tabula_core::row::{Row, RowKey};
use tabula_core::status::{Code, Status};
use tabula_core::table::Table;

/// Retry policy with 1ms exact backoff so retry-heavy tests stay fast.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        classifier: ErrorClassifier::default(),
        backoff: Backoff {
            initial: Duration::from_millis(1),
            multiplier: 1.0,
            max: Duration::from_millis(1),
            jitter: false,
        },
        max_attempts: None,
        honor_retry_info: true,
    }
}

pub fn table(emulator: &Emulator) -> Table<Emulator> {
    Table::with_policy(emulator.clone(), "projects/p/instances/i/tables/t", fast_policy())
        .default_timeout(Duration::from_secs(10))
}

pub fn status(code: Code) -> Status {
    Status::new(code, "")
}

pub fn set_cell(value: &str) -> Mutation {
    let mut m = Mutation::new();
    m.set("cf", "col", 1000, value);
    m
}

/// Emulator holding one single-cell row per key.
pub fn emulator_with_rows(keys: &[&str]) -> Emulator {
    let emulator = Emulator::new();
    for key in keys {
        emulator.put(*key, &set_cell(key));
    }
    emulator
}

pub fn keys(rows: &[Row]) -> Vec<String> {
    rows.iter().map(|r| r.key.to_string()).collect()
}

pub fn row_keys(keys: &[&str]) -> Vec<RowKey> {
    keys.iter().map(|k| RowKey::from(*k)).collect()
}
