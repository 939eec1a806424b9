//! `tabula simulate` – run scripted fault scenarios against the emulator.

use anyhow::{bail, Result};
use clap::ValueEnum;
use std::fmt::Debug;
use std::time::Duration;
use tabula_core::config::TabulaConfig;
use tabula_core::control::CallContext;
use tabula_core::emulator::{Emulator, Fault, Method};
use tabula_core::filter::Filter;
use tabula_core::mutation::{ConditionalMutation, Mutation, Timestamp};
use tabula_core::retry::TableError;
use tabula_core::row::RowKey;
use tabula_core::rowset::{RowRange, RowSet};
use tabula_core::scan::ReadOption;
use tabula_core::status::{Code, Status};
use tabula_core::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Three UNAVAILABLE replies, then the write lands.
    WriteRetry,
    /// A conditional write that fails once and is not resent.
    Conditional,
    /// Whole-request and per-entry failures, resending only what failed.
    BulkRetry,
    /// A permanent failure plus a non-idempotent entry: no retry round.
    BulkPartial,
    /// A scan interrupted three times, resuming past the last key.
    ScanResume,
    /// The same for a reverse scan.
    ScanReverse,
    /// An interrupted scan with a row limit.
    ScanLimit,
    /// Bulk write issued with a deadline already in the past.
    ExpiredDeadline,
    /// Every scenario above.
    All,
}

impl Scenario {
    const EACH: [Scenario; 8] = [
        Scenario::WriteRetry,
        Scenario::Conditional,
        Scenario::BulkRetry,
        Scenario::BulkPartial,
        Scenario::ScanResume,
        Scenario::ScanReverse,
        Scenario::ScanLimit,
        Scenario::ExpiredDeadline,
    ];

    pub fn expand(self) -> Vec<Scenario> {
        match self {
            Scenario::All => Self::EACH.to_vec(),
            one => vec![one],
        }
    }

    fn name(self) -> String {
        self.to_possible_value()
            .map(|v| v.get_name().to_string())
            .unwrap_or_default()
    }
}

/// Outcome of one scenario.
struct Report {
    ok: bool,
    detail: String,
}

impl Report {
    fn expect(ok: bool, detail: String) -> Self {
        Self { ok, detail }
    }
}

pub async fn run_simulate(cfg: &TabulaConfig, scenario: Scenario) -> Result<()> {
    let mut failed = 0usize;
    for s in scenario.expand() {
        let report = run_one(cfg, s).await;
        println!(
            "{:<18} {:<4} {}",
            s.name(),
            if report.ok { "ok" } else { "FAIL" },
            report.detail
        );
        if !report.ok {
            failed += 1;
        }
    }
    if failed > 0 {
        bail!("{} scenario(s) did not behave as expected", failed);
    }
    Ok(())
}

fn unavailable() -> Status {
    Status::new(Code::Unavailable, "simulated outage")
}

fn cell(value: &str) -> Mutation {
    let mut m = Mutation::new();
    m.set("cf", "col", 1, value);
    m
}

fn seeded(keys: &[&str]) -> Emulator {
    let emulator = Emulator::new();
    for key in keys {
        emulator.put(*key, &cell(key));
    }
    emulator
}

fn keys(keys: &[&str]) -> Vec<RowKey> {
    keys.iter().map(|k| RowKey::from(*k)).collect()
}

fn describe<T: Debug>(result: &Result<T, TableError>) -> String {
    match result {
        Ok(v) => format!("ok {:?}", v),
        Err(e) => format!("error {}", e),
    }
}

async fn scan(
    table: &Table<Emulator>,
    rows: impl Into<RowSet>,
    options: &[ReadOption],
) -> Result<Vec<String>, TableError> {
    let mut out = Vec::new();
    table
        .read_rows(
            &CallContext::background(),
            rows,
            |row| {
                out.push(row.key.to_string());
                true
            },
            options,
        )
        .await?;
    Ok(out)
}

async fn run_one(cfg: &TabulaConfig, scenario: Scenario) -> Report {
    let ctx = CallContext::background();
    match scenario {
        Scenario::WriteRetry => {
            let emulator = Emulator::new();
            emulator.push_faults(Method::MutateRow, (0..3).map(|_| Fault::reject(unavailable())));
            let table = Table::new(emulator.clone(), "simulated", cfg);
            let result = table.apply(&ctx, "row", cell("v")).await;
            let calls = emulator.call_count(Method::MutateRow);
            Report::expect(
                result.is_ok() && calls == 4,
                format!("{} after {} attempts", describe(&result), calls),
            )
        }
        Scenario::Conditional => {
            let emulator = Emulator::new();
            emulator.push_fault(Method::CheckAndMutateRow, Fault::reject(unavailable()));
            let table = Table::new(emulator.clone(), "simulated", cfg);
            let cond = ConditionalMutation::new(Filter::PassAll, Some(cell("v")), None);
            let result = table.apply_conditional(&ctx, "row", cond).await;
            let calls = emulator.call_count(Method::CheckAndMutateRow);
            Report::expect(
                result.is_err() && calls == 1,
                format!("{} after {} attempt(s)", describe(&result), calls),
            )
        }
        Scenario::BulkRetry => {
            let emulator = Emulator::new();
            let status = |code| Status::new(code, "");
            emulator.push_faults(
                Method::MutateRows,
                vec![
                    Fault::reject(unavailable()),
                    Fault::EntryStatuses(vec![
                        status(Code::Unavailable),
                        status(Code::Ok),
                        status(Code::Aborted),
                    ]),
                    Fault::EntryStatuses(vec![status(Code::Ok), status(Code::Aborted)]),
                ],
            );
            let table = Table::new(emulator.clone(), "simulated", cfg);
            let result = table
                .apply_bulk(
                    &ctx,
                    keys(&["row1", "row2", "row3"]),
                    vec![cell("1"), cell("2"), cell("3")],
                )
                .await;
            let sizes: Vec<usize> = emulator
                .mutate_rows_requests()
                .iter()
                .map(|r| r.entries.len())
                .collect();
            Report::expect(
                matches!(result, Ok(None)) && sizes == [3, 3, 2, 1],
                format!("{}; request sizes {:?}", describe(&result), sizes),
            )
        }
        Scenario::BulkPartial => {
            let emulator = Emulator::new();
            emulator.push_fault(
                Method::MutateRows,
                Fault::EntryStatuses(vec![
                    Status::new(Code::FailedPrecondition, ""),
                    Status::new(Code::Aborted, ""),
                ]),
            );
            let table = Table::new(emulator.clone(), "simulated", cfg);
            let mut server_time = Mutation::new();
            server_time.set("cf", "col", Timestamp::ServerTime, "");
            let result = table
                .apply_bulk(&ctx, keys(&["row1", "row2"]), vec![cell("1"), server_time])
                .await;
            let codes: Option<Vec<Option<Code>>> = result
                .as_ref()
                .ok()
                .and_then(|errors| errors.as_ref())
                .map(|errors| errors.iter().map(|e| e.as_ref().map(|s| s.code)).collect());
            let calls = emulator.call_count(Method::MutateRows);
            Report::expect(
                codes == Some(vec![Some(Code::FailedPrecondition), Some(Code::Aborted)])
                    && calls == 1,
                format!("per-entry codes {:?} after {} request(s)", codes, calls),
            )
        }
        Scenario::ScanResume => {
            let emulator = seeded(&["a", "b", "c", "d", "f", "g"]);
            emulator.push_faults(
                Method::ReadRows,
                vec![
                    Fault::reject(unavailable()),
                    Fault::interrupt_after(2, unavailable()),
                    Fault::interrupt_after(2, unavailable()),
                    Fault::last_scanned("e", unavailable()),
                ],
            );
            let table = Table::new(emulator.clone(), "simulated", cfg);
            let result = scan(&table, RowRange::new("a", "z"), &[]).await;
            Report::expect(
                matches!(&result, Ok(rows) if rows == &["a", "b", "c", "d", "f", "g"]),
                format!(
                    "{} over {} streams",
                    describe(&result),
                    emulator.call_count(Method::ReadRows)
                ),
            )
        }
        Scenario::ScanReverse => {
            let emulator = seeded(&["a", "b", "c", "d", "f", "g"]);
            emulator.push_faults(
                Method::ReadRows,
                vec![
                    Fault::interrupt_after(2, unavailable()),
                    Fault::last_scanned("e", unavailable()),
                    Fault::interrupt_after(2, unavailable()),
                ],
            );
            let table = Table::new(emulator.clone(), "simulated", cfg);
            let result = scan(&table, RowRange::closed("a", "z"), &[ReadOption::Reverse]).await;
            Report::expect(
                matches!(&result, Ok(rows) if rows == &["g", "f", "d", "c", "b", "a"]),
                format!(
                    "{} over {} streams",
                    describe(&result),
                    emulator.call_count(Method::ReadRows)
                ),
            )
        }
        Scenario::ScanLimit => {
            let emulator = seeded(&["a", "b", "c", "d"]);
            emulator.push_fault(Method::ReadRows, Fault::interrupt_after(2, unavailable()));
            let table = Table::new(emulator.clone(), "simulated", cfg);
            let result = scan(&table, RowRange::new("a", "z"), &[ReadOption::Limit(3)]).await;
            let limits: Vec<u64> = emulator
                .read_requests()
                .iter()
                .map(|r| r.rows_limit)
                .collect();
            Report::expect(
                matches!(&result, Ok(rows) if rows == &["a", "b", "c"]) && limits == [3, 1],
                format!("{}; request limits {:?}", describe(&result), limits),
            )
        }
        Scenario::ExpiredDeadline => {
            let emulator = Emulator::new();
            let table = Table::new(emulator.clone(), "simulated", cfg);
            let expired = CallContext::with_timeout(Duration::ZERO);
            let result = table
                .apply_bulk(
                    &expired,
                    keys(&["row1", "row2", "row3"]),
                    vec![cell("1"), cell("2"), cell("3")],
                )
                .await;
            let calls = emulator.call_count(Method::MutateRows);
            Report::expect(
                matches!(result, Err(TableError::DeadlineExceeded)) && calls == 0,
                format!("{} after {} request(s)", describe(&result), calls),
            )
        }
        Scenario::All => Report::expect(false, "expands to every scenario".to_string()),
    }
}
