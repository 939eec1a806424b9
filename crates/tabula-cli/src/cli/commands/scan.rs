//! `tabula scan` – scan a seeded emulator and print rows as JSON lines.

use anyhow::{Context, Result};
use serde_json::json;
use std::ops::Bound;
use std::path::PathBuf;
use tabula_core::config::TabulaConfig;
use tabula_core::control::CallContext;
use tabula_core::emulator::{Emulator, Fault, Method};
use tabula_core::row::{Row, RowKey};
use tabula_core::rowset::RowRange;
use tabula_core::scan::ReadOption;
use tabula_core::status::{Code, Status};
use tabula_core::table::Table;

#[derive(Debug, Clone)]
pub struct ScanArgs {
    pub seed: PathBuf,
    pub start: Option<String>,
    pub end: Option<String>,
    pub reverse: bool,
    pub limit: i64,
    pub interrupt_after: Option<usize>,
}

impl ScanArgs {
    /// `[start, end)`, either side open-ended when not given.
    pub fn range(&self) -> RowRange {
        RowRange {
            start: self
                .start
                .as_deref()
                .map_or(Bound::Unbounded, |s| Bound::Included(RowKey::from(s))),
            end: self
                .end
                .as_deref()
                .map_or(Bound::Unbounded, |e| Bound::Excluded(RowKey::from(e))),
        }
    }

    pub fn options(&self) -> Vec<ReadOption> {
        let mut options = Vec::new();
        if self.reverse {
            options.push(ReadOption::Reverse);
        }
        if self.limit != 0 {
            options.push(ReadOption::Limit(self.limit));
        }
        options
    }
}

pub async fn run_scan(cfg: &TabulaConfig, args: &ScanArgs) -> Result<()> {
    let json = std::fs::read_to_string(&args.seed)
        .with_context(|| format!("reading seed {}", args.seed.display()))?;
    let emulator = Emulator::from_seed_json(&json)
        .with_context(|| format!("parsing seed {}", args.seed.display()))?;
    if let Some(rows) = args.interrupt_after {
        emulator.push_fault(
            Method::ReadRows,
            Fault::interrupt_after(rows, Status::new(Code::Unavailable, "injected interruption")),
        );
    }

    let table = Table::new(emulator.clone(), "seeded", cfg);
    let mut printed = 0usize;
    table
        .read_rows(
            &CallContext::background(),
            args.range(),
            |row| {
                println!("{}", row_json(&row));
                printed += 1;
                true
            },
            &args.options(),
        )
        .await?;

    tracing::info!(
        rows = printed,
        attempts = emulator.call_count(Method::ReadRows),
        "scan finished"
    );
    Ok(())
}

fn row_json(row: &Row) -> serde_json::Value {
    let cells: Vec<serde_json::Value> = row
        .cells
        .iter()
        .map(|c| {
            json!({
                "family": c.family,
                "qualifier": String::from_utf8_lossy(&c.qualifier),
                "timestamp_micros": c.timestamp_micros,
                "value": String::from_utf8_lossy(&c.value),
            })
        })
        .collect();
    json!({ "key": row.key.to_string(), "cells": cells })
}
