//! CLI for the Tabula retry engine: inspect config and exercise the drivers
//! against the in-memory emulator.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tabula_core::config;

use commands::{run_config, run_scan, run_simulate, ScanArgs, Scenario};

/// Top-level CLI for Tabula.
#[derive(Debug, Parser)]
#[command(name = "tabula")]
#[command(about = "Tabula: retry and resumption engine for wide-column table clients", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Print the effective configuration and where it was loaded from.
    Config,

    /// Run a scripted fault scenario against the emulator and report the outcome.
    Simulate {
        /// Scenario to run.
        #[arg(value_enum, default_value = "all")]
        scenario: Scenario,
    },

    /// Scan a seeded emulator and print rows as JSON lines.
    Scan {
        /// JSON seed file: {"rows": [{"key": "...", "cells": [...]}]}.
        #[arg(long)]
        seed: PathBuf,
        /// First key to include.
        #[arg(long)]
        start: Option<String>,
        /// Key to stop before.
        #[arg(long)]
        end: Option<String>,
        /// Scan in descending key order.
        #[arg(long)]
        reverse: bool,
        /// Maximum rows to return (0 = unbounded).
        #[arg(long, default_value = "0")]
        limit: i64,
        /// Fail the first stream with UNAVAILABLE after N rows.
        #[arg(long, value_name = "N")]
        interrupt_after: Option<usize>,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Config => run_config(&cfg)?,
            CliCommand::Simulate { scenario } => run_simulate(&cfg, scenario).await?,
            CliCommand::Scan {
                seed,
                start,
                end,
                reverse,
                limit,
                interrupt_after,
            } => {
                let args = ScanArgs {
                    seed,
                    start,
                    end,
                    reverse,
                    limit,
                    interrupt_after,
                };
                run_scan(&cfg, &args).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
