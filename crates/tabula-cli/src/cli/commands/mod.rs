//! CLI command handlers, one file per command.

mod config;
mod scan;
mod simulate;

pub use config::run_config;
pub use scan::{run_scan, ScanArgs};
pub use simulate::{run_simulate, Scenario};
