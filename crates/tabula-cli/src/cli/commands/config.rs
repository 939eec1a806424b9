//! `tabula config` – print the effective configuration.

use anyhow::Result;
use tabula_core::config::{self, TabulaConfig, DISABLE_RETRY_INFO_ENV};
use tabula_core::logging;

pub fn run_config(cfg: &TabulaConfig) -> Result<()> {
    println!("config: {}", config::config_path()?.display());
    if let Ok(log) = logging::log_path() {
        println!("log:    {}", log.display());
    }
    if !cfg.retry.honor_retry_info {
        println!("server retry hints disabled (config or {})", DISABLE_RETRY_INFO_ENV);
    }
    println!("{}", serde_json::to_string_pretty(cfg)?);
    Ok(())
}
