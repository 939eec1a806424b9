use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bulk::DEFAULT_MAX_MUTATIONS_PER_REQUEST;
use crate::retry::{Backoff, ErrorClassifier, RetryPolicy, DEFAULT_RETRYABLE_INTERNAL_MESSAGES};

/// Environment variable that turns off use of server retry hints.
pub const DISABLE_RETRY_INFO_ENV: &str = "DISABLE_RETRY_INFO";

/// Retry policy parameters (`[retry]` in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Growth factor applied per attempt.
    pub multiplier: f64,
    /// Cap on any single backoff delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Randomize each delay in `[0, computed]`.
    pub jitter: bool,
    /// Maximum attempts including the first; unset means only the call deadline bounds retries.
    pub max_attempts: Option<u32>,
    /// Prefer the server's retry hint over client backoff when present.
    pub honor_retry_info: bool,
    /// Substrings that make an `Internal` status retryable (case-insensitive).
    pub retryable_internal_messages: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 100,
            multiplier: 1.3,
            max_delay_ms: 2000,
            jitter: true,
            max_attempts: None,
            honor_retry_info: true,
            retryable_internal_messages: DEFAULT_RETRYABLE_INTERNAL_MESSAGES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Bulk-write settings (`[bulk]` in config.toml).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    /// Cap on edits carried by one bulk request.
    pub max_mutations_per_request: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            max_mutations_per_request: DEFAULT_MAX_MUTATIONS_PER_REQUEST,
        }
    }
}

/// Global configuration loaded from `~/.config/tabula/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TabulaConfig {
    /// Call timeout applied when the caller gives no deadline.
    pub default_timeout_secs: u64,
    pub retry: RetryConfig,
    pub bulk: BulkConfig,
}

impl Default for TabulaConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 60,
            retry: RetryConfig::default(),
            bulk: BulkConfig::default(),
        }
    }
}

impl TabulaConfig {
    /// Build the retry policy shared by the drivers.
    pub fn retry_policy(&self) -> RetryPolicy {
        let r = &self.retry;
        RetryPolicy {
            classifier: ErrorClassifier::new(&r.retryable_internal_messages),
            backoff: Backoff {
                initial: Duration::from_millis(r.initial_delay_ms),
                multiplier: r.multiplier,
                max: Duration::from_millis(r.max_delay_ms),
                jitter: r.jitter,
            },
            max_attempts: r.max_attempts,
            honor_retry_info: r.honor_retry_info,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs.max(1))
    }
}

/// Apply the `DISABLE_RETRY_INFO` override given the variable's value.
pub fn apply_env_override(mut cfg: TabulaConfig, disable_retry_info: Option<&str>) -> TabulaConfig {
    if let Some(value) = disable_retry_info {
        let value = value.trim();
        if value == "1" || value.eq_ignore_ascii_case("true") {
            tracing::debug!("{} set, ignoring server retry hints", DISABLE_RETRY_INFO_ENV);
            cfg.retry.honor_retry_info = false;
        }
    }
    cfg
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("tabula")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
/// The environment override is applied on top.
pub fn load_or_init() -> Result<TabulaConfig> {
    let cfg = load_from(&config_path()?)?;
    let env = std::env::var(DISABLE_RETRY_INFO_ENV).ok();
    Ok(apply_env_override(cfg, env.as_deref()))
}

/// Load configuration from `path`, writing defaults there if it is missing.
pub fn load_from(path: &Path) -> Result<TabulaConfig> {
    if !path.exists() {
        let default_cfg = TabulaConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)?;
    let cfg: TabulaConfig =
        toml::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{Code, Status};

    #[test]
    fn default_config_values() {
        let cfg = TabulaConfig::default();
        assert_eq!(cfg.default_timeout_secs, 60);
        assert_eq!(cfg.retry.initial_delay_ms, 100);
        assert_eq!(cfg.retry.max_delay_ms, 2000);
        assert!(cfg.retry.honor_retry_info);
        assert_eq!(cfg.retry.max_attempts, None);
        assert_eq!(cfg.bulk.max_mutations_per_request, 100_000);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = TabulaConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: TabulaConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn config_toml_partial_sections() {
        let toml = r#"
            default_timeout_secs = 5

            [retry]
            max_attempts = 4
            jitter = false
            retryable_internal_messages = ["stream terminated"]
        "#;
        let cfg: TabulaConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.default_timeout_secs, 5);
        assert_eq!(cfg.retry.max_attempts, Some(4));
        assert!(!cfg.retry.jitter);
        assert_eq!(cfg.retry.initial_delay_ms, 100);
        assert_eq!(cfg.bulk, BulkConfig::default());

        let policy = cfg.retry_policy();
        assert!(!policy.backoff.jitter);
        assert!(policy
            .classifier
            .is_retryable(&Status::new(Code::Internal, "Stream terminated by peer")));
        assert!(!policy
            .classifier
            .is_retryable(&Status::new(Code::Internal, "rst_stream")));
    }

    #[test]
    fn env_override_disables_retry_info() {
        let cfg = apply_env_override(TabulaConfig::default(), Some("1"));
        assert!(!cfg.retry.honor_retry_info);
        let cfg = apply_env_override(TabulaConfig::default(), Some("TRUE"));
        assert!(!cfg.retry.honor_retry_info);
        let cfg = apply_env_override(TabulaConfig::default(), Some("0"));
        assert!(cfg.retry.honor_retry_info);
        let cfg = apply_env_override(TabulaConfig::default(), None);
        assert!(cfg.retry.honor_retry_info);
    }

    #[test]
    fn load_from_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let cfg = load_from(&path).unwrap();
        assert_eq!(cfg, TabulaConfig::default());
        assert!(path.exists());
        assert_eq!(load_from(&path).unwrap(), cfg);
    }

    #[test]
    fn load_from_reports_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "default_timeout_secs = \"soon\"").unwrap();
        assert!(load_from(&path).is_err());
    }
}
