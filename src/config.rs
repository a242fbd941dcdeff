//! Region-merge configuration.
//!
//! Loaded from TOML with `serde(deny_unknown_fields)` so a typo in a config
//! file fails loudly rather than silently falling back to a default. A
//! missing config file is not an error — it just means defaults.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

fn default_no_cluster() -> bool {
    false
}

fn default_open_log_interval_ms() -> u64 {
    10_000
}

/// Top-level region-merge configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RegionMergeConfig {
    pub testing: TestingConfig,
    pub executor: ExecutorConfig,
}

impl Default for RegionMergeConfig {
    fn default() -> Self {
        Self {
            testing: TestingConfig::default(),
            executor: ExecutorConfig::default(),
        }
    }
}

/// Settings that only matter in a test harness without a full cluster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TestingConfig {
    /// When true, the transaction assumes it is running without a live
    /// coordination-service cluster (e.g. against an in-memory fake) and
    /// relaxes timing assumptions the executor would otherwise make.
    #[serde(default = "default_no_cluster")]
    pub no_cluster: bool,
}

impl Default for TestingConfig {
    fn default() -> Self {
        Self {
            no_cluster: default_no_cluster(),
        }
    }
}

/// Executor tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ExecutorConfig {
    /// How often (in milliseconds) the executor logs a "still waiting for
    /// the merged region to open" message while blocked after the PONR.
    #[serde(default = "default_open_log_interval_ms")]
    pub open_log_interval_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            open_log_interval_ms: default_open_log_interval_ms(),
        }
    }
}

impl RegionMergeConfig {
    /// Load configuration from `path`. A missing file yields defaults.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file exists but fails to parse.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError {
                path: Some(path.to_owned()),
                message: e.to_string(),
            }),
        }
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns [`ConfigError`] with a line number on malformed TOML or an
    /// unknown field.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| {
            let message = if let Some(span) = e.span() {
                let line = toml_str[..span.start].matches('\n').count() + 1;
                format!("line {line}: {e}")
            } else {
                e.to_string()
            };
            ConfigError {
                path: None,
                message,
            }
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigError {
    pub path: Option<std::path::PathBuf>,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "config error in {}: {}", path.display(), self.message),
            None => write!(f, "config error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}
