//! Server configuration.
//!
//! Loaded from an optional TOML file; every field has a default, so an
//! empty file (or no file) yields a working setup:
//!
//! ```toml
//! listen = "0.0.0.0:3000"
//!
//! [log]
//! level  = "info"
//! format = "pretty"          # or "json"
//!
//! [accounting]
//! reap_children          = true
//! expose_headers         = true
//! max_internal_redirects = 10
//!
//! [work]
//! scratch_dir    = "/tmp"
//! max_iterations = 200000000
//! max_io_bytes   = 67108864
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::telemetry::LogConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub listen: SocketAddr,
    pub log: LogConfig,
    pub accounting: AccountingConfig,
    pub work: WorkConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 3000)),
            log: LogConfig::default(),
            accounting: AccountingConfig::default(),
            work: WorkConfig::default(),
        }
    }
}

/// How the host layer drives the accountant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccountingConfig {
    /// Collect exited children (non-blocking) before the end snapshot.
    pub reap_children: bool,
    /// Copy published values into `x-acc-*` response headers.
    pub expose_headers: bool,
    /// Internal redirects allowed per transaction before answering 500.
    pub max_internal_redirects: usize,
}

impl Default for AccountingConfig {
    fn default() -> Self {
        Self {
            reap_children: true,
            expose_headers: true,
            max_internal_redirects: 10,
        }
    }
}

/// Limits for the demo work endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkConfig {
    pub scratch_dir: PathBuf,
    pub max_iterations: u64,
    pub max_io_bytes: u64,
}

impl Default for WorkConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir(),
            max_iterations: 200_000_000,
            max_io_bytes: 64 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Defaults when `path` is `None`, otherwise the parsed file.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}
