// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration file

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strand_core::Address;
use strand_engine::{MaintenanceConfig, StreamConfig};
use thiserror::Error;

/// Overrides `base_dir` when set
pub const BASE_DIR_ENV: &str = "STRAND_BASE_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Daemon configuration
///
/// Paths left unset are placed under `base_dir`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub base_dir: PathBuf,
    pub socket_path: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
    pub lock_path: Option<PathBuf>,
    /// Address arbitration instances on this node are hosted at
    pub self_address: Address,
    pub maintenance: MaintenanceConfig,
    pub stream: StreamConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("/var/lib/strand"),
            socket_path: None,
            log_path: None,
            lock_path: None,
            self_address: Address::new("127.0.0.1:2882"),
            maintenance: MaintenanceConfig::default(),
            stream: StreamConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load from `path`, falling back to defaults when the file does not
    /// exist, then apply the environment override
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Self::default()
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        config
            .with_base_dir_override(std::env::var_os(BASE_DIR_ENV).map(PathBuf::from))
            .validated()
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn with_base_dir_override(mut self, base_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = base_dir.filter(|d| !d.as_os_str().is_empty()) {
            self.base_dir = dir;
        }
        self
    }

    pub fn validated(self) -> Result<Self, ConfigError> {
        if !self.self_address.is_valid() {
            return Err(ConfigError::Invalid(format!(
                "self_address {} is not host:port",
                self.self_address
            )));
        }
        if self.maintenance.target_period.is_zero() {
            return Err(ConfigError::Invalid(
                "maintenance.target_period must be positive".to_string(),
            ));
        }
        Ok(self)
    }

    /// Root of the per-tenant directories
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("data")
    }

    pub fn socket_path(&self) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(|| self.base_dir.join("strandd.sock"))
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_path
            .clone()
            .unwrap_or_else(|| self.base_dir.join("strandd.log"))
    }

    pub fn lock_path(&self) -> PathBuf {
        self.lock_path
            .clone()
            .unwrap_or_else(|| self.base_dir.join("strandd.pid"))
    }

    /// Config rooted at `base_dir` with every path defaulted
    pub fn for_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
