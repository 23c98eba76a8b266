//! File and environment configuration for the `ticketscan` binary.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::runtime::handle::RuntimeConfig;

/// Overrides [`AppConfig::api_url`].
pub const API_URL_ENV: &str = "TICKETSCAN_API_URL";
/// Overrides [`AppConfig::access_token`].
pub const ACCESS_TOKEN_ENV: &str = "TICKETSCAN_ACCESS_TOKEN";

/// Errors while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The config file is not valid TOML for [`AppConfig`].
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A required value is absent from both file and environment.
    #[error("missing {0}; set it in the config file or via {1}")]
    Missing(&'static str, &'static str),
}

/// Settings for one `ticketscan` invocation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// REST backend base URL.
    pub api_url: Option<String>,
    /// Bearer token for the REST backend.
    pub access_token: Option<String>,
    /// SQLite file holding scan history.
    pub db_path: Option<PathBuf>,
    /// Per-request timeout for backend calls.
    pub request_timeout_ms: Option<u64>,
    /// Scan session tunables.
    pub scanner: RuntimeConfig,
}

impl AppConfig {
    /// Parses a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reads `path`, or the default location when `None`, then applies
    /// environment overrides. A missing default file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => read_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => read_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Replaces fields with non-empty values returned by `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(API_URL_ENV).filter(|v| !v.is_empty()) {
            self.api_url = Some(url);
        }
        if let Some(token) = lookup(ACCESS_TOKEN_ENV).filter(|v| !v.is_empty()) {
            self.access_token = Some(token);
        }
    }

    /// Base URL, required for any backend call.
    pub fn require_api_url(&self) -> Result<&str, ConfigError> {
        self.api_url
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("api_url", API_URL_ENV))
    }

    /// Bearer token, required for any backend call.
    pub fn require_access_token(&self) -> Result<&str, ConfigError> {
        self.access_token
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("access_token", ACCESS_TOKEN_ENV))
    }

    /// Configured history database, or the default under the data directory.
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(default_db_path)
    }
}

fn read_file(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    AppConfig::from_toml(&content)
}

/// `<config_dir>/ticketscan/config.toml`, when a config directory exists.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ticketscan").join("config.toml"))
}

/// `<data_dir>/ticketscan/history.db`, falling back to the working directory.
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("ticketscan"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("history.db")
}
