//! Client configuration.
//!
//! Resolution order (later wins):
//! 1. Built-in defaults
//! 2. TOML file (explicit `--config` path, else `<platform config dir>/config.toml` if present)
//! 3. Environment overrides (`COURIER_API_URL`, `COURIER_DATA_DIR`, `COURIER_CREDENTIAL_KEY`)

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default backend base URL.
const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Secure-store key the session credential is persisted under.
pub const DEFAULT_CREDENTIAL_KEY: &str = "jwt-key";

/// Default HTTP request timeout.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default time a cached query result stays fresh.
const DEFAULT_QUERY_STALE_SECS: u64 = 60;

const ENV_API_URL: &str = "COURIER_API_URL";
const ENV_DATA_DIR: &str = "COURIER_DATA_DIR";
const ENV_CREDENTIAL_KEY: &str = "COURIER_CREDENTIAL_KEY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend base URL, without a trailing slash.
    pub api_url: String,
    /// Where the secure store lives. `None` means the platform data dir.
    pub data_dir: Option<PathBuf>,
    /// Secure-store key for the session credential.
    pub credential_key: String,
    pub request_timeout_secs: u64,
    pub query_stale_secs: u64,
    /// Treat credentials whose `exp` claim has passed as undecodable.
    pub reject_expired_tokens: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            data_dir: None,
            credential_key: DEFAULT_CREDENTIAL_KEY.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            query_stale_secs: DEFAULT_QUERY_STALE_SECS,
            reject_expired_tokens: false,
        }
    }
}

impl Config {
    /// Load configuration from an explicit path or the platform default,
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        tracing::debug!(api_url = %config.api_url, "configuration loaded");
        Ok(config)
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.api_url = normalize_base_url(&config.api_url);
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api_url = normalize_base_url(&url);
        }
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|v| !v.trim().is_empty()) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(key) = lookup(ENV_CREDENTIAL_KEY).filter(|v| !v.trim().is_empty()) {
            self.credential_key = key;
        }
    }

    /// Resolve the data directory, falling back to the platform default.
    pub fn resolved_data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        project_dirs()
            .map(|dirs| dirs.data_dir().to_path_buf())
            .context("could not determine a data directory; set COURIER_DATA_DIR")
    }

    /// Directory holding the encrypted credential store.
    pub fn secure_store_dir(&self) -> Result<PathBuf> {
        Ok(self.resolved_data_dir()?.join("secure"))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn query_stale_time(&self) -> Duration {
        Duration::from_secs(self.query_stale_secs)
    }
}

/// `<platform config dir>/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "courier", "courier")
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
