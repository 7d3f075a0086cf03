//! Runtime configuration
//!
//! Read from `<data_dir>/config.yaml`; a missing file means defaults. The
//! server URL can be overridden by `RETREEVER_BASE_URL` and then by the
//! first command-line argument.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "config.yaml";
pub const LOG_FILE: &str = "retreever.log";
pub const BASE_URL_ENV: &str = "RETREEVER_BASE_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server exposing `/retreever/*`
    pub base_url: String,
    pub debounce_ms: u64,
    pub heartbeat_secs: u64,
    pub request_timeout_secs: u64,
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            base_url: "http://localhost:8080".to_string(),
            debounce_ms: 400,
            heartbeat_secs: 30,
            request_timeout_secs: 30,
            data_dir: default_data_dir(),
        }
    }
}

/// `~/.retreever`, or `./.retreever` without a home directory
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".retreever")
}

impl Config {
    /// Load from the default data directory and apply overrides.
    pub fn load(args: &[String]) -> Result<Config> {
        let mut config = Self::load_from(&default_data_dir().join(CONFIG_FILE))?;
        config.apply_overrides(std::env::var(BASE_URL_ENV).ok(), args.first().cloned());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Later sources win; blank values are ignored.
    pub fn apply_overrides(&mut self, env_url: Option<String>, arg_url: Option<String>) {
        for url in [env_url, arg_url].into_iter().flatten() {
            if !url.trim().is_empty() {
                self.base_url = url.trim().to_string();
            }
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.data_dir.join("store")
    }
}
