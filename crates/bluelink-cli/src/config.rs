//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Scan duration when neither the command line nor the config file sets one.
pub const DEFAULT_SCAN_SECS: u64 = 10;

/// Connection timeout when neither the command line nor the config file sets one.
pub const DEFAULT_CONNECT_SECS: u64 = 30;

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Default device identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,

    /// Scan duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_timeout: Option<u64>,

    /// Connection timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<u64>,

    /// Snapshot file location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bluelink")
            .join("config.toml")
    }

    /// Load config from `path`, or return the default if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config file at {}", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Save config to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// The snapshot file to use.
    pub fn store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(bluelink_store::default_store_path)
    }
}

/// Resolve device: command line first, then the config file.
pub fn resolve_device(device: Option<String>, config: &Config) -> Option<String> {
    device.or_else(|| config.device.clone())
}

/// Resolve a timeout: command line first, then the config file, then `default`.
pub fn resolve_timeout(arg: Option<u64>, configured: Option<u64>, default: u64) -> Duration {
    Duration::from_secs(arg.or(configured).unwrap_or(default))
}
