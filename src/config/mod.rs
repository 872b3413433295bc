//! Configuration for plctrend-rs
//!
//! Settings live in a single TOML file in the platform config directory:
//! - **Linux**: `~/.config/dev.plctrend.plctrend-rs/config.toml`
//! - **macOS**: `~/Library/Application Support/dev.plctrend.plctrend-rs/config.toml`
//! - **Windows**: `%APPDATA%\dev.plctrend.plctrend-rs\config.toml`
//!
//! # Example
//!
//! ```toml
//! [connection]
//! host = "10.0.0.5"
//! family = "Slc500"
//!
//! [acquisition]
//! interval_ms = 500
//! capacity = { MaxPoints = 100000 }
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{Result, TrendError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "dev.plctrend.plctrend-rs";

/// Config filename
pub const CONFIG_FILE: &str = "config.toml";

/// Get the application config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the path to the default config file
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendConfig {
    #[serde(default)]
    pub connection: ConnectionSettings,
    #[serde(default)]
    pub acquisition: AcquisitionSettings,
    #[serde(default)]
    pub discovery: DiscoverySettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl TrendConfig {
    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| TrendError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| TrendError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        self.acquisition
            .poller_config()
            .map_err(|e| TrendError::Config(e.to_string()))?;
        if self.connection.timeout_ms == 0 {
            return Err(TrendError::Config(
                "connection timeout must be positive".to_string(),
            ));
        }
        if self.acquisition.capacity.limit() == Some(0) {
            return Err(TrendError::Config(
                "capacity must allow at least one point".to_string(),
            ));
        }
        Ok(())
    }

    /// Load a config file
    ///
    /// A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            TrendError::Config(format!("Failed to read config {:?}: {}", path, e))
        })?;
        Self::from_toml(&content)
    }

    /// Load the config from `path` or the default location, falling back to defaults on any error
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) => p,
                None => return Self::default(),
            },
        };
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the config, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TrendError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| {
            TrendError::Config(format!("Failed to write config {:?}: {}", path, e))
        })
    }
}
