//! Configuration file parsing
//!
//! Parses TOML configuration for target wiring: the cluster endpoint
//! to dial and the VDI each logical unit exposes.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::protocol::types::SD_DEFAULT_ADDR;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Target configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Cluster settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Logical units to expose
    #[serde(default)]
    pub lu: Vec<LuConfig>,
}

/// Cluster settings
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Cluster endpoint as host:port
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            log_level: default_log_level(),
        }
    }
}

fn default_addr() -> String {
    SD_DEFAULT_ADDR.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// One logical unit
#[derive(Debug, Clone, Deserialize)]
pub struct LuConfig {
    /// VDI name this logical unit exposes
    pub vdi: String,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.store.addr.is_empty() {
            return Err(ConfigError::Invalid("store.addr must not be empty".into()));
        }

        let mut seen = std::collections::HashSet::new();
        for lu in &self.lu {
            if lu.vdi.is_empty() {
                return Err(ConfigError::Invalid("lu.vdi must not be empty".into()));
            }
            if !seen.insert(lu.vdi.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate logical unit for VDI {:?}",
                    lu.vdi
                )));
            }
        }

        Ok(())
    }
}
