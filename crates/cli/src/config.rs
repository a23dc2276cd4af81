//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI configuration, read from `~/.config/wafctl/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// WAF management address
    pub host: Option<String>,
    /// API bearer token
    pub token: Option<String>,
    /// Zabbix host name used for state files and encoded lines
    pub zabbix_host: Option<String>,
    /// Directory the sender keeps its poll state in
    pub state_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default location; a missing file
    /// yields an empty configuration
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))
    }

    /// Get the configuration file path
    pub fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("wafctl").join("config.json"))
    }

    /// State directory, defaulting to the sender's default
    pub fn state_dir_or_default(&self, override_dir: Option<PathBuf>) -> PathBuf {
        override_dir
            .or_else(|| self.state_dir.clone())
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// First non-empty value of a flag and the config file
pub fn pick(flag: Option<String>, file: &Option<String>) -> Option<String> {
    flag.filter(|v| !v.is_empty())
        .or_else(|| file.clone().filter(|v| !v.is_empty()))
}
