//! Sender configuration
//!
//! Layered lowest to highest: built-in defaults, optional config file,
//! `WAF_SENDER_*` environment variables, command-line flags.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use waf_collector::collector::DEFAULT_SITE_PAGE_SIZE;

const ENV_PREFIX: &str = "WAF_SENDER";

/// Sender configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SenderConfig {
    /// Appliance management address
    #[serde(default)]
    pub waf_host: Option<String>,

    /// API bearer token
    #[serde(default)]
    pub token: Option<String>,

    /// Zabbix server (or proxy) address handed to the sender
    #[serde(default)]
    pub zabbix_server: Option<String>,

    /// Host name the items belong to in Zabbix
    #[serde(default)]
    pub zabbix_host: Option<String>,

    /// Traffic granularity: mins, hours or days
    #[serde(default = "default_data_type")]
    pub data_type: String,

    /// Directory holding the poll state files
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default = "default_sender_program")]
    pub sender_program: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,

    #[serde(default = "default_site_page_size")]
    pub site_page_size: u32,

    /// Prometheus textfile to write run metrics to
    #[serde(default)]
    pub metrics_file: Option<PathBuf>,
}

fn default_data_type() -> String {
    "mins".to_string()
}

fn default_state_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_sender_program() -> String {
    "zabbix_sender".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_accept_invalid_certs() -> bool {
    true
}

fn default_site_page_size() -> u32 {
    DEFAULT_SITE_PAGE_SIZE
}

/// Settings given on the command line, applied over every other layer
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub waf_host: Option<String>,
    pub token: Option<String>,
    pub zabbix_server: Option<String>,
    pub zabbix_host: Option<String>,
    pub data_type: Option<String>,
    pub state_dir: Option<PathBuf>,
    pub sender_program: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub verify_certs: bool,
    pub site_page_size: Option<u32>,
    pub metrics_file: Option<PathBuf>,
}

/// Fully resolved settings with every required value present
#[derive(Debug, Clone)]
pub struct Settings {
    pub waf_host: String,
    pub token: String,
    pub zabbix_server: String,
    pub zabbix_host: String,
    pub data_type: String,
    pub state_dir: PathBuf,
    pub sender_program: String,
    pub request_timeout: Duration,
    pub accept_invalid_certs: bool,
    pub site_page_size: u32,
    pub metrics_file: Option<PathBuf>,
}

impl SenderConfig {
    /// Load configuration from the optional file, the environment and
    /// command-line overrides
    pub fn load(file: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX));

        let path_string = |p: &PathBuf| p.to_string_lossy().into_owned();
        let string_overrides = [
            ("waf_host", overrides.waf_host.clone()),
            ("token", overrides.token.clone()),
            ("zabbix_server", overrides.zabbix_server.clone()),
            ("zabbix_host", overrides.zabbix_host.clone()),
            ("data_type", overrides.data_type.clone()),
            ("state_dir", overrides.state_dir.as_ref().map(path_string)),
            ("sender_program", overrides.sender_program.clone()),
            ("metrics_file", overrides.metrics_file.as_ref().map(path_string)),
        ];
        for (key, value) in string_overrides {
            if let Some(value) = value {
                builder = builder.set_override(key, value)?;
            }
        }
        if let Some(secs) = overrides.request_timeout_secs {
            builder = builder
                .set_override("request_timeout_secs", i64::try_from(secs).unwrap_or(i64::MAX))?;
        }
        if let Some(size) = overrides.site_page_size {
            builder = builder.set_override("site_page_size", i64::from(size))?;
        }
        if overrides.verify_certs {
            builder = builder.set_override("accept_invalid_certs", false)?;
        }

        let config = builder.build().context("Failed to read configuration")?;
        config
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Check required settings and convert to [`Settings`]
    pub fn into_settings(self) -> Result<Settings> {
        let mut missing = Vec::new();
        let mut require = |name: &'static str, value: Option<String>| {
            match value.filter(|v| !v.trim().is_empty()) {
                Some(v) => v,
                None => {
                    missing.push(name);
                    String::new()
                }
            }
        };

        let waf_host = require("waf_host", self.waf_host);
        let token = require("token", self.token);
        let zabbix_server = require("zabbix_server", self.zabbix_server);
        let zabbix_host = require("zabbix_host", self.zabbix_host);

        if !missing.is_empty() {
            bail!("missing required settings: {}", missing.join(", "));
        }

        Ok(Settings {
            waf_host,
            token,
            zabbix_server,
            zabbix_host,
            data_type: self.data_type,
            state_dir: self.state_dir,
            sender_program: self.sender_program,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            accept_invalid_certs: self.accept_invalid_certs,
            site_page_size: self.site_page_size,
            metrics_file: self.metrics_file,
        })
    }
}
