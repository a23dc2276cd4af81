//! WAF Sender - pushes per-site WAF traffic metrics to Zabbix
//!
//! Runs one collection pass per invocation, meant to be scheduled by the
//! monitoring agent or cron. Prints `0` on success and `1` on failure,
//! with the matching exit code; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use waf_collector::{
    ApiClient, ApiConfig, CollectorConfig, CollectorMetrics, Granularity, PollWindowTracker,
    Runner, ZabbixSender,
};

mod config;

use config::{Overrides, SenderConfig, Settings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "waf-sender")]
#[command(author, version, about = "Collects WAF per-site traffic metrics and pushes them to Zabbix")]
struct Cli {
    /// Config file (TOML, JSON or YAML)
    #[arg(long, env = "WAF_SENDER_CONFIG")]
    config: Option<PathBuf>,

    /// WAF management address, e.g. https://10.0.0.5:8443
    #[arg(long)]
    waf_host: Option<String>,

    /// API bearer token
    #[arg(long)]
    token: Option<String>,

    /// Zabbix server or proxy address
    #[arg(long)]
    zabbix_server: Option<String>,

    /// Host name in Zabbix the items belong to
    #[arg(long)]
    zabbix_host: Option<String>,

    /// Data granularity: mins, hours or days
    #[arg(long)]
    data_type: Option<String>,

    /// Directory for poll state files
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Path or name of the zabbix_sender executable
    #[arg(long)]
    sender_program: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Validate the appliance TLS certificate
    #[arg(long)]
    verify_certs: bool,

    /// Page size for the site listing
    #[arg(long)]
    site_page_size: Option<u32>,

    /// Write run metrics to this Prometheus textfile
    #[arg(long)]
    metrics_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Suppress all log output
    #[arg(long, conflicts_with = "debug")]
    quiet: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", env = "WAF_SENDER_LOG_FORMAT")]
    log_format: LogFormat,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            waf_host: self.waf_host.clone(),
            token: self.token.clone(),
            zabbix_server: self.zabbix_server.clone(),
            zabbix_host: self.zabbix_host.clone(),
            data_type: self.data_type.clone(),
            state_dir: self.state_dir.clone(),
            sender_program: self.sender_program.clone(),
            request_timeout_secs: self.timeout,
            verify_certs: self.verify_certs,
            site_page_size: self.site_page_size,
            metrics_file: self.metrics_file.clone(),
        }
    }
}

fn init_tracing(cli: &Cli) {
    if cli.quiet {
        return;
    }

    let default_level = if cli.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    match cli.log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    let settings = match SenderConfig::load(cli.config.as_deref(), &cli.overrides())
        .and_then(SenderConfig::into_settings)
    {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("error: {:#}", e);
            eprintln!("Run `waf-sender --help` for usage.");
            println!("1");
            return ExitCode::FAILURE;
        }
    };

    match run(settings).await {
        Ok(()) => {
            println!("0");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "waf-sender failed");
            println!("1");
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: Settings) -> Result<()> {
    let granularity = Granularity::parse(&settings.data_type);
    if !granularity.is_known() {
        warn!(
            data_type = %settings.data_type,
            "Unknown data type, passing it through with minute windows"
        );
    }

    let api = ApiClient::new(&ApiConfig {
        base_url: settings.waf_host.clone(),
        token: settings.token.clone(),
        timeout: settings.request_timeout,
        accept_invalid_certs: settings.accept_invalid_certs,
    })
    .context("Failed to create API client")?;

    let sink = ZabbixSender::new(&settings.sender_program, &settings.zabbix_server);

    let mut collector_config = CollectorConfig::new(&settings.zabbix_host, granularity);
    collector_config.site_page_size = settings.site_page_size;

    let metrics = match &settings.metrics_file {
        Some(_) => Some(CollectorMetrics::new().context("Failed to register run metrics")?),
        None => None,
    };

    let mut runner = Runner::new(
        Arc::new(api),
        Arc::new(sink),
        PollWindowTracker::new(&settings.state_dir),
        collector_config,
    )
    .with_waf_host(&settings.waf_host);
    if let Some(metrics) = &metrics {
        runner = runner.with_metrics(metrics.clone());
    }

    let result = runner.run().await;

    if let (Some(metrics), Some(path)) = (&metrics, &settings.metrics_file) {
        if let Err(e) = metrics.write_textfile(path) {
            warn!(error = %format!("{:#}", e), "Failed to write metrics file");
        }
    }

    let summary = result?;
    info!(
        points = summary.points,
        bytes = summary.bytes,
        sites = summary.stats.sites,
        "Run complete"
    );
    Ok(())
}
