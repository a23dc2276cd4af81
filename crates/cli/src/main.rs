//! wafctl - troubleshooting CLI for the WAF metrics sender
//!
//! Inspects what the sender would see: discovery documents, raw traffic,
//! device id resolution, a dry-run collection pass and the poll state.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::discover::DiscoverTarget;
use commands::{collect, discover, resolve, state, traffic, Session};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use waf_collector::collector::DEFAULT_SITE_PAGE_SIZE;

/// WAF metrics troubleshooting CLI
#[derive(Parser)]
#[command(name = "wafctl")]
#[command(author, version, about = "Troubleshooting CLI for the WAF metrics sender", long_about = None)]
pub struct Cli {
    /// Config file (defaults to ~/.config/wafctl/config.json)
    #[arg(long, env = "WAFCTL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// WAF management address (can also be set via WAF_HOST env var)
    #[arg(long, env = "WAF_HOST", global = true)]
    pub host: Option<String>,

    /// API bearer token (can also be set via WAF_TOKEN env var)
    #[arg(long, env = "WAF_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    /// Validate the appliance TLS certificate
    #[arg(long, global = true)]
    pub verify_certs: bool,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30, global = true)]
    pub timeout: u64,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print low-level discovery JSON
    Discover {
        /// What to discover
        #[arg(value_enum, default_value = "sites")]
        target: DiscoverTarget,
    },

    /// Query raw traffic for a site
    Traffic {
        /// Site identifier (`_pk` in the site list)
        site_id: String,

        /// Device id to query with (defaults to the primary device id)
        #[arg(long)]
        device_id: Option<String>,

        /// Data granularity: mins, hours or days
        #[arg(long = "type", default_value = "mins")]
        data_type: String,

        /// How far back to query (e.g., 30m, 1h, 2d)
        #[arg(long, default_value = "1h")]
        since: String,
    },

    /// Find the device id that yields data for a site
    Resolve {
        /// Site identifier
        site_id: String,

        /// Candidate to start from (defaults to the site's structId)
        #[arg(long)]
        candidate: Option<String>,
    },

    /// Run one collection pass and print the encoded lines
    Collect {
        /// Data granularity: mins, hours or days
        #[arg(long = "type", default_value = "mins")]
        data_type: String,

        /// Zabbix host name for the points and the state lookup
        #[arg(long)]
        zabbix_host: Option<String>,

        /// Directory holding the poll state files
        #[arg(long)]
        state_dir: Option<PathBuf>,
    },

    /// Show the poll state and the next query window
    State {
        /// Zabbix host name the state belongs to
        #[arg(long)]
        zabbix_host: Option<String>,

        /// Directory holding the poll state files
        #[arg(long)]
        state_dir: Option<PathBuf>,

        /// Granularity for the next window (defaults to the stored one)
        #[arg(long = "type")]
        data_type: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let loaded = match &cli.config {
        Some(path) => config::Config::load_from(path),
        None => config::Config::load(),
    };
    let file = loaded.unwrap_or_else(|e| {
        output::print_error(&format!("Ignoring config file: {:#}", e));
        config::Config::default()
    });
    let session = Session {
        host: config::pick(cli.host, &file.host),
        token: config::pick(cli.token, &file.token),
        verify_certs: cli.verify_certs,
        timeout: Duration::from_secs(cli.timeout),
    };

    match cli.command {
        Commands::Discover { target } => {
            discover::discover(&session, target, DEFAULT_SITE_PAGE_SIZE).await;
        }
        Commands::Traffic {
            site_id,
            device_id,
            data_type,
            since,
        } => {
            traffic::show_traffic(&session, &site_id, device_id, &data_type, &since, cli.format)
                .await?;
        }
        Commands::Resolve { site_id, candidate } => {
            resolve::resolve(&session, &site_id, candidate, cli.format).await?;
        }
        Commands::Collect {
            data_type,
            zabbix_host,
            state_dir,
        } => {
            let options = collect::CollectOptions {
                data_type,
                zabbix_host: config::pick(zabbix_host, &file.zabbix_host),
                state_dir: file.state_dir_or_default(state_dir),
                page_size: DEFAULT_SITE_PAGE_SIZE,
            };
            collect::collect(&session, options).await?;
        }
        Commands::State {
            zabbix_host,
            state_dir,
            data_type,
        } => {
            let zabbix_host = config::pick(zabbix_host, &file.zabbix_host)
                .unwrap_or_else(|| collect::DEFAULT_ZABBIX_HOST.to_string());
            state::show_state(
                &zabbix_host,
                file.state_dir_or_default(state_dir),
                data_type.as_deref(),
                cli.format,
            )?;
        }
    }

    Ok(())
}
