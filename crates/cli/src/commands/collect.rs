//! Dry-run collection pass
//!
//! Runs the same collection the sender does and prints the encoded
//! lines instead of delivering them. The poll state is read, never
//! written.

use anyhow::{Context, Result};
use chrono::Local;
use std::io::Write;
use std::path::PathBuf;
use waf_collector::protocol::write_points;
use waf_collector::{CollectorConfig, Granularity, MetricsCollector, PollWindowTracker};

use super::Session;

/// Zabbix host used when neither a flag nor the config file names one
pub const DEFAULT_ZABBIX_HOST: &str = "wafctl";

/// Options of `wafctl collect`
#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub data_type: String,
    pub zabbix_host: Option<String>,
    pub state_dir: PathBuf,
    pub page_size: u32,
}

pub async fn collect(session: &Session, options: CollectOptions) -> Result<()> {
    let api = session.api()?;
    let granularity = Granularity::parse(&options.data_type);
    let zabbix_host = options
        .zabbix_host
        .unwrap_or_else(|| DEFAULT_ZABBIX_HOST.to_string());

    let tracker = PollWindowTracker::new(&options.state_dir);
    let state = tracker.load_state(&zabbix_host);
    match &state {
        Some(state) => eprintln!(
            "resuming from {} ({})",
            state.last_run_time.to_rfc3339(),
            tracker.state_path(&zabbix_host).display()
        ),
        None => eprintln!("no poll state for {}, using a cold-start window", zabbix_host),
    }

    let mut config = CollectorConfig::new(&zabbix_host, granularity);
    config.site_page_size = options.page_size;
    let mut collector = MetricsCollector::new(api, config, state);

    let points = collector
        .collect(Local::now())
        .await
        .context("Collection failed")?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    write_points(&mut out, &points).context("Failed to write points")?;
    out.flush()?;

    let stats = collector.stats();
    eprintln!(
        "{} points from {} sites ({} enabled, {} zero-filled, {} fetch failures, {} unresolved)",
        points.len(),
        stats.sites,
        stats.enabled_sites,
        stats.zero_filled,
        stats.fetch_failures,
        stats.resolver_fallbacks
    );
    Ok(())
}
