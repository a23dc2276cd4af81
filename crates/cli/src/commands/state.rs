//! Poll state inspection

use anyhow::Result;
use chrono::{DateTime, Local};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use waf_collector::window::compute_window;
use waf_collector::{Granularity, PollWindowTracker};

use crate::output::{print_json, print_warning, OutputFormat};

#[derive(Debug, Serialize)]
struct StateReport {
    state_file: String,
    exists: bool,
    last_run_time: Option<String>,
    data_type: String,
    next_window_start: String,
    next_window_end: String,
}

/// Show the stored state for `zabbix_host` and the window the next run
/// would query. Without `data_type` the stored granularity is used.
pub fn show_state(
    zabbix_host: &str,
    state_dir: PathBuf,
    data_type: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let tracker = PollWindowTracker::new(state_dir);
    let path = tracker.state_path(zabbix_host);
    let state = tracker.load_state(zabbix_host);
    let granularity = match (data_type, &state) {
        (Some(data_type), _) => Granularity::parse(data_type),
        (None, Some(state)) => state.granularity.clone(),
        (None, None) => Granularity::Minutes,
    };
    let (start, end) = compute_window(&granularity, state.as_ref(), Local::now());

    let report = StateReport {
        state_file: path.display().to_string(),
        exists: path.exists(),
        last_run_time: state.as_ref().map(|s| s.last_run_time.to_rfc3339()),
        data_type: granularity.as_str().to_string(),
        next_window_start: format_time(start),
        next_window_end: format_time(end),
    };

    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Table => {
            println!("{}", "Poll State".bold());
            println!("{}", "=".repeat(40));
            println!("File:        {}", report.state_file.cyan());
            match &report.last_run_time {
                Some(t) => println!("Last run:    {}", t.green()),
                None if report.exists => {
                    print_warning("State file is unreadable; the next run starts cold")
                }
                None => println!("Last run:    {}", "never".yellow()),
            }
            println!("Data type:   {}", report.data_type);
            println!(
                "Next window: {} .. {}",
                report.next_window_start, report.next_window_end
            );
        }
    }
    Ok(())
}

fn format_time(t: DateTime<Local>) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}
