//! Device id resolution for a single site

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use waf_collector::collector::DEFAULT_SITE_PAGE_SIZE;
use waf_collector::{DeviceIdResolver, Resolution, Site};

use super::Session;
use crate::output::{print_json, print_success, print_warning, OutputFormat};

#[derive(Debug, Serialize)]
struct ResolveReport<'a> {
    site_id: &'a str,
    site_name: Option<&'a str>,
    candidate: &'a str,
    device_id: &'a str,
    strategy: Option<String>,
}

/// Run the resolution chain for `site_id` and print the outcome.
///
/// Without `--candidate`, the site's structId from the listing is used,
/// falling back to the placeholder `""`.
pub async fn resolve(
    session: &Session,
    site_id: &str,
    candidate: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let api = session.api()?;
    let sites = api
        .list_sites(DEFAULT_SITE_PAGE_SIZE)
        .await
        .context("Failed to list sites")?;
    let site = sites.iter().find(|s| s.id == site_id);
    if site.is_none() {
        print_warning(&format!("Site {} is not in the site list", site_id));
    }

    let candidate = default_candidate(candidate, site);
    let mut resolver = DeviceIdResolver::new(api);
    let resolution = resolver.resolve(site_id, &candidate, &sites).await;

    let report = ResolveReport {
        site_id,
        site_name: site.map(|s| s.name.as_str()),
        candidate: &candidate,
        device_id: &resolution.device_id,
        strategy: resolution.strategy.map(|s| s.to_string()),
    };
    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Table => print_resolution(&report, &resolution),
    }
    Ok(())
}

fn default_candidate(flag: Option<String>, site: Option<&Site>) -> String {
    flag.or_else(|| site.and_then(|s| s.alternate_id()).map(str::to_string))
        .unwrap_or_default()
}

fn print_resolution(report: &ResolveReport<'_>, resolution: &Resolution) {
    println!("{}", "Device Id Resolution".bold());
    println!("{}", "=".repeat(40));
    println!("Site:      {}", report.site_id.cyan());
    if let Some(name) = report.site_name {
        println!("Name:      {}", name.cyan());
    }
    println!("Candidate: {:?}", report.candidate);
    println!();

    match resolution.strategy {
        Some(strategy) => print_success(&format!(
            "device id {} (via {})",
            resolution.device_id.green(),
            strategy
        )),
        None => print_warning(&format!(
            "no device id yields data; collection would keep {:?} and zero-fill",
            resolution.device_id
        )),
    }
}
