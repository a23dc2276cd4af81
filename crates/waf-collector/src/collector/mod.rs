//! Per-run metrics collection from the appliance
//!
//! One [`MetricsCollector`] drives one pass: connectivity check, site
//! enumeration, device id resolution, windowed traffic fetch, and
//! assembly of the flattened [`MetricPoint`] batch. Sites are processed
//! sequentially and a failure on one site never aborts the others.

mod discovery;

#[cfg(test)]
mod tests;

pub use discovery::{discover_devices, discover_sites, LldDocument};

use crate::api::{TrafficQuery, TrafficRecord, WafApi};
use crate::error::CollectError;
use crate::models::{
    site_key, DiscoveryRecord, Granularity, MetricPoint, MetricSample, Site, TrafficMetric,
    KEY_PREFIX,
};
use crate::observability::{IntervalStats, StructuredLogger};
use crate::resolver::DeviceIdResolver;
use crate::window::{compute_window, PollState};
use chrono::{DateTime, Local};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Literal used when the primary device id cannot be determined
pub const PRIMARY_ID_PLACEHOLDER: &str = "default";

/// Default page size for the single site-listing request
pub const DEFAULT_SITE_PAGE_SIZE: u32 = 1000;

pub fn collector_status_key() -> String {
    format!("{}.collector.status", KEY_PREFIX)
}

pub fn collector_timestamp_key() -> String {
    format!("{}.collector.timestamp", KEY_PREFIX)
}

pub fn discovery_key() -> String {
    format!("{}.sites.discovery", KEY_PREFIX)
}

/// Settings for one collection pass
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Host name the points are reported under
    pub target_host: String,
    pub granularity: Granularity,
    pub site_page_size: u32,
}

impl CollectorConfig {
    pub fn new(target_host: impl Into<String>, granularity: Granularity) -> Self {
        Self {
            target_host: target_host.into(),
            granularity,
            site_page_size: DEFAULT_SITE_PAGE_SIZE,
        }
    }
}

/// Counters describing the last pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectStats {
    pub sites: usize,
    pub enabled_sites: usize,
    /// Enabled sites whose traffic query failed
    pub fetch_failures: usize,
    /// Enabled sites reported as zeros (query failed or returned nothing)
    pub zero_filled: usize,
    /// Sites where no device id produced data
    pub resolver_fallbacks: usize,
    pub samples: usize,
}

/// Collects one batch of metric points.
///
/// Owns the in-run caches (primary device id via the resolver, site
/// list); construct a fresh one per run.
pub struct MetricsCollector {
    api: Arc<dyn WafApi>,
    config: CollectorConfig,
    resolver: DeviceIdResolver,
    poll_state: Option<PollState>,
    logger: StructuredLogger,
    sites: Vec<Site>,
    stats: CollectStats,
}

impl MetricsCollector {
    pub fn new(api: Arc<dyn WafApi>, config: CollectorConfig, poll_state: Option<PollState>) -> Self {
        let logger = StructuredLogger::new(config.target_host.clone());
        Self {
            resolver: DeviceIdResolver::new(api.clone()),
            api,
            config,
            poll_state,
            logger,
            sites: Vec::new(),
            stats: CollectStats::default(),
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Sites enumerated by the last pass
    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn stats(&self) -> &CollectStats {
        &self.stats
    }

    /// Run one pass and return every point to deliver.
    ///
    /// Fails only when the appliance is unreachable, the site listing
    /// fails, or it is empty.
    pub async fn collect(&mut self, now: DateTime<Local>) -> Result<Vec<MetricPoint>, CollectError> {
        self.stats = CollectStats::default();

        self.api.ping().await.map_err(CollectError::Connectivity)?;

        let primary_id = match self.resolver.primary_device_id().await {
            Some(id) => id,
            None => {
                warn!(
                    placeholder = PRIMARY_ID_PLACEHOLDER,
                    "Primary device id unavailable, using placeholder"
                );
                PRIMARY_ID_PLACEHOLDER.to_string()
            }
        };

        let sites = self
            .api
            .list_sites(self.config.site_page_size)
            .await
            .map_err(CollectError::SiteListing)?;
        if sites.is_empty() {
            return Err(CollectError::NoSites);
        }

        self.stats.sites = sites.len();
        self.stats.enabled_sites = sites.iter().filter(|s| s.enabled).count();
        info!(
            sites = sites.len(),
            enabled = self.stats.enabled_sites,
            "Enumerated sites"
        );

        let clock = now.timestamp();
        let host = self.config.target_host.clone();
        let mut points = vec![
            MetricPoint::new(&host, collector_status_key(), 1i64, clock),
            MetricPoint::new(&host, collector_timestamp_key(), clock, clock),
            self.discovery_point(&sites, &primary_id, clock),
        ];

        let window = compute_window(&self.config.granularity, self.poll_state.as_ref(), now);
        debug!(start = %window.0, end = %window.1, "Query window");

        for site in &sites {
            points.push(MetricPoint::new(
                &host,
                site_key("status", &site.name),
                i64::from(site.enabled),
                clock,
            ));

            if !site.enabled {
                debug!(site_id = %site.id, site_name = %site.name, "Site disabled, emitting zeros");
                self.push_sample(&mut points, &site.name, &MetricSample::zero(clock));
                continue;
            }

            let samples = self.collect_site(site, &sites, &primary_id, window, clock).await;
            for sample in &samples {
                self.push_sample(&mut points, &site.name, sample);
            }
        }

        self.sites = sites;
        Ok(points)
    }

    /// Samples for one enabled site, or a single zero sample at `clock`
    async fn collect_site(
        &mut self,
        site: &Site,
        sites: &[Site],
        primary_id: &str,
        window: (DateTime<Local>, DateTime<Local>),
        clock: i64,
    ) -> Vec<MetricSample> {
        // "0" means the primary device; an empty structId is passed on so
        // the resolver short-circuits to the primary id itself
        let candidate = if site.struct_id == "0" {
            primary_id
        } else {
            site.struct_id.as_str()
        };
        let resolution = self.resolver.resolve(&site.id, candidate, sites).await;
        if resolution.is_fallback() {
            self.stats.resolver_fallbacks += 1;
        }

        let query = TrafficQuery {
            data_type: self.config.granularity.as_str().to_string(),
            app_id: site.id.clone(),
            device_id: resolution.device_id.clone(),
            window: Some(window),
        };

        let records = match self.api.query_traffic(&query).await {
            Ok(records) => records,
            Err(e) => {
                self.stats.fetch_failures += 1;
                self.stats.zero_filled += 1;
                self.logger
                    .log_site_fallback(&site.id, &site.name, &e.to_string());
                return vec![MetricSample::zero(clock)];
            }
        };

        let samples = samples_from_records(&records, clock);

        if samples.is_empty() {
            self.stats.zero_filled += 1;
            let reason = if records.is_empty() {
                "no records in window"
            } else {
                "all records were empty"
            };
            self.logger.log_site_fallback(&site.id, &site.name, reason);
            return vec![MetricSample::zero(clock)];
        }

        if let Some(spacing) =
            IntervalStats::from_sorted(&samples.iter().map(|s| s.timestamp).collect::<Vec<_>>())
        {
            debug!(
                site_name = %site.name,
                samples = samples.len(),
                min_secs = spacing.min,
                max_secs = spacing.max,
                avg_secs = spacing.avg,
                "Sample spacing"
            );
        }

        let dropped = records.len() - samples.len();
        if dropped > 0 {
            debug!(site_name = %site.name, dropped, "Dropped empty records");
        }

        self.stats.samples += samples.len();
        self.logger
            .log_site_collected(&site.id, &site.name, &resolution.device_id, samples.len());
        samples
    }

    fn discovery_point(&self, sites: &[Site], primary_id: &str, clock: i64) -> MetricPoint {
        let records: Vec<DiscoveryRecord> = sites
            .iter()
            .map(|site| DiscoveryRecord::from_site(site, primary_id))
            .collect();
        let payload = serde_json::to_string(&records).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to encode discovery payload");
            "[]".to_string()
        });
        MetricPoint::new(&self.config.target_host, discovery_key(), payload, clock)
    }

    fn push_sample(&self, points: &mut Vec<MetricPoint>, site_name: &str, sample: &MetricSample) {
        for metric in TrafficMetric::ALL {
            points.push(MetricPoint::new(
                &self.config.target_host,
                metric.key(site_name),
                sample.get(metric),
                sample.timestamp,
            ));
        }
    }
}

/// Valid records of a raw response, converted and sorted by time
pub fn samples_from_records(records: &[TrafficRecord], now: i64) -> Vec<MetricSample> {
    let mut samples: Vec<MetricSample> = records
        .iter()
        .filter(|r| r.is_valid())
        .map(|r| r.to_sample(now))
        .collect();
    samples.sort_by_key(|s| s.timestamp);
    samples
}
