//! Observability for collection runs
//!
//! Provides:
//! - Prometheus run metrics, rendered in the text exposition format for
//!   the node-exporter textfile collector
//! - Structured run events with tracing
//! - Sample spacing statistics for debug output

use crate::models::MetricPoint;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder,
};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

/// Histogram buckets for whole-run duration (in seconds)
const RUN_DURATION_BUCKETS: &[f64] = &[0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

/// Run metrics for one sender process.
///
/// Owns its registry, so independent instances never collide. Clones
/// share the same underlying metrics.
#[derive(Clone)]
pub struct CollectorMetrics {
    registry: Registry,
    run_duration_seconds: Histogram,
    sites_discovered: IntGauge,
    points_delivered: IntGauge,
    site_fetch_failures: IntCounter,
    resolver_fallbacks: IntCounter,
    run_success: IntGauge,
    last_success_timestamp_seconds: IntGauge,
}

impl CollectorMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let run_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "waf_collector_run_duration_seconds",
                "Wall time of a full collect and deliver run",
            )
            .buckets(RUN_DURATION_BUCKETS.to_vec()),
        )?;
        let sites_discovered = IntGauge::new(
            "waf_collector_sites_discovered",
            "Number of sites returned by the appliance",
        )?;
        let points_delivered = IntGauge::new(
            "waf_collector_points_delivered",
            "Number of metric points in the last delivered batch",
        )?;
        let site_fetch_failures = IntCounter::new(
            "waf_collector_site_fetch_failures_total",
            "Per-site traffic queries that failed and fell back to zeros",
        )?;
        let resolver_fallbacks = IntCounter::new(
            "waf_collector_resolver_fallbacks_total",
            "Sites for which no device id returned data",
        )?;
        let run_success = IntGauge::new(
            "waf_collector_run_success",
            "1 if the last run delivered its batch, 0 otherwise",
        )?;
        let last_success_timestamp_seconds = IntGauge::new(
            "waf_collector_last_success_timestamp_seconds",
            "Unix time of the last successfully delivered run",
        )?;

        registry.register(Box::new(run_duration_seconds.clone()))?;
        registry.register(Box::new(sites_discovered.clone()))?;
        registry.register(Box::new(points_delivered.clone()))?;
        registry.register(Box::new(site_fetch_failures.clone()))?;
        registry.register(Box::new(resolver_fallbacks.clone()))?;
        registry.register(Box::new(run_success.clone()))?;
        registry.register(Box::new(last_success_timestamp_seconds.clone()))?;

        Ok(Self {
            registry,
            run_duration_seconds,
            sites_discovered,
            points_delivered,
            site_fetch_failures,
            resolver_fallbacks,
            run_success,
            last_success_timestamp_seconds,
        })
    }

    pub fn observe_run_duration(&self, duration_secs: f64) {
        self.run_duration_seconds.observe(duration_secs);
    }

    pub fn set_sites_discovered(&self, count: usize) {
        self.sites_discovered.set(count as i64);
    }

    pub fn set_points_delivered(&self, count: usize) {
        self.points_delivered.set(count as i64);
    }

    pub fn inc_site_fetch_failures(&self, by: u64) {
        self.site_fetch_failures.inc_by(by);
    }

    pub fn inc_resolver_fallbacks(&self, by: u64) {
        self.resolver_fallbacks.inc_by(by);
    }

    /// Record the outcome of a run; `finished_at` is Unix seconds
    pub fn record_outcome(&self, success: bool, finished_at: i64) {
        self.run_success.set(i64::from(success));
        if success {
            self.last_success_timestamp_seconds.set(finished_at);
        }
    }

    /// Render all metrics in the Prometheus text format
    pub fn render_text(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Write the rendered metrics to `path`, replacing it atomically
    pub fn write_textfile(&self, path: &Path) -> anyhow::Result<()> {
        use anyhow::Context;

        let text = self.render_text()?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {:?}", dir))?;
        temp.write_all(text.as_bytes())
            .context("Failed to write metrics")?;
        temp.persist(path)
            .with_context(|| format!("Failed to rename metrics file to {:?}", path))?;

        debug!(path = %path.display(), "Wrote run metrics");
        Ok(())
    }
}

/// Structured logger for run events
///
/// Every event carries an `event` field and the target identity, so a
/// JSON log stream can be filtered per run phase.
#[derive(Clone)]
pub struct StructuredLogger {
    target_identity: String,
}

impl StructuredLogger {
    pub fn new(target_identity: impl Into<String>) -> Self {
        Self {
            target_identity: target_identity.into(),
        }
    }

    pub fn target_identity(&self) -> &str {
        &self.target_identity
    }

    pub fn log_run_started(&self, waf_host: &str, data_type: &str, resumed: bool) {
        info!(
            event = "run_started",
            target = %self.target_identity,
            waf_host = %waf_host,
            data_type = %data_type,
            resumed = resumed,
            "Collection run started"
        );
    }

    pub fn log_site_collected(
        &self,
        site_id: &str,
        site_name: &str,
        device_id: &str,
        samples: usize,
    ) {
        info!(
            event = "site_collected",
            target = %self.target_identity,
            site_id = %site_id,
            site_name = %site_name,
            device_id = %device_id,
            samples = samples,
            "Collected site traffic"
        );
    }

    /// A site is reported as zeros at `now` instead of real samples
    pub fn log_site_fallback(&self, site_id: &str, site_name: &str, reason: &str) {
        warn!(
            event = "site_fallback",
            target = %self.target_identity,
            site_id = %site_id,
            site_name = %site_name,
            reason = %reason,
            "No traffic samples, emitting zeros"
        );
    }

    pub fn log_delivery_succeeded(&self, points: usize, bytes: usize) {
        info!(
            event = "delivery_succeeded",
            target = %self.target_identity,
            points = points,
            bytes = bytes,
            "Batch delivered"
        );
    }

    pub fn log_delivery_failed(&self, points: usize, error: &str) {
        warn!(
            event = "delivery_failed",
            target = %self.target_identity,
            points = points,
            error = %error,
            "Batch delivery failed, poll state left unchanged"
        );
    }

    pub fn log_run_finished(&self, success: bool, points: usize, duration_secs: f64) {
        if success {
            info!(
                event = "run_finished",
                target = %self.target_identity,
                success = true,
                points = points,
                duration_secs = duration_secs,
                "Collection run finished"
            );
        } else {
            warn!(
                event = "run_finished",
                target = %self.target_identity,
                success = false,
                points = points,
                duration_secs = duration_secs,
                "Collection run failed"
            );
        }
    }
}

/// Spacing between consecutive sample timestamps, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalStats {
    pub min: i64,
    pub max: i64,
    pub avg: f64,
}

impl IntervalStats {
    /// `None` unless at least two timestamps are given. Input must be
    /// sorted ascending.
    pub fn from_sorted(timestamps: &[i64]) -> Option<Self> {
        let gaps: Vec<i64> = timestamps.windows(2).map(|w| w[1] - w[0]).collect();
        let min = *gaps.iter().min()?;
        let max = *gaps.iter().max()?;
        let avg = gaps.iter().sum::<i64>() as f64 / gaps.len() as f64;
        Some(Self { min, max, avg })
    }
}

/// Number of distinct clocks per key in a batch
pub fn timestamp_density(points: &[MetricPoint]) -> BTreeMap<&str, usize> {
    let mut clocks: BTreeMap<&str, BTreeSet<i64>> = BTreeMap::new();
    for point in points {
        clocks.entry(point.key.as_str()).or_default().insert(point.clock);
    }
    clocks
        .into_iter()
        .map(|(key, set)| (key, set.len()))
        .collect()
}

/// Log keys that carry more than one timestamp in the batch
pub fn log_timestamp_density(points: &[MetricPoint]) {
    for (key, distinct) in timestamp_density(points) {
        if distinct > 1 {
            debug!(key = %key, distinct_timestamps = distinct, "Multiple samples for key");
        }
    }
}
