//! One collect, encode, deliver, persist cycle
//!
//! The poll state is only advanced after the sink confirms delivery, so
//! a failed run is re-covered by the next one.

use crate::api::WafApi;
use crate::collector::{collector_status_key, CollectStats, CollectorConfig, MetricsCollector};
use crate::error::RunError;
use crate::models::MetricPoint;
use crate::observability::{log_timestamp_density, CollectorMetrics, StructuredLogger};
use crate::protocol::encode;
use crate::sink::Sink;
use crate::window::PollWindowTracker;
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// What a successful run delivered
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub points: usize,
    pub bytes: usize,
    pub stats: CollectStats,
    /// State file written, `None` if persisting failed after delivery
    pub state_path: Option<PathBuf>,
}

/// Wires the collector to a sink and the poll state
pub struct Runner {
    api: Arc<dyn WafApi>,
    sink: Arc<dyn Sink>,
    tracker: PollWindowTracker,
    config: CollectorConfig,
    logger: StructuredLogger,
    metrics: Option<CollectorMetrics>,
    waf_host: String,
}

impl Runner {
    pub fn new(
        api: Arc<dyn WafApi>,
        sink: Arc<dyn Sink>,
        tracker: PollWindowTracker,
        config: CollectorConfig,
    ) -> Self {
        let logger = StructuredLogger::new(config.target_host.clone());
        Self {
            api,
            sink,
            tracker,
            config,
            logger,
            metrics: None,
            waf_host: String::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: CollectorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Appliance address, only used for logging
    pub fn with_waf_host(mut self, waf_host: impl Into<String>) -> Self {
        self.waf_host = waf_host.into();
        self
    }

    pub fn tracker(&self) -> &PollWindowTracker {
        &self.tracker
    }

    /// Run once, starting now
    pub async fn run(&self) -> Result<RunSummary, RunError> {
        let run_start = Local::now();
        self.run_at(run_start, Local::now()).await
    }

    /// Run once. `run_start` is what gets persisted on success; `now` is
    /// the end of the query window and the clock of synthetic points.
    pub async fn run_at(
        &self,
        run_start: DateTime<Local>,
        now: DateTime<Local>,
    ) -> Result<RunSummary, RunError> {
        let started = Instant::now();
        let identity = &self.config.target_host;

        let state = self.tracker.load_state(identity);
        self.logger.log_run_started(
            &self.waf_host,
            self.config.granularity.as_str(),
            state.is_some(),
        );

        let mut collector = MetricsCollector::new(self.api.clone(), self.config.clone(), state);
        let result = self.execute(&mut collector, run_start, now).await;

        if let Err(e) = &result {
            warn!(error = %e, "Run failed, reporting collector down");
            self.report_failure(now).await;
        }

        let duration = started.elapsed().as_secs_f64();
        let points = result.as_ref().map(|s| s.points).unwrap_or(0);
        self.logger.log_run_finished(result.is_ok(), points, duration);
        self.record_metrics(collector.stats(), &result, duration);

        result
    }

    async fn execute(
        &self,
        collector: &mut MetricsCollector,
        run_start: DateTime<Local>,
        now: DateTime<Local>,
    ) -> Result<RunSummary, RunError> {
        let points = collector.collect(now).await?;
        log_timestamp_density(&points);

        let payload = encode(&points);
        if let Err(e) = self.sink.deliver(&payload).await {
            self.logger.log_delivery_failed(points.len(), &e.to_string());
            return Err(e.into());
        }
        self.logger
            .log_delivery_succeeded(points.len(), payload.len());

        let state_path = match self.tracker.save_state(
            &self.config.target_host,
            run_start,
            &self.config.granularity,
        ) {
            Ok(path) => Some(path),
            Err(e) => {
                // Delivered already; the next run re-covers this window
                warn!(error = %e, "Failed to persist poll state");
                None
            }
        };

        Ok(RunSummary {
            points: points.len(),
            bytes: payload.len(),
            stats: collector.stats().clone(),
            state_path,
        })
    }

    /// Best-effort `collector.status = 0`
    async fn report_failure(&self, now: DateTime<Local>) {
        let point = MetricPoint::new(
            &self.config.target_host,
            collector_status_key(),
            0i64,
            now.timestamp(),
        );
        match self.sink.deliver(&encode(&[point])).await {
            Ok(_) => debug!("Reported collector status 0"),
            Err(e) => warn!(error = %e, "Failed to report collector status"),
        }
    }

    fn record_metrics(
        &self,
        stats: &CollectStats,
        result: &Result<RunSummary, RunError>,
        duration_secs: f64,
    ) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        metrics.observe_run_duration(duration_secs);
        metrics.set_sites_discovered(stats.sites);
        metrics.inc_site_fetch_failures(stats.fetch_failures as u64);
        metrics.inc_resolver_fallbacks(stats.resolver_fallbacks as u64);
        if let Ok(summary) = result {
            metrics.set_points_delivered(summary.points);
        }
        metrics.record_outcome(result.is_ok(), Local::now().timestamp());
    }
}
