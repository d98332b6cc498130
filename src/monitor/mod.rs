//! Self-monitoring for ingestion runs.
//!
//! [`HealthMonitor`] turns a finished [`RunResult`] plus stored history into a
//! [`HealthReport`]: performance metrics, comparisons with recent runs, data
//! quality shifts and alerts. Reports are persisted per run and can be rebuilt
//! for historical runs with [`HealthMonitor::backfill_metrics`].

mod backfill;
pub mod report;
pub mod stats;
mod thresholds;

pub use report::{
    Alert, AlertLevel, AppHealth, AppHealthStatus, Change, DataQuality, Deltas, Deviation,
    HealthReport, PreviousRunDeltas, RunMetrics, TrailingAverageDeltas,
};
pub use stats::QualitySample;
pub use thresholds::Thresholds;

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::metrics::MonitorMetrics;
use crate::pipeline::RunResult;
use crate::storage::{ReviewStore, TrackedField};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Span};

pub struct HealthMonitor {
    store: Arc<dyn ReviewStore>,
    config: MonitorConfig,
    span: Span,
}

impl HealthMonitor {
    pub fn new(store: Arc<dyn ReviewStore>, config: MonitorConfig) -> Self {
        Self {
            store,
            config,
            span: Span::none(),
        }
    }

    /// Log every event of this monitor inside `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.config.thresholds
    }

    /// Evaluate a finished run.
    ///
    /// Storage read failures degrade to empty deltas or zeroed data quality;
    /// evaluation itself never fails.
    pub fn evaluate_run(&self, result: &RunResult) -> HealthReport {
        let _enter = self.span.enter();
        info!(run_id = result.run_id, "Evaluating health for run #{}", result.run_id);

        let metrics = stats::compute_metrics(result);

        let history = self
            .store
            .recent_closed_runs(result.run_id, self.config.lookback_window)
            .unwrap_or_else(|e| {
                warn!(run_id = result.run_id, "Run history unavailable, skipping deltas: {}", e);
                Vec::new()
            });
        let deltas = stats::compute_deltas(&history, &metrics);

        let data_quality = match (self.quality_sample(Some(result.run_id)), self.quality_sample(None)) {
            (Ok(current), Ok(baseline)) => stats::compute_data_quality(&current, &baseline),
            (Err(e), _) | (_, Err(e)) => {
                warn!(run_id = result.run_id, "Data quality sample unavailable: {}", e);
                DataQuality::default()
            }
        };

        let alerts = stats::detect_anomalies(
            result,
            &metrics,
            &deltas,
            &data_quality,
            &self.config.thresholds,
        );
        let app_health = stats::build_app_health(&result.app_results);

        debug!(
            run_id = result.run_id,
            alerts = alerts.len(),
            history = history.len(),
            "Health evaluation complete"
        );

        HealthReport {
            run_id: result.run_id,
            timestamp: result.completed_at.unwrap_or_else(Utc::now),
            status: result.status,
            metrics,
            deltas,
            data_quality,
            alerts,
            app_health,
            backfilled: false,
        }
    }

    fn quality_sample(&self, run_id: Option<i64>) -> Result<QualitySample> {
        Ok(QualitySample {
            app_version: self.store.field_null_rate(TrackedField::AppVersion, run_id)?,
            reply_content: self.store.field_null_rate(TrackedField::ReplyContent, run_id)?,
            content: self.store.content_stats(run_id)?,
        })
    }

    /// Persist `report`, replacing any earlier report for the same run.
    pub fn store_report(&self, report: &HealthReport) -> Result<()> {
        let _enter = self.span.enter();
        match self.store.upsert_health_report(report) {
            Ok(()) => {
                MonitorMetrics::record_report(report);
                info!(run_id = report.run_id, "Stored health report for run #{}", report.run_id);
                Ok(())
            }
            Err(e) => {
                MonitorMetrics::record_store_failure();
                error!(run_id = report.run_id, "Failed to store health report: {}", e);
                Err(e)
            }
        }
    }

    /// Stored reports, most recent run first.
    pub fn get_recent_health_reports(&self, limit: usize) -> Result<Vec<HealthReport>> {
        self.store.recent_health_reports(limit)
    }
}
