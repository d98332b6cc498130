//! Ingestion Phase Metrics
//!
//! Run lifecycle counters plus per-app review counts and timings.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};
use crate::pipeline::{AppRunResult, RunResult, RunStatus};

pub struct IngestionMetrics;

impl IngestionMetrics {
    pub fn record_run_started() {
        ::metrics::counter!(phase_metric!(counter, "ingestion", "runs_started")).increment(1);
    }

    pub fn record_run_finished(result: &RunResult) {
        match result.status {
            RunStatus::Failed => {
                ::metrics::counter!(phase_metric!(counter, "ingestion", "runs_failed")).increment(1)
            }
            _ => ::metrics::counter!(phase_metric!(counter, "ingestion", "runs_completed"))
                .increment(1),
        }
        ::metrics::histogram!(phase_metric!(histogram, "ingestion", "run_duration_seconds"))
            .record(result.duration_seconds);
        ::metrics::gauge!(phase_metric!(gauge, "ingestion", "last_run_inserted"))
            .set(result.total_reviews_inserted as f64);
    }

    pub fn record_app(app: &AppRunResult) {
        if app.is_failed() {
            ::metrics::counter!(phase_metric!(counter, "ingestion", "app_failures")).increment(1);
        } else {
            ::metrics::counter!(phase_metric!(counter, "ingestion", "reviews_fetched"))
                .increment(app.reviews_fetched);
            ::metrics::counter!(phase_metric!(counter, "ingestion", "reviews_inserted"))
                .increment(app.reviews_inserted);
            ::metrics::counter!(phase_metric!(counter, "ingestion", "reviews_skipped"))
                .increment(app.reviews_skipped);
        }
        ::metrics::histogram!(phase_metric!(histogram, "ingestion", "app_duration_seconds"))
            .record(app.duration_seconds);
    }
}

impl PhaseMetrics for IngestionMetrics {
    fn register_metrics() {
        use metrics::{counter, gauge, histogram};

        let _ = counter!(phase_metric!(counter, "ingestion", "runs_started"));
        let _ = counter!(phase_metric!(counter, "ingestion", "runs_completed"));
        let _ = counter!(phase_metric!(counter, "ingestion", "runs_failed"));
        let _ = counter!(phase_metric!(counter, "ingestion", "app_failures"));
        let _ = counter!(phase_metric!(counter, "ingestion", "reviews_fetched"));
        let _ = counter!(phase_metric!(counter, "ingestion", "reviews_inserted"));
        let _ = counter!(phase_metric!(counter, "ingestion", "reviews_skipped"));

        let _ = histogram!(phase_metric!(histogram, "ingestion", "run_duration_seconds"));
        let _ = histogram!(phase_metric!(histogram, "ingestion", "app_duration_seconds"));

        let _ = gauge!(phase_metric!(gauge, "ingestion", "last_run_inserted"));
    }

    fn phase_name() -> &'static str {
        "ingestion"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "ingestion", "runs_started"),
                metric_type: MetricType::Counter,
                help: "Ingestion runs opened",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingestion", "runs_completed"),
                metric_type: MetricType::Counter,
                help: "Ingestion runs closed as completed or partial",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingestion", "runs_failed"),
                metric_type: MetricType::Counter,
                help: "Ingestion runs in which every app failed",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingestion", "app_failures"),
                metric_type: MetricType::Counter,
                help: "Apps that failed within a run",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingestion", "reviews_fetched"),
                metric_type: MetricType::Counter,
                help: "Reviews returned by the review source",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingestion", "reviews_inserted"),
                metric_type: MetricType::Counter,
                help: "Previously unseen reviews written to storage",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingestion", "reviews_skipped"),
                metric_type: MetricType::Counter,
                help: "Fetched reviews that were already stored",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "ingestion", "run_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Wall time of a full ingestion run",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "ingestion", "app_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Wall time spent on a single app",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(gauge, "ingestion", "last_run_inserted"),
                metric_type: MetricType::Gauge,
                help: "Reviews inserted by the most recent run",
                labels: vec![],
            },
        ]
    }
}
