//! Monitor Phase Metrics

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};
use crate::monitor::{AlertLevel, HealthReport};

pub struct MonitorMetrics;

impl MonitorMetrics {
    pub fn record_report(report: &HealthReport) {
        ::metrics::counter!(phase_metric!(counter, "monitor", "reports_stored")).increment(1);
        for alert in &report.alerts {
            match alert.level {
                AlertLevel::Warning => {
                    ::metrics::counter!(phase_metric!(counter, "monitor", "alerts_warning"))
                        .increment(1)
                }
                AlertLevel::Info => {
                    ::metrics::counter!(phase_metric!(counter, "monitor", "alerts_info")).increment(1)
                }
            }
        }
        if !report.backfilled {
            ::metrics::gauge!(phase_metric!(gauge, "monitor", "dedup_rate"))
                .set(report.metrics.dedup_rate);
            ::metrics::gauge!(phase_metric!(gauge, "monitor", "error_rate"))
                .set(report.metrics.error_rate);
        }
    }

    pub fn record_store_failure() {
        ::metrics::counter!(phase_metric!(counter, "monitor", "store_failures")).increment(1);
    }

    pub fn record_backfilled(count: usize) {
        ::metrics::counter!(phase_metric!(counter, "monitor", "runs_backfilled"))
            .increment(count as u64);
    }
}

impl PhaseMetrics for MonitorMetrics {
    fn register_metrics() {
        use metrics::{counter, gauge};

        let _ = counter!(phase_metric!(counter, "monitor", "reports_stored"));
        let _ = counter!(phase_metric!(counter, "monitor", "store_failures"));
        let _ = counter!(phase_metric!(counter, "monitor", "alerts_warning"));
        let _ = counter!(phase_metric!(counter, "monitor", "alerts_info"));
        let _ = counter!(phase_metric!(counter, "monitor", "runs_backfilled"));

        let _ = gauge!(phase_metric!(gauge, "monitor", "dedup_rate"));
        let _ = gauge!(phase_metric!(gauge, "monitor", "error_rate"));
    }

    fn phase_name() -> &'static str {
        "monitor"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "monitor", "reports_stored"),
                metric_type: MetricType::Counter,
                help: "Health reports written to storage",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "monitor", "store_failures"),
                metric_type: MetricType::Counter,
                help: "Health reports that could not be written",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "monitor", "alerts_warning"),
                metric_type: MetricType::Counter,
                help: "WARNING alerts raised",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "monitor", "alerts_info"),
                metric_type: MetricType::Counter,
                help: "INFO alerts raised",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "monitor", "runs_backfilled"),
                metric_type: MetricType::Counter,
                help: "Historical runs given a reconstructed report",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(gauge, "monitor", "dedup_rate"),
                metric_type: MetricType::Gauge,
                help: "Dedup rate of the most recent live run",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(gauge, "monitor", "error_rate"),
                metric_type: MetricType::Gauge,
                help: "App error rate of the most recent live run",
                labels: vec![],
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_documentation() {
        MonitorMetrics::register_metrics();
        let docs = MonitorMetrics::metrics_documentation();
        assert_eq!(docs.len(), 7);
        for doc in docs {
            assert!(doc.name.starts_with("review_ingest_monitor_"));
        }
    }
}
