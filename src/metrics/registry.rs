//! Metrics registry for coordinating phase-specific metrics
//!
//! Registers every phase's metrics and detects name conflicts early.

use crate::metrics::{MetricDoc, PhaseMetrics};
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub fn register_all_metrics() {
    let mut all_metrics = HashMap::new();

    register_phase_metrics::<super::ingestion::IngestionMetrics>(&mut all_metrics);
    register_phase_metrics::<super::monitor::MonitorMetrics>(&mut all_metrics);

    info!(
        "Registered {} total metrics across all phases",
        all_metrics.len()
    );

    for (name, doc) in &all_metrics {
        debug!(
            "  - {} [{}] ({:?}, labels {:?}): {}",
            name,
            extract_phase_from_metric_name(name),
            doc.metric_type,
            doc.labels,
            doc.help
        );
    }
}

/// Register metrics for a specific phase and detect conflicts
fn register_phase_metrics<T: PhaseMetrics>(all_metrics: &mut HashMap<String, MetricDoc>) {
    T::register_metrics();
    let phase_docs = T::metrics_documentation();
    let phase_name = T::phase_name();

    info!(
        "Registering {} metrics for phase '{}'",
        phase_docs.len(),
        phase_name
    );

    for doc in phase_docs {
        if let Some(existing) = all_metrics.get(doc.name) {
            warn!(
                "Metric name conflict detected: '{}' is defined in phase '{}' and again in '{}'",
                doc.name,
                extract_phase_from_metric_name(existing.name),
                phase_name
            );
        } else {
            all_metrics.insert(doc.name.to_string(), doc);
        }
    }
}

/// Extract phase name from metric name (e.g. "review_ingest_monitor_dedup_rate" -> "monitor")
fn extract_phase_from_metric_name(metric_name: &str) -> &str {
    if let Some(stripped) = metric_name.strip_prefix("review_ingest_") {
        if let Some(next_underscore) = stripped.find('_') {
            return &stripped[..next_underscore];
        }
    }
    "unknown"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_phase_from_metric_name() {
        assert_eq!(
            extract_phase_from_metric_name("review_ingest_ingestion_runs_started_total"),
            "ingestion"
        );
        assert_eq!(
            extract_phase_from_metric_name("review_ingest_monitor_dedup_rate"),
            "monitor"
        );
        assert_eq!(
            extract_phase_from_metric_name("invalid_metric_name"),
            "unknown"
        );
    }

    #[test]
    fn test_phases_do_not_share_names() {
        let mut all = HashMap::new();
        register_phase_metrics::<crate::metrics::IngestionMetrics>(&mut all);
        register_phase_metrics::<crate::metrics::MonitorMetrics>(&mut all);
        assert_eq!(all.len(), 17);
    }
}
