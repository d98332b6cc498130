//! Metrics for the ingestion service
//!
//! Each phase (ingestion cycles, health monitoring) owns its metric names in a
//! dedicated submodule. Recording goes through the `metrics` facade, so it is a
//! no-op until a recorder is installed by [`init_metrics`].

pub mod ingestion;
pub mod monitor;
pub mod registry;

pub use ingestion::IngestionMetrics;
pub use monitor::MonitorMetrics;

use std::net::SocketAddr;
use std::sync::Once;
use tracing::{info, warn};

/// Environment variable holding the Prometheus listen address.
pub const METRICS_ADDR_ENV: &str = "REVIEW_INGEST_METRICS_ADDR";

static INIT: Once = Once::new();

/// Install the Prometheus recorder and register every phase's metrics.
///
/// Idempotent. Does nothing unless `REVIEW_INGEST_METRICS_ADDR` is set to a
/// valid socket address, in which case an HTTP exporter listens there.
pub fn init_metrics() {
    INIT.call_once(|| {
        let addr_str = match std::env::var(METRICS_ADDR_ENV) {
            Ok(v) if !v.trim().is_empty() => v,
            _ => return,
        };
        let addr = match addr_str.parse::<SocketAddr>() {
            Ok(addr) => addr,
            Err(e) => {
                warn!("Invalid metrics addr '{}': {}, metrics disabled", addr_str, e);
                return;
            }
        };

        let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
        match builder.install_recorder() {
            Ok(_) => {
                info!("Prometheus exporter listening at http://{}/metrics", addr);
                registry::register_all_metrics();
            }
            Err(e) => {
                warn!("Failed to install Prometheus recorder: {}", e);
            }
        }
    });
}

/// Trait for phase-specific metrics collections
///
/// Each phase implements this trait to provide:
/// - Metric registration at startup
/// - Consistent naming conventions
/// - Documentation of what each metric measures
pub trait PhaseMetrics {
    /// Register all metrics for this phase
    fn register_metrics();

    /// Get the phase name for prefixing metrics
    fn phase_name() -> &'static str;

    /// Get documentation for all metrics in this phase
    fn metrics_documentation() -> Vec<MetricDoc>;
}

/// Documentation for a single metric
#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
    pub labels: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub enum MetricType {
    Counter,
    Histogram,
    Gauge,
}

/// Build a metric name following `review_ingest_{phase}_{name}[_total]`.
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("review_ingest_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("review_ingest_", $phase, "_", $name)
    };
    (gauge, $phase:literal, $name:literal) => {
        concat!("review_ingest_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;
