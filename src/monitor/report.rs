use crate::pipeline::RunStatus;
use crate::storage::TrackedField;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a health finding. Neither level ever blocks a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    Info,
    Warning,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Info => "INFO",
            AlertLevel::Warning => "WARNING",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub metric: String,
    pub message: String,
    pub threshold: Option<f64>,
    pub actual_value: Option<f64>,
}

impl Alert {
    pub fn warning(metric: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Warning,
            metric: metric.into(),
            message: message.into(),
            threshold: None,
            actual_value: None,
        }
    }

    pub fn info(metric: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Info,
            ..Self::warning(metric, message)
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_actual(mut self, actual: f64) -> Self {
        self.actual_value = Some(actual);
        self
    }
}

/// Performance numbers derived from a single run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub reviews_inserted: u64,
    pub reviews_fetched: u64,
    pub reviews_skipped: u64,
    pub dedup_rate: f64,
    pub error_rate: f64,
    pub duration_seconds: f64,
    pub ingestion_rate_per_min: f64,
    pub apps_processed: u64,
    pub apps_failed: u64,
}

/// Current value against the single most recent prior run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub previous: f64,
    pub current: f64,
    pub change: f64,
    pub change_pct: f64,
}

/// Current value against a trailing-window mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deviation {
    pub baseline: f64,
    pub current: f64,
    pub deviation: f64,
    pub deviation_pct: f64,
    pub z_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviousRunDeltas {
    pub reviews_inserted: Change,
    pub duration: Change,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailingAverageDeltas {
    pub reviews_inserted: Deviation,
    pub duration: Deviation,
}

/// Both comparisons are absent when there is no prior closed run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Deltas {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vs_previous: Option<PreviousRunDeltas>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vs_avg_last_5: Option<TrailingAverageDeltas>,
}

impl Deltas {
    pub fn is_empty(&self) -> bool {
        self.vs_previous.is_none() && self.vs_avg_last_5.is_none()
    }
}

/// This run's inserted rows against the all-time baseline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    pub app_version_null_rate: f64,
    pub app_version_null_rate_baseline: f64,
    pub app_version_null_rate_shift_pct: f64,
    pub reply_content_null_rate: f64,
    pub reply_content_null_rate_baseline: f64,
    pub reply_content_null_rate_shift_pct: f64,
    pub empty_content_rate: f64,
    pub empty_content_rate_baseline: f64,
    pub avg_content_length: f64,
    pub avg_content_length_baseline: f64,
}

impl DataQuality {
    /// Shift in percentage points for one tracked field.
    pub fn shift_pp(&self, field: TrackedField) -> f64 {
        match field {
            TrackedField::AppVersion => self.app_version_null_rate_shift_pct,
            TrackedField::ReplyContent => self.reply_content_null_rate_shift_pct,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppHealthStatus {
    Ok,
    Stale,
    Error,
}

impl AppHealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppHealthStatus::Ok => "ok",
            AppHealthStatus::Stale => "stale",
            AppHealthStatus::Error => "error",
        }
    }
}

impl fmt::Display for AppHealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppHealth {
    pub app_id: String,
    pub app_title: Option<String>,
    pub status: AppHealthStatus,
    pub reviews_fetched: u64,
    pub reviews_inserted: u64,
    pub reviews_skipped: u64,
    pub duration_seconds: f64,
    pub error: Option<String>,
}

/// Evaluated health of one run. Persisted keyed by `run_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub run_id: i64,
    pub timestamp: DateTime<Utc>,
    pub status: RunStatus,
    pub metrics: RunMetrics,
    pub deltas: Deltas,
    pub data_quality: DataQuality,
    #[serde(default)]
    pub alerts: Vec<Alert>,
    #[serde(default)]
    pub app_health: Vec<AppHealth>,
    /// Rebuilt after the fact from the audit log; fetched and skipped counts
    /// are approximations.
    #[serde(default)]
    pub backfilled: bool,
}

impl HealthReport {
    pub fn warning_count(&self) -> usize {
        self.alerts
            .iter()
            .filter(|a| a.level == AlertLevel::Warning)
            .count()
    }

    pub fn info_count(&self) -> usize {
        self.alerts.len() - self.warning_count()
    }

    pub fn is_healthy(&self) -> bool {
        self.warning_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_level_serializes_uppercase() {
        let alert = Alert::warning("dedup_rate", "too high")
            .with_threshold(0.995)
            .with_actual(0.997);
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["level"], "WARNING");
        assert_eq!(json["threshold"], 0.995);
        assert_eq!(json["actual_value"], 0.997);
    }

    #[test]
    fn test_empty_deltas_are_omitted_and_read_back() {
        let json = serde_json::to_string(&Deltas::default()).unwrap();
        assert_eq!(json, "{}");
        let back: Deltas = serde_json::from_str(&json).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn test_reports_without_backfill_flag_default_to_live() {
        let json = r#"{
            "run_id": 3,
            "timestamp": "2025-01-01T00:00:00Z",
            "status": "partial",
            "metrics": {
                "reviews_inserted": 1, "reviews_fetched": 2, "reviews_skipped": 1,
                "dedup_rate": 0.5, "error_rate": 0.5, "duration_seconds": 1.0,
                "ingestion_rate_per_min": 120.0, "apps_processed": 1, "apps_failed": 1
            },
            "deltas": {},
            "data_quality": {
                "app_version_null_rate": 0.0, "app_version_null_rate_baseline": 0.0,
                "app_version_null_rate_shift_pct": 0.0, "reply_content_null_rate": 0.0,
                "reply_content_null_rate_baseline": 0.0, "reply_content_null_rate_shift_pct": 0.0,
                "empty_content_rate": 0.0, "empty_content_rate_baseline": 0.0,
                "avg_content_length": 0.0, "avg_content_length_baseline": 0.0
            },
            "alerts": [{"level": "INFO", "metric": "x", "message": "m", "threshold": null, "actual_value": null}]
        }"#;
        let report: HealthReport = serde_json::from_str(json).unwrap();
        assert!(!report.backfilled);
        assert_eq!(report.status, RunStatus::Partial);
        assert_eq!(report.info_count(), 1);
        assert!(report.is_healthy());
    }
}
