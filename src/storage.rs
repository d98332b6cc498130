use crate::error::{IngestError, Result};
use crate::monitor::HealthReport;
use crate::pipeline::RunStatus;
use crate::types::{AppInfo, Review, SortOrder};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

pub mod sqlite;

pub use sqlite::SqliteStore;

/// Parameters recorded when a run opens.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub target_apps: Vec<String>,
    pub reviews_per_app: u32,
    pub language: String,
    pub country: String,
    pub sort_order: SortOrder,
}

/// Final bookkeeping written when a run closes.
#[derive(Debug, Clone)]
pub struct RunCompletion {
    pub run_id: i64,
    pub total_inserted: u64,
    pub total_apps: u64,
    pub status: RunStatus,
    pub error_message: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// A closed run as seen by the trailing-window comparisons.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: i64,
    pub total_inserted: u64,
    pub duration_seconds: f64,
}

/// Optional review columns whose null rate is tracked run over run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedField {
    AppVersion,
    ReplyContent,
}

impl TrackedField {
    pub const ALL: [TrackedField; 2] = [TrackedField::AppVersion, TrackedField::ReplyContent];

    pub fn column(&self) -> &'static str {
        match self {
            TrackedField::AppVersion => "app_version",
            TrackedField::ReplyContent => "reply_content",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NullCount {
    pub count: u64,
    pub null_count: u64,
}

impl NullCount {
    /// Fraction of rows with a null value. An empty sample divides by one.
    pub fn rate(&self) -> f64 {
        self.null_count as f64 / self.count.max(1) as f64
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ContentStats {
    pub count: u64,
    pub empty_count: u64,
    pub avg_length: f64,
}

impl ContentStats {
    pub fn empty_rate(&self) -> f64 {
        self.empty_count as f64 / self.count.max(1) as f64
    }
}

/// A closed run that has no stored health report yet.
///
/// Timestamps are kept as stored so one unreadable row cannot hide the
/// others; callers parse them per run with [`ClosedRun::timestamps`].
#[derive(Debug, Clone)]
pub struct ClosedRun {
    pub run_id: i64,
    pub started_at: String,
    pub completed_at: String,
    pub status: String,
    pub total_inserted: u64,
    pub total_apps_processed: u64,
    pub error_message: Option<String>,
}

impl ClosedRun {
    /// `(started_at, completed_at)`, parsed.
    pub fn timestamps(&self) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        Ok((
            parse_timestamp(&self.started_at)?,
            parse_timestamp(&self.completed_at)?,
        ))
    }
}

/// Per-app inserted counts recovered from the audit log.
#[derive(Debug, Clone, PartialEq)]
pub struct AppInsertCount {
    pub app_id: String,
    pub app_title: Option<String>,
    pub inserted: u64,
}

/// One row of the run history listing.
#[derive(Debug, Clone, Serialize)]
pub struct RunHistoryRow {
    pub run_id: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: String,
    pub total_inserted: u64,
    pub total_apps_processed: u64,
    pub reviews_per_app: u32,
    pub error_message: Option<String>,
}

/// Cumulative database snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub total_reviews: u64,
    pub total_apps: u64,
    pub avg_rating: Option<f64>,
    pub earliest_review: Option<String>,
    pub latest_review: Option<String>,
    pub db_file_size_mb: Option<f64>,
}

/// Durable storage used by the pipeline and the health monitor.
///
/// Access is serialized by the single driving loop, so implementations only
/// need to be safe to share, not to scale.
pub trait ReviewStore: Send + Sync {
    // Run bookkeeping
    fn start_run(&self, config: &RunConfig, started_at: DateTime<Utc>) -> Result<i64>;
    fn complete_run(&self, completion: &RunCompletion) -> Result<()>;

    // Apps and reviews
    fn upsert_app(&self, app: &AppInfo) -> Result<()>;
    fn existing_review_ids(&self, candidate_ids: &HashSet<String>) -> Result<HashSet<String>>;
    /// Insert-or-ignore; returns the number of rows actually written.
    fn bulk_insert_reviews(&self, reviews: &[Review]) -> Result<u64>;

    // Audit log
    fn log_scraped_reviews(&self, review_ids: &[String], run_id: i64) -> Result<()>;
    fn app_insert_counts(&self, run_id: i64) -> Result<Vec<AppInsertCount>>;

    // Monitor inputs
    /// Completed or partial runs strictly before `before_run_id`, newest first.
    fn recent_closed_runs(&self, before_run_id: i64, limit: usize) -> Result<Vec<RunSummary>>;
    /// Null count for one field over a single run's inserts, or all rows when `run_id` is `None`.
    fn field_null_rate(&self, field: TrackedField, run_id: Option<i64>) -> Result<NullCount>;
    fn content_stats(&self, run_id: Option<i64>) -> Result<ContentStats>;

    // Health reports
    fn upsert_health_report(&self, report: &HealthReport) -> Result<()>;
    /// Stored reports, highest run id first.
    fn recent_health_reports(&self, limit: usize) -> Result<Vec<HealthReport>>;
    fn runs_missing_health_report(&self) -> Result<Vec<ClosedRun>>;

    // Display
    fn run_history(&self, limit: usize) -> Result<Vec<RunHistoryRow>>;
    fn stats(&self) -> Result<StoreStats>;
}

/// Read a stored timestamp.
///
/// Accepts RFC 3339 as written by this crate, and the naive
/// `YYYY-MM-DD HH:MM:SS[.f]` form SQLite's `CURRENT_TIMESTAMP` produces, which
/// is taken as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| IngestError::Data(format!("unreadable timestamp '{value}'")))
}

pub(crate) fn duration_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds().max(0) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_timestamp_accepts_rfc3339_and_sqlite_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 10, 5, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-01T10:05:00.000000Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-01-01T12:05:00+02:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-01-01 10:05:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-01-01T10:05:00").unwrap(), expected);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage_as_data_error() {
        let err = parse_timestamp("yesterday").unwrap_err();
        assert!(matches!(err, IngestError::Data(_)));
    }
}
