use crate::constants::FAILED_APPS_MARKER;
use crate::error::{IngestError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcome of one app within one ingestion cycle.
///
/// `error` being set marks the app as failed. Without an error,
/// `reviews_inserted + reviews_skipped == reviews_fetched`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppRunResult {
    pub app_id: String,
    pub app_title: Option<String>,
    pub reviews_fetched: u64,
    pub reviews_inserted: u64,
    pub reviews_skipped: u64,
    pub duration_seconds: f64,
    pub error: Option<String>,
}

impl AppRunResult {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_title: None,
            reviews_fetched: 0,
            reviews_inserted: 0,
            reviews_skipped: 0,
            duration_seconds: 0.0,
            error: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Partial,
    Failed,
}

impl RunStatus {
    /// Final status for a cycle given how many apps succeeded and failed.
    ///
    /// A cycle that attempted no apps at all counts as completed.
    pub fn from_counts(processed: u64, failed: u64) -> Self {
        if failed == 0 {
            RunStatus::Completed
        } else if processed == 0 {
            RunStatus::Failed
        } else {
            RunStatus::Partial
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "partial" => Ok(RunStatus::Partial),
            "failed" => Ok(RunStatus::Failed),
            other => Err(IngestError::UnknownStatus(other.to_string())),
        }
    }
}

/// Aggregate outcome of one ingestion cycle.
///
/// Built by [`RunResultBuilder`]; once handed out it is never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub app_results: Vec<AppRunResult>,
    pub total_reviews_fetched: u64,
    pub total_reviews_inserted: u64,
    pub total_reviews_skipped: u64,
    pub total_apps_processed: u64,
    pub total_apps_failed: u64,
    pub duration_seconds: f64,
    pub error_message: Option<String>,
}

impl RunResult {
    pub fn failed_app_ids(&self) -> Vec<&str> {
        self.app_results
            .iter()
            .filter(|a| a.is_failed())
            .map(|a| a.app_id.as_str())
            .collect()
    }
}

/// Local accumulator for a cycle in flight. Only the pipeline holds one.
#[derive(Debug)]
pub struct RunResultBuilder {
    run_id: i64,
    started_at: DateTime<Utc>,
    app_results: Vec<AppRunResult>,
}

impl RunResultBuilder {
    pub fn new(run_id: i64, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            app_results: Vec::new(),
        }
    }

    pub fn push(&mut self, app_result: AppRunResult) {
        self.app_results.push(app_result);
    }

    /// Status and error summary as they will be recorded when the run closes.
    pub fn outcome(&self) -> (RunStatus, Option<String>) {
        let failed: Vec<&str> = self
            .app_results
            .iter()
            .filter(|a| a.is_failed())
            .map(|a| a.app_id.as_str())
            .collect();
        let processed = (self.app_results.len() - failed.len()) as u64;
        let status = RunStatus::from_counts(processed, failed.len() as u64);
        (status, failure_summary(&failed))
    }

    pub fn total_inserted(&self) -> u64 {
        self.app_results.iter().map(|a| a.reviews_inserted).sum()
    }

    pub fn apps_processed(&self) -> u64 {
        self.app_results.iter().filter(|a| !a.is_failed()).count() as u64
    }

    pub fn finish(self, completed_at: DateTime<Utc>, duration_seconds: f64) -> RunResult {
        let (status, error_message) = self.outcome();
        let mut result = RunResult {
            run_id: self.run_id,
            started_at: self.started_at,
            completed_at: Some(completed_at),
            status,
            app_results: Vec::with_capacity(self.app_results.len()),
            total_reviews_fetched: 0,
            total_reviews_inserted: 0,
            total_reviews_skipped: 0,
            total_apps_processed: 0,
            total_apps_failed: 0,
            duration_seconds,
            error_message,
        };
        for app in self.app_results {
            result.total_reviews_fetched += app.reviews_fetched;
            result.total_reviews_inserted += app.reviews_inserted;
            result.total_reviews_skipped += app.reviews_skipped;
            if app.is_failed() {
                result.total_apps_failed += 1;
            } else {
                result.total_apps_processed += 1;
            }
            result.app_results.push(app);
        }
        result
    }
}

/// `"2 apps failed: a, b"`, or `None` when nothing failed.
pub fn failure_summary(failed_app_ids: &[&str]) -> Option<String> {
    if failed_app_ids.is_empty() {
        return None;
    }
    Some(format!(
        "{} {} {}",
        failed_app_ids.len(),
        FAILED_APPS_MARKER,
        failed_app_ids.join(", ")
    ))
}

/// Inverse of [`failure_summary`]. Text without the marker is read as a bare
/// comma-separated id list.
pub fn parse_failure_summary(summary: &str) -> Vec<String> {
    let ids = match summary.split_once(FAILED_APPS_MARKER) {
        Some((_, rest)) => rest,
        None => summary,
    };
    ids.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(id: &str, fetched: u64, inserted: u64, skipped: u64) -> AppRunResult {
        AppRunResult {
            reviews_fetched: fetched,
            reviews_inserted: inserted,
            reviews_skipped: skipped,
            ..AppRunResult::new(id)
        }
    }

    fn failed(id: &str) -> AppRunResult {
        AppRunResult {
            error: Some("boom".to_string()),
            ..AppRunResult::new(id)
        }
    }

    #[test]
    fn test_totals_are_sums_of_app_results() {
        let mut builder = RunResultBuilder::new(7, Utc::now());
        builder.push(app("a", 100, 80, 20));
        builder.push(app("b", 0, 0, 0));
        builder.push(app("c", 50, 50, 0));
        let result = builder.finish(Utc::now(), 60.0);

        assert_eq!(result.run_id, 7);
        assert_eq!(result.total_reviews_fetched, 150);
        assert_eq!(result.total_reviews_inserted, 130);
        assert_eq!(result.total_reviews_skipped, 20);
        assert_eq!(result.total_apps_processed, 3);
        assert_eq!(result.total_apps_failed, 0);
        assert_eq!(result.status, RunStatus::Completed);
        assert!(result.error_message.is_none());
        assert!(result.completed_at.is_some());
    }

    #[test]
    fn test_status_partial_when_some_apps_fail() {
        let mut builder = RunResultBuilder::new(1, Utc::now());
        builder.push(app("a", 10, 10, 0));
        builder.push(failed("b"));
        builder.push(app("c", 5, 5, 0));
        let result = builder.finish(Utc::now(), 1.0);

        assert_eq!(result.status, RunStatus::Partial);
        assert_eq!(result.total_apps_failed, 1);
        assert_eq!(result.error_message.as_deref(), Some("1 apps failed: b"));
        assert_eq!(result.failed_app_ids(), vec!["b"]);
    }

    #[test]
    fn test_status_failed_only_when_every_app_fails() {
        let mut builder = RunResultBuilder::new(1, Utc::now());
        builder.push(failed("a"));
        builder.push(failed("b"));
        let result = builder.finish(Utc::now(), 1.0);
        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.total_apps_processed, 0);
        assert_eq!(result.total_apps_failed, 2);
    }

    #[test]
    fn test_status_from_counts() {
        assert_eq!(RunStatus::from_counts(3, 0), RunStatus::Completed);
        assert_eq!(RunStatus::from_counts(0, 2), RunStatus::Failed);
        assert_eq!(RunStatus::from_counts(1, 1), RunStatus::Partial);
        assert_eq!(RunStatus::from_counts(0, 0), RunStatus::Completed);
    }

    #[test]
    fn test_failure_summary_parses_back_to_ids() {
        let summary = failure_summary(&["com.a", "com.b"]).unwrap();
        assert_eq!(summary, "2 apps failed: com.a, com.b");
        assert_eq!(parse_failure_summary(&summary), vec!["com.a", "com.b"]);
        assert_eq!(parse_failure_summary("x, y"), vec!["x", "y"]);
        assert!(parse_failure_summary("").is_empty());
    }

    #[test]
    fn test_status_text_round_trip() {
        for status in [RunStatus::Running, RunStatus::Completed, RunStatus::Partial, RunStatus::Failed] {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }
        assert!(matches!("bogus".parse::<RunStatus>(), Err(IngestError::UnknownStatus(_))));
    }
}
