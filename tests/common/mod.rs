#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use review_ingest::config::MonitorConfig;
use review_ingest::error::{IngestError, Result};
use review_ingest::monitor::{HealthMonitor, HealthReport};
use review_ingest::pipeline::IngestionPipeline;
use review_ingest::storage::{
    AppInsertCount, ClosedRun, ContentStats, NullCount, ReviewStore, RunCompletion, RunConfig,
    RunHistoryRow, RunSummary, SqliteStore, StoreStats, TrackedField,
};
use review_ingest::types::{AppInfo, FetchOptions, Review, ReviewSource, SortOrder};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub enum Script {
    Reviews(Vec<Review>),
    NotFound,
    FailReviews(String),
}

/// Review source driven by a per-app script. Records every call.
pub struct FakeSource {
    scripts: std::sync::Mutex<HashMap<String, Script>>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self {
            scripts: std::sync::Mutex::new(HashMap::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with(self, app_id: &str, script: Script) -> Self {
        self.set(app_id, script);
        self
    }

    pub fn set(&self, app_id: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(app_id.to_string(), script);
    }

    fn script(&self, app_id: &str) -> Option<Script> {
        self.scripts.lock().unwrap().get(app_id).cloned()
    }
}

#[async_trait]
impl ReviewSource for FakeSource {
    fn source_name(&self) -> &str {
        "fake"
    }

    async fn fetch_app_info(&self, app_id: &str) -> Result<Option<AppInfo>> {
        self.calls.lock().await.push(format!("info:{app_id}"));
        match self.script(app_id) {
            None | Some(Script::NotFound) => Ok(None),
            Some(_) => Ok(Some(app_info(app_id))),
        }
    }

    async fn fetch_reviews(&self, app_id: &str, options: &FetchOptions) -> Result<Vec<Review>> {
        self.calls.lock().await.push(format!("reviews:{app_id}"));
        match self.script(app_id) {
            Some(Script::Reviews(reviews)) => Ok(reviews
                .into_iter()
                .take(options.count as usize)
                .collect()),
            Some(Script::FailReviews(message)) => Err(IngestError::Source { message }),
            _ => Ok(Vec::new()),
        }
    }
}

pub fn app_info(app_id: &str) -> AppInfo {
    AppInfo {
        app_id: app_id.to_string(),
        title: format!("Title of {app_id}"),
        developer: "Test Dev".to_string(),
        rating: 4.2,
        reviews_count: 1000,
        installs: "10,000+".to_string(),
        genre: "Productivity".to_string(),
        scraped_at: Utc::now(),
    }
}

/// `n` reviews with ids `{prefix}-{i}`.
pub fn reviews(app_id: &str, prefix: &str, n: usize, app_version: Option<&str>) -> Vec<Review> {
    let base = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| Review {
            review_id: format!("{prefix}-{i}"),
            app_id: app_id.to_string(),
            author: format!("user{i}"),
            rating: (i % 5 + 1) as u8,
            content: format!("review body number {i}"),
            timestamp: base + Duration::minutes(i as i64),
            thumbs_up: i as u64,
            app_version: app_version.map(str::to_string),
            reply_content: None,
            reply_timestamp: None,
            scraped_at: Utc::now(),
        })
        .collect()
}

pub fn fetch_options() -> FetchOptions {
    FetchOptions {
        count: 300,
        language: "en".to_string(),
        country: "us".to_string(),
        sort_order: SortOrder::Newest,
    }
}

pub fn apps(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

pub fn memory_store() -> Arc<dyn ReviewStore> {
    Arc::new(SqliteStore::open_in_memory().unwrap())
}

pub fn pipeline(source: Arc<FakeSource>, store: Arc<dyn ReviewStore>) -> IngestionPipeline {
    IngestionPipeline::new(source, store, fetch_options())
}

pub fn monitor(store: Arc<dyn ReviewStore>) -> HealthMonitor {
    HealthMonitor::new(store, MonitorConfig::default())
}

/// SQLite store whose selected write paths can be switched to fail.
pub struct FailingStore {
    inner: SqliteStore,
    pub fail_start_run: AtomicBool,
    pub fail_existence_check: AtomicBool,
    pub fail_bulk_insert: AtomicBool,
    pub fail_audit_log: AtomicBool,
    pub start_run_calls: AtomicUsize,
}

impl FailingStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteStore::open_in_memory().unwrap(),
            fail_start_run: AtomicBool::new(false),
            fail_existence_check: AtomicBool::new(false),
            fail_bulk_insert: AtomicBool::new(false),
            fail_audit_log: AtomicBool::new(false),
            start_run_calls: AtomicUsize::new(0),
        }
    }

    fn check(flag: &AtomicBool) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            Err(IngestError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )))
        } else {
            Ok(())
        }
    }
}

impl ReviewStore for FailingStore {
    fn start_run(&self, config: &RunConfig, started_at: DateTime<Utc>) -> Result<i64> {
        self.start_run_calls.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_start_run)?;
        self.inner.start_run(config, started_at)
    }

    fn complete_run(&self, completion: &RunCompletion) -> Result<()> {
        self.inner.complete_run(completion)
    }

    fn upsert_app(&self, app: &AppInfo) -> Result<()> {
        self.inner.upsert_app(app)
    }

    fn existing_review_ids(&self, candidate_ids: &HashSet<String>) -> Result<HashSet<String>> {
        Self::check(&self.fail_existence_check)?;
        self.inner.existing_review_ids(candidate_ids)
    }

    fn bulk_insert_reviews(&self, reviews: &[Review]) -> Result<u64> {
        Self::check(&self.fail_bulk_insert)?;
        self.inner.bulk_insert_reviews(reviews)
    }

    fn log_scraped_reviews(&self, review_ids: &[String], run_id: i64) -> Result<()> {
        Self::check(&self.fail_audit_log)?;
        self.inner.log_scraped_reviews(review_ids, run_id)
    }

    fn app_insert_counts(&self, run_id: i64) -> Result<Vec<AppInsertCount>> {
        self.inner.app_insert_counts(run_id)
    }

    fn recent_closed_runs(&self, before_run_id: i64, limit: usize) -> Result<Vec<RunSummary>> {
        self.inner.recent_closed_runs(before_run_id, limit)
    }

    fn field_null_rate(&self, field: TrackedField, run_id: Option<i64>) -> Result<NullCount> {
        self.inner.field_null_rate(field, run_id)
    }

    fn content_stats(&self, run_id: Option<i64>) -> Result<ContentStats> {
        self.inner.content_stats(run_id)
    }

    fn upsert_health_report(&self, report: &HealthReport) -> Result<()> {
        self.inner.upsert_health_report(report)
    }

    fn recent_health_reports(&self, limit: usize) -> Result<Vec<HealthReport>> {
        self.inner.recent_health_reports(limit)
    }

    fn runs_missing_health_report(&self) -> Result<Vec<ClosedRun>> {
        self.inner.runs_missing_health_report()
    }

    fn run_history(&self, limit: usize) -> Result<Vec<RunHistoryRow>> {
        self.inner.run_history(limit)
    }

    fn stats(&self) -> Result<StoreStats> {
        self.inner.stats()
    }
}

/// Poll `done` every 20ms until it holds, failing after five seconds.
pub async fn wait_until(what: &str, done: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while !done() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}
