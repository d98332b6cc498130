use super::{AppRunResult, RunResult, RunResultBuilder};
use crate::error::{IngestError, Result};
use crate::metrics::IngestionMetrics;
use crate::storage::{ReviewStore, RunCompletion, RunConfig};
use crate::types::{FetchOptions, Review, ReviewSource};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn, Instrument, Span};

/// Fetch, dedupe, insert and audit-log reviews for a list of apps.
///
/// Apps are processed one at a time in the given order. A failing app is
/// recorded in its own [`AppRunResult`] and the cycle moves on.
pub struct IngestionPipeline {
    source: Arc<dyn ReviewSource>,
    store: Arc<dyn ReviewStore>,
    options: FetchOptions,
    span: Span,
}

impl IngestionPipeline {
    pub fn new(source: Arc<dyn ReviewSource>, store: Arc<dyn ReviewStore>, options: FetchOptions) -> Self {
        Self {
            source,
            store,
            options,
            span: Span::none(),
        }
    }

    /// Log every event of this pipeline inside `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Run one full cycle over `target_apps`.
    ///
    /// Only a failure to open the run record is returned as an error. Every
    /// per-app failure, and a failure to close the run record, is captured or
    /// logged and a well-formed [`RunResult`] is still returned.
    pub async fn run(&self, target_apps: &[String]) -> Result<RunResult> {
        self.run_cycle(target_apps).instrument(self.span.clone()).await
    }

    async fn run_cycle(&self, target_apps: &[String]) -> Result<RunResult> {
        let started_at = Utc::now();
        let clock = Instant::now();

        let run_id = self.store.start_run(
            &RunConfig {
                target_apps: target_apps.to_vec(),
                reviews_per_app: self.options.count,
                language: self.options.language.clone(),
                country: self.options.country.clone(),
                sort_order: self.options.sort_order,
            },
            started_at,
        )?;
        IngestionMetrics::record_run_started();
        info!(
            run_id,
            apps = target_apps.len(),
            "Starting ingestion run #{} for {} apps",
            run_id,
            target_apps.len()
        );

        let mut builder = RunResultBuilder::new(run_id, started_at);
        for (i, app_id) in target_apps.iter().enumerate() {
            info!(run_id, app_id = %app_id, "[{}/{}] Processing {}", i + 1, target_apps.len(), app_id);
            let app_result = self.process_app(app_id, run_id).await;
            IngestionMetrics::record_app(&app_result);
            builder.push(app_result);
        }

        let completed_at = Utc::now();
        let duration_seconds = clock.elapsed().as_secs_f64();
        let (status, error_message) = builder.outcome();

        let completion = RunCompletion {
            run_id,
            total_inserted: builder.total_inserted(),
            total_apps: builder.apps_processed(),
            status,
            error_message,
            completed_at,
        };
        if let Err(e) = self.store.complete_run(&completion) {
            error!(run_id, "Failed to close run record #{}: {}", run_id, e);
        }

        let result = builder.finish(completed_at, duration_seconds);
        IngestionMetrics::record_run_finished(&result);
        info!(
            run_id,
            status = %result.status,
            inserted = result.total_reviews_inserted,
            skipped = result.total_reviews_skipped,
            failed_apps = result.total_apps_failed,
            "Run #{} {} in {:.1}s",
            run_id,
            result.status,
            result.duration_seconds
        );
        Ok(result)
    }

    /// Never fails: an error becomes the app's `error` with zeroed counts.
    /// The title is kept when the app was found before the failure.
    async fn process_app(&self, app_id: &str, run_id: i64) -> AppRunResult {
        let clock = Instant::now();
        let mut result = AppRunResult::new(app_id);
        let outcome = self.ingest_app(app_id, &mut result, run_id).await;
        let duration_seconds = clock.elapsed().as_secs_f64();

        match outcome {
            Ok(()) => {
                info!(
                    app_id,
                    fetched = result.reviews_fetched,
                    inserted = result.reviews_inserted,
                    skipped = result.reviews_skipped,
                    "{}: {} fetched, {} new, {} duplicates",
                    app_id,
                    result.reviews_fetched,
                    result.reviews_inserted,
                    result.reviews_skipped
                );
                AppRunResult {
                    duration_seconds,
                    ..result
                }
            }
            Err(e) => {
                warn!(app_id, "{} failed: {}", app_id, e);
                AppRunResult {
                    app_title: result.app_title,
                    duration_seconds,
                    error: Some(e.to_string()),
                    ..AppRunResult::new(app_id)
                }
            }
        }
    }

    async fn ingest_app(&self, app_id: &str, result: &mut AppRunResult, run_id: i64) -> Result<()> {
        let info = self
            .source
            .fetch_app_info(app_id)
            .await?
            .ok_or(IngestError::AppNotFound)?;
        result.app_title = Some(info.title.clone());
        self.store.upsert_app(&info)?;

        let reviews = self.source.fetch_reviews(app_id, &self.options).await?;
        result.reviews_fetched = reviews.len() as u64;
        if reviews.is_empty() {
            debug!(app_id, "No reviews returned");
            return Ok(());
        }

        let candidate_ids: HashSet<String> = reviews.iter().map(|r| r.review_id.clone()).collect();
        let existing = self.store.existing_review_ids(&candidate_ids)?;
        let new_reviews: Vec<Review> = reviews
            .into_iter()
            .filter(|r| !existing.contains(&r.review_id))
            .collect();
        debug!(
            app_id,
            candidates = candidate_ids.len(),
            known = existing.len(),
            new = new_reviews.len(),
            "Existence check complete"
        );

        if !new_reviews.is_empty() {
            result.reviews_inserted = match self.store.bulk_insert_reviews(&new_reviews) {
                Ok(inserted) => inserted,
                Err(e) => {
                    warn!(app_id, "Bulk insert failed, counting all reviews as skipped: {}", e);
                    0
                }
            };

            if result.reviews_inserted > 0 {
                let new_ids: Vec<String> = new_reviews.into_iter().map(|r| r.review_id).collect();
                if let Err(e) = self.store.log_scraped_reviews(&new_ids, run_id) {
                    warn!(app_id, run_id, "Audit log write failed: {}", e);
                }
            }
        }

        result.reviews_skipped = result.reviews_fetched.saturating_sub(result.reviews_inserted);
        Ok(())
    }
}
