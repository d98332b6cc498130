use super::HealthMonitor;
use crate::constants::{FAILED_APPS_MARKER, HISTORICAL_FAILURE};
use crate::error::{IngestError, Result};
use crate::metrics::MonitorMetrics;
use crate::pipeline::{parse_failure_summary, AppRunResult, RunResult, RunStatus};
use crate::storage::{duration_between, ClosedRun};
use tracing::{error, info};

impl HealthMonitor {
    /// Build and store reports for closed runs that have none yet.
    ///
    /// Per-app inserted counts come from the audit log. Fetched counts are
    /// taken to equal inserted and skipped counts are zero, so dedup activity
    /// is understated for these runs; their reports carry `backfilled = true`.
    /// A run that cannot be rebuilt, for example one whose stored timestamps
    /// are unreadable, is logged and skipped.
    ///
    /// Returns the number of reports stored.
    pub fn backfill_metrics(&self) -> Result<usize> {
        let runs = {
            let _enter = self.span.enter();
            self.store.runs_missing_health_report()?
        };

        let mut backfilled = 0;
        for run in &runs {
            let stored = self
                .reconstruct_run_result(run)
                .map(|result| {
                    let mut report = self.evaluate_run(&result);
                    report.backfilled = true;
                    report
                })
                .and_then(|report| self.store_report(&report));

            let _enter = self.span.enter();
            match stored {
                Ok(()) => {
                    backfilled += 1;
                    info!(run_id = run.run_id, "Backfilled run #{}", run.run_id);
                }
                Err(e) => {
                    error!(run_id = run.run_id, "Failed to backfill run #{}: {}", run.run_id, e);
                }
            }
        }

        MonitorMetrics::record_backfilled(backfilled);
        let _enter = self.span.enter();
        info!("Backfill complete: {} of {} runs processed", backfilled, runs.len());
        Ok(backfilled)
    }

    fn reconstruct_run_result(&self, run: &ClosedRun) -> Result<RunResult> {
        let reconstruction = |message: String| IngestError::Reconstruction {
            run_id: run.run_id,
            message,
        };

        let (started_at, completed_at) = run
            .timestamps()
            .map_err(|e| reconstruction(e.to_string()))?;

        let status: RunStatus = run
            .status
            .parse()
            .map_err(|e: IngestError| reconstruction(e.to_string()))?;

        let counts = self
            .store
            .app_insert_counts(run.run_id)
            .map_err(|e| reconstruction(format!("audit log unreadable: {e}")))?;

        let mut app_results: Vec<AppRunResult> = counts
            .into_iter()
            .map(|c| AppRunResult {
                app_title: c.app_title,
                reviews_fetched: c.inserted,
                reviews_inserted: c.inserted,
                ..AppRunResult::new(c.app_id)
            })
            .collect();

        let failed_apps = run
            .error_message
            .as_deref()
            .filter(|msg| msg.contains(FAILED_APPS_MARKER))
            .map(parse_failure_summary)
            .unwrap_or_default();
        for app_id in &failed_apps {
            app_results.push(AppRunResult {
                error: Some(HISTORICAL_FAILURE.to_string()),
                ..AppRunResult::new(app_id.as_str())
            });
        }

        Ok(RunResult {
            run_id: run.run_id,
            started_at,
            completed_at: Some(completed_at),
            status,
            app_results,
            total_reviews_fetched: run.total_inserted,
            total_reviews_inserted: run.total_inserted,
            total_reviews_skipped: 0,
            total_apps_processed: run.total_apps_processed,
            total_apps_failed: failed_apps.len() as u64,
            duration_seconds: duration_between(started_at, completed_at),
            error_message: run.error_message.clone(),
        })
    }
}
