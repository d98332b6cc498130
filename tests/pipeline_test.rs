mod common;

use common::{apps, memory_store, monitor, pipeline, reviews, FailingStore, FakeSource, Script};
use review_ingest::monitor::{AlertLevel, AppHealthStatus};
use review_ingest::pipeline::RunStatus;
use review_ingest::storage::ReviewStore;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[tokio::test]
async fn test_one_failing_app_gives_partial_run() {
    let source = Arc::new(
        FakeSource::new()
            .with("com.a", Script::Reviews(reviews("com.a", "a", 3, Some("1.0"))))
            .with("com.b", Script::FailReviews("connection reset".to_string()))
            .with("com.c", Script::Reviews(reviews("com.c", "c", 2, Some("1.0")))),
    );
    let store = memory_store();
    let pipeline = pipeline(source, store.clone());

    let result = pipeline
        .run(&apps(&["com.a", "com.b", "com.c"]))
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Partial);
    assert_eq!(result.total_apps_processed, 2);
    assert_eq!(result.total_apps_failed, 1);
    assert_eq!(result.total_reviews_inserted, 5);
    assert_eq!(result.error_message.as_deref(), Some("1 apps failed: com.b"));

    let failed = &result.app_results[1];
    assert_eq!(failed.app_id, "com.b");
    assert_eq!(
        failed.error.as_deref(),
        Some("Review source error: connection reset")
    );
    assert_eq!(failed.reviews_fetched, 0);
    assert_eq!(failed.reviews_inserted, 0);

    let report = monitor(store).evaluate_run(&result);
    assert!((report.metrics.error_rate - 0.3333).abs() < 1e-9);
    let alert = report
        .alerts
        .iter()
        .find(|a| a.metric == "error_rate")
        .expect("error_rate alert");
    assert_eq!(alert.level, AlertLevel::Warning);
    assert!(alert.message.contains("com.b"));
    assert!(!report.is_healthy());
}

#[tokio::test]
async fn test_apps_are_processed_in_order() {
    let source = Arc::new(
        FakeSource::new()
            .with("com.a", Script::Reviews(reviews("com.a", "a", 1, None)))
            .with("com.b", Script::Reviews(reviews("com.b", "b", 1, None))),
    );
    let pipeline = pipeline(source.clone(), memory_store());

    let result = pipeline.run(&apps(&["com.b", "com.a"])).await.unwrap();

    let ids: Vec<&str> = result.app_results.iter().map(|a| a.app_id.as_str()).collect();
    assert_eq!(ids, vec!["com.b", "com.a"]);
    let calls = source.calls.lock().await.clone();
    assert_eq!(
        calls,
        vec!["info:com.b", "reviews:com.b", "info:com.a", "reviews:com.a"]
    );
}

#[tokio::test]
async fn test_second_run_deduplicates_against_stored_reviews() {
    let source = Arc::new(
        FakeSource::new().with("com.a", Script::Reviews(reviews("com.a", "a", 4, Some("2.1")))),
    );
    let store = memory_store();
    let pipeline = pipeline(source.clone(), store.clone());
    let targets = apps(&["com.a"]);

    let first = pipeline.run(&targets).await.unwrap();
    assert_eq!(first.total_reviews_inserted, 4);

    // Two new reviews on top of the four already stored.
    let mut batch = reviews("com.a", "a", 4, Some("2.1"));
    batch.extend(reviews("com.a", "new", 2, Some("2.2")));
    source.set("com.a", Script::Reviews(batch));

    let second = pipeline.run(&targets).await.unwrap();
    assert!(second.run_id > first.run_id);
    assert_eq!(second.status, RunStatus::Completed);
    assert_eq!(second.total_reviews_fetched, 6);
    assert_eq!(second.total_reviews_inserted, 2);
    assert_eq!(second.total_reviews_skipped, 4);

    let third = pipeline.run(&targets).await.unwrap();
    assert_eq!(third.total_reviews_inserted, 0);
    assert_eq!(third.total_reviews_skipped, 6);

    let report = monitor(store.clone()).evaluate_run(&third);
    assert_eq!(report.app_health[0].status, AppHealthStatus::Stale);
    assert_eq!(report.metrics.dedup_rate, 1.0);
    assert!(report.alerts.iter().any(|a| a.metric == "dedup_rate"));

    assert_eq!(store.stats().unwrap().total_reviews, 6);
}

#[tokio::test]
async fn test_unknown_app_is_recorded_as_not_found() {
    let source = Arc::new(FakeSource::new().with("com.gone", Script::NotFound));
    let store = memory_store();
    let pipeline = pipeline(source.clone(), store.clone());

    let result = pipeline.run(&apps(&["com.gone"])).await.unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.app_results[0].error.as_deref(), Some("app_not_found"));
    // Reviews are never requested for an app the source does not know.
    assert_eq!(source.calls.lock().await.clone(), vec!["info:com.gone"]);

    let history = store.run_history(1).unwrap();
    assert_eq!(history[0].status, "failed");
    assert_eq!(
        history[0].error_message.as_deref(),
        Some("1 apps failed: com.gone")
    );
}

#[tokio::test]
async fn test_app_without_reviews_is_healthy() {
    let source = Arc::new(FakeSource::new().with("com.quiet", Script::Reviews(Vec::new())));
    let store = memory_store();

    let result = pipeline(source, store.clone())
        .run(&apps(&["com.quiet"]))
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.total_reviews_fetched, 0);
    assert!(result.error_message.is_none());

    let report = monitor(store).evaluate_run(&result);
    assert_eq!(report.app_health[0].status, AppHealthStatus::Ok);
    assert_eq!(report.metrics.dedup_rate, 0.0);
}

#[tokio::test]
async fn test_totals_match_app_results_and_audit_log() {
    let source = Arc::new(
        FakeSource::new()
            .with("com.a", Script::Reviews(reviews("com.a", "a", 5, None)))
            .with("com.b", Script::Reviews(reviews("com.b", "b", 3, None)))
            .with("com.c", Script::NotFound),
    );
    let store = memory_store();
    let result = pipeline(source, store.clone())
        .run(&apps(&["com.a", "com.b", "com.c"]))
        .await
        .unwrap();

    let sum = |f: fn(&review_ingest::pipeline::AppRunResult) -> u64| -> u64 {
        result.app_results.iter().map(f).sum()
    };
    assert_eq!(result.total_reviews_fetched, sum(|a| a.reviews_fetched));
    assert_eq!(result.total_reviews_inserted, sum(|a| a.reviews_inserted));
    assert_eq!(result.total_reviews_skipped, sum(|a| a.reviews_skipped));
    assert_eq!(
        result.total_apps_processed + result.total_apps_failed,
        result.app_results.len() as u64
    );
    for app in result.app_results.iter().filter(|a| !a.is_failed()) {
        assert_eq!(app.reviews_inserted + app.reviews_skipped, app.reviews_fetched);
    }

    let audit = store.app_insert_counts(result.run_id).unwrap();
    let audited: Vec<(&str, u64)> = audit.iter().map(|c| (c.app_id.as_str(), c.inserted)).collect();
    assert_eq!(audited, vec![("com.a", 5), ("com.b", 3)]);
    assert_eq!(audit[0].app_title.as_deref(), Some("Title of com.a"));
}

#[tokio::test]
async fn test_fetch_count_limits_reviews() {
    let source = Arc::new(
        FakeSource::new().with("com.a", Script::Reviews(reviews("com.a", "a", 10, None))),
    );
    let mut options = common::fetch_options();
    options.count = 4;
    let pipeline =
        review_ingest::pipeline::IngestionPipeline::new(source, memory_store(), options);

    let result = pipeline.run(&apps(&["com.a"])).await.unwrap();

    assert_eq!(result.total_reviews_fetched, 4);
    assert_eq!(result.total_reviews_inserted, 4);
}

#[tokio::test]
async fn test_null_rate_shift_raises_info_alert() {
    let source = Arc::new(
        FakeSource::new().with("com.a", Script::Reviews(reviews("com.a", "v", 10, Some("3.0")))),
    );
    let store = memory_store();
    let pipeline = pipeline(source.clone(), store.clone());
    let targets = apps(&["com.a"]);
    pipeline.run(&targets).await.unwrap();

    source.set(
        "com.a",
        Script::Reviews(reviews("com.a", "nov", 10, None)),
    );
    let result = pipeline.run(&targets).await.unwrap();
    let report = monitor(store).evaluate_run(&result);

    assert_eq!(report.data_quality.app_version_null_rate, 1.0);
    assert_eq!(report.data_quality.app_version_null_rate_baseline, 0.5);
    assert_eq!(report.data_quality.app_version_null_rate_shift_pct, 50.0);
    let alert = report
        .alerts
        .iter()
        .find(|a| a.metric == "app_version_null_rate")
        .expect("null rate alert");
    assert_eq!(alert.level, AlertLevel::Info);
    assert_eq!(
        alert.message,
        "app_version null rate increased by 50.0 percentage points vs baseline"
    );
    assert!(report.deltas.vs_previous.is_some());
}

#[tokio::test]
async fn test_failed_bulk_insert_counts_every_review_as_skipped() {
    let source = Arc::new(
        FakeSource::new().with("com.a", Script::Reviews(reviews("com.a", "a", 4, None))),
    );
    let store = Arc::new(FailingStore::new());
    store.fail_bulk_insert.store(true, Ordering::SeqCst);

    let result = pipeline(source, store.clone())
        .run(&apps(&["com.a"]))
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    let app = &result.app_results[0];
    assert!(app.error.is_none());
    assert_eq!(app.reviews_fetched, 4);
    assert_eq!(app.reviews_inserted, 0);
    assert_eq!(app.reviews_skipped, 4);
    assert_eq!(app.reviews_inserted + app.reviews_skipped, app.reviews_fetched);
    assert_eq!(store.stats().unwrap().total_reviews, 0);
    assert!(store.app_insert_counts(result.run_id).unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_audit_log_keeps_app_successful() {
    let source = Arc::new(
        FakeSource::new().with("com.a", Script::Reviews(reviews("com.a", "a", 4, None))),
    );
    let store = Arc::new(FailingStore::new());
    store.fail_audit_log.store(true, Ordering::SeqCst);

    let result = pipeline(source, store.clone())
        .run(&apps(&["com.a"]))
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    let app = &result.app_results[0];
    assert!(app.error.is_none());
    assert_eq!(app.reviews_inserted, 4);
    assert_eq!(app.reviews_skipped, 0);
    assert_eq!(store.stats().unwrap().total_reviews, 4);
    assert!(store.app_insert_counts(result.run_id).unwrap().is_empty());
}

#[tokio::test]
async fn test_failure_after_lookup_keeps_app_title() {
    let source = Arc::new(
        FakeSource::new().with("com.a", Script::Reviews(reviews("com.a", "a", 4, None))),
    );
    let store = Arc::new(FailingStore::new());
    store.fail_existence_check.store(true, Ordering::SeqCst);

    let result = pipeline(source, store.clone())
        .run(&apps(&["com.a"]))
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    let app = &result.app_results[0];
    assert_eq!(app.error.as_deref(), Some("I/O error: disk full"));
    assert_eq!(app.app_title.as_deref(), Some("Title of com.a"));
    assert_eq!(app.reviews_fetched, 0);

    let report = monitor(store).evaluate_run(&result);
    assert_eq!(report.app_health[0].app_title.as_deref(), Some("Title of com.a"));
}
