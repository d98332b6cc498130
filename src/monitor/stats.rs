//! Pure health computations over a finished run and its history.
//!
//! Nothing here touches storage; the monitor gathers the inputs and these
//! functions turn them into the report sections. Identical inputs always
//! produce identical output.

use super::report::{
    Alert, AppHealth, AppHealthStatus, Change, DataQuality, Deltas, Deviation, PreviousRunDeltas,
    RunMetrics, TrailingAverageDeltas,
};
use super::thresholds::Thresholds;
use crate::constants::TRAILING_AVERAGE_WINDOW;
use crate::pipeline::{AppRunResult, RunResult};
use crate::storage::{ContentStats, NullCount, RunSummary, TrackedField};

/// Round half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

pub fn compute_metrics(result: &RunResult) -> RunMetrics {
    let total_apps = result.total_apps_processed + result.total_apps_failed;
    let ingestion_rate = if result.duration_seconds > 0.0 {
        result.total_reviews_fetched as f64 / result.duration_seconds * 60.0
    } else {
        0.0
    };

    RunMetrics {
        reviews_inserted: result.total_reviews_inserted,
        reviews_fetched: result.total_reviews_fetched,
        reviews_skipped: result.total_reviews_skipped,
        dedup_rate: round_to(ratio(result.total_reviews_skipped, result.total_reviews_fetched), 4),
        error_rate: round_to(ratio(result.total_apps_failed, total_apps), 4),
        duration_seconds: round_to(result.duration_seconds, 2),
        ingestion_rate_per_min: round_to(ingestion_rate, 2),
        apps_processed: result.total_apps_processed,
        apps_failed: result.total_apps_failed,
    }
}

pub fn change(previous: f64, current: f64) -> Change {
    let pct = if previous != 0.0 {
        (current - previous) / previous * 100.0
    } else {
        0.0
    };
    Change {
        previous: round_to(previous, 2),
        current: round_to(current, 2),
        change: round_to(current - previous, 2),
        change_pct: round_to(pct, 2),
    }
}

/// `z_score` is only defined for a positive spread.
pub fn deviation(baseline: f64, current: f64, std_dev: f64) -> Deviation {
    let dev = current - baseline;
    let pct = if baseline != 0.0 {
        dev / baseline * 100.0
    } else {
        0.0
    };
    Deviation {
        baseline: round_to(baseline, 2),
        current: round_to(current, 2),
        deviation: round_to(dev, 2),
        deviation_pct: round_to(pct, 2),
        z_score: (std_dev > 0.0).then(|| round_to(dev / std_dev, 2)),
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation; zero for fewer than two points.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Compare against prior closed runs, newest first.
pub fn compute_deltas(history: &[RunSummary], metrics: &RunMetrics) -> Deltas {
    let Some(prev) = history.first() else {
        return Deltas::default();
    };

    let vs_previous = PreviousRunDeltas {
        reviews_inserted: change(prev.total_inserted as f64, metrics.reviews_inserted as f64),
        duration: change(prev.duration_seconds, metrics.duration_seconds),
    };

    let window = &history[..history.len().min(TRAILING_AVERAGE_WINDOW)];
    let inserted: Vec<f64> = window.iter().map(|r| r.total_inserted as f64).collect();
    let durations: Vec<f64> = window.iter().map(|r| r.duration_seconds).collect();

    let vs_avg = TrailingAverageDeltas {
        reviews_inserted: deviation(
            mean(&inserted),
            metrics.reviews_inserted as f64,
            sample_std_dev(&inserted),
        ),
        duration: deviation(mean(&durations), metrics.duration_seconds, 0.0),
    };

    Deltas {
        vs_previous: Some(vs_previous),
        vs_avg_last_5: Some(vs_avg),
    }
}

/// Null and content counts for one population of reviews.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QualitySample {
    pub app_version: NullCount,
    pub reply_content: NullCount,
    pub content: ContentStats,
}

pub fn compute_data_quality(current: &QualitySample, baseline: &QualitySample) -> DataQuality {
    let cur_ver = current.app_version.rate();
    let cur_rep = current.reply_content.rate();
    let base_ver = baseline.app_version.rate();
    let base_rep = baseline.reply_content.rate();

    DataQuality {
        app_version_null_rate: round_to(cur_ver, 4),
        app_version_null_rate_baseline: round_to(base_ver, 4),
        app_version_null_rate_shift_pct: round_to((cur_ver - base_ver) * 100.0, 2),
        reply_content_null_rate: round_to(cur_rep, 4),
        reply_content_null_rate_baseline: round_to(base_rep, 4),
        reply_content_null_rate_shift_pct: round_to((cur_rep - base_rep) * 100.0, 2),
        empty_content_rate: round_to(current.content.empty_rate(), 4),
        empty_content_rate_baseline: round_to(baseline.content.empty_rate(), 4),
        avg_content_length: round_to(current.content.avg_length, 1),
        avg_content_length_baseline: round_to(baseline.content.avg_length, 1),
    }
}

/// Run every check independently, in a fixed order.
pub fn detect_anomalies(
    result: &RunResult,
    metrics: &RunMetrics,
    deltas: &Deltas,
    quality: &DataQuality,
    thresholds: &Thresholds,
) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if metrics.error_rate > thresholds.error_rate_max {
        alerts.push(
            Alert::warning(
                "error_rate",
                format!(
                    "{} app(s) failed: {}",
                    metrics.apps_failed,
                    result.failed_app_ids().join(", ")
                ),
            )
            .with_threshold(thresholds.error_rate_max)
            .with_actual(metrics.error_rate),
        );
    }

    if metrics.dedup_rate > thresholds.dedup_rate_ceiling {
        alerts.push(
            Alert::warning(
                "dedup_rate",
                format!(
                    "Dedup rate {:.1}% exceeds {:.1}% threshold - possible API staleness",
                    metrics.dedup_rate * 100.0,
                    thresholds.dedup_rate_ceiling * 100.0
                ),
            )
            .with_threshold(thresholds.dedup_rate_ceiling)
            .with_actual(metrics.dedup_rate),
        );
    }

    if let Some(avg) = &deltas.vs_avg_last_5 {
        let dev_pct = avg.reviews_inserted.deviation_pct;
        let limit = thresholds.inserted_change_pct;
        if dev_pct < -limit {
            alerts.push(
                Alert::warning(
                    "reviews_inserted",
                    format!("Reviews inserted dropped {:.1}% vs recent average", dev_pct.abs()),
                )
                .with_threshold(-limit)
                .with_actual(dev_pct),
            );
        } else if dev_pct > limit {
            alerts.push(
                Alert::info(
                    "reviews_inserted",
                    format!("Reviews inserted increased {:.1}% vs recent average", dev_pct),
                )
                .with_threshold(limit)
                .with_actual(dev_pct),
            );
        }

        let baseline = avg.duration.baseline;
        if baseline > 0.0 {
            let ceiling = baseline * thresholds.duration_multiplier;
            if metrics.duration_seconds > ceiling {
                alerts.push(
                    Alert::warning(
                        "duration",
                        format!(
                            "Duration {:.0}s is {:.1}x recent average",
                            metrics.duration_seconds,
                            metrics.duration_seconds / baseline
                        ),
                    )
                    .with_threshold(ceiling)
                    .with_actual(metrics.duration_seconds),
                );
            }
        }
    }

    for field in TrackedField::ALL {
        let shift = quality.shift_pp(field);
        if shift.abs() > thresholds.null_rate_shift_pp {
            let direction = if shift > 0.0 { "increased" } else { "decreased" };
            alerts.push(
                Alert::info(
                    format!("{}_null_rate", field.column()),
                    format!(
                        "{} null rate {} by {:.1} percentage points vs baseline",
                        field.column(),
                        direction,
                        shift.abs()
                    ),
                )
                .with_threshold(thresholds.null_rate_shift_pp)
                .with_actual(shift.abs()),
            );
        }
    }

    if let Some(z) = deltas
        .vs_avg_last_5
        .as_ref()
        .and_then(|avg| avg.reviews_inserted.z_score)
    {
        if z.abs() > thresholds.z_score_limit {
            alerts.push(
                Alert::info(
                    "reviews_inserted_z_score",
                    format!(
                        "Reviews inserted is {:.1} standard deviations from recent mean",
                        z.abs()
                    ),
                )
                .with_threshold(thresholds.z_score_limit)
                .with_actual(z.abs()),
            );
        }
    }

    alerts
}

pub fn classify_app(app: &AppRunResult) -> AppHealthStatus {
    if app.is_failed() {
        AppHealthStatus::Error
    } else if app.reviews_inserted == 0 && app.reviews_fetched > 0 {
        AppHealthStatus::Stale
    } else {
        AppHealthStatus::Ok
    }
}

pub fn build_app_health(app_results: &[AppRunResult]) -> Vec<AppHealth> {
    app_results
        .iter()
        .map(|app| AppHealth {
            app_id: app.app_id.clone(),
            app_title: app.app_title.clone(),
            status: classify_app(app),
            reviews_fetched: app.reviews_fetched,
            reviews_inserted: app.reviews_inserted,
            reviews_skipped: app.reviews_skipped,
            duration_seconds: round_to(app.duration_seconds, 2),
            error: app.error.clone(),
        })
        .collect()
}
