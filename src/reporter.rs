//! Human-readable text for runs, health reports, run history and database
//! snapshots. Every function is pure and returns the formatted block; callers
//! decide whether it goes to stdout, the log or both.

use crate::monitor::{AlertLevel, HealthReport};
use crate::pipeline::RunResult;
use crate::storage::{RunHistoryRow, StoreStats};
use chrono::{DateTime, Utc};
use std::fmt::Write;

const RUN_DIVIDER_WIDTH: usize = 66;
const HEALTH_DIVIDER_WIDTH: usize = 70;
const HISTORY_DIVIDER_WIDTH: usize = 90;
const SUMMARY_DIVIDER_WIDTH: usize = 100;

fn divider(width: usize) -> String {
    "=".repeat(width)
}

/// `"Xm Ys"` from one minute up, otherwise `"S.Ss"`.
pub fn fmt_duration(seconds: f64) -> String {
    if seconds >= 60.0 {
        let total = seconds as u64;
        format!("{}m {}s", total / 60, total % 60)
    } else {
        format!("{:.1}s", seconds)
    }
}

/// Integer with comma thousands separators.
pub fn fmt_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn fmt_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn truncate(text: &str, max_chars: usize, keep: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(keep).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

fn alert_prefix(level: AlertLevel) -> &'static str {
    match level {
        AlertLevel::Warning => "[WARNING]",
        AlertLevel::Info => "[INFO   ]",
    }
}

pub fn format_run(result: &RunResult) -> String {
    let div = divider(RUN_DIVIDER_WIDTH);
    let mut out = String::new();

    let _ = writeln!(out);
    let _ = writeln!(out, "{div}");
    let _ = writeln!(
        out,
        "  INGESTION RUN #{}  |  {}",
        result.run_id,
        fmt_timestamp(&result.started_at)
    );
    let _ = writeln!(out, "{div}");
    let _ = writeln!(out, "  Status   : {}", result.status);
    let _ = writeln!(out, "  Duration : {}", fmt_duration(result.duration_seconds));
    let failed = if result.total_apps_failed > 0 {
        format!(", {} failed", result.total_apps_failed)
    } else {
        String::new()
    };
    let _ = writeln!(out, "  Apps     : {} processed{}", result.total_apps_processed, failed);
    let _ = writeln!(out);
    let _ = writeln!(out, "  Per-app breakdown:");
    let _ = writeln!(
        out,
        "  {:<45} {:>7} {:>5} {:>6} {:>7}",
        "App", "Fetched", "New", "Skip", "Time"
    );
    let _ = writeln!(out, "  {}", "-".repeat(72));

    for app in &result.app_results {
        let label = truncate(app.app_title.as_deref().unwrap_or(&app.app_id), 43, 40);
        let error = app
            .error
            .as_deref()
            .map(|e| format!("  ERR: {e}"))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "  {:<45} {:>7} {:>5} {:>6} {:>6.1}s{}",
            label, app.reviews_fetched, app.reviews_inserted, app.reviews_skipped, app.duration_seconds, error
        );
    }

    let dedup_pct = if result.total_reviews_fetched > 0 {
        result.total_reviews_skipped as f64 / result.total_reviews_fetched as f64 * 100.0
    } else {
        0.0
    };

    let _ = writeln!(out);
    let _ = writeln!(out, "  Totals:");
    let _ = writeln!(out, "    Reviews fetched    : {}", fmt_count(result.total_reviews_fetched));
    let _ = writeln!(out, "    New (inserted)     : {}", fmt_count(result.total_reviews_inserted));
    let _ = writeln!(out, "    Duplicates skipped : {}", fmt_count(result.total_reviews_skipped));
    let _ = writeln!(out, "    Dedup rate         : {:.1}%", dedup_pct);
    let _ = writeln!(out, "{div}");
    out
}

pub fn format_db_stats(stats: &StoreStats) -> String {
    let or_na = |v: Option<String>| v.unwrap_or_else(|| "n/a".to_string());
    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(out, "  Database snapshot:");
    let _ = writeln!(out, "    Total reviews  : {}", fmt_count(stats.total_reviews));
    let _ = writeln!(out, "    Total apps     : {}", stats.total_apps);
    let _ = writeln!(out, "    Avg rating     : {}", or_na(stats.avg_rating.map(|r| r.to_string())));
    let _ = writeln!(
        out,
        "    Date range     : {} .. {}",
        or_na(stats.earliest_review.clone()),
        or_na(stats.latest_review.clone())
    );
    let _ = writeln!(
        out,
        "    DB file size   : {} MB",
        or_na(stats.db_file_size_mb.map(|s| s.to_string()))
    );
    out
}

pub fn format_run_history(rows: &[RunHistoryRow]) -> String {
    if rows.is_empty() {
        return "\n  No ingestion runs recorded yet.\n".to_string();
    }

    let div = divider(HISTORY_DIVIDER_WIDTH);
    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(out, "{div}");
    let _ = writeln!(out, "  Last {} ingestion runs", rows.len());
    let _ = writeln!(out, "{div}");
    let _ = writeln!(
        out,
        "  {:>4}  {:<20} {:<10} {:>8} {:>5} {:>8}  Error",
        "Run", "Started", "Status", "Reviews", "Apps", "Per App"
    );
    let _ = writeln!(out, "  {}", "-".repeat(84));

    for row in rows {
        let error = truncate(row.error_message.as_deref().unwrap_or(""), 30, 27);
        let _ = writeln!(
            out,
            "  {:>4}  {:<20} {:<10} {:>8} {:>5} {:>8}  {}",
            row.run_id,
            fmt_timestamp(&row.started_at),
            row.status,
            row.total_inserted,
            row.total_apps_processed,
            row.reviews_per_app,
            error
        );
    }
    let _ = writeln!(out, "{div}");
    out
}

/// Alert block printed after every scheduled run.
pub fn format_alerts(report: &HealthReport) -> String {
    if report.alerts.is_empty() {
        return format!("\n  Run #{}: No anomalies detected.\n", report.run_id);
    }

    let div = divider(HEALTH_DIVIDER_WIDTH);
    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(out, "{div}");
    let _ = writeln!(
        out,
        "  HEALTH ALERTS - Run #{}  ({} alert(s))",
        report.run_id,
        report.alerts.len()
    );
    let _ = writeln!(out, "{div}");
    for alert in &report.alerts {
        let _ = writeln!(out, "  {} {}", alert_prefix(alert.level), alert.message);
    }
    let _ = writeln!(out, "{div}");
    out
}

/// Full detail of one stored report.
pub fn format_health_report(report: &HealthReport) -> String {
    let m = &report.metrics;
    let dq = &report.data_quality;
    let div = divider(HEALTH_DIVIDER_WIDTH);
    let mut out = String::new();

    let _ = writeln!(out);
    let _ = writeln!(out, "{div}");
    let _ = writeln!(
        out,
        "  HEALTH REPORT - Run #{}  |  {}",
        report.run_id,
        fmt_timestamp(&report.timestamp)
    );
    if report.backfilled {
        let _ = writeln!(
            out,
            "  Status: {} (backfilled; fetched and skipped counts are approximate)",
            report.status
        );
    } else {
        let _ = writeln!(out, "  Status: {}", report.status);
    }
    let _ = writeln!(out, "{div}");

    let _ = writeln!(out);
    let _ = writeln!(out, "  Performance:");
    let _ = writeln!(out, "    Reviews inserted     : {}", fmt_count(m.reviews_inserted));
    let _ = writeln!(out, "    Reviews fetched      : {}", fmt_count(m.reviews_fetched));
    let _ = writeln!(out, "    Dedup rate           : {:.1}%", m.dedup_rate * 100.0);
    let _ = writeln!(out, "    Error rate           : {:.1}%", m.error_rate * 100.0);
    let _ = writeln!(out, "    Duration             : {:.0}s", m.duration_seconds);
    let _ = writeln!(
        out,
        "    Ingestion rate       : {:.0} reviews/min",
        m.ingestion_rate_per_min
    );
    let _ = writeln!(
        out,
        "    Apps                 : {} ok, {} failed",
        m.apps_processed, m.apps_failed
    );

    let _ = writeln!(out);
    let _ = writeln!(out, "  Data Quality:");
    let _ = writeln!(
        out,
        "    app_version null     : {:.1}%  (baseline {:.1}%, shift {:+.1}pp)",
        dq.app_version_null_rate * 100.0,
        dq.app_version_null_rate_baseline * 100.0,
        dq.app_version_null_rate_shift_pct
    );
    let _ = writeln!(
        out,
        "    reply_content null   : {:.1}%  (baseline {:.1}%, shift {:+.1}pp)",
        dq.reply_content_null_rate * 100.0,
        dq.reply_content_null_rate_baseline * 100.0,
        dq.reply_content_null_rate_shift_pct
    );
    let _ = writeln!(out, "    empty content        : {:.1}%", dq.empty_content_rate * 100.0);
    let _ = writeln!(
        out,
        "    avg content length   : {:.0} chars  (baseline {:.0})",
        dq.avg_content_length, dq.avg_content_length_baseline
    );

    if let Some(prev) = &report.deltas.vs_previous {
        let _ = writeln!(out);
        let _ = writeln!(out, "  Delta vs Previous Run:");
        for (name, c) in [("reviews_inserted", &prev.reviews_inserted), ("duration", &prev.duration)] {
            let _ = writeln!(
                out,
                "    {:<22}: {:>8.0}  (was {:.0}, {:+.1}%)",
                name, c.current, c.previous, c.change_pct
            );
        }
    }

    if let Some(avg) = &report.deltas.vs_avg_last_5 {
        let _ = writeln!(out);
        let _ = writeln!(out, "  Delta vs Last-5 Average:");
        for (name, d) in [("reviews_inserted", &avg.reviews_inserted), ("duration", &avg.duration)] {
            let z = d.z_score.map(|z| format!(", z={z:.1}")).unwrap_or_default();
            let _ = writeln!(
                out,
                "    {:<22}: {:>8.0}  (avg {:.0}, {:+.1}%{})",
                name, d.current, d.baseline, d.deviation_pct, z
            );
        }
    }

    let _ = writeln!(out);
    if report.alerts.is_empty() {
        let _ = writeln!(out, "  Alerts: None");
    } else {
        let _ = writeln!(out, "  Alerts ({}):", report.alerts.len());
        for alert in &report.alerts {
            let _ = writeln!(out, "    {} {}", alert_prefix(alert.level), alert.message);
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "{div}");
    out
}

/// One line per report. Backfilled reports are starred.
pub fn format_health_summary(reports: &[HealthReport]) -> String {
    if reports.is_empty() {
        return "\n  No health reports available.\n".to_string();
    }

    let div = divider(SUMMARY_DIVIDER_WIDTH);
    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(out, "{div}");
    let _ = writeln!(out, "  Health Summary - Last {} Runs", reports.len());
    let _ = writeln!(out, "{div}");
    let _ = writeln!(
        out,
        "  {:>4}  {:<20} {:<10} {:>8} {:>7} {:>5} {:>7} {:>7}",
        "Run", "Timestamp", "Status", "Inserted", "Dedup%", "Err%", "Dur(s)", "Alerts"
    );
    let _ = writeln!(out, "  {}", "-".repeat(94));

    for r in reports {
        let m = &r.metrics;
        let status = if r.backfilled {
            format!("{}*", r.status)
        } else {
            r.status.to_string()
        };
        let _ = writeln!(
            out,
            "  {:>4}  {:<20} {:<10} {:>8} {:>6.1}% {:>4.1}% {:>7.0} {:>7}",
            r.run_id,
            fmt_timestamp(&r.timestamp),
            status,
            m.reviews_inserted,
            m.dedup_rate * 100.0,
            m.error_rate * 100.0,
            m.duration_seconds,
            r.alerts.len()
        );
    }

    if reports.iter().any(|r| r.backfilled) {
        let _ = writeln!(out, "  * backfilled from the audit log; dedup figures understated");
    }
    let _ = writeln!(out, "{div}");
    out
}
