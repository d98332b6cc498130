use super::{
    AppInsertCount, ClosedRun, ContentStats, NullCount, ReviewStore, RunCompletion, RunConfig,
    parse_timestamp, RunHistoryRow, RunSummary, StoreStats, TrackedField,
};
use crate::error::Result;
use crate::monitor::HealthReport;
use crate::types::{AppInfo, Review};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// SQLite limits host parameters per statement; stay well below it.
const ID_CHUNK: usize = 500;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS apps (
        app_id             TEXT PRIMARY KEY,
        title              TEXT,
        developer          TEXT,
        genre              TEXT,
        play_store_rating  REAL,
        play_store_reviews INTEGER,
        installs           TEXT,
        first_scraped_at   TEXT,
        last_scraped_at    TEXT
    );
    CREATE TABLE IF NOT EXISTS reviews (
        review_id        TEXT PRIMARY KEY,
        app_id           TEXT NOT NULL,
        author           TEXT,
        rating           INTEGER,
        content          TEXT,
        review_timestamp TEXT,
        scraped_at       TEXT,
        thumbs_up        INTEGER DEFAULT 0,
        app_version      TEXT,
        reply_content    TEXT,
        reply_timestamp  TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_reviews_app_id ON reviews(app_id);
    CREATE TABLE IF NOT EXISTS scrape_runs (
        run_id                  INTEGER PRIMARY KEY AUTOINCREMENT,
        started_at              TEXT NOT NULL,
        completed_at            TEXT,
        status                  TEXT NOT NULL DEFAULT 'running',
        target_apps             TEXT,
        reviews_per_app         INTEGER,
        language                TEXT,
        country                 TEXT,
        sort_order              TEXT,
        total_reviews_collected INTEGER DEFAULT 0,
        total_apps_processed    INTEGER DEFAULT 0,
        error_message           TEXT
    );
    CREATE TABLE IF NOT EXISTS review_scrape_log (
        review_id TEXT NOT NULL,
        run_id    INTEGER NOT NULL,
        logged_at TEXT NOT NULL,
        PRIMARY KEY (review_id, run_id)
    );
    CREATE INDEX IF NOT EXISTS idx_review_scrape_log_run ON review_scrape_log(run_id);
    CREATE TABLE IF NOT EXISTS ingestion_metrics (
        run_id                  INTEGER PRIMARY KEY,
        recorded_at             TEXT NOT NULL,
        report_json             TEXT NOT NULL,
        reviews_inserted        INTEGER,
        reviews_fetched         INTEGER,
        reviews_skipped         INTEGER,
        dedup_rate              REAL,
        error_rate              REAL,
        duration_seconds        REAL,
        ingestion_rate_per_min  REAL,
        apps_processed          INTEGER,
        apps_failed             INTEGER,
        app_version_null_rate   REAL,
        reply_content_null_rate REAL,
        empty_content_rate      REAL,
        alerts_count            INTEGER
    );
"#;

pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (creating if needed) the database file and ensure the schema.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        debug!("Opened review store at {}", db_path.display());
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(db_path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_opt_ts(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_timestamp).transpose()
}

impl ReviewStore for SqliteStore {
    fn start_run(&self, config: &RunConfig, started_at: DateTime<Utc>) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO scrape_runs (started_at, status, target_apps, reviews_per_app, language, country, sort_order)
             VALUES (?1, 'running', ?2, ?3, ?4, ?5, ?6)",
            params![
                ts(started_at),
                serde_json::to_string(&config.target_apps)?,
                config.reviews_per_app,
                config.language,
                config.country,
                config.sort_order.as_str(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn complete_run(&self, completion: &RunCompletion) -> Result<()> {
        self.conn().execute(
            "UPDATE scrape_runs SET
                completed_at = ?1,
                status = ?2,
                total_reviews_collected = ?3,
                total_apps_processed = ?4,
                error_message = ?5
             WHERE run_id = ?6",
            params![
                ts(completion.completed_at),
                completion.status.as_str(),
                completion.total_inserted as i64,
                completion.total_apps as i64,
                completion.error_message,
                completion.run_id,
            ],
        )?;
        Ok(())
    }

    fn upsert_app(&self, app: &AppInfo) -> Result<()> {
        self.conn().execute(
            "INSERT INTO apps (app_id, title, developer, genre, play_store_rating, play_store_reviews,
                               installs, first_scraped_at, last_scraped_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
             ON CONFLICT(app_id) DO UPDATE SET
                title = excluded.title,
                developer = excluded.developer,
                genre = excluded.genre,
                play_store_rating = excluded.play_store_rating,
                play_store_reviews = excluded.play_store_reviews,
                installs = excluded.installs,
                last_scraped_at = excluded.last_scraped_at",
            params![
                app.app_id,
                app.title,
                app.developer,
                app.genre,
                app.rating,
                app.reviews_count as i64,
                app.installs,
                ts(app.scraped_at),
            ],
        )?;
        Ok(())
    }

    fn existing_review_ids(&self, candidate_ids: &HashSet<String>) -> Result<HashSet<String>> {
        let conn = self.conn();
        let ids: Vec<&String> = candidate_ids.iter().collect();
        let mut existing = HashSet::new();
        for chunk in ids.chunks(ID_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!("SELECT review_id FROM reviews WHERE review_id IN ({placeholders})");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| row.get::<_, String>(0))?;
            for id in rows {
                existing.insert(id?);
            }
        }
        Ok(existing)
    }

    fn bulk_insert_reviews(&self, reviews: &[Review]) -> Result<u64> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut inserted = 0u64;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO reviews (
                    review_id, app_id, author, rating, content, review_timestamp, scraped_at,
                    thumbs_up, app_version, reply_content, reply_timestamp
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for r in reviews {
                inserted += stmt.execute(params![
                    r.review_id,
                    r.app_id,
                    r.author,
                    r.rating,
                    r.content,
                    ts(r.timestamp),
                    ts(r.scraped_at),
                    r.thumbs_up as i64,
                    r.app_version,
                    r.reply_content,
                    r.reply_timestamp.map(ts),
                ])? as u64;
            }
        }
        tx.commit()?;
        debug!("Bulk insert complete: {} of {} rows written", inserted, reviews.len());
        Ok(inserted)
    }

    fn log_scraped_reviews(&self, review_ids: &[String], run_id: i64) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let logged_at = ts(Utc::now());
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO review_scrape_log (review_id, run_id, logged_at) VALUES (?1, ?2, ?3)",
            )?;
            for id in review_ids {
                stmt.execute(params![id, run_id, logged_at])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn app_insert_counts(&self, run_id: i64) -> Result<Vec<AppInsertCount>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT r.app_id, a.title, COUNT(*) AS cnt
             FROM review_scrape_log rsl
             JOIN reviews r ON rsl.review_id = r.review_id
             LEFT JOIN apps a ON r.app_id = a.app_id
             WHERE rsl.run_id = ?1
             GROUP BY r.app_id
             ORDER BY r.app_id",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(AppInsertCount {
                app_id: row.get(0)?,
                app_title: row.get(1)?,
                inserted: row.get::<_, i64>(2)? as u64,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    fn recent_closed_runs(&self, before_run_id: i64, limit: usize) -> Result<Vec<RunSummary>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT run_id, total_reviews_collected, started_at, completed_at
             FROM scrape_runs
             WHERE run_id < ?1 AND status IN ('completed', 'partial') AND completed_at IS NOT NULL
             ORDER BY run_id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![before_run_id, limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<i64>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        let mut summaries = Vec::new();
        for row in rows {
            let (run_id, total, started, completed) = row?;
            let duration = parse_timestamp(&started)
                .and_then(|start| Ok(super::duration_between(start, parse_timestamp(&completed)?)));
            match duration {
                Ok(duration_seconds) => summaries.push(RunSummary {
                    run_id,
                    total_inserted: total.unwrap_or(0).max(0) as u64,
                    duration_seconds,
                }),
                Err(e) => warn!(run_id, "Leaving run #{} out of history: {}", run_id, e),
            }
        }
        Ok(summaries)
    }

    fn field_null_rate(&self, field: TrackedField, run_id: Option<i64>) -> Result<NullCount> {
        let column = field.column();
        let conn = self.conn();
        let (count, nulls): (i64, i64) = match run_id {
            Some(id) => conn.query_row(
                &format!(
                    "SELECT COUNT(*), COALESCE(SUM(CASE WHEN r.{column} IS NULL THEN 1 ELSE 0 END), 0)
                     FROM reviews r JOIN review_scrape_log rsl ON r.review_id = rsl.review_id
                     WHERE rsl.run_id = ?1"
                ),
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?,
            None => conn.query_row(
                &format!(
                    "SELECT COUNT(*), COALESCE(SUM(CASE WHEN {column} IS NULL THEN 1 ELSE 0 END), 0)
                     FROM reviews"
                ),
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?,
        };
        Ok(NullCount {
            count: count as u64,
            null_count: nulls as u64,
        })
    }

    fn content_stats(&self, run_id: Option<i64>) -> Result<ContentStats> {
        let conn = self.conn();
        let map = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(i64, i64, Option<f64>)> {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        };
        let (count, empty, avg) = match run_id {
            Some(id) => conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN r.content IS NULL OR r.content = '' THEN 1 ELSE 0 END), 0),
                        AVG(LENGTH(r.content))
                 FROM reviews r JOIN review_scrape_log rsl ON r.review_id = rsl.review_id
                 WHERE rsl.run_id = ?1",
                params![id],
                map,
            )?,
            None => conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN content IS NULL OR content = '' THEN 1 ELSE 0 END), 0),
                        AVG(LENGTH(content))
                 FROM reviews",
                [],
                map,
            )?,
        };
        Ok(ContentStats {
            count: count as u64,
            empty_count: empty as u64,
            avg_length: avg.unwrap_or(0.0),
        })
    }

    fn upsert_health_report(&self, report: &HealthReport) -> Result<()> {
        let m = &report.metrics;
        let dq = &report.data_quality;
        self.conn().execute(
            "INSERT OR REPLACE INTO ingestion_metrics (
                run_id, recorded_at, report_json,
                reviews_inserted, reviews_fetched, reviews_skipped,
                dedup_rate, error_rate, duration_seconds, ingestion_rate_per_min,
                apps_processed, apps_failed,
                app_version_null_rate, reply_content_null_rate, empty_content_rate,
                alerts_count
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                report.run_id,
                ts(Utc::now()),
                serde_json::to_string_pretty(report)?,
                m.reviews_inserted as i64,
                m.reviews_fetched as i64,
                m.reviews_skipped as i64,
                m.dedup_rate,
                m.error_rate,
                m.duration_seconds,
                m.ingestion_rate_per_min,
                m.apps_processed as i64,
                m.apps_failed as i64,
                dq.app_version_null_rate,
                dq.reply_content_null_rate,
                dq.empty_content_rate,
                report.alerts.len() as i64,
            ],
        )?;
        Ok(())
    }

    fn recent_health_reports(&self, limit: usize) -> Result<Vec<HealthReport>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT report_json FROM ingestion_metrics ORDER BY run_id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| row.get::<_, String>(0))?;
        let mut reports = Vec::new();
        for json in rows {
            reports.push(serde_json::from_str(&json?)?);
        }
        Ok(reports)
    }

    fn runs_missing_health_report(&self) -> Result<Vec<ClosedRun>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT sr.run_id, sr.started_at, sr.completed_at, sr.status,
                    sr.total_reviews_collected, sr.total_apps_processed, sr.error_message
             FROM scrape_runs sr
             LEFT JOIN ingestion_metrics im ON sr.run_id = im.run_id
             WHERE im.run_id IS NULL AND sr.completed_at IS NOT NULL
             ORDER BY sr.run_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<i64>>(4)?,
                row.get::<_, Option<i64>>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })?;
        let mut runs = Vec::new();
        for row in rows {
            let (run_id, started, completed, status, total, apps, error_message) = row?;
            runs.push(ClosedRun {
                run_id,
                started_at: started,
                completed_at: completed,
                status,
                total_inserted: total.unwrap_or(0).max(0) as u64,
                total_apps_processed: apps.unwrap_or(0).max(0) as u64,
                error_message,
            });
        }
        Ok(runs)
    }

    fn run_history(&self, limit: usize) -> Result<Vec<RunHistoryRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT run_id, started_at, completed_at, status, total_reviews_collected,
                    total_apps_processed, reviews_per_app, error_message
             FROM scrape_runs
             ORDER BY run_id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<i64>>(4)?,
                row.get::<_, Option<i64>>(5)?,
                row.get::<_, Option<i64>>(6)?,
                row.get::<_, Option<String>>(7)?,
            ))
        })?;
        let mut history = Vec::new();
        for row in rows {
            let (run_id, started, completed, status, total, apps, per_app, error_message) = row?;
            let (started_at, completed_at) =
                match parse_timestamp(&started).and_then(|s| Ok((s, parse_opt_ts(completed)?))) {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(run_id, "Leaving run #{} out of history: {}", run_id, e);
                        continue;
                    }
                };
            history.push(RunHistoryRow {
                run_id,
                started_at,
                completed_at,
                status,
                total_inserted: total.unwrap_or(0).max(0) as u64,
                total_apps_processed: apps.unwrap_or(0).max(0) as u64,
                reviews_per_app: per_app.unwrap_or(0).max(0) as u32,
                error_message,
            });
        }
        Ok(history)
    }

    fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn();
        let total_reviews: i64 = conn.query_row("SELECT COUNT(*) FROM reviews", [], |r| r.get(0))?;
        let total_apps: i64 = conn.query_row("SELECT COUNT(*) FROM apps", [], |r| r.get(0))?;
        let avg_rating: Option<f64> =
            conn.query_row("SELECT AVG(rating) FROM reviews", [], |r| r.get(0))?;
        let (earliest, latest): (Option<String>, Option<String>) = conn
            .query_row(
                "SELECT MIN(review_timestamp), MAX(review_timestamp) FROM reviews",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?
            .unwrap_or((None, None));
        let db_file_size_mb = self
            .path
            .as_ref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| (m.len() as f64 / 1024.0 / 1024.0 * 100.0).round() / 100.0);
        Ok(StoreStats {
            total_reviews: total_reviews as u64,
            total_apps: total_apps as u64,
            avg_rating: avg_rating.map(|r| (r * 100.0).round() / 100.0),
            earliest_review: earliest,
            latest_review: latest,
            db_file_size_mb,
        })
    }
}
