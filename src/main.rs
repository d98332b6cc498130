use anyhow::Context;
use clap::{Parser, Subcommand};
use review_ingest::config::IngestConfig;
use review_ingest::infra::HttpReviewSource;
use review_ingest::monitor::HealthMonitor;
use review_ingest::pipeline::IngestionPipeline;
use review_ingest::scheduler::Scheduler;
use review_ingest::storage::{ReviewStore, SqliteStore};
use review_ingest::types::ReviewSource;
use review_ingest::{constants, logging, metrics, reporter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "review-ingest")]
#[command(about = "Scheduled app review ingestion with health monitoring")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (default: review_ingest.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path, overriding the config
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run ingestion cycles on a schedule
    Run {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
        /// Seconds between cycles
        #[arg(long)]
        interval: Option<u64>,
        /// Target apps (comma-separated), replacing the configured list
        #[arg(long)]
        apps: Option<String>,
        /// Reviews to fetch per app
        #[arg(long)]
        count: Option<u32>,
    },
    /// Show the most recent runs
    History {
        #[arg(long, default_value_t = constants::DEFAULT_HISTORY_LIMIT)]
        limit: usize,
    },
    /// Show current database stats
    Stats,
    /// Show the latest health report
    Health,
    /// Show a summary of the last N health reports
    HealthHistory {
        #[arg(default_value_t = constants::DEFAULT_HISTORY_LIMIT)]
        n: usize,
    },
    /// Build health reports for historical runs that have none
    BackfillMetrics,
}

fn parse_app_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = IngestConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(db) = cli.database {
        config.database_path = db;
    }

    let _log_guard = logging::init_logging(&config.logging);
    metrics::init_metrics();

    let store: Arc<dyn ReviewStore> = Arc::new(
        SqliteStore::open(&config.database_path)
            .with_context(|| format!("opening database {}", config.database_path.display()))?,
    );
    let monitor = HealthMonitor::new(store.clone(), config.monitor.clone())
        .with_span(tracing::info_span!("monitor"));

    match cli.command {
        Commands::Run {
            once,
            interval,
            apps,
            count,
        } => {
            if let Some(apps) = apps {
                config.target_apps = parse_app_list(&apps);
            }
            if let Some(interval) = interval {
                config.interval_seconds = interval;
            }
            if let Some(count) = count {
                config.reviews_per_app = count;
            }
            config.validate()?;

            let source: Arc<dyn ReviewSource> = Arc::new(HttpReviewSource::new(&config.source)?);
            info!(
                source = source.source_name(),
                database = %config.database_path.display(),
                "Starting ingestion"
            );

            let pipeline = IngestionPipeline::new(source, store.clone(), config.fetch_options())
                .with_span(tracing::info_span!("pipeline"));
            let mut scheduler = Scheduler::new(
                pipeline,
                monitor,
                store,
                config.target_apps.clone(),
                Duration::from_secs(config.interval_seconds),
            )
            .one_shot(once)
            .with_span(tracing::info_span!("scheduler"));

            scheduler.start().await;
        }
        Commands::History { limit } => {
            let rows = store.run_history(limit)?;
            println!("{}", reporter::format_run_history(&rows));
        }
        Commands::Stats => {
            let stats = store.stats()?;
            println!("{}", reporter::format_db_stats(&stats));
        }
        Commands::Health => {
            let reports = monitor.get_recent_health_reports(1)?;
            match reports.first() {
                Some(report) => println!("{}", reporter::format_health_report(report)),
                None => println!("\n  No health reports available yet.\n"),
            }
        }
        Commands::HealthHistory { n } => {
            let reports = monitor.get_recent_health_reports(n)?;
            println!("{}", reporter::format_health_summary(&reports));
        }
        Commands::BackfillMetrics => {
            println!("\n  Backfilling health metrics for historical runs...\n");
            let backfilled = monitor.backfill_metrics()?;
            println!("\n  Backfilled {} runs.\n", backfilled);
        }
    }

    Ok(())
}
