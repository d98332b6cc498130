use crate::constants;
use crate::error::{IngestError, Result};
use crate::monitor::Thresholds;
use crate::types::{FetchOptions, SortOrder};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Top-level configuration for the ingestion service.
///
/// Every field has a default, so an empty TOML file (or none at all) is a
/// valid configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub target_apps: Vec<String>,
    pub reviews_per_app: u32,
    pub language: String,
    pub country: String,
    pub sort_order: SortOrder,
    pub interval_seconds: u64,
    pub database_path: PathBuf,
    pub source: SourceConfig,
    pub monitor: MonitorConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub min_delay_secs: f64,
    pub max_delay_secs: f64,
    pub max_retries: u32,
    pub retry_base_delay_secs: f64,
    pub retry_max_delay_secs: f64,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub lookback_window: usize,
    pub thresholds: Thresholds,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: PathBuf,
    pub file_name: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            target_apps: constants::DEFAULT_TARGET_APPS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            reviews_per_app: constants::DEFAULT_REVIEWS_PER_APP,
            language: constants::DEFAULT_LANGUAGE.to_string(),
            country: constants::DEFAULT_COUNTRY.to_string(),
            sort_order: SortOrder::Newest,
            interval_seconds: constants::DEFAULT_INTERVAL_SECONDS,
            database_path: PathBuf::from(constants::DEFAULT_DATABASE_PATH),
            source: SourceConfig::default(),
            monitor: MonitorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: constants::DEFAULT_SOURCE_URL.to_string(),
            min_delay_secs: constants::MIN_DELAY_SECS,
            max_delay_secs: constants::MAX_DELAY_SECS,
            max_retries: constants::MAX_RETRIES,
            retry_base_delay_secs: constants::RETRY_BASE_DELAY_SECS,
            retry_max_delay_secs: constants::RETRY_MAX_DELAY_SECS,
            timeout_seconds: constants::REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            lookback_window: constants::LOOKBACK_WINDOW,
            thresholds: Thresholds::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(constants::LOG_DIR),
            file_name: constants::LOG_FILE.to_string(),
        }
    }
}

impl SourceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl IngestConfig {
    /// Load configuration from `path`, or from `review_ingest.toml` in the
    /// working directory when present, falling back to defaults. Environment
    /// overrides (after `.env`) are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = Path::new(constants::DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            IngestError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: IngestConfig = toml::from_str(content)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(db) = std::env::var("REVIEW_INGEST_DB") {
            if !db.trim().is_empty() {
                self.database_path = PathBuf::from(db);
            }
        }
        if let Ok(url) = std::env::var("REVIEW_INGEST_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.base_url = url;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_apps.is_empty() {
            return Err(IngestError::Config("target_apps must not be empty".into()));
        }
        if self.source.min_delay_secs < 0.0 || self.source.max_delay_secs < self.source.min_delay_secs {
            return Err(IngestError::Config(format!(
                "invalid source delay range [{}, {}]",
                self.source.min_delay_secs, self.source.max_delay_secs
            )));
        }
        if self.monitor.lookback_window == 0 {
            return Err(IngestError::Config("monitor.lookback_window must be at least 1".into()));
        }
        Ok(())
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            count: self.reviews_per_app,
            language: self.language.clone(),
            country: self.country.clone(),
            sort_order: self.sort_order,
        }
    }
}
