use crate::error::{IngestError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single store review as returned by the review source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub review_id: String,
    /// Filled in from the request when the source omits it.
    #[serde(default)]
    pub app_id: String,
    pub author: String,
    pub rating: u8,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub thumbs_up: u64,
    pub app_version: Option<String>,
    pub reply_content: Option<String>,
    pub reply_timestamp: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub scraped_at: DateTime<Utc>,
}

/// App metadata as returned by the review source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppInfo {
    pub app_id: String,
    pub title: String,
    #[serde(default)]
    pub developer: String,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub reviews_count: u64,
    #[serde(default)]
    pub installs: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default = "Utc::now")]
    pub scraped_at: DateTime<Utc>,
}

/// Order in which the source returns reviews.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    MostRelevant,
    #[default]
    Newest,
    Rating,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::MostRelevant => "most_relevant",
            SortOrder::Newest => "newest",
            SortOrder::Rating => "rating",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "most_relevant" => Ok(SortOrder::MostRelevant),
            "newest" => Ok(SortOrder::Newest),
            "rating" => Ok(SortOrder::Rating),
            other => Err(IngestError::Config(format!("unknown sort order '{other}'"))),
        }
    }
}

/// Parameters for one `fetch_reviews` call.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    pub count: u32,
    pub language: String,
    pub country: String,
    pub sort_order: SortOrder,
}

/// The review source the pipeline pulls from.
///
/// Rate limiting, retries and pagination live behind this trait; callers see
/// one request per operation.
#[async_trait::async_trait]
pub trait ReviewSource: Send + Sync {
    /// Human-readable name used in logs.
    fn source_name(&self) -> &str;

    /// Fetch app metadata. `Ok(None)` means the app does not exist.
    async fn fetch_app_info(&self, app_id: &str) -> Result<Option<AppInfo>>;

    /// Fetch up to `options.count` reviews for the app.
    async fn fetch_reviews(&self, app_id: &str, options: &FetchOptions) -> Result<Vec<Review>>;
}
