use super::rate_limiter::{Backoff, RateLimiter};
use crate::config::SourceConfig;
use crate::error::{IngestError, Result};
use crate::types::{AppInfo, FetchOptions, Review, ReviewSource};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("review-ingest/", env!("CARGO_PKG_VERSION"));

/// [`ReviewSource`] backed by a JSON HTTP service.
///
/// - `GET {base}/apps/{app_id}` returns an [`AppInfo`] (404 when unknown)
/// - `GET {base}/apps/{app_id}/reviews?count=&lang=&country=&sort=` returns a
///   JSON array of [`Review`]
pub struct HttpReviewSource {
    client: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
    backoff: Backoff,
    max_retries: u32,
}

impl HttpReviewSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::from_secs(config.min_delay_secs, config.max_delay_secs),
            backoff: Backoff::from_secs(config.retry_base_delay_secs, config.retry_max_delay_secs),
            max_retries: config.max_retries,
        })
    }

    /// GET with rate limiting and retries. `Ok(None)` on 404.
    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<Option<T>> {
        let mut attempt = 0u32;
        loop {
            self.limiter.acquire().await;
            debug!("GET {} (attempt {})", url, attempt + 1);

            let failure = match self.client.get(url).query(query).send().await {
                Ok(resp) if resp.status() == StatusCode::NOT_FOUND => return Ok(None),
                Ok(resp) if resp.status().is_success() => return Ok(Some(resp.json::<T>().await?)),
                Ok(resp) if is_retryable_status(resp.status()) => {
                    IngestError::Source {
                        message: format!("GET {} returned {}", url, resp.status()),
                    }
                }
                Ok(resp) => {
                    return Err(IngestError::Source {
                        message: format!("GET {} returned {}", url, resp.status()),
                    })
                }
                Err(e) if e.is_timeout() || e.is_connect() || e.is_request() => IngestError::Http(e),
                Err(e) => return Err(e.into()),
            };

            if attempt >= self.max_retries {
                return Err(failure);
            }
            let delay = self.backoff.delay(attempt);
            warn!(
                "{} (attempt {}/{}), retrying in {:.1}s",
                failure,
                attempt + 1,
                self.max_retries + 1,
                delay.as_secs_f64()
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl ReviewSource for HttpReviewSource {
    fn source_name(&self) -> &str {
        &self.base_url
    }

    async fn fetch_app_info(&self, app_id: &str) -> Result<Option<AppInfo>> {
        let url = format!("{}/apps/{}", self.base_url, app_id);
        self.get_json(&url, &[]).await
    }

    async fn fetch_reviews(&self, app_id: &str, options: &FetchOptions) -> Result<Vec<Review>> {
        let url = format!("{}/apps/{}/reviews", self.base_url, app_id);
        let query = [
            ("count", options.count.to_string()),
            ("lang", options.language.clone()),
            ("country", options.country.clone()),
            ("sort", options.sort_order.as_str().to_string()),
        ];
        let mut reviews: Vec<Review> = self
            .get_json(&url, &query)
            .await?
            .ok_or(IngestError::AppNotFound)?;

        for review in reviews.iter_mut().filter(|r| r.app_id.is_empty()) {
            review.app_id = app_id.to_string();
        }
        reviews.truncate(options.count as usize);
        Ok(reviews)
    }
}
