pub mod http_client;
pub mod rate_limiter;

pub use http_client::HttpReviewSource;
pub use rate_limiter::{Backoff, RateLimiter};
