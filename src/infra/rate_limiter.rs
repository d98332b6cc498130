use rand::Rng;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Spaces consecutive requests by a random delay drawn from
/// `[min_delay, max_delay]`, measured from the previous request.
#[derive(Debug)]
pub struct RateLimiter {
    min_delay: Duration,
    max_delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay: max_delay.max(min_delay),
            last_request: Mutex::new(None),
        }
    }

    pub fn from_secs(min_secs: f64, max_secs: f64) -> Self {
        Self::new(
            Duration::from_secs_f64(min_secs.max(0.0)),
            Duration::from_secs_f64(max_secs.max(0.0)),
        )
    }

    fn next_gap(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        let secs = rand::thread_rng().gen_range(self.min_delay.as_secs_f64()..=self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// Wait until this request may go out. The first request never waits.
    pub async fn acquire(&self) {
        let gap = self.next_gap();
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + gap;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Exponential retry delay: `base * 2^attempt`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn from_secs(base_secs: f64, max_secs: f64) -> Self {
        Self {
            base: Duration::from_secs_f64(base_secs.max(0.0)),
            max: Duration::from_secs_f64(max_secs.max(0.0)),
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2f64.powi(attempt.min(30) as i32);
        Duration::from_secs_f64(self.base.as_secs_f64() * factor).min(self.max)
    }
}
