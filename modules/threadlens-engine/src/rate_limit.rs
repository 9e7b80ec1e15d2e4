use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Minimum-spacing limiter for one external source, shared process-wide.
///
/// The slot is held across the sleep, so concurrent callers serialize: each
/// one is released at least `min_interval` after the previous release,
/// whichever job it belongs to.
pub struct RateLimiter {
    min_interval: Duration,
    last_release: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_release: Mutex::new(None),
        }
    }

    /// Block until the spacing requirement is satisfied.
    pub async fn acquire(&self) {
        let mut last = self.last_release.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_call_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(2));
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_calls_are_spaced() {
        let limiter = RateLimiter::new(Duration::from_secs(2));
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_serialize() {
        use std::sync::Arc;

        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(1)));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Three callers through a 1s limiter: at least 2s total.
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_interval_means_no_wait() {
        let limiter = RateLimiter::new(Duration::from_secs(2));
        limiter.acquire().await;
        sleep(Duration::from_secs(3)).await;
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
