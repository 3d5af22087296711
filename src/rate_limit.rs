use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::Settings;

/// Process-wide gate enforcing a minimum spacing between consecutive
/// outbound portal requests, across all search modes.
///
/// The lock is held across the whole check-sleep-stamp sequence, so two
/// racing callers can never both decide they owe no delay.
#[derive(Debug)]
pub struct RateLimiter {
    delay: Duration,
    enabled: bool,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            enabled: true,
            last_request: Mutex::new(None),
        }
    }

    pub fn disabled() -> Self {
        Self {
            delay: Duration::ZERO,
            enabled: false,
            last_request: Mutex::new(None),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        if settings.rate_limit_enabled {
            Self::new(settings.rate_limit_delay)
        } else {
            Self::disabled()
        }
    }

    /// Blocks until at least the configured delay has elapsed since the last
    /// granted acquisition, then records the new last-request time. The very
    /// first acquisition proceeds immediately.
    pub async fn acquire(&self) {
        if !self.enabled {
            return;
        }
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.delay {
                let wait = self.delay - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "rate limit delay before request");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_acquire_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_acquires_are_spaced_by_delay() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(1));

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_limiter_never_waits() {
        let limiter = RateLimiter::disabled();
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn spacing_is_measured_start_to_start() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        limiter.acquire().await;

        // Partial elapsed time counts toward the spacing requirement.
        tokio::time::sleep(Duration::from_millis(600)).await;
        let start = Instant::now();
        limiter.acquire().await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(400));
        assert!(waited < Duration::from_millis(600));
    }
}
