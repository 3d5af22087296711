use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use tracing::warn;

use crate::config::{Settings, REQUEST_TIMEOUT};
use crate::rate_limit::RateLimiter;

/// The portal rejects obviously non-browser clients.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("request failed with status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl HttpError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            HttpError::Status(code) => Some(*code),
            HttpError::Transport(err) => err.status().map(|status| status.as_u16()),
        }
    }
}

/// Decoded body and status of a successful portal fetch.
#[derive(Debug, Clone)]
pub struct PortalResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
    pub backoff: f64,
}

impl RetryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            attempts: settings.retry_attempts,
            delay: settings.retry_delay,
            backoff: settings.retry_backoff,
        }
    }

    /// Deterministic delay * backoff^attempt schedule; randomization is off
    /// so sleeps follow the configured sequence exactly.
    fn schedule(&self) -> backoff::ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.delay)
            .with_multiplier(self.backoff)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Rate-limited, retrying HTTP client over a shared reqwest session.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(settings: &Settings, limiter: Arc<RateLimiter>) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            limiter,
            retry: RetryPolicy::from_settings(settings),
        })
    }

    pub async fn get(&self, url: &str) -> Result<PortalResponse, HttpError> {
        retry_with_policy(&self.retry, self.limiter.as_ref(), || {
            self.perform(self.client.get(url))
        })
        .await
    }

    pub async fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
    ) -> Result<PortalResponse, HttpError> {
        retry_with_policy(&self.retry, self.limiter.as_ref(), || {
            self.perform(self.client.post(url).form(form))
        })
        .await
    }

    async fn perform(&self, request: reqwest::RequestBuilder) -> Result<PortalResponse, HttpError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status(status.as_u16()));
        }
        // text() honors the declared charset and falls back to UTF-8 when
        // the portal omits one.
        let body = response.text().await?;
        Ok(PortalResponse {
            status: status.as_u16(),
            body,
        })
    }
}

/// Runs `op` up to `policy.attempts` times, gating every attempt on the rate
/// limiter and sleeping the exponential schedule between failures. The final
/// failure is surfaced unchanged; every `request()`-level call gets a fresh
/// attempt budget.
pub(crate) async fn retry_with_policy<T, F, Fut>(
    policy: &RetryPolicy,
    limiter: &RateLimiter,
    op: F,
) -> Result<T, HttpError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, HttpError>>,
{
    let max_attempts = policy.attempts.max(1);
    let attempts = AtomicU32::new(0);
    retry(policy.schedule(), || {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let request = op();
        async move {
            limiter.acquire().await;
            match request.await {
                Ok(value) => Ok(value),
                Err(err) if attempt >= max_attempts => Err(backoff::Error::permanent(err)),
                Err(err) => {
                    warn!(attempt, max_attempts, error = %err, "request failed, retrying");
                    Err(backoff::Error::transient(err))
                }
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            delay: Duration::from_millis(200),
            backoff: 2.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures_with_growing_backoff() {
        let limiter = RateLimiter::disabled();
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = retry_with_policy(&policy(3), &limiter, || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(HttpError::Status(503))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Slept 200ms then 400ms between the three attempts.
        assert!(start.elapsed() >= Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_configured_attempts() {
        let limiter = RateLimiter::disabled();
        let calls = AtomicU32::new(0);

        let result: Result<(), HttpError> = retry_with_policy(&policy(3), &limiter, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(HttpError::Status(500)) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.unwrap_err().status_code(), Some(500));
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_first_attempt_does_not_retry() {
        let limiter = RateLimiter::disabled();
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = retry_with_policy(&policy(3), &limiter, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok("body") }
        })
        .await;

        assert_eq!(result.unwrap(), "body");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn every_attempt_passes_through_the_rate_limiter() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let _: Result<(), HttpError> = retry_with_policy(&policy(2), &limiter, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(HttpError::Status(502)) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // Second attempt waited on the limiter in addition to the backoff.
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[test]
    fn status_code_is_preserved() {
        assert_eq!(HttpError::Status(404).status_code(), Some(404));
    }
}
