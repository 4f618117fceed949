// src/fetch/mod.rs

//! Rate-limited, retrying HTTP fetching.
//!
//! The sync engine talks to the [`Fetcher`] and [`BulkFetcher`] traits only;
//! [`RetryingFetcher`] is the production implementation. Fetch failures are
//! data, not errors: a fetcher call always yields one [`FetchOutcome`] so
//! callers can record failures per URL and keep going.

pub mod bulk;
pub mod rate_limit;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::FetchConfig;
use crate::utils::url::host_of;

pub use bulk::{BulkFetcher, CooperativeFetcher, WorkerPoolFetcher, build_backend};
pub use rate_limit::RateLimiter;

/// Backoff ceiling. Retries never wait longer than this.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// One outcome per fetch call, success or failure.
pub type FetchOutcome = std::result::Result<FetchResponse, FetchFailure>;

/// A fetched page body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub url: String,
    pub status: u16,
    pub body: String,

    /// Attempts spent, including the successful one
    pub attempts: u32,
}

/// A fetch that exhausted its retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub url: String,

    /// Last observed HTTP status, absent for transport-level failures
    pub status: Option<u16>,

    pub attempts: u32,
    pub error: String,
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "GET {} failed after {} attempts: {}",
            self.url, self.attempts, self.error
        )
    }
}

/// Single-URL fetch capability.
///
/// Implementations carry their own rate limiting, retries, and any
/// authentication state; callers just ask for a URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchOutcome;
}

/// Retry and backoff parameters.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before retry n is `base_delay * 2^n`
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Backoff before retrying after failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

/// Production fetcher: per-host rate gate, per-attempt timeout, exponential
/// backoff on timeout, transport error, or HTTP status >= 400.
pub struct RetryingFetcher {
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl RetryingFetcher {
    /// Build a fetcher from config. Client construction failures surface
    /// before any request is made.
    pub fn from_config(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self::with_limiter(
            client,
            Arc::new(RateLimiter::per_second(config.requests_per_second)),
            RetryPolicy {
                max_retries: config.max_retries,
                base_delay: Duration::from_millis(config.retry_base_ms),
            },
        ))
    }

    /// Build from an existing client, e.g. one carrying session cookies.
    pub fn with_limiter(
        client: reqwest::Client,
        limiter: Arc<RateLimiter>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            client,
            limiter,
            policy,
        }
    }

    async fn attempt(&self, url: &str) -> std::result::Result<(u16, String), (Option<u16>, String)> {
        match self.client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                let code = status.as_u16();
                if status.is_client_error() || status.is_server_error() {
                    return Err((Some(code), format!("HTTP status {code}")));
                }
                match response.text().await {
                    Ok(body) => Ok((code, body)),
                    Err(e) => Err((Some(code), e.to_string())),
                }
            }
            Err(e) => Err((e.status().map(|s| s.as_u16()), e.to_string())),
        }
    }
}

#[async_trait]
impl Fetcher for RetryingFetcher {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let host = host_of(url).unwrap_or_else(|| url.to_string());
        let total_attempts = self.policy.max_retries + 1;
        let mut last_status = None;
        let mut last_error = String::new();

        for attempt in 0..total_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.policy.delay_for(attempt - 1)).await;
            }
            self.limiter.acquire(&host).await;

            match self.attempt(url).await {
                Ok((status, body)) => {
                    return Ok(FetchResponse {
                        url: url.to_string(),
                        status,
                        body,
                        attempts: attempt + 1,
                    });
                }
                Err((status, error)) => {
                    log::debug!(
                        "attempt {}/{} for {} failed: {}",
                        attempt + 1,
                        total_attempts,
                        url,
                        error
                    );
                    last_status = status.or(last_status);
                    last_error = error;
                }
            }
        }

        Err(FetchFailure {
            url: url.to_string(),
            status: last_status,
            attempts: total_attempts,
            error: last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            max_retries: 40,
            base_delay: Duration::from_secs(1),
        };
        assert_eq!(policy.delay_for(10), MAX_BACKOFF);
        // huge attempt indices must not overflow
        assert_eq!(policy.delay_for(u32::MAX), MAX_BACKOFF);
    }

    #[test]
    fn test_failure_display_mentions_attempts() {
        let failure = FetchFailure {
            url: "https://example.com/p2".to_string(),
            status: Some(503),
            attempts: 4,
            error: "HTTP status 503".to_string(),
        };
        let text = failure.to_string();
        assert!(text.contains("https://example.com/p2"));
        assert!(text.contains("4 attempts"));
    }
}
