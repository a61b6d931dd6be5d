// Page fetching: the Browserless-backed fetcher plus the paced wrapper every
// call site goes through (rate limit token per attempt, timeout, retry of
// transient failures with exponential backoff).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use browserless_client::{BrowserlessClient, BrowserlessError, ContentOptions};
use rand::Rng;
use thiserror::Error;
use tracing::{info, warn};

use crate::rate_limiter::RateLimiter;
use crate::traits::PageFetcher;

/// Selector the listing page renders its product rows into.
pub const LISTING_READY: &str = "tr.product";
/// Overview pages are usable once the quick-specs table exists.
pub const OVERVIEW_READY: &str = "div.rightColumn.quickSpecs table";
pub const SPECS_READY: &str = "table.specsTable.compact";
pub const REVIEW_READY: &str = "div.article";

/// What the fetcher should wait for before capturing the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitConditions {
    pub selector: Option<String>,
}

impl WaitConditions {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn selector(selector: &str) -> Self {
        Self {
            selector: Some(selector.to_string()),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Worth retrying: network trouble, rate limiting, server errors.
    #[error("transient fetch failure for {url}: {message}")]
    Transient { url: String, message: String },

    /// Retrying will not help, e.g. the page does not exist.
    #[error("permanent fetch failure for {url}: {message}")]
    Permanent { url: String, message: String },

    #[error("fetch timed out after {}s: {url}", .after.as_secs_f64())]
    Timeout { url: String, after: Duration },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. } | FetchError::Timeout { .. })
    }

    pub fn url(&self) -> &str {
        match self {
            FetchError::Transient { url, .. }
            | FetchError::Permanent { url, .. }
            | FetchError::Timeout { url, .. } => url,
        }
    }
}

// ---------------------------------------------------------------------------
// BrowserlessFetcher
// ---------------------------------------------------------------------------

pub struct BrowserlessFetcher {
    client: BrowserlessClient,
    navigation_timeout: Duration,
}

impl BrowserlessFetcher {
    pub fn new(
        base_url: &str,
        token: Option<&str>,
        timeout: Duration,
    ) -> browserless_client::Result<Self> {
        info!(base_url, "BrowserlessFetcher initialized");
        Ok(Self {
            client: BrowserlessClient::new(base_url, token, timeout)?,
            navigation_timeout: timeout,
        })
    }
}

#[async_trait]
impl PageFetcher for BrowserlessFetcher {
    async fn fetch(&self, url: &str, wait: &WaitConditions) -> Result<String, FetchError> {
        info!(url, fetcher = "browserless", "Fetching page");

        let options = ContentOptions {
            wait_for_selector: wait.selector.clone(),
            navigation_timeout: self.navigation_timeout,
            ..ContentOptions::default()
        };

        let html = self.client.content(url, &options).await.map_err(|e| match e {
            BrowserlessError::Timeout(_) => FetchError::Timeout {
                url: url.to_string(),
                after: self.navigation_timeout,
            },
            other if other.is_transient() => FetchError::Transient {
                url: url.to_string(),
                message: other.to_string(),
            },
            other => FetchError::Permanent {
                url: url.to_string(),
                message: other.to_string(),
            },
        })?;

        if html.trim().is_empty() {
            warn!(url, fetcher = "browserless", "Empty HTML response");
            return Err(FetchError::Transient {
                url: url.to_string(),
                message: "empty document".to_string(),
            });
        }

        info!(url, fetcher = "browserless", bytes = html.len(), "Fetched successfully");
        Ok(html)
    }
}

// ---------------------------------------------------------------------------
// PacedFetcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Backoff before retry `n` (0-based) is `base_delay * 3^n` plus up to 1s jitter.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let jitter = Duration::from_millis(rand::rng().random_range(0..1000));
        self.base_delay
            .saturating_mul(3u32.saturating_pow(attempt))
            .saturating_add(jitter)
    }
}

/// Wraps a fetcher so that every attempt consumes a rate-limit token and is
/// bounded by a timeout. Transient failures are retried; permanent ones are not.
pub struct PacedFetcher {
    inner: Arc<dyn PageFetcher>,
    limiter: Arc<RateLimiter>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl PacedFetcher {
    pub fn new(
        inner: Arc<dyn PageFetcher>,
        limiter: Arc<RateLimiter>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            inner,
            limiter,
            timeout,
            retry,
        }
    }
}

#[async_trait]
impl PageFetcher for PacedFetcher {
    async fn fetch(&self, url: &str, wait: &WaitConditions) -> Result<String, FetchError> {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 0;
        loop {
            self.limiter.acquire().await;

            let result = match tokio::time::timeout(self.timeout, self.inner.fetch(url, wait)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout {
                    url: url.to_string(),
                    after: self.timeout,
                }),
            };

            match result {
                Ok(html) => return Ok(html),
                Err(e) if e.is_transient() && attempt + 1 < attempts => {
                    let backoff = self.retry.backoff(attempt);
                    warn!(
                        url,
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Transient fetch failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockFetcher;

    fn paced(mock: Arc<MockFetcher>, attempts: u32) -> PacedFetcher {
        PacedFetcher::new(
            mock,
            Arc::new(RateLimiter::new(6000)),
            Duration::from_secs(30),
            RetryPolicy {
                attempts,
                base_delay: Duration::from_millis(10),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let mock = Arc::new(
            MockFetcher::new()
                .on_page("https://x/a", "<html>ok</html>")
                .fail_times("https://x/a", 2),
        );
        let fetcher = paced(mock.clone(), 3);
        let html = fetcher.fetch("https://x/a", &WaitConditions::none()).await.unwrap();
        assert_eq!(html, "<html>ok</html>");
        assert_eq!(mock.call_count("https://x/a"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_stop_after_attempt_budget() {
        let mock = Arc::new(
            MockFetcher::new()
                .on_page("https://x/a", "<html>ok</html>")
                .fail_times("https://x/a", 5),
        );
        let fetcher = paced(mock.clone(), 3);
        let err = fetcher.fetch("https://x/a", &WaitConditions::none()).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(mock.call_count("https://x/a"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failures_are_not_retried() {
        let mock = Arc::new(MockFetcher::new());
        let fetcher = paced(mock.clone(), 3);
        let err = fetcher.fetch("https://x/missing", &WaitConditions::none()).await.unwrap_err();
        assert!(matches!(err, FetchError::Permanent { .. }));
        assert_eq!(mock.call_count("https://x/missing"), 1);
    }

    #[test]
    fn backoff_saturates_for_large_attempt_counts() {
        let policy = RetryPolicy {
            attempts: 100,
            base_delay: Duration::from_secs(2),
        };
        assert!(policy.backoff(0) >= Duration::from_secs(2));
        assert!(policy.backoff(0) < Duration::from_secs(3));
        assert!(policy.backoff(25) >= policy.backoff(20));
        let cap = Duration::from_secs(2).saturating_mul(u32::MAX);
        let late = policy.backoff(99);
        assert!(late >= cap && late < cap + Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_times_out() {
        let mock = Arc::new(
            MockFetcher::new()
                .on_page("https://x/slow", "<html/>")
                .with_delay(Duration::from_secs(60)),
        );
        let fetcher = paced(mock.clone(), 1);
        let err = fetcher.fetch("https://x/slow", &WaitConditions::none()).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }));
    }
}
