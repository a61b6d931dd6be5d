//! Archive reference resolution.
//!
//! Looks up an existing snapshot of a detail page and, when allowed, asks the
//! snapshot service to capture one. Every failure is soft: the caller gets
//! `None` and the record's archive field stays null.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use wayback_client::WaybackError;

use dpreview_common::SnapshotStrategy;

use crate::rate_limiter::RateLimiter;
use crate::traits::SnapshotService;

pub struct ArchiveResolver {
    service: Arc<dyn SnapshotService>,
    limiter: Arc<RateLimiter>,
    strategy: SnapshotStrategy,
    save_interval: Duration,
    /// Earliest instant the next capture request may be sent.
    next_capture: Mutex<Option<Instant>>,
}

impl ArchiveResolver {
    pub fn new(
        service: Arc<dyn SnapshotService>,
        limiter: Arc<RateLimiter>,
        strategy: SnapshotStrategy,
        save_interval: Duration,
    ) -> Self {
        Self {
            service,
            limiter,
            strategy,
            save_interval,
            next_capture: Mutex::new(None),
        }
    }

    pub fn strategy(&self) -> &SnapshotStrategy {
        &self.strategy
    }

    /// Snapshot URL for `url`, capturing one when none exists and
    /// `create_if_missing` is set.
    pub async fn resolve(&self, url: &str, create_if_missing: bool) -> Option<String> {
        self.limiter.acquire().await;
        match self.service.lookup(url, self.strategy.timestamp()).await {
            Ok(Some(snapshot)) => {
                debug!(url, snapshot = %snapshot, strategy = %self.strategy, "Found existing snapshot");
                return Some(snapshot);
            }
            Ok(None) => debug!(url, "No existing snapshot"),
            Err(e) => log_failure("lookup", url, &e),
        }

        if !create_if_missing {
            return None;
        }

        self.wait_for_capture_slot().await;
        self.limiter.acquire().await;
        match self.service.capture(url).await {
            Ok(snapshot) => {
                info!(url, snapshot = %snapshot, "Created snapshot");
                Some(snapshot)
            }
            Err(e) => {
                log_failure("capture", url, &e);
                None
            }
        }
    }

    /// Reserve the next capture slot, then sleep until it opens. The lock is
    /// released before sleeping.
    async fn wait_for_capture_slot(&self) {
        let wait_until = {
            let mut next = self.next_capture.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(at) if at > now => at,
                _ => now,
            };
            *next = Some(slot + self.save_interval);
            slot
        };
        if wait_until > Instant::now() {
            debug!(wait_ms = (wait_until - Instant::now()).as_millis() as u64, "Spacing snapshot capture");
            tokio::time::sleep_until(wait_until).await;
        }
    }
}

fn log_failure(operation: &str, url: &str, error: &anyhow::Error) {
    if matches!(error.downcast_ref::<WaybackError>(), Some(WaybackError::RateLimited)) {
        warn!(url, operation, "Snapshot service rate limited the request");
    } else {
        warn!(url, operation, error = %error, "Snapshot request failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fast_limiter, MockSnapshots};

    const PAGE: &str = "https://www.dpreview.com/products/fujifilm/slrs/fujifilm_xt5";

    fn resolver(mock: Arc<MockSnapshots>, strategy: SnapshotStrategy) -> ArchiveResolver {
        ArchiveResolver::new(mock, fast_limiter(), strategy, Duration::from_secs(5))
    }

    #[tokio::test(start_paused = true)]
    async fn existing_snapshot_wins() {
        let mock = Arc::new(MockSnapshots::new().with_snapshot(PAGE, "https://web.archive.org/web/2023/x"));
        let out = resolver(mock.clone(), SnapshotStrategy::Latest).resolve(PAGE, true).await;
        assert_eq!(out.as_deref(), Some("https://web.archive.org/web/2023/x"));
        assert_eq!(mock.capture_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn strategy_timestamp_is_forwarded() {
        let mock = Arc::new(MockSnapshots::new());
        resolver(mock.clone(), SnapshotStrategy::Earliest).resolve(PAGE, false).await;
        resolver(mock.clone(), SnapshotStrategy::ClosestTo("20230115".into()))
            .resolve(PAGE, false)
            .await;
        assert_eq!(
            mock.lookups(),
            vec![
                (PAGE.to_string(), Some("19960101".to_string())),
                (PAGE.to_string(), Some("20230115".to_string())),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_snapshot_without_create_is_none() {
        let mock = Arc::new(MockSnapshots::new());
        let out = resolver(mock.clone(), SnapshotStrategy::Latest).resolve(PAGE, false).await;
        assert_eq!(out, None);
        assert_eq!(mock.capture_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn capture_on_miss_and_failures_are_soft() {
        let mock = Arc::new(MockSnapshots::new().capture_result("https://web.archive.org/web/new/x"));
        let out = resolver(mock.clone(), SnapshotStrategy::Latest).resolve(PAGE, true).await;
        assert_eq!(out.as_deref(), Some("https://web.archive.org/web/new/x"));

        let failing = Arc::new(MockSnapshots::new().failing());
        assert_eq!(
            resolver(failing.clone(), SnapshotStrategy::Latest).resolve(PAGE, true).await,
            None
        );
        assert_eq!(failing.capture_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn captures_are_spaced() {
        let mock = Arc::new(MockSnapshots::new().capture_result("https://web.archive.org/web/new/x"));
        let resolver = resolver(mock.clone(), SnapshotStrategy::Latest);

        let start = Instant::now();
        for _ in 0..3 {
            resolver.resolve(PAGE, true).await;
        }
        assert!(start.elapsed() >= Duration::from_secs(10));
        assert_eq!(mock.capture_count(), 3);
    }
}
