// Trait seams for the crawl core.
//
// PageFetcher: rendered document content for a URL (Browserless in production).
// SnapshotService: timestamped archive lookups and capture requests (Wayback).
// RecordSink: durable output of finished records (YAML directory).
//
// The orchestrator only sees these traits, so the whole pipeline runs against
// MockFetcher / MockSnapshots / MemorySink in tests: no network, no browser.

use anyhow::Result;
use async_trait::async_trait;

use dpreview_common::NormalizedRecord;

use crate::fetch::{FetchError, WaitConditions};

// ---------------------------------------------------------------------------
// PageFetcher
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Navigate to `url` and return the rendered document once `wait` is satisfied.
    async fn fetch(&self, url: &str, wait: &WaitConditions) -> std::result::Result<String, FetchError>;
}

// ---------------------------------------------------------------------------
// SnapshotService
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SnapshotService: Send + Sync {
    /// Existing snapshot URL closest to `timestamp` (newest when `None`).
    async fn lookup(&self, url: &str, timestamp: Option<&str>) -> Result<Option<String>>;

    /// Request a fresh capture; returns the new snapshot URL.
    async fn capture(&self, url: &str) -> Result<String>;
}

#[async_trait]
impl SnapshotService for wayback_client::WaybackClient {
    async fn lookup(&self, url: &str, timestamp: Option<&str>) -> Result<Option<String>> {
        Ok(self.available(url, timestamp).await?.map(|snapshot| snapshot.url))
    }

    async fn capture(&self, url: &str) -> Result<String> {
        Ok(self.save(url).await?)
    }
}

// ---------------------------------------------------------------------------
// RecordSink
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Persist one record. Must be idempotent per product code: writing the
    /// same entity twice overwrites.
    async fn write(&self, record: NormalizedRecord) -> Result<()>;
}
