pub mod error;
pub mod types;

pub use error::{Result, WaybackError};
pub use types::{AvailabilityResponse, Snapshot};

use std::time::Duration;

const AVAILABILITY_URL: &str = "https://archive.org/wayback/available";
const SAVE_URL: &str = "https://web.archive.org/save";

pub struct WaybackClient {
    client: reqwest::Client,
    availability_url: String,
    save_url: String,
}

impl WaybackClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_endpoints(AVAILABILITY_URL, SAVE_URL, timeout)
    }

    /// Point the client at alternative endpoints (mirrors, local stubs).
    pub fn with_endpoints(availability_url: &str, save_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WaybackError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            availability_url: availability_url.to_string(),
            save_url: save_url.trim_end_matches('/').to_string(),
        })
    }

    /// Look up the capture closest to `timestamp` (`YYYYMMDD[hhmmss]`), or the
    /// most recent capture when no timestamp is given.
    pub async fn available(&self, url: &str, timestamp: Option<&str>) -> Result<Option<Snapshot>> {
        let mut query = vec![("url", url)];
        if let Some(ts) = timestamp {
            query.push(("timestamp", ts));
        }

        let resp = self
            .client
            .get(&self.availability_url)
            .query(&query)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(WaybackError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(WaybackError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        let parsed: AvailabilityResponse = serde_json::from_str(&body)?;
        let snapshot = parsed.into_snapshot();
        tracing::debug!(url, found = snapshot.is_some(), "Wayback availability checked");
        Ok(snapshot)
    }

    /// Ask the Wayback Machine to capture `url` now. Returns the snapshot URL
    /// the save endpoint redirects to.
    pub async fn save(&self, url: &str) -> Result<String> {
        let endpoint = format!("{}/{}", self.save_url, url);
        tracing::info!(url, "Requesting Wayback capture");

        let resp = self.client.get(&endpoint).send().await?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(WaybackError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(WaybackError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(resp.url().to_string())
    }
}
