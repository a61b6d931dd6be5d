pub mod error;

pub use error::{BrowserlessError, Result};

use std::time::Duration;

use serde::Serialize;

/// Navigation readiness event passed to Browserless as `gotoOptions.waitUntil`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
    Load,
    #[serde(rename = "domcontentloaded")]
    DomContentLoaded,
    #[serde(rename = "networkidle0")]
    NetworkIdle,
}

/// Options for a single `/content` render.
#[derive(Debug, Clone)]
pub struct ContentOptions {
    pub wait_until: WaitUntil,
    /// CSS selector to wait for before the DOM is captured.
    pub wait_for_selector: Option<String>,
    pub selector_timeout: Duration,
    pub navigation_timeout: Duration,
}

impl Default for ContentOptions {
    fn default() -> Self {
        Self {
            wait_until: WaitUntil::NetworkIdle,
            wait_for_selector: None,
            selector_timeout: Duration::from_secs(10),
            navigation_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentBody<'a> {
    url: &'a str,
    goto_options: GotoOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    wait_for_selector: Option<WaitForSelector<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GotoOptions {
    wait_until: WaitUntil,
    timeout: u64,
}

#[derive(Serialize)]
struct WaitForSelector<'a> {
    selector: &'a str,
    timeout: u64,
}

pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BrowserlessError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        })
    }

    /// Fetch fully-rendered HTML content for a URL via Browserless /content endpoint.
    pub async fn content(&self, url: &str, options: &ContentOptions) -> Result<String> {
        let mut endpoint = format!("{}/content", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }

        let body = ContentBody {
            url,
            goto_options: GotoOptions {
                wait_until: options.wait_until,
                timeout: options.navigation_timeout.as_millis() as u64,
            },
            wait_for_selector: options.wait_for_selector.as_deref().map(|selector| {
                WaitForSelector {
                    selector,
                    timeout: options.selector_timeout.as_millis() as u64,
                }
            }),
        };

        tracing::debug!(url, selector = ?options.wait_for_selector, "Browserless content request");

        let resp = self
            .client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_serializes_browserless_field_names() {
        let body = ContentBody {
            url: "https://example.com",
            goto_options: GotoOptions {
                wait_until: WaitUntil::NetworkIdle,
                timeout: 30_000,
            },
            wait_for_selector: Some(WaitForSelector {
                selector: "div.article",
                timeout: 10_000,
            }),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["gotoOptions"]["waitUntil"], "networkidle0");
        assert_eq!(json["waitForSelector"]["selector"], "div.article");
        assert_eq!(json["waitForSelector"]["timeout"], 10_000);
    }

    #[test]
    fn selector_is_omitted_when_unset() {
        let body = ContentBody {
            url: "https://example.com",
            goto_options: GotoOptions {
                wait_until: WaitUntil::Load,
                timeout: 1,
            },
            wait_for_selector: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("waitForSelector").is_none());
        assert_eq!(json["gotoOptions"]["waitUntil"], "load");
    }
}
