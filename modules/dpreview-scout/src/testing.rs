// Test mocks for the crawl pipeline.
//
// Three mocks matching the three trait boundaries:
// - MockFetcher (PageFetcher): HashMap-based URL→document, scripted failures
// - MockSnapshots (SnapshotService): URL→snapshot table plus capture result
// - MemorySink (RecordSink): in-memory record list, per-id write failures
//
// Plus `fixtures`: small inline HTML documents shaped like the real pages.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use wayback_client::WaybackError;

use dpreview_common::NormalizedRecord;

use crate::fetch::{FetchError, WaitConditions};
use crate::rate_limiter::RateLimiter;
use crate::traits::{PageFetcher, RecordSink, SnapshotService};

/// Limiter generous enough that tests never wait on it.
pub fn fast_limiter() -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(60_000))
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// HashMap-based page fetcher. Unregistered URLs fail permanently.
/// Builder pattern: `.on_page()`, `.fail_times()`, `.fail_permanently()`, `.with_delay()`.
#[derive(Default)]
pub struct MockFetcher {
    pages: HashMap<String, String>,
    permanent_failures: HashSet<String>,
    transient_failures: Mutex<HashMap<String, u32>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    /// The first `times` fetches of `url` fail transiently.
    pub fn fail_times(self, url: &str, times: u32) -> Self {
        self.transient_failures
            .lock()
            .unwrap()
            .insert(url.to_string(), times);
        self
    }

    pub fn fail_permanently(mut self, url: &str) -> Self {
        self.permanent_failures.insert(url.to_string());
        self
    }

    /// Every fetch sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every URL requested, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &str, _wait: &WaitConditions) -> Result<String, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut failures = self.transient_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(url) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(FetchError::Transient {
                        url: url.to_string(),
                        message: "MockFetcher: scripted transient failure".to_string(),
                    });
                }
            }
        }

        if self.permanent_failures.contains(url) {
            return Err(FetchError::Permanent {
                url: url.to_string(),
                message: "MockFetcher: scripted permanent failure".to_string(),
            });
        }

        self.pages.get(url).cloned().ok_or_else(|| FetchError::Permanent {
            url: url.to_string(),
            message: "MockFetcher: no page registered".to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// MockSnapshots
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockSnapshots {
    snapshots: HashMap<String, String>,
    capture: Option<String>,
    failing: bool,
    rate_limited: bool,
    lookups: Mutex<Vec<(String, Option<String>)>>,
    captures: Mutex<Vec<String>>,
}

impl MockSnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(mut self, url: &str, snapshot: &str) -> Self {
        self.snapshots.insert(url.to_string(), snapshot.to_string());
        self
    }

    /// Snapshot URL returned by every capture request.
    pub fn capture_result(mut self, snapshot: &str) -> Self {
        self.capture = Some(snapshot.to_string());
        self
    }

    /// Every lookup and capture errors.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Every capture is refused with a rate-limit error.
    pub fn rate_limited(mut self) -> Self {
        self.rate_limited = true;
        self
    }

    pub fn lookups(&self) -> Vec<(String, Option<String>)> {
        self.lookups.lock().unwrap().clone()
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.lock().unwrap().len()
    }

    pub fn capture_count(&self) -> usize {
        self.captures.lock().unwrap().len()
    }
}

#[async_trait]
impl SnapshotService for MockSnapshots {
    async fn lookup(&self, url: &str, timestamp: Option<&str>) -> Result<Option<String>> {
        self.lookups
            .lock()
            .unwrap()
            .push((url.to_string(), timestamp.map(str::to_string)));
        if self.failing {
            bail!("MockSnapshots: lookup failed for {url}");
        }
        Ok(self.snapshots.get(url).cloned())
    }

    async fn capture(&self, url: &str) -> Result<String> {
        self.captures.lock().unwrap().push(url.to_string());
        if self.rate_limited {
            return Err(WaybackError::RateLimited.into());
        }
        if self.failing {
            bail!("MockSnapshots: capture failed for {url}");
        }
        match &self.capture {
            Some(snapshot) => Ok(snapshot.clone()),
            None => bail!("MockSnapshots: no capture configured"),
        }
    }
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

/// In-memory sink. Writing an existing product code replaces the record.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<NormalizedRecord>>,
    fail_on: HashSet<String>,
    attempts: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes for this product code fail.
    pub fn fail_on(mut self, product_code: &str) -> Self {
        self.fail_on.insert(product_code.to_string());
        self
    }

    pub fn records(&self) -> Vec<NormalizedRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn record(&self, product_code: &str) -> Option<NormalizedRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.product_code == product_code)
            .cloned()
    }

    /// Product codes of every write attempt, including failed ones.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn write(&self, record: NormalizedRecord) -> Result<()> {
        self.attempts.lock().unwrap().push(record.product_code.clone());
        if self.fail_on.contains(&record.product_code) {
            bail!("MemorySink: write refused for {}", record.product_code);
        }
        let mut records = self.records.lock().unwrap();
        records.retain(|r| r.product_code != record.product_code);
        records.push(record);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub mod fixtures {
    use super::MockFetcher;

    pub const BASE_URL: &str = "https://www.dpreview.com";
    pub const LISTING_URL: &str = "https://www.dpreview.com/products/cameras/all?view=list";

    fn brand(id: &str) -> &str {
        id.split('_').next().unwrap_or(id)
    }

    pub fn detail_url(id: &str) -> String {
        format!("{BASE_URL}/products/{}/slrs/{id}", brand(id))
    }

    pub fn specs_url(id: &str) -> String {
        format!("{}/specifications", detail_url(id))
    }

    pub fn review_url(id: &str) -> String {
        format!("{BASE_URL}/reviews/{id}-review")
    }

    // --- Listing ---

    #[derive(Debug, Clone)]
    pub struct ListingRow {
        pub id: String,
        pub name: String,
        pub announced: Option<String>,
    }

    impl ListingRow {
        pub fn new(id: &str, name: &str, announced: Option<&str>) -> Self {
            Self {
                id: id.to_string(),
                name: name.to_string(),
                announced: announced.map(str::to_string),
            }
        }
    }

    pub fn listing_page(rows: &[ListingRow], has_next: bool) -> String {
        let next = if has_next {
            r#"<link rel="next" href="?view=list&page=next">"#
        } else {
            ""
        };
        let body: String = rows
            .iter()
            .map(|row| {
                let href = format!("/products/{}/slrs/{}", brand(&row.id), row.id);
                let date = row
                    .announced
                    .as_ref()
                    .map(|d| format!(r#"<div class="announcementDate">Announced {d}</div>"#))
                    .unwrap_or_default();
                format!(
                    r#"<tr class="product" id="product_{id}">
                      <td class="product"><div class="productImage"><a href="{href}">
                        <img src="https://1.img-dpreview.com/files/p/TS100x100~products/{id}/thumb.jpeg"></a></div></td>
                      <td class="info"><div class="name"><a href="{href}">{name}</a></div>{date}</td>
                    </tr>"#,
                    id = row.id,
                    name = row.name,
                )
            })
            .collect();
        format!(
            r#"<html><head>{next}</head><body>
               <table class="productList"><tbody>{body}</tbody></table>
               </body></html>"#
        )
    }

    // --- Overview ---

    #[derive(Debug, Clone)]
    pub struct Overview {
        pub name: String,
        pub image_url: Option<String>,
        pub award: Option<String>,
        pub short_specs: Vec<String>,
        pub summary: Option<String>,
        pub photos: Vec<String>,
        pub asin: Option<String>,
        pub review_link: Option<String>,
        pub announced: Option<String>,
    }

    impl Default for Overview {
        fn default() -> Self {
            Self {
                name: "Fujifilm X-T5".to_string(),
                image_url: Some("https://1.img-dpreview.com/files/p/TS560x560~products/fujifilm_xt5/main.jpeg".to_string()),
                award: Some("gold".to_string()),
                short_specs: vec!["40 megapixels".to_string(), "APS-C sensor".to_string()],
                summary: Some(
                    "The Fujifilm X-T5 is a 40MP APS-C mirrorless camera with a classic \
                     dial-led design, in-body stabilization and 6.2K video capture."
                        .to_string(),
                ),
                photos: vec![
                    "https://1.img-dpreview.com/files/p/TS80x80~products/fujifilm_xt5/shots/1.jpeg".to_string(),
                    "https://1.img-dpreview.com/files/p/TS80x80~products/fujifilm_xt5/shots/2.jpeg".to_string(),
                ],
                asin: Some("B0BK1TJRQX".to_string()),
                review_link: Some("/reviews/fujifilm-x-t5-review".to_string()),
                announced: Some("Nov 2, 2022".to_string()),
            }
        }
    }

    pub fn overview_page(o: &Overview) -> String {
        let image = o
            .image_url
            .as_ref()
            .map(|src| format!(r#"<div class="productImage"><img src="{src}"></div>"#))
            .unwrap_or_default();
        let badge = o
            .award
            .as_ref()
            .map(|a| format!(r#"<div class="productBadgeAndScore {a}"></div>"#))
            .unwrap_or_default();
        let quick: String = o
            .short_specs
            .iter()
            .enumerate()
            .map(|(i, v)| format!(r#"<tr><th class="label">Spec {i}</th><td class="value">{v}</td></tr>"#))
            .collect();
        let summary = o
            .summary
            .as_ref()
            .map(|s| format!(r#"<div class="productDescription">{s}</div>"#))
            .unwrap_or_default();
        let photos: String = o
            .photos
            .iter()
            .map(|p| format!(r#"<div class="productShotThumbnail" style="background-image:url('{p}')"></div>"#))
            .collect();
        let asin = o
            .asin
            .as_ref()
            .map(|a| format!(r#"<a class="amazonAffiliate" data-product-id="{a}" href="https://www.amazon.com/dp/{a}">Buy</a>"#))
            .unwrap_or_default();
        let review = o
            .review_link
            .as_ref()
            .map(|href| format!(r#"<a class="actionButtonLink" href="{href}">Read review</a>"#))
            .unwrap_or_default();
        let announced = o
            .announced
            .as_ref()
            .map(|d| format!(r#"<p class="dates"><span class="greyLabel">Announced</span> {d} • Current model</p>"#))
            .unwrap_or_default();

        format!(
            r#"<html><body>
              <h1>{name} Overview</h1>
              <div class="mainContent">{image}{badge}{summary}{photos}{announced}{asin}{review}</div>
              <div class="rightColumn quickSpecs"><table>{quick}</table></div>
            </body></html>"#,
            name = o.name,
        )
    }

    // --- Specifications ---

    pub fn default_spec_rows() -> Vec<(&'static str, &'static str)> {
        vec![
            ("Body type", "SLR-style mirrorless"),
            ("Effective pixels", "40 megapixels"),
            ("Sensor size", "APS-C (23.5 x 15.6 mm)"),
            ("ISO", "Auto, 125-12800 (expands to 64-51200)"),
            ("Autofocus", "Contrast Detect (sensor), Phase Detect, Multi-area"),
            ("Lens mount", "Fujifilm X"),
            ("Dimensions", "130 x 91 x 64 mm (5.12 x 3.58 x 2.52″)"),
            ("Weight (inc. batteries)", "557 g (1.23 lb / 19.65 oz)"),
        ]
    }

    pub fn specs_page(rows: &[(&str, &str)]) -> String {
        let body: String = rows
            .iter()
            .map(|(label, value)| {
                format!(r#"<tr><th class="label">{label}</th><td class="value">{value}</td></tr>"#)
            })
            .collect();
        format!(
            r#"<html><body><table class="specsTable compact"><tbody>{body}</tbody></table></body></html>"#
        )
    }

    // --- Review ---

    #[derive(Debug, Clone)]
    pub struct Review {
        pub score: u32,
        pub intro: String,
        pub good_for: Option<String>,
        pub not_so_good_for: Option<String>,
        pub conclusion: Option<String>,
    }

    impl Default for Review {
        fn default() -> Self {
            Self {
                score: 90,
                intro: "Fujifilm's X-T5 returns to the photo-first design of the X-T line with a higher resolution sensor.".to_string(),
                good_for: Some("Enthusiasts wanting resolution".to_string()),
                not_so_good_for: Some("Video-first shooters".to_string()),
                conclusion: Some("A superb stills camera.".to_string()),
            }
        }
    }

    pub fn review_page(r: &Review) -> String {
        let row = |class: &str, inner: &str, text: &Option<String>| {
            text.as_ref()
                .map(|t| format!(r#"<tr class="{class}"><td><div class="{inner}">{t}</div></td></tr>"#))
                .unwrap_or_default()
        };
        format!(
            r#"<html><body><div class="article">
              <div class="articleBody"><p>{intro}</p></div>
              <span class="overallScore">{score}%</span>
              <table class="scoring">{good}{bad}{summary}</table>
            </div></body></html>"#,
            intro = r.intro,
            score = r.score,
            good = row("suitability goodFor", "text", &r.good_for),
            bad = row("suitability notGoodFor", "text", &r.not_so_good_for),
            summary = row("summary", "summary", &r.conclusion),
        )
    }

    /// Register overview, specifications and (optionally) review pages for
    /// one entity. Without a review the overview keeps its summary, photos
    /// and marketplace link but has no review link.
    pub fn with_entity(mock: MockFetcher, id: &str, name: &str, with_review: bool) -> MockFetcher {
        let overview = Overview {
            name: name.to_string(),
            review_link: with_review.then(|| format!("/reviews/{id}-review")),
            ..Overview::default()
        };
        let mock = mock
            .on_page(&detail_url(id), &overview_page(&overview))
            .on_page(&specs_url(id), &specs_page(&default_spec_rows()));
        if with_review {
            mock.on_page(&review_url(id), &review_page(&Review::default()))
        } else {
            mock
        }
    }
}
