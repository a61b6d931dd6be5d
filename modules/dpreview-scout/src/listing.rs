//! Paginated listing walk.
//!
//! [`ListEnumerator`] fetches listing pages lazily (one page per refill of its
//! buffer), applies the announcement-date cutoff and the optional count limit,
//! and stops when pagination runs dry. Every page fetch goes through the
//! shared paced fetcher, so it consumes rate-limit tokens like detail fetches.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, LazyLock};

use chrono::NaiveDate;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, error, info, warn};

use dpreview_common::EntitySummary;

use crate::extract::parse_utils::{absolutize, element_text, first, first_in, selector};
use crate::fetch::{WaitConditions, LISTING_READY};
use crate::traits::PageFetcher;

static PRODUCT_ROWS: LazyLock<Selector> = LazyLock::new(|| selector("tr.product"));
static NAME_LINK: LazyLock<Selector> = LazyLock::new(|| selector("td.info div.name a"));
static THUMBNAIL: LazyLock<Selector> =
    LazyLock::new(|| selector("td.product div.productImage a img"));
static ANNOUNCED: LazyLock<Selector> = LazyLock::new(|| selector("td.info div.announcementDate"));
static NEXT_PAGE: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"link[rel="next"], a[rel="next"]"#));
static ANNOUNCED_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^announced:?\s*").expect("valid regex"));

// ---------------------------------------------------------------------------
// Page parsing
// ---------------------------------------------------------------------------

/// Entities and pagination state read off one listing page.
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub entries: Vec<EntitySummary>,
    pub has_next: bool,
}

pub fn parse_listing_page(html: &str, base_url: &str) -> ListingPage {
    let doc = Html::parse_document(html);

    let entries = doc
        .select(&PRODUCT_ROWS)
        .filter_map(|row| {
            let link = first_in(row, &NAME_LINK)?;
            let href = link.value().attr("href").unwrap_or_default();
            let url = absolutize(base_url, href);

            let id = row
                .value()
                .id()
                .and_then(|id| id.strip_prefix("product_"))
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .or_else(|| slug_from_url(&url))?;

            let announced_text = first_in(row, &ANNOUNCED)
                .map(element_text)
                .map(|t| ANNOUNCED_PREFIX.replace(&t, "").trim().to_string())
                .filter(|t| !t.is_empty());

            Some(EntitySummary {
                id,
                name: element_text(link),
                url,
                announced: announced_text.as_deref().and_then(parse_announced),
                announced_text,
                thumbnail_url: first_in(row, &THUMBNAIL)
                    .and_then(|img| img.value().attr("src"))
                    .map(|src| absolutize(base_url, src))
                    .unwrap_or_default(),
            })
        })
        .collect();

    ListingPage {
        entries,
        has_next: first(&doc, &NEXT_PAGE).is_some(),
    }
}

fn slug_from_url(url: &str) -> Option<String> {
    url.split(['?', '#'])
        .next()?
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty() && !s.contains(':'))
        .map(str::to_string)
}

/// Parse listing date text. Month-only forms resolve to the first of the month.
pub fn parse_announced(raw: &str) -> Option<NaiveDate> {
    let text = ANNOUNCED_PREFIX.replace(raw.trim(), "");
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    for fmt in ["%Y-%m-%d", "%b %d, %Y", "%B %d, %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return Some(date);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{text}-01"), "%Y-%m-%d") {
        return Some(date);
    }
    for fmt in ["%d %b %Y", "%d %B %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(&format!("1 {text}"), fmt) {
            return Some(date);
        }
    }
    None
}

/// URL of listing page `page` (1-based). Page 1 is the listing URL itself.
pub fn page_url(listing_url: &str, page: u32) -> String {
    if page <= 1 {
        return listing_url.to_string();
    }
    match url::Url::parse(listing_url) {
        Ok(mut url) => {
            let pairs: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(k, _)| k != "page")
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            url.query_pairs_mut()
                .clear()
                .extend_pairs(pairs)
                .append_pair("page", &page.to_string());
            url.to_string()
        }
        Err(_) => {
            let sep = if listing_url.contains('?') { '&' } else { '?' };
            format!("{listing_url}{sep}page={page}")
        }
    }
}

// ---------------------------------------------------------------------------
// Date filter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Include,
    /// No usable date; kept and logged.
    IncludeUndated,
    Exclude,
}

/// Inclusive lower bound on announcement date. Undated entities pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateFilter {
    cutoff: Option<NaiveDate>,
}

impl DateFilter {
    pub fn new(cutoff: Option<NaiveDate>) -> Self {
        Self { cutoff }
    }

    pub fn cutoff(&self) -> Option<NaiveDate> {
        self.cutoff
    }

    pub fn decide(&self, entity: &EntitySummary) -> FilterDecision {
        let Some(cutoff) = self.cutoff else {
            return FilterDecision::Include;
        };
        match entity.announced {
            Some(date) if date >= cutoff => FilterDecision::Include,
            Some(_) => FilterDecision::Exclude,
            None => FilterDecision::IncludeUndated,
        }
    }
}

// ---------------------------------------------------------------------------
// ListEnumerator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingStats {
    pub pages_fetched: usize,
    pub filtered_by_date: usize,
    pub undated_included: usize,
    pub page_errors: usize,
}

pub struct ListEnumerator {
    fetcher: Arc<dyn PageFetcher>,
    listing_url: String,
    base_url: String,
    filter: DateFilter,
    limit: Option<usize>,

    page: u32,
    buffer: VecDeque<EntitySummary>,
    seen: HashSet<String>,
    yielded: usize,
    exhausted: bool,
    stats: ListingStats,
}

impl ListEnumerator {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        listing_url: impl Into<String>,
        base_url: impl Into<String>,
        filter: DateFilter,
        limit: Option<usize>,
    ) -> Self {
        Self {
            fetcher,
            listing_url: listing_url.into(),
            base_url: base_url.into(),
            filter,
            limit,
            page: 0,
            buffer: VecDeque::new(),
            seen: HashSet::new(),
            yielded: 0,
            exhausted: false,
            stats: ListingStats::default(),
        }
    }

    /// Next entity passing the filter, fetching listing pages as needed.
    /// `None` once pagination is exhausted or the limit is reached.
    pub async fn next(&mut self) -> Option<EntitySummary> {
        loop {
            if self.limit.is_some_and(|limit| self.yielded >= limit) {
                return None;
            }
            if let Some(entity) = self.buffer.pop_front() {
                self.yielded += 1;
                return Some(entity);
            }
            if self.exhausted {
                return None;
            }
            self.fetch_next_page().await;
        }
    }

    /// Drain the sequence into a vector.
    pub async fn collect_all(&mut self) -> Vec<EntitySummary> {
        let mut out = Vec::new();
        while let Some(entity) = self.next().await {
            out.push(entity);
        }
        out
    }

    /// Start again from page 1 with fresh counters.
    pub fn restart(&mut self) {
        self.page = 0;
        self.buffer.clear();
        self.seen.clear();
        self.yielded = 0;
        self.exhausted = false;
        self.stats = ListingStats::default();
    }

    pub fn stats(&self) -> &ListingStats {
        &self.stats
    }

    async fn fetch_next_page(&mut self) {
        self.page += 1;
        let url = page_url(&self.listing_url, self.page);
        debug!(page = self.page, url = %url, "Fetching listing page");

        let html = match self
            .fetcher
            .fetch(&url, &WaitConditions::selector(LISTING_READY))
            .await
        {
            Ok(html) => html,
            Err(e) => {
                error!(page = self.page, url = %url, error = %e, "Listing page fetch failed, ending enumeration");
                self.stats.page_errors += 1;
                self.exhausted = true;
                return;
            }
        };
        self.stats.pages_fetched += 1;

        let page = parse_listing_page(&html, &self.base_url);
        let mut new_entities = 0;
        for entity in page.entries {
            if !self.seen.insert(entity.id.clone()) {
                continue;
            }
            new_entities += 1;
            match self.filter.decide(&entity) {
                FilterDecision::Include => self.buffer.push_back(entity),
                FilterDecision::IncludeUndated => {
                    warn!(
                        product_code = %entity.id,
                        announced = entity.announced_text.as_deref().unwrap_or(""),
                        "No usable announcement date, including despite cutoff"
                    );
                    self.stats.undated_included += 1;
                    self.buffer.push_back(entity);
                }
                FilterDecision::Exclude => {
                    debug!(product_code = %entity.id, announced = ?entity.announced, "Before cutoff, excluded");
                    self.stats.filtered_by_date += 1;
                }
            }
        }

        info!(
            page = self.page,
            new_entities,
            queued = self.buffer.len(),
            has_next = page.has_next,
            "Listing page parsed"
        );

        if new_entities == 0 || !page.has_next {
            self.exhausted = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockFetcher};

    const LISTING: &str = "https://www.dpreview.com/products/cameras/all?view=list";
    const BASE: &str = "https://www.dpreview.com";

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn date_formats() {
        assert_eq!(parse_announced("2023-03-01"), date(2023, 3, 1));
        assert_eq!(parse_announced("Announced Nov 2, 2022"), date(2022, 11, 2));
        assert_eq!(parse_announced("September 12, 2024"), date(2024, 9, 12));
        assert_eq!(parse_announced("2021-07"), date(2021, 7, 1));
        assert_eq!(parse_announced("Feb 2020"), date(2020, 2, 1));
        assert_eq!(parse_announced("Announced: March 2019"), date(2019, 3, 1));
        assert_eq!(parse_announced("Coming soon"), None);
        assert_eq!(parse_announced(""), None);
    }

    #[test]
    fn page_urls_carry_page_param() {
        assert_eq!(page_url(LISTING, 1), LISTING);
        assert_eq!(
            page_url(LISTING, 3),
            "https://www.dpreview.com/products/cameras/all?view=list&page=3"
        );
        assert_eq!(
            page_url("https://x.com/list?page=2&view=list", 4),
            "https://x.com/list?view=list&page=4"
        );
    }

    #[test]
    fn rows_parse_into_summaries() {
        let html = fixtures::listing_page(
            &[
                fixtures::ListingRow::new("canon_eosr5", "Canon EOS R5", Some("Jul 9, 2020")),
                fixtures::ListingRow::new("nikon_z8", "Nikon Z8", None),
            ],
            true,
        );
        let page = parse_listing_page(&html, BASE);
        assert!(page.has_next);
        assert_eq!(page.entries.len(), 2);

        let r5 = &page.entries[0];
        assert_eq!(r5.id, "canon_eosr5");
        assert_eq!(r5.name, "Canon EOS R5");
        assert_eq!(r5.url, "https://www.dpreview.com/products/canon/slrs/canon_eosr5");
        assert_eq!(r5.announced, date(2020, 7, 9));
        assert!(r5.thumbnail_url.starts_with("https://"));
        assert_eq!(page.entries[1].announced, None);
    }

    #[test]
    fn id_falls_back_to_url_slug() {
        let html = r#"<table><tr class="product"><td class="info"><div class="name">
            <a href="/products/sony/slrs/sony_a7iv/">Sony a7 IV</a></div></td></tr></table>"#;
        let page = parse_listing_page(html, BASE);
        assert_eq!(page.entries[0].id, "sony_a7iv");
        assert!(!page.has_next);
    }

    #[test]
    fn cutoff_is_inclusive_and_fails_open() {
        let filter = DateFilter::new(date(2023, 3, 1));
        let entity = |announced| EntitySummary {
            id: "x".into(),
            name: "x".into(),
            url: "x".into(),
            announced,
            announced_text: None,
            thumbnail_url: String::new(),
        };
        assert_eq!(filter.decide(&entity(date(2023, 2, 28))), FilterDecision::Exclude);
        assert_eq!(filter.decide(&entity(date(2023, 3, 1))), FilterDecision::Include);
        assert_eq!(filter.decide(&entity(date(2024, 1, 1))), FilterDecision::Include);
        assert_eq!(filter.decide(&entity(None)), FilterDecision::IncludeUndated);
        assert_eq!(DateFilter::new(None).decide(&entity(date(1999, 1, 1))), FilterDecision::Include);
    }

    fn two_page_mock() -> Arc<MockFetcher> {
        let page1 = fixtures::listing_page(
            &[
                fixtures::ListingRow::new("d1", "Old", Some("Jan 5, 2023")),
                fixtures::ListingRow::new("d2", "Cutoff", Some("Mar 1, 2023")),
            ],
            true,
        );
        let page2 = fixtures::listing_page(
            &[
                fixtures::ListingRow::new("d3", "New", Some("2024-06-01")),
                fixtures::ListingRow::new("d4", "Undated", None),
            ],
            false,
        );
        Arc::new(
            MockFetcher::new()
                .on_page(LISTING, &page1)
                .on_page(&page_url(LISTING, 2), &page2),
        )
    }

    #[tokio::test]
    async fn enumeration_applies_cutoff_across_pages() {
        let mock = two_page_mock();
        let mut list = ListEnumerator::new(mock.clone(), LISTING, BASE, DateFilter::new(date(2023, 3, 1)), None);
        let ids: Vec<String> = list.collect_all().await.into_iter().map(|e| e.id).collect();

        assert_eq!(ids, vec!["d2", "d3", "d4"]);
        assert_eq!(list.stats().filtered_by_date, 1);
        assert_eq!(list.stats().undated_included, 1);
        assert_eq!(list.stats().pages_fetched, 2);
        // No third page requested: page 2 had no next link.
        assert_eq!(mock.calls().len(), 2);
    }

    #[tokio::test]
    async fn limit_stops_before_next_page() {
        let mock = two_page_mock();
        let mut list = ListEnumerator::new(mock.clone(), LISTING, BASE, DateFilter::default(), Some(2));
        assert_eq!(list.collect_all().await.len(), 2);
        assert_eq!(mock.calls().len(), 1);
    }

    #[tokio::test]
    async fn repeated_page_ends_enumeration() {
        let page = fixtures::listing_page(&[fixtures::ListingRow::new("a", "A", None)], true);
        let mock = Arc::new(
            MockFetcher::new()
                .on_page(LISTING, &page)
                .on_page(&page_url(LISTING, 2), &page),
        );
        let mut list = ListEnumerator::new(mock.clone(), LISTING, BASE, DateFilter::default(), None);
        assert_eq!(list.collect_all().await.len(), 1);
        assert_eq!(mock.calls().len(), 2);
    }

    #[tokio::test]
    async fn page_error_ends_enumeration_and_restart_replays() {
        let page = fixtures::listing_page(&[fixtures::ListingRow::new("a", "A", None)], true);
        let mock = Arc::new(MockFetcher::new().on_page(LISTING, &page));
        let mut list = ListEnumerator::new(mock.clone(), LISTING, BASE, DateFilter::default(), None);

        assert_eq!(list.collect_all().await.len(), 1);
        assert_eq!(list.stats().page_errors, 1);

        list.restart();
        assert_eq!(list.next().await.map(|e| e.id).as_deref(), Some("a"));
    }
}
