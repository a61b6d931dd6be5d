use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use dpreview_common::{ReviewBlock, ReviewSummary};

use super::parse_utils::{element_text, first, selector, url_from_style};
use super::{Diagnostic, Extracted, Stage};

const MIN_OVERVIEW_SUMMARY: usize = 100;
const MIN_REVIEW_INTRO: usize = 50;
/// Text on overview pages that belongs to site blog teasers, not the product.
const BLOG_PATTERNS: [&str; 4] = ["this month", "challenge", "share your", "photo adventures"];

fn selectors(list: &[&str]) -> Vec<Selector> {
    list.iter().map(|css| selector(css)).collect()
}

static OVERVIEW_SUMMARY: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selectors(&[
        "div.productDescription",
        "div.shortProductDescription",
        "div.productOverview p",
        "div.mainContent div.description",
        "div.leftColumn p",
    ])
});
static REVIEW_INTRO: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selectors(&[
        "div.article div.articleBody > p",
        "div.article p.intro",
        "div.article p",
    ])
});
static REVIEW_SCORE: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selectors(&["span.overallScore", "span.score", "div.score", "[data-score]"])
});
static PHOTO_THUMBNAILS: LazyLock<Selector> = LazyLock::new(|| selector("div.productShotThumbnail"));
static AFFILIATE_LINKS: LazyLock<Selector> =
    LazyLock::new(|| selector("a.amazonAffiliate[data-product-id]"));
static LINKS: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static GOOD_FOR: LazyLock<Selector> = LazyLock::new(|| selector("tr.suitability.goodFor div.text"));
static NOT_GOOD_FOR: LazyLock<Selector> =
    LazyLock::new(|| selector("tr.suitability.notGoodFor div.text"));
static CONCLUSION: LazyLock<Selector> = LazyLock::new(|| selector("tr.summary div.summary"));

static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));
static AMAZON_DP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/dp/([A-Z0-9]{10})").expect("valid regex"));
static ASIN_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]{10}$").expect("valid regex"));

#[derive(Debug, Clone, Default)]
pub struct ReviewOutcome {
    /// `None` exactly when no review document was retrieved. Overview
    /// summary, photos and marketplace ids only feed an existing review.
    pub block: Option<ReviewBlock>,
    /// Score from the review page; 0 when absent.
    pub score: u32,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn extract(overview: &Html, review: Option<&Html>) -> ReviewOutcome {
    let mut diagnostics = Vec::new();
    let Some(doc) = review else {
        diagnostics.push(Diagnostic::absent(Stage::Review, "ReviewData", "no review page"));
        return ReviewOutcome {
            block: None,
            score: 0,
            diagnostics,
        };
    };

    let executive_summary = executive_summary(overview, Some(doc)).take(&mut diagnostics);
    let product_photos = product_photos(overview).take(&mut diagnostics);
    let mut asin = marketplace_ids(overview);
    for id in marketplace_ids(doc) {
        if !asin.contains(&id) {
            asin.push(id);
        }
    }
    let score = score(doc).take(&mut diagnostics);
    let review_summary = review_summary(doc, &mut diagnostics);

    ReviewOutcome {
        block: Some(ReviewBlock {
            executive_summary,
            product_photos,
            review_summary,
            asin,
        }),
        score,
        diagnostics,
    }
}

/// Overview product description first, then the review intro paragraph.
pub fn executive_summary(overview: &Html, review: Option<&Html>) -> Extracted<String> {
    for sel in OVERVIEW_SUMMARY.iter() {
        for el in overview.select(sel) {
            let text = element_text(el);
            if text.chars().count() > MIN_OVERVIEW_SUMMARY && !looks_like_blog(&text) {
                return Extracted::found(text);
            }
        }
    }

    if let Some(doc) = review {
        for sel in REVIEW_INTRO.iter() {
            for el in doc.select(sel) {
                let text = element_text(el);
                if text.chars().count() > MIN_REVIEW_INTRO {
                    return Extracted::found(text);
                }
            }
        }
    }

    Extracted::missing(Diagnostic::absent(
        Stage::Review,
        "ExecutiveSummary",
        "div.productDescription | div.article p",
    ))
}

fn looks_like_blog(text: &str) -> bool {
    let lower = text.to_lowercase();
    BLOG_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Gallery thumbnails on the overview page, size segment removed, deduplicated.
pub fn product_photos(overview: &Html) -> Extracted<Vec<String>> {
    let mut photos: Vec<String> = Vec::new();
    for url in overview
        .select(&PHOTO_THUMBNAILS)
        .filter_map(|el| el.value().attr("style"))
        .filter_map(url_from_style)
    {
        if !photos.contains(&url) {
            photos.push(url);
        }
    }

    if photos.is_empty() {
        return Extracted::missing(Diagnostic::absent(
            Stage::Review,
            "ProductPhotos",
            "div.productShotThumbnail[style]",
        ));
    }
    Extracted::found(photos)
}

/// Amazon identifiers from affiliate widgets, then from plain `/dp/` links.
/// First-seen order, no duplicates.
pub fn marketplace_ids(doc: &Html) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    let mut push = |id: &str| {
        if ASIN_SHAPE.is_match(id) && !ids.iter().any(|known| known == id) {
            ids.push(id.to_string());
        }
    };

    for el in doc.select(&AFFILIATE_LINKS) {
        if let Some(id) = el.value().attr("data-product-id") {
            push(id.trim());
        }
    }
    for href in doc.select(&LINKS).filter_map(|el| el.value().attr("href")) {
        if !href.contains("amazon.") {
            continue;
        }
        if let Some(caps) = AMAZON_DP.captures(href) {
            push(&caps[1]);
        }
    }
    ids
}

/// First integer in a score element, or its `data-score` attribute.
pub fn score(doc: &Html) -> Extracted<u32> {
    for sel in REVIEW_SCORE.iter() {
        let Some(el) = first(doc, sel) else { continue };
        let raw = el
            .value()
            .attr("data-score")
            .map(str::to_string)
            .unwrap_or_else(|| element_text(el));
        if let Some(n) = DIGITS.find(&raw).and_then(|m| m.as_str().parse::<u32>().ok()) {
            return Extracted::found(n);
        }
    }
    Extracted::missing(Diagnostic::absent(
        Stage::Review,
        "ReviewScore",
        "span.overallScore | span.score | div.score | [data-score]",
    ))
}

fn review_summary(doc: &Html, diagnostics: &mut Vec<Diagnostic>) -> ReviewSummary {
    let mut part = |sel: &Selector, field: &'static str, css: &str| -> Option<String> {
        let text = first(doc, sel).map(element_text).filter(|t| !t.is_empty());
        if text.is_none() {
            diagnostics.push(Diagnostic::absent(Stage::Review, field, css));
        }
        text
    };

    ReviewSummary {
        good_for: part(&GOOD_FOR, "GoodFor", "tr.suitability.goodFor div.text"),
        not_so_good_for: part(&NOT_GOOD_FOR, "NotSoGoodFor", "tr.suitability.notGoodFor div.text"),
        conclusion: part(&CONCLUSION, "Conclusion", "tr.summary div.summary"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str) -> Html {
        Html::parse_document(&format!("<html><body>{body}</body></html>"))
    }

    const LONG: &str = "The X-T5 pairs a 40MP APS-C sensor with a classic dial-based body, \
        making it one of the most capable stills cameras in its class.";

    #[test]
    fn no_review_and_no_overview_content_is_null_block() {
        let out = extract(&doc("<h1>Camera</h1>"), None);
        assert!(out.block.is_none());
        assert_eq!(out.score, 0);
    }

    #[test]
    fn overview_content_without_review_is_still_null_block() {
        let overview = doc(&format!(
            r#"<div class="productDescription">{LONG}</div>
               <div class="productShotThumbnail" style="background-image:url(https://img/shots/1.jpg)"></div>
               <a class="amazonAffiliate" data-product-id="B0BK1TJRQX">Buy</a>"#
        ));
        let out = extract(&overview, None);
        assert!(out.block.is_none());
        assert_eq!(out.score, 0);
    }

    #[test]
    fn overview_content_feeds_an_existing_review() {
        let overview = doc(&format!(
            r#"<div class="productDescription">{LONG}</div>
               <a class="amazonAffiliate" data-product-id="B0BK1TJRQX">Buy</a>"#
        ));
        let review = doc(r#"<div class="article"><p>short</p></div>"#);
        let block = extract(&overview, Some(&review)).block.unwrap();
        assert_eq!(block.executive_summary, LONG);
        assert_eq!(block.asin, vec!["B0BK1TJRQX"]);
        assert!(block.review_summary.is_empty());
    }

    #[test]
    fn blog_teasers_are_not_summaries() {
        let teaser = "Share your best shots in this month's challenge! Our readers' photo adventures \
            continue with another round of submissions from around the world.";
        let overview = doc(&format!(r#"<div class="productDescription">{teaser}</div>"#));
        let review = doc(&format!(r#"<div class="article"><p>{LONG}</p></div>"#));
        assert_eq!(executive_summary(&overview, Some(&review)).value, LONG);
        assert_eq!(executive_summary(&overview, None).value, "");
    }

    #[test]
    fn review_page_fields() {
        let review = doc(
            r#"<div class="article"><span class="overallScore">Score 88%</span>
               <table>
                 <tr class="suitability goodFor"><td><div class="text">Landscape shooters</div></td></tr>
                 <tr class="summary"><td><div class="summary">Excellent all-rounder.</div></td></tr>
               </table>
               <a href="https://www.amazon.com/dp/B0BK1TJRQX?tag=x">Amazon</a>
               <a href="https://www.amazon.com/gp/product/B0BK1TJRQX/dp/B09JZT6YK5">Amazon</a>
               </div>"#,
        );
        let out = extract(&doc(""), Some(&review));
        assert_eq!(out.score, 88);
        let block = out.block.unwrap();
        assert_eq!(block.review_summary.good_for.as_deref(), Some("Landscape shooters"));
        assert_eq!(block.review_summary.not_so_good_for, None);
        assert_eq!(block.review_summary.conclusion.as_deref(), Some("Excellent all-rounder."));
        assert_eq!(block.asin, vec!["B0BK1TJRQX", "B09JZT6YK5"]);
    }

    #[test]
    fn score_prefers_data_attribute() {
        assert_eq!(score(&doc(r#"<div data-score="74">seventy-four</div>"#)).value, 74);
        assert_eq!(score(&doc("<p>none</p>")).value, 0);
    }

    #[test]
    fn photos_are_deduplicated() {
        let overview = doc(
            r#"<div class="productShotThumbnail" style="background-image:url(https://img/TS80x80~shots/1.jpg)"></div>
               <div class="productShotThumbnail" style="background-image:url(https://img/shots/1.jpg)"></div>
               <div class="productShotThumbnail" style="background-image:url(https://img/shots/2.jpg)"></div>"#,
        );
        assert_eq!(
            product_photos(&overview).value,
            vec!["https://img/shots/1.jpg", "https://img/shots/2.jpg"]
        );
    }
}
