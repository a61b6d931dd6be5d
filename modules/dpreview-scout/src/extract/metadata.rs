use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use super::parse_utils::{
    element_text, element_text_tight, first, first_in, has_class, selector, strip_size_param,
    url_from_style,
};
use super::{Diagnostic, Extracted, Stage};

const OVERVIEW_SUFFIX: &str = " Overview";
const MEDALS: [&str; 3] = ["gold", "silver", "bronze"];
const AWARDS: [&str; 4] = ["gold", "silver", "bronze", "recommended"];

static H1: LazyLock<Selector> = LazyLock::new(|| selector("h1"));
static BREADCRUMB: LazyLock<Selector> =
    LazyLock::new(|| selector("div.breadcrumbs a.item:last-child"));
static MAIN_IMAGE: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        "div#productImage",
        "div.productImage",
        "div.mainProductImage",
        "div.productImageMain",
    ]
    .iter()
    .map(|css| selector(css))
    .collect()
});
static IMG: LazyLock<Selector> = LazyLock::new(|| selector("img"));
static SHOT_THUMBNAIL: LazyLock<Selector> = LazyLock::new(|| selector("div.productShotThumbnail"));
static QUICK_SPEC_ROWS: LazyLock<Selector> =
    LazyLock::new(|| selector("div.rightColumn.quickSpecs table tr"));
static TH_LABEL: LazyLock<Selector> = LazyLock::new(|| selector("th.label"));
static TD_VALUE: LazyLock<Selector> = LazyLock::new(|| selector("td.value"));
static BADGE: LazyLock<Selector> = LazyLock::new(|| selector("div.productBadgeAndScore"));
static REVIEW_SECTIONS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        "div.reviewPreview",
        "div.review-preview",
        "td.review",
        "div.productReview",
        "div.reviewInfo",
    ]
    .iter()
    .map(|css| selector(css))
    .collect()
});
static AWARD_SPAN: LazyLock<Selector> = LazyLock::new(|| selector("span.award"));
static AWARD_MARKERS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        "div.mainContent [data-award]",
        "div.leftColumn [data-award]",
        "div.mainContent .badge",
        "div.leftColumn .badge",
    ]
    .iter()
    .map(|css| selector(css))
    .collect()
});
static GREY_LABEL: LazyLock<Selector> = LazyLock::new(|| selector("span.greyLabel"));
static REVIEW_DATE: LazyLock<Selector> =
    LazyLock::new(|| selector("div.reviewDate, span.reviewDate, div.review span.date"));
static JSON_LD: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"script[type="application/ld+json"]"#));
static BULLET_TAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\s*[•·].*").expect("valid regex"));

/// Everything the metadata stage reads off the overview page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub name: String,
    pub image_url: String,
    pub award: String,
    pub short_specs: Vec<String>,
    /// Score from structured data on the overview page; 0 when absent.
    pub overview_score: u32,
    /// "Announced" label text on the overview page.
    pub announced: String,
}

pub fn extract(doc: &Html, diagnostics: &mut Vec<Diagnostic>) -> Metadata {
    Metadata {
        name: name(doc).take(diagnostics),
        image_url: image_url(doc).take(diagnostics),
        award: award(doc).take(diagnostics),
        short_specs: short_specs(doc).take(diagnostics),
        overview_score: structured_score(doc).take(diagnostics),
        announced: announced(doc).take(diagnostics),
    }
}

pub fn name(doc: &Html) -> Extracted<String> {
    if let Some(h1) = first(doc, &H1) {
        let title = element_text_tight(h1);
        let title = title.strip_suffix(OVERVIEW_SUFFIX).unwrap_or(&title).to_string();
        if !title.is_empty() {
            return Extracted::found(title);
        }
    }
    if let Some(crumb) = first(doc, &BREADCRUMB) {
        let text = element_text_tight(crumb);
        if !text.is_empty() {
            return Extracted::found(text);
        }
    }
    Extracted::missing(Diagnostic::missing(
        Stage::Metadata,
        "Name",
        "h1 | div.breadcrumbs a.item:last-child",
    ))
}

/// Main product shot. Gallery photos (`/shots/`) are skipped; the first
/// gallery thumbnail is the last resort.
pub fn image_url(doc: &Html) -> Extracted<String> {
    for sel in MAIN_IMAGE.iter() {
        let Some(el) = first(doc, sel) else { continue };

        if let Some(url) = el.value().attr("style").and_then(url_from_style) {
            if !url.contains("/shots/") {
                return Extracted::found(url);
            }
        }
        if let Some(src) = first_in(el, &IMG).and_then(|img| img.value().attr("src")) {
            if !src.is_empty() && !src.contains("/shots/") {
                return Extracted::found(strip_size_param(src));
            }
        }
    }

    let thumbnail = first(doc, &SHOT_THUMBNAIL)
        .and_then(|el| el.value().attr("style"))
        .and_then(url_from_style);
    match thumbnail {
        Some(url) => Extracted::fallback(
            url,
            Diagnostic::missing(Stage::Metadata, "ImageURL", "main image missing; used gallery thumbnail"),
        ),
        None => Extracted::missing(Diagnostic::missing(
            Stage::Metadata,
            "ImageURL",
            "div#productImage | div.productImage | div.mainProductImage | div.productImageMain",
        )),
    }
}

/// Award tier: `gold`, `silver`, `bronze`, `recommended`, or empty.
pub fn award(doc: &Html) -> Extracted<String> {
    if let Some(badge) = first(doc, &BADGE) {
        if let Some(medal) = MEDALS.iter().find(|m| has_class(badge, m)) {
            return Extracted::found(medal.to_string());
        }
        if element_text(badge).to_lowercase().contains("recommended") {
            return Extracted::found("recommended".to_string());
        }
    }

    for sel in REVIEW_SECTIONS.iter() {
        let Some(section) = first(doc, sel) else { continue };
        if let Some(span) = first_in(section, &AWARD_SPAN) {
            if let Some(medal) = MEDALS.iter().find(|m| has_class(span, m)) {
                return Extracted::found(medal.to_string());
            }
        }
        let text = element_text(section).to_lowercase();
        for medal in MEDALS {
            if text.contains(&format!("{medal} award")) {
                return Extracted::found(medal.to_string());
            }
        }
        if text.contains("recommended") {
            return Extracted::found("recommended".to_string());
        }
    }

    for sel in AWARD_MARKERS.iter() {
        let Some(el) = first(doc, sel) else { continue };
        let data = el.value().attr("data-award").unwrap_or_default().to_lowercase();
        if AWARDS.contains(&data.as_str()) {
            return Extracted::found(data);
        }
        let text = element_text(el).to_lowercase();
        if let Some(award) = AWARDS.iter().find(|a| text.contains(*a)) {
            return Extracted::found(award.to_string());
        }
    }

    Extracted::missing(Diagnostic::absent(
        Stage::Metadata,
        "Award",
        "div.productBadgeAndScore | review sections | [data-award]",
    ))
}

/// Values of the quick-specs table, in page order.
pub fn short_specs(doc: &Html) -> Extracted<Vec<String>> {
    let specs: Vec<String> = doc
        .select(&QUICK_SPEC_ROWS)
        .filter(|row| first_in(*row, &TH_LABEL).is_some())
        .filter_map(|row| first_in(row, &TD_VALUE))
        .map(element_text_tight)
        .filter(|v| !v.is_empty())
        .collect();

    if specs.is_empty() {
        return Extracted::missing(Diagnostic::missing(
            Stage::Metadata,
            "ShortSpecs",
            "div.rightColumn.quickSpecs table tr",
        ));
    }
    Extracted::found(specs)
}

/// Text following the `Announced` grey label, bullet tail removed.
pub fn announced(doc: &Html) -> Extracted<String> {
    let label = doc
        .select(&GREY_LABEL)
        .find(|el| element_text_tight(*el) == "Announced");

    let text = label
        .and_then(|el| el.next_sibling())
        .and_then(|node| node.value().as_text().map(|t| t.trim().to_string()))
        .map(|t| BULLET_TAIL.replace(&t, "").trim().to_string())
        .filter(|t| !t.is_empty());

    match text {
        Some(t) => Extracted::found(t),
        None => Extracted::missing(Diagnostic::absent(
            Stage::Metadata,
            "Announced",
            "span.greyLabel[Announced] + text",
        )),
    }
}

/// `review.reviewRating.ratingValue` from the page's JSON-LD block.
pub fn structured_score(doc: &Html) -> Extracted<u32> {
    let score = first(doc, &JSON_LD)
        .map(|el| el.text().collect::<String>())
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
        .and_then(|data| {
            let rating = data.get("review")?.get("reviewRating")?.get("ratingValue")?;
            match rating {
                serde_json::Value::Number(n) => n.as_f64(),
                serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }
        })
        .filter(|v| *v >= 0.0)
        .map(|v| v as u32);

    match score {
        Some(s) => Extracted::found(s),
        None => Extracted::missing(Diagnostic::absent(
            Stage::Metadata,
            "ReviewScore",
            "script[type=application/ld+json] review.reviewRating.ratingValue",
        )),
    }
}

/// Preview blurb for `Specs.ReviewPreview`: the page's own review teaser when
/// it mentions the review, otherwise a synthesized `"{score}%{Award}\nRead review ..."`.
pub fn review_preview(doc: &Html, score: u32, award: &str) -> String {
    let award_lower = award.to_lowercase();
    for sel in REVIEW_SECTIONS.iter() {
        let Some(el) = first(doc, sel) else { continue };
        let text = el.text().collect::<Vec<_>>().join("\n");
        let lower = text.to_lowercase();
        if text.contains(&score.to_string())
            || lower.contains("review")
            || (!award_lower.is_empty() && lower.contains(&award_lower))
        {
            return text.trim().to_string();
        }
    }

    let award_text = if award.is_empty() {
        String::new()
    } else {
        let mut chars = award.chars();
        let title: String = chars
            .next()
            .map(|c| c.to_uppercase().chain(chars).collect())
            .unwrap_or_default();
        format!("{title} Award")
    };

    let mut parts = vec![format!("{score}%{award_text}"), "Read review ...".to_string()];
    if let Some(date) = first(doc, &REVIEW_DATE).map(element_text_tight) {
        if !date.is_empty() {
            parts.push(date);
        }
    }
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str) -> Html {
        Html::parse_document(&format!("<html><body>{body}</body></html>"))
    }

    #[test]
    fn name_strips_overview_suffix() {
        assert_eq!(name(&doc("<h1>Canon EOS R5 Overview</h1>")).value, "Canon EOS R5");
        let crumb = doc(r#"<div class="breadcrumbs"><a class="item">Cameras</a><a class="item">Nikon Z8</a></div>"#);
        assert_eq!(name(&crumb).value, "Nikon Z8");
    }

    #[test]
    fn missing_name_carries_diagnostic() {
        let out = name(&doc("<p>nothing</p>"));
        assert_eq!(out.value, "");
        let d = out.diagnostic.unwrap();
        assert_eq!(d.field, "Name");
        assert!(d.detail.contains("h1"));
        assert!(!d.expected);
    }

    #[test]
    fn image_prefers_main_image_over_gallery() {
        let html = doc(r#"
            <div class="productImage" style="background-image:url('https://img/shots/1.jpg')">
              <img src="https://img/TS250x250~products/main.jpg">
            </div>
            <div class="productShotThumbnail" style="background-image:url(https://img/shots/thumb.jpg)"></div>
        "#);
        let out = image_url(&html);
        assert_eq!(out.value, "https://img/products/main.jpg");
        assert!(out.diagnostic.is_none());
    }

    #[test]
    fn image_falls_back_to_thumbnail_with_note() {
        let html = doc(r#"<div class="productShotThumbnail" style="background-image:url(https://img/TS80x80~shots/t.jpg)"></div>"#);
        let out = image_url(&html);
        assert_eq!(out.value, "https://img/shots/t.jpg");
        assert!(out.diagnostic.is_some());
    }

    #[test]
    fn award_from_badge_class_and_text() {
        assert_eq!(award(&doc(r#"<div class="productBadgeAndScore silver">82%</div>"#)).value, "silver");
        assert_eq!(
            award(&doc(r#"<div class="reviewPreview">Bronze Award winner</div>"#)).value,
            "bronze"
        );
        assert_eq!(
            award(&doc(r#"<div class="mainContent"><span data-award="Recommended"></span></div>"#)).value,
            "recommended"
        );
        let none = award(&doc("<p>no award</p>"));
        assert_eq!(none.value, "");
        assert!(none.diagnostic.unwrap().expected);
    }

    #[test]
    fn short_specs_keep_values_only() {
        let html = doc(r#"<div class="rightColumn quickSpecs"><table>
            <tr><th class="label">Sensor</th><td class="value">APS-C</td></tr>
            <tr><td class="value">orphan</td></tr>
            <tr><th class="label">Pixels</th><td class="value">40MP</td></tr>
        </table></div>"#);
        assert_eq!(short_specs(&html).value, vec!["APS-C", "40MP"]);
    }

    #[test]
    fn announced_drops_bullet_tail() {
        let html = doc(r#"<p><span class="greyLabel">Announced</span> Nov 2, 2022 • Discontinued</p>"#);
        assert_eq!(announced(&html).value, "Nov 2, 2022");
    }

    #[test]
    fn structured_score_reads_json_ld() {
        let html = doc(r#"<script type="application/ld+json">{"review": {"reviewRating": {"ratingValue": "88"}}}</script>"#);
        assert_eq!(structured_score(&html).value, 88);
        assert_eq!(structured_score(&doc("")).value, 0);
    }

    #[test]
    fn synthesized_preview_format() {
        let html = doc(r#"<div class="reviewDate">Jan 5, 2023</div>"#);
        assert_eq!(review_preview(&html, 90, "gold"), "90%Gold Award\nRead review ...\nJan 5, 2023");
        assert_eq!(review_preview(&doc(""), 71, ""), "71%\nRead review ...");
    }
}
