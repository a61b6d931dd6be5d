use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

static URL_FROM_CSS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"url\(["']?([^"'()]+)["']?\)"#).expect("valid regex"));
/// Thumbnail size segment in image CDN URLs, e.g. `TS560x560~`.
static SIZE_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"TS\d+x\d+~").expect("valid regex"));
static MULTI_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static SPACE_BEFORE_INCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\s+(″|"|'')"#).expect("valid regex"));
static SPACE_BEFORE_PAREN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+\)").expect("valid regex"));

/// Compile a selector written in source. Only used for literals.
pub fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {css:?}: {e:?}"))
}

/// Collapse whitespace runs, then drop spaces before inch marks and `)`.
pub fn normalize_whitespace(text: &str) -> String {
    let text = MULTI_SPACE.replace_all(text, " ");
    let text = SPACE_BEFORE_INCH.replace_all(&text, "$1");
    let text = SPACE_BEFORE_PAREN.replace_all(&text, ")");
    text.trim().to_string()
}

/// Element text with text nodes joined by single spaces, normalized.
pub fn element_text(el: ElementRef<'_>) -> String {
    let joined = el
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    normalize_whitespace(&joined)
}

/// Element text with text nodes concatenated as-is (inline markup produces
/// no extra spaces), then trimmed.
pub fn element_text_tight(el: ElementRef<'_>) -> String {
    el.text().map(str::trim).collect::<String>().trim().to_string()
}

/// Text nodes of an element, trimmed, one per entry.
pub fn text_nodes(el: ElementRef<'_>) -> Vec<String> {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

pub fn first<'a>(doc: &'a Html, sel: &Selector) -> Option<ElementRef<'a>> {
    doc.select(sel).next()
}

pub fn first_in<'a>(el: ElementRef<'a>, sel: &Selector) -> Option<ElementRef<'a>> {
    el.select(sel).next()
}

pub fn has_class(el: ElementRef<'_>, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

/// Remove the CDN thumbnail size segment from an image URL.
pub fn strip_size_param(url: &str) -> String {
    SIZE_PARAM.replace_all(url, "").into_owned()
}

/// URL from a CSS `background-image: url(...)` declaration, size segment removed.
pub fn url_from_style(style: &str) -> Option<String> {
    URL_FROM_CSS
        .captures(style)
        .map(|caps| strip_size_param(caps[1].trim()))
        .filter(|u| !u.is_empty())
}

/// Resolve `href` against `base`. Absolute hrefs pass through unchanged.
pub fn absolutize(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    match url::Url::parse(base).and_then(|b| b.join(href)) {
        Ok(u) => u.to_string(),
        Err(_) => format!("{}{}", base.trim_end_matches('/'), href),
    }
}
