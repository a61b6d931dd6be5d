use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::DpreviewError;
use crate::schema::{FieldKind, SPEC_FIELDS, UNMAPPED_KEY};

// --- Listing ---

/// One product row from the paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySummary {
    /// Stable slug, e.g. `fujifilm_xt5`.
    pub id: String,
    pub name: String,
    /// Absolute detail-page URL.
    pub url: String,
    /// Parsed announcement date, `None` when missing or unparseable.
    pub announced: Option<NaiveDate>,
    /// Announcement text as shown on the listing.
    pub announced_text: Option<String>,
    pub thumbnail_url: String,
}

// --- Output record ---

/// The unit handed to the output sink. Field order is serialization order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    #[serde(rename = "DPRReviewArchiveURL")]
    pub archive_url: Option<String>,
    #[serde(rename = "ProductCode")]
    pub product_code: String,
    #[serde(rename = "Award")]
    pub award: String,
    #[serde(rename = "ImageURL")]
    pub image_url: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "ShortSpecs")]
    pub short_specs: Vec<String>,
    #[serde(rename = "ReviewScore")]
    pub review_score: u32,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "ReviewData")]
    pub review: Option<ReviewBlock>,
    #[serde(rename = "Specs")]
    pub specs: Specs,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReviewBlock {
    pub executive_summary: String,
    pub product_photos: Vec<String>,
    pub review_summary: ReviewSummary,
    #[serde(rename = "ASIN")]
    pub asin: Vec<String>,
}

/// Good-for / not-good-for / conclusion triple. Each part is nullable on its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReviewSummary {
    pub good_for: Option<String>,
    pub not_so_good_for: Option<String>,
    pub conclusion: Option<String>,
}

impl ReviewSummary {
    pub fn is_empty(&self) -> bool {
        self.good_for.is_none() && self.not_so_good_for.is_none() && self.conclusion.is_none()
    }
}

// --- Specifications ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpecValue {
    Text(String),
    List(Vec<String>),
    Dimensions(Dimensions),
}

impl SpecValue {
    pub fn is_empty(&self) -> bool {
        match self {
            SpecValue::Text(s) => s.is_empty(),
            SpecValue::List(items) => items.is_empty(),
            SpecValue::Dimensions(_) => false,
        }
    }

    fn default_for(kind: FieldKind) -> Self {
        match kind {
            FieldKind::List => SpecValue::List(Vec::new()),
            FieldKind::Text | FieldKind::Dimensions => SpecValue::Text(String::new()),
        }
    }
}

/// Body dimensions parsed from text like `133 x 97 x 70 mm (5.24 x 3.82 x 2.76″)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
    pub depth: f64,
    /// `mm`, `cm` or `in`.
    pub unit: String,
    /// Source text, kept verbatim.
    pub raw: String,
}

static DIMENSIONS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^\s*(\d+(?:\.\d+)?)\s*[x×]\s*(\d+(?:\.\d+)?)\s*[x×]\s*(\d+(?:\.\d+)?)\s*(mm|cm|in|″|")"#,
    )
    .expect("valid dimensions regex")
});

impl Dimensions {
    /// Parse the leading `W x H x D unit` triple. `None` when the text has another shape.
    pub fn parse(raw: &str) -> Option<Self> {
        let caps = DIMENSIONS_RE.captures(raw)?;
        let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<f64>().ok());
        let unit = match &caps[4] {
            "″" | "\"" => "in",
            other => other,
        };
        Some(Self {
            width: num(1)?,
            height: num(2)?,
            depth: num(3)?,
            unit: unit.to_string(),
            raw: raw.trim().to_string(),
        })
    }
}

/// Canonical specification mapping plus the bucket of unmapped source labels.
///
/// Serializes every canonical field in schema order, filling absent ones with
/// their kind's empty value, followed by `Unmapped`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "SpecsRepr")]
pub struct Specs {
    fields: BTreeMap<String, SpecValue>,
    unmapped: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct SpecsRepr {
    #[serde(rename = "Unmapped", default)]
    unmapped: BTreeMap<String, String>,
    #[serde(flatten)]
    fields: BTreeMap<String, SpecValue>,
}

impl From<SpecsRepr> for Specs {
    fn from(repr: SpecsRepr) -> Self {
        Self {
            fields: repr
                .fields
                .into_iter()
                .filter(|(_, v)| !v.is_empty())
                .collect(),
            unmapped: repr.unmapped,
        }
    }
}

impl Specs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value under a canonical field. Empty values are not stored,
    /// so an earlier non-empty value is never clobbered by a blank row.
    pub fn insert(&mut self, field: &str, value: SpecValue) {
        if value.is_empty() {
            return;
        }
        self.fields.insert(field.to_string(), value);
    }

    pub fn get(&self, field: &str) -> Option<&SpecValue> {
        self.fields.get(field)
    }

    /// Text value of a field, `""` when absent or not textual.
    pub fn text(&self, field: &str) -> &str {
        match self.fields.get(field) {
            Some(SpecValue::Text(s)) => s,
            Some(SpecValue::Dimensions(d)) => &d.raw,
            _ => "",
        }
    }

    pub fn has_value(&self, field: &str) -> bool {
        self.fields.get(field).is_some_and(|v| !v.is_empty())
    }

    pub fn insert_unmapped(&mut self, label: &str, value: &str) {
        self.unmapped.insert(label.to_string(), value.to_string());
    }

    pub fn unmapped(&self) -> &BTreeMap<String, String> {
        &self.unmapped
    }

    /// Number of canonical fields holding data.
    pub fn populated(&self) -> usize {
        self.fields.len()
    }
}

impl Serialize for Specs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(SPEC_FIELDS.len() + 1))?;
        for (name, kind) in SPEC_FIELDS {
            match self.fields.get(*name) {
                Some(value) => map.serialize_entry(name, value)?,
                None => map.serialize_entry(name, &SpecValue::default_for(*kind))?,
            }
        }
        map.serialize_entry(UNMAPPED_KEY, &self.unmapped)?;
        map.end()
    }
}

// --- Archive strategy ---

/// Which existing snapshot the archive lookup prefers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SnapshotStrategy {
    #[default]
    Latest,
    Earliest,
    /// Closest to a `YYYYMMDD[hhmmss]` timestamp.
    ClosestTo(String),
}

/// Earliest date the Wayback Machine holds captures for.
const EARLIEST_TIMESTAMP: &str = "19960101";

impl SnapshotStrategy {
    /// Timestamp to send to the availability API. `None` asks for the newest capture.
    pub fn timestamp(&self) -> Option<&str> {
        match self {
            SnapshotStrategy::Latest => None,
            SnapshotStrategy::Earliest => Some(EARLIEST_TIMESTAMP),
            SnapshotStrategy::ClosestTo(ts) => Some(ts),
        }
    }
}

impl FromStr for SnapshotStrategy {
    type Err = DpreviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "latest" => return Ok(SnapshotStrategy::Latest),
            "earliest" => return Ok(SnapshotStrategy::Earliest),
            _ => {}
        }
        if let Some(ts) = s.strip_prefix("closest:") {
            let digits: String = ts.chars().filter(|c| *c != '-').collect();
            if (8..=14).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit()) {
                return Ok(SnapshotStrategy::ClosestTo(digits));
            }
        }
        Err(DpreviewError::Config(format!(
            "invalid archive strategy '{s}' (expected latest, earliest or closest:YYYYMMDD)"
        )))
    }
}

impl fmt::Display for SnapshotStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotStrategy::Latest => write!(f, "latest"),
            SnapshotStrategy::Earliest => write!(f, "earliest"),
            SnapshotStrategy::ClosestTo(ts) => write!(f, "closest:{ts}"),
        }
    }
}
