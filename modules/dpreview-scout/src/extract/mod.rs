//! Staged extraction: metadata → specifications → review content.
//!
//! Every field extractor is a total function returning [`Extracted`]: the
//! value is always well-typed (falling back to the field default) and a
//! [`Diagnostic`] records which selector path came up empty. Nothing in this
//! module fails; only fetching can fail an entity.

pub mod metadata;
pub mod parse_utils;
pub mod review;
pub mod specs;

use std::fmt;
use std::sync::Arc;

use scraper::Html;
use tracing::{debug, warn};

use dpreview_common::{EntitySummary, LabelMap, NormalizedRecord, SpecValue};

use crate::util::preview;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Metadata,
    Specifications,
    Review,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Metadata => write!(f, "metadata"),
            Stage::Specifications => write!(f, "specifications"),
            Stage::Review => write!(f, "review"),
        }
    }
}

/// A soft extraction failure or fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub stage: Stage,
    pub field: &'static str,
    /// Selector path that failed, or a note on the fallback taken.
    pub detail: String,
    /// Absence is routine for this field (no award, no review yet).
    pub expected: bool,
}

impl Diagnostic {
    pub fn missing(stage: Stage, field: &'static str, detail: impl Into<String>) -> Self {
        Self {
            stage,
            field,
            detail: detail.into(),
            expected: false,
        }
    }

    pub fn absent(stage: Stage, field: &'static str, detail: impl Into<String>) -> Self {
        Self {
            expected: true,
            ..Self::missing(stage, field, detail)
        }
    }
}

/// Result of a total field extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted<T> {
    pub value: T,
    pub diagnostic: Option<Diagnostic>,
}

impl<T> Extracted<T> {
    pub fn found(value: T) -> Self {
        Self {
            value,
            diagnostic: None,
        }
    }

    pub fn fallback(value: T, diagnostic: Diagnostic) -> Self {
        Self {
            value,
            diagnostic: Some(diagnostic),
        }
    }

    /// Move the value out, appending any diagnostic to `sink`.
    pub fn take(self, sink: &mut Vec<Diagnostic>) -> T {
        if let Some(d) = self.diagnostic {
            sink.push(d);
        }
        self.value
    }
}

impl<T: Default> Extracted<T> {
    pub fn missing(diagnostic: Diagnostic) -> Self {
        Self::fallback(T::default(), diagnostic)
    }
}

/// A specification label with no canonical mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmappedLabel {
    pub label: String,
    pub value: String,
}

/// Raw documents for one entity. Lives only while that entity is processed.
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    pub summary: EntitySummary,
    pub overview_html: String,
    pub specs_html: String,
    pub review_html: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Extraction {
    /// Finished record with no archive reference yet.
    pub record: NormalizedRecord,
    pub diagnostics: Vec<Diagnostic>,
    pub unmapped: Vec<UnmappedLabel>,
}

pub struct EntityExtractor {
    labels: Arc<LabelMap>,
}

impl EntityExtractor {
    pub fn new(labels: Arc<LabelMap>) -> Self {
        Self { labels }
    }

    pub fn extract(&self, ctx: &ExtractionContext) -> Extraction {
        let overview = Html::parse_document(&ctx.overview_html);
        let specs_doc = Html::parse_document(&ctx.specs_html);
        let review_doc = ctx.review_html.as_deref().map(Html::parse_document);
        let summary = &ctx.summary;

        let mut diagnostics = Vec::new();

        // Stage 1: metadata
        let meta = metadata::extract(&overview, &mut diagnostics);

        // Stage 2: specifications
        let specs_out = specs::extract(&specs_doc, review_doc.as_ref(), &self.labels);
        diagnostics.extend(specs_out.diagnostics);
        let mut specs = specs_out.specs;

        // Stage 3: review content
        let review_out = review::extract(&overview, review_doc.as_ref());
        diagnostics.extend(review_out.diagnostics);

        // Listing data fills what the detail pages lacked.
        let name = if meta.name.is_empty() {
            diagnostics.push(Diagnostic::missing(
                Stage::Metadata,
                "Name",
                "used listing name",
            ));
            summary.name.clone()
        } else {
            meta.name
        };
        let image_url = if meta.image_url.is_empty() && !summary.thumbnail_url.is_empty() {
            diagnostics.push(Diagnostic::missing(
                Stage::Metadata,
                "ImageURL",
                "used listing thumbnail",
            ));
            summary.thumbnail_url.clone()
        } else {
            meta.image_url
        };

        if !specs.has_value("Announced") {
            let announced = if !meta.announced.is_empty() {
                Some(meta.announced)
            } else {
                summary.announced_text.clone()
            };
            if let Some(announced) = announced {
                specs.insert("Announced", SpecValue::Text(announced));
            }
        }

        let review_score = if review_out.score > 0 {
            review_out.score
        } else {
            meta.overview_score
        };

        if !specs.has_value("ReviewPreview") && review_score > 0 {
            let text = metadata::review_preview(&overview, review_score, &meta.award);
            specs.insert("ReviewPreview", SpecValue::Text(text));
        }

        let record = NormalizedRecord {
            archive_url: None,
            product_code: summary.id.clone(),
            award: meta.award,
            image_url,
            name,
            short_specs: meta.short_specs,
            review_score,
            url: summary.url.clone(),
            review: review_out.block,
            specs,
        };

        for d in &diagnostics {
            if d.expected {
                debug!(product_code = %summary.id, stage = %d.stage, field = d.field, selector = %d.detail, "Field not present");
            } else {
                warn!(product_code = %summary.id, stage = %d.stage, field = d.field, selector = %d.detail, "Field extraction fell back to default");
            }
        }
        for u in &specs_out.unmapped {
            warn!(
                product_code = %summary.id,
                label = %u.label,
                value = %preview(&u.value, 50),
                "Unmapped specification label"
            );
        }

        Extraction {
            record,
            diagnostics,
            unmapped: specs_out.unmapped,
        }
    }
}
