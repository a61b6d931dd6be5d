use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use dpreview_common::{field_kind, Dimensions, FieldKind, LabelMap, SpecValue, Specs};

use super::parse_utils::{element_text, element_text_tight, first_in, normalize_whitespace, selector, text_nodes};
use super::{Diagnostic, Stage, UnmappedLabel};

static SPECS_ROWS: LazyLock<Selector> = LazyLock::new(|| selector("table.specsTable tbody tr"));
static CONTENT_ROWS: LazyLock<Selector> = LazyLock::new(|| selector("table.contentTable tr"));
static TH_LABEL: LazyLock<Selector> = LazyLock::new(|| selector("th.label"));
static TD_VALUE: LazyLock<Selector> = LazyLock::new(|| selector("td.value"));
static TH: LazyLock<Selector> = LazyLock::new(|| selector("th"));
static TD: LazyLock<Selector> = LazyLock::new(|| selector("td"));
static LIST_ITEMS: LazyLock<Selector> = LazyLock::new(|| selector("ul li, ol li"));
static ANNOUNCED_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Announced\s+").expect("valid regex"));

#[derive(Debug, Clone, Default)]
pub struct SpecsOutcome {
    pub specs: Specs,
    pub unmapped: Vec<UnmappedLabel>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Read the specifications page table and, when the review document carries
/// its own spec table, fill remaining gaps from it.
pub fn extract(specs_doc: &Html, review_doc: Option<&Html>, labels: &LabelMap) -> SpecsOutcome {
    let mut out = SpecsOutcome::default();

    let rows = collect_rows(specs_doc, &SPECS_ROWS, &TH_LABEL, &TD_VALUE);
    if rows.is_empty() {
        out.diagnostics.push(Diagnostic::missing(
            Stage::Specifications,
            "Specs",
            "table.specsTable tbody tr",
        ));
    }
    for (label, value_el) in rows {
        apply_row(&label, value_el, labels, &mut out, true);
    }

    if let Some(review) = review_doc {
        for (label, value_el) in collect_rows(review, &CONTENT_ROWS, &TH, &TD) {
            apply_row(&label, value_el, labels, &mut out, false);
        }
    }

    out
}

fn collect_rows<'a>(
    doc: &'a Html,
    rows: &Selector,
    label: &Selector,
    value: &Selector,
) -> Vec<(String, ElementRef<'a>)> {
    doc.select(rows)
        .filter_map(|row| {
            let label_el = first_in(row, label)?;
            let value_el = first_in(row, value)?;
            Some((element_text_tight(label_el).replace(':', ""), value_el))
        })
        .collect()
}

/// Map one label/value row onto the record. `overwrite` is false for the
/// secondary table, which only fills fields still empty.
fn apply_row(label: &str, value_el: ElementRef<'_>, labels: &LabelMap, out: &mut SpecsOutcome, overwrite: bool) {
    let label = label.trim();
    let value = element_text(value_el);
    if label.is_empty() || value.is_empty() {
        return;
    }

    let Some(field) = labels.lookup(label) else {
        if !out.specs.unmapped().contains_key(label) {
            out.specs.insert_unmapped(label, &value);
            out.unmapped.push(UnmappedLabel {
                label: label.to_string(),
                value,
            });
        }
        return;
    };

    if !overwrite && out.specs.has_value(field) {
        return;
    }

    let parsed = match field_kind(field) {
        Some(FieldKind::List) => SpecValue::List(parse_list_value(value_el)),
        Some(FieldKind::Dimensions) => match Dimensions::parse(&value) {
            Some(dims) => SpecValue::Dimensions(dims),
            None => {
                out.diagnostics.push(Diagnostic::absent(
                    Stage::Specifications,
                    "Dimensions",
                    format!("'{value}' is not W x H x D; kept raw text"),
                ));
                SpecValue::Text(value)
            }
        },
        Some(FieldKind::Text) | None if field == "Announced" => {
            SpecValue::Text(ANNOUNCED_PREFIX.replace(&value, "").into_owned())
        }
        Some(FieldKind::Text) | None => SpecValue::Text(value),
    };
    out.specs.insert(field, parsed);
}

/// Split a cell into items: `<ul>/<ol>` entries when present, otherwise the
/// first of newline / `;` / `,` that yields more than one part.
pub fn parse_list_value(el: ElementRef<'_>) -> Vec<String> {
    let items: Vec<String> = el
        .select(&LIST_ITEMS)
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect();
    if !items.is_empty() {
        return items;
    }

    let raw = text_nodes(el).join("\n");
    for sep in ['\n', ';', ','] {
        if raw.contains(sep) {
            let parts: Vec<String> = raw
                .split(sep)
                .map(normalize_whitespace)
                .filter(|p| !p.is_empty())
                .collect();
            if parts.len() > 1 {
                return parts;
            }
        }
    }

    let single = normalize_whitespace(&raw);
    if single.is_empty() {
        Vec::new()
    } else {
        vec![single]
    }
}
