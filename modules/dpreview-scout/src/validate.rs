//! Read-only schema check over a directory of output records.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde_yaml::Value;

use dpreview_common::{
    FieldKind, ValueType, REQUIRED_KEYS, REVIEW_KEYS, REVIEW_SUMMARY_KEYS, SPEC_FIELDS, UNMAPPED_KEY,
};

use crate::backfill::record_files;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    Unparseable(String),
    MissingKey(String),
    UnexpectedKey(String),
    WrongType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Problem::Unparseable(e) => write!(f, "not parseable as YAML: {e}"),
            Problem::MissingKey(key) => write!(f, "missing key {key}"),
            Problem::UnexpectedKey(key) => write!(f, "unexpected key {key}"),
            Problem::WrongType { key, expected, found } => {
                write!(f, "{key}: expected {expected}, found {found}")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub problems: Vec<Problem>,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub files: Vec<FileReport>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.files.iter().all(|f| f.problems.is_empty())
    }

    pub fn invalid_count(&self) -> usize {
        self.files.iter().filter(|f| !f.problems.is_empty()).count()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for file in &self.files {
            if file.problems.is_empty() {
                writeln!(f, "OK      {}", file.path.display())?;
                continue;
            }
            writeln!(f, "INVALID {}", file.path.display())?;
            for problem in &file.problems {
                writeln!(f, "        - {problem}")?;
            }
        }
        write!(
            f,
            "{} file(s) checked, {} invalid",
            self.files.len(),
            self.invalid_count()
        )
    }
}

pub fn validate_directory(dir: &Path) -> Result<ValidationReport> {
    let files = record_files(dir)?
        .into_iter()
        .map(|path| {
            let problems = match std::fs::read_to_string(&path) {
                Ok(text) => validate_text(&text),
                Err(e) => vec![Problem::Unparseable(e.to_string())],
            };
            FileReport { path, problems }
        })
        .collect();
    Ok(ValidationReport { files })
}

pub fn validate_text(text: &str) -> Vec<Problem> {
    match serde_yaml::from_str::<Value>(text) {
        Ok(value) => validate_record(&value),
        Err(e) => vec![Problem::Unparseable(e.to_string())],
    }
}

/// Every problem with one record. Empty means the record matches the schema.
pub fn validate_record(record: &Value) -> Vec<Problem> {
    let mut problems = Vec::new();
    let Some(map) = record.as_mapping() else {
        problems.push(wrong_type("<record>", "mapping", record));
        return problems;
    };

    check_keys(map, "", REQUIRED_KEYS, true, &mut problems);

    if let Some(review) = map.get("ReviewData").and_then(Value::as_mapping) {
        check_keys(review, "ReviewData.", REVIEW_KEYS, false, &mut problems);
        if let Some(summary) = review.get("ReviewSummary").and_then(Value::as_mapping) {
            check_keys(summary, "ReviewData.ReviewSummary.", REVIEW_SUMMARY_KEYS, false, &mut problems);
        }
    }

    if let Some(specs) = map.get("Specs").and_then(Value::as_mapping) {
        check_specs(specs, &mut problems);
    }
    problems
}

fn check_keys(
    map: &serde_yaml::Mapping,
    prefix: &str,
    expected: &[(&str, ValueType)],
    exact: bool,
    problems: &mut Vec<Problem>,
) {
    for (key, ty) in expected {
        let path = format!("{prefix}{key}");
        match map.get(*key) {
            None => problems.push(Problem::MissingKey(path)),
            Some(value) if !matches_type(value, *ty) => {
                problems.push(wrong_type(&path, ty.describe(), value))
            }
            Some(_) => {}
        }
    }
    if exact {
        for key in map.keys() {
            let name = key.as_str().unwrap_or("<non-string key>");
            if !expected.iter().any(|(k, _)| *k == name) {
                problems.push(Problem::UnexpectedKey(format!("{prefix}{name}")));
            }
        }
    }
}

fn check_specs(specs: &serde_yaml::Mapping, problems: &mut Vec<Problem>) {
    for (field, kind) in SPEC_FIELDS {
        let path = format!("Specs.{field}");
        let Some(value) = specs.get(*field) else {
            problems.push(Problem::MissingKey(path));
            continue;
        };
        let ok = match kind {
            FieldKind::Text => value.is_string(),
            FieldKind::List => matches_type(value, ValueType::StringList),
            FieldKind::Dimensions => value.is_string() || is_dimensions(value),
        };
        if !ok {
            let expected = match kind {
                FieldKind::Text => "string",
                FieldKind::List => "list of strings",
                FieldKind::Dimensions => "string or dimensions mapping",
            };
            problems.push(wrong_type(&path, expected, value));
        }
    }

    match specs.get(UNMAPPED_KEY) {
        None => problems.push(Problem::MissingKey(format!("Specs.{UNMAPPED_KEY}"))),
        Some(Value::Mapping(m)) if m.values().all(Value::is_string) => {}
        Some(other) => problems.push(wrong_type(
            &format!("Specs.{UNMAPPED_KEY}"),
            "mapping of strings",
            other,
        )),
    }
}

fn matches_type(value: &Value, ty: ValueType) -> bool {
    match ty {
        ValueType::String => value.is_string(),
        ValueType::NullableString => value.is_string() || value.is_null(),
        ValueType::Integer => value.is_u64() || value.is_i64(),
        ValueType::StringList => value
            .as_sequence()
            .is_some_and(|items| items.iter().all(Value::is_string)),
        ValueType::Mapping => value.is_mapping(),
        ValueType::NullableMapping => value.is_mapping() || value.is_null(),
    }
}

fn is_dimensions(value: &Value) -> bool {
    let Some(map) = value.as_mapping() else {
        return false;
    };
    ["Width", "Height", "Depth"]
        .iter()
        .all(|k| map.get(*k).is_some_and(Value::is_number))
        && ["Unit", "Raw"].iter().all(|k| map.get(*k).is_some_and(Value::is_string))
}

fn wrong_type(key: &str, expected: &'static str, found: &Value) -> Problem {
    Problem::WrongType {
        key: key.to_string(),
        expected,
        found: type_name(found),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}
