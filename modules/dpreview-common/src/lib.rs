pub mod config;
pub mod error;
pub mod labels;
pub mod schema;
pub mod types;

pub use config::{parse_cutoff, ScoutConfig};
pub use error::{DpreviewError, Result};
pub use labels::{normalize_label, LabelMap};
pub use schema::{
    field_kind, FieldKind, ValueType, ARCHIVE_KEY, REQUIRED_KEYS, REVIEW_KEYS, REVIEW_SUMMARY_KEYS,
    SPEC_FIELDS, UNMAPPED_KEY,
};
pub use types::*;
