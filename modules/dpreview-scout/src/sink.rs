// YAML output: one file per entity, `<dir>/<ProductCode>.yaml`, replaced
// atomically so an interrupted write never leaves a truncated record.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use dpreview_common::NormalizedRecord;

use crate::traits::RecordSink;
use crate::util::write_atomic;

pub struct YamlDirectory {
    dir: PathBuf,
}

impl YamlDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File for a product code. Characters outside `[A-Za-z0-9_.-]` become `_`.
    pub fn path_for(&self, product_code: &str) -> PathBuf {
        let name: String = product_code
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let name = name.trim_start_matches('.');
        let name = if name.is_empty() { "_" } else { name };
        self.dir.join(format!("{name}.yaml"))
    }

    /// YAML text for a record, keys in record order.
    pub fn render(record: &NormalizedRecord) -> Result<String> {
        let value = serde_yaml::to_value(record).context("Failed to convert record to YAML")?;
        serde_yaml::to_string(&value).context("Failed to render record YAML")
    }
}

#[async_trait]
impl RecordSink for YamlDirectory {
    async fn write(&self, record: NormalizedRecord) -> Result<()> {
        let path = self.path_for(&record.product_code);
        let yaml = Self::render(&record)?;
        write_atomic(&path, yaml.as_bytes())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(product_code = %record.product_code, path = %path.display(), "Record written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpreview_common::{SpecValue, Specs, SPEC_FIELDS};

    fn record() -> NormalizedRecord {
        let mut specs = Specs::new();
        specs.insert("BodyType", SpecValue::Text("SLR-style mirrorless".into()));
        NormalizedRecord {
            archive_url: None,
            product_code: "fujifilm_xt5".into(),
            award: "gold".into(),
            image_url: "https://img/main.jpg".into(),
            name: "Fujifilm X-T5".into(),
            short_specs: vec!["40 megapixels".into()],
            review_score: 90,
            url: "https://www.dpreview.com/products/fujifilm/slrs/fujifilm_xt5".into(),
            review: None,
            specs,
        }
    }

    #[test]
    fn product_codes_are_sanitized() {
        let sink = YamlDirectory::new("/out");
        assert_eq!(sink.path_for("canon_eosr5"), PathBuf::from("/out/canon_eosr5.yaml"));
        assert_eq!(sink.path_for("../etc/passwd"), PathBuf::from("/out/_etc_passwd.yaml"));
    }

    #[test]
    fn rendered_record_has_every_key_in_order() {
        let yaml = YamlDirectory::render(&record()).unwrap();
        let top: Vec<&str> = yaml
            .lines()
            .filter(|l| !l.starts_with(' ') && !l.starts_with('-') && l.contains(':'))
            .map(|l| l.split(':').next().unwrap())
            .collect();
        assert_eq!(
            top,
            vec![
                "DPRReviewArchiveURL",
                "ProductCode",
                "Award",
                "ImageURL",
                "Name",
                "ShortSpecs",
                "ReviewScore",
                "URL",
                "ReviewData",
                "Specs",
            ]
        );
        assert!(yaml.contains("DPRReviewArchiveURL: null"));
        assert!(yaml.contains("ReviewData: null"));

        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        let specs = value.get("Specs").unwrap().as_mapping().unwrap();
        assert_eq!(specs.len(), SPEC_FIELDS.len() + 1);
        assert_eq!(value["Specs"]["Autofocus"], serde_yaml::Value::Sequence(vec![]));
        assert_eq!(value["Specs"]["ISO"], serde_yaml::Value::String(String::new()));
    }

    #[tokio::test]
    async fn write_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let sink = YamlDirectory::new(dir.path());
        sink.write(record()).await.unwrap();

        let text = std::fs::read_to_string(dir.path().join("fujifilm_xt5.yaml")).unwrap();
        let back: NormalizedRecord = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back, record());
    }
}
