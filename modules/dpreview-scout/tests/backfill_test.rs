//! Integration tests: archive backfill over a directory written by the YAML sink.
//!
//! Records are produced by `YamlDirectory`, then backfilled through an
//! `ArchiveResolver` backed by `MockSnapshots`. The contract under test is
//! that backfill touches the archive reference and nothing else.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_yaml::Value;

use dpreview_common::{NormalizedRecord, ReviewBlock, ReviewSummary, SnapshotStrategy, SpecValue, Specs, ARCHIVE_KEY};
use dpreview_scout::archive::ArchiveResolver;
use dpreview_scout::backfill::{backfill_directory, backfill_file, BackfillOptions, FileOutcome};
use dpreview_scout::sink::YamlDirectory;
use dpreview_scout::testing::{fast_limiter, MockSnapshots};
use dpreview_scout::traits::RecordSink;

const SNAPSHOT: &str = "https://web.archive.org/web/20240101000000/https://www.dpreview.com/products/nikon/slrs/nikon_z8";

fn url(code: &str) -> String {
    format!("https://www.dpreview.com/products/nikon/slrs/{code}")
}

fn record(code: &str, archive_url: Option<&str>) -> NormalizedRecord {
    let mut specs = Specs::new();
    specs.insert("BodyType", SpecValue::Text("SLR-style mirrorless".into()));
    specs.insert(
        "Autofocus",
        SpecValue::List(vec!["Phase Detect".into(), "Multi-area".into()]),
    );
    specs.insert_unmapped("Sensor readout", "Stacked");
    NormalizedRecord {
        archive_url: archive_url.map(str::to_string),
        product_code: code.to_string(),
        award: "gold".into(),
        image_url: "https://1.img-dpreview.com/files/p/nikon_z8.jpeg".into(),
        name: "Nikon Z8".into(),
        short_specs: vec!["46 megapixels".into(), "Full frame sensor".into()],
        review_score: 92,
        url: url(code),
        review: Some(ReviewBlock {
            executive_summary: "A smaller Z9 with the same stacked sensor.".into(),
            product_photos: vec!["https://1.img-dpreview.com/files/p/shots/1.jpeg".into()],
            review_summary: ReviewSummary {
                good_for: Some("Action and wildlife".into()),
                not_so_good_for: None,
                conclusion: Some("Remarkably capable.".into()),
            },
            asin: vec!["B0C4Q1Z8XZ".into()],
        }),
        specs,
    }
}

fn resolver(snapshots: MockSnapshots) -> ArchiveResolver {
    ArchiveResolver::new(
        Arc::new(snapshots),
        fast_limiter(),
        SnapshotStrategy::Latest,
        Duration::ZERO,
    )
}

async fn write_records(dir: &Path, records: Vec<NormalizedRecord>) -> YamlDirectory {
    let sink = YamlDirectory::new(dir);
    for record in records {
        sink.write(record).await.unwrap();
    }
    sink
}

fn without_archive_line(text: &str) -> Vec<&str> {
    text.lines()
        .filter(|l| !l.starts_with(&format!("{ARCHIVE_KEY}:")))
        .collect()
}

#[tokio::test]
async fn backfill_changes_only_the_archive_reference() {
    let dir = tempfile::tempdir().unwrap();
    let sink = write_records(dir.path(), vec![record("nikon_z8", None)]).await;
    let path = sink.path_for("nikon_z8");
    let before = std::fs::read_to_string(&path).unwrap();

    let resolver = resolver(MockSnapshots::new().with_snapshot(&url("nikon_z8"), SNAPSHOT));
    let outcome = backfill_file(&path, &resolver, BackfillOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome, FileOutcome::Updated(SNAPSHOT.to_string()));

    let after = std::fs::read_to_string(&path).unwrap();
    assert_ne!(before, after);
    assert_eq!(without_archive_line(&before), without_archive_line(&after));

    let doc: Value = serde_yaml::from_str(&after).unwrap();
    assert_eq!(doc[ARCHIVE_KEY].as_str(), Some(SNAPSHOT));
    // The archive key stays first.
    assert!(after.starts_with(&format!("{ARCHIVE_KEY}:")));
}

#[tokio::test]
async fn hand_edited_keys_survive_backfill() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nikon_z8.yaml");
    std::fs::write(
        &path,
        format!("ProductCode: nikon_z8\nURL: {}\nNotes: checked by hand\n", url("nikon_z8")),
    )
    .unwrap();

    let resolver = resolver(MockSnapshots::new().with_snapshot(&url("nikon_z8"), SNAPSHOT));
    backfill_file(&path, &resolver, BackfillOptions::default())
        .await
        .unwrap();

    let doc: Value = serde_yaml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let keys: Vec<&str> = doc
        .as_mapping()
        .unwrap()
        .keys()
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(keys, vec![ARCHIVE_KEY, "ProductCode", "URL", "Notes"]);
    assert_eq!(doc["Notes"].as_str(), Some("checked by hand"));
}

#[tokio::test]
async fn directory_report_counts_each_outcome() {
    let dir = tempfile::tempdir().unwrap();
    write_records(
        dir.path(),
        vec![
            record("nikon_z8", None),
            record("nikon_z9", Some("https://web.archive.org/web/2023/z9")),
            record("nikon_zf", None),
        ],
    )
    .await;
    std::fs::write(dir.path().join("broken.yaml"), "- not\n- a mapping\n").unwrap();

    let snapshots = MockSnapshots::new().with_snapshot(&url("nikon_z8"), SNAPSHOT);
    let resolver = resolver(snapshots);
    let report = backfill_directory(dir.path(), &resolver, BackfillOptions::default())
        .await
        .unwrap();

    assert_eq!(report.scanned, 4);
    assert_eq!(report.updated, 1);
    assert_eq!(report.already_archived, 1);
    assert_eq!(report.not_found, 1);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].0.ends_with("broken.yaml"));
    assert!(report.to_string().starts_with("=== Archive Backfill Complete ==="));

    // No snapshot: the record keeps its null reference.
    let zf: Value =
        serde_yaml::from_str(&std::fs::read_to_string(dir.path().join("nikon_zf.yaml")).unwrap()).unwrap();
    assert!(zf[ARCHIVE_KEY].is_null());
}

#[tokio::test]
async fn overwrite_replaces_existing_reference() {
    let dir = tempfile::tempdir().unwrap();
    let sink = write_records(
        dir.path(),
        vec![record("nikon_z8", Some("https://web.archive.org/web/2019/old"))],
    )
    .await;
    let path = sink.path_for("nikon_z8");

    let snapshots = Arc::new(MockSnapshots::new().with_snapshot(&url("nikon_z8"), SNAPSHOT));
    let resolver = ArchiveResolver::new(
        snapshots.clone(),
        fast_limiter(),
        SnapshotStrategy::Latest,
        Duration::ZERO,
    );

    let skipped = backfill_file(&path, &resolver, BackfillOptions::default())
        .await
        .unwrap();
    assert_eq!(skipped, FileOutcome::AlreadyArchived);
    assert_eq!(snapshots.lookup_count(), 0);

    let options = BackfillOptions {
        overwrite: true,
        ..Default::default()
    };
    let replaced = backfill_file(&path, &resolver, options).await.unwrap();
    assert_eq!(replaced, FileOutcome::Updated(SNAPSHOT.to_string()));
    assert_eq!(snapshots.lookup_count(), 1);
}

#[tokio::test]
async fn create_requests_capture_when_no_snapshot_exists() {
    let dir = tempfile::tempdir().unwrap();
    let sink = write_records(dir.path(), vec![record("nikon_z8", None)]).await;
    let path = sink.path_for("nikon_z8");

    let snapshots = Arc::new(MockSnapshots::new().capture_result(SNAPSHOT));
    let resolver = ArchiveResolver::new(
        snapshots.clone(),
        fast_limiter(),
        SnapshotStrategy::Latest,
        Duration::ZERO,
    );

    let without = backfill_file(&path, &resolver, BackfillOptions::default())
        .await
        .unwrap();
    assert_eq!(without, FileOutcome::NotFound);
    assert_eq!(snapshots.capture_count(), 0);

    let options = BackfillOptions {
        create: true,
        ..Default::default()
    };
    let with = backfill_file(&path, &resolver, options).await.unwrap();
    assert_eq!(with, FileOutcome::Updated(SNAPSHOT.to_string()));
    assert_eq!(snapshots.capture_count(), 1);
}
