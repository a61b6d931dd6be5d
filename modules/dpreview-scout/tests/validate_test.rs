//! Integration tests: records written by a scrape run pass schema validation,
//! before and after backfill, and hand-damaged records are reported.

use std::sync::Arc;
use std::time::Duration;

use dpreview_common::{LabelMap, SnapshotStrategy};
use dpreview_scout::archive::ArchiveResolver;
use dpreview_scout::backfill::{backfill_directory, BackfillOptions};
use dpreview_scout::extract::EntityExtractor;
use dpreview_scout::listing::{DateFilter, ListEnumerator};
use dpreview_scout::orchestrator::Orchestrator;
use dpreview_scout::progress::ProgressStore;
use dpreview_scout::sink::YamlDirectory;
use dpreview_scout::testing::fixtures::{self, ListingRow, BASE_URL, LISTING_URL};
use dpreview_scout::testing::{fast_limiter, MockFetcher, MockSnapshots};
use dpreview_scout::validate::{validate_directory, Problem};

async fn scrape_into(out: &std::path::Path, state: &std::path::Path) {
    let rows = [
        ListingRow::new("fujifilm_xt5", "Fujifilm X-T5", Some("Nov 2, 2022")),
        ListingRow::new("sony_a7iv", "Sony a7 IV", None),
    ];
    let mock = MockFetcher::new().on_page(LISTING_URL, &fixtures::listing_page(&rows, false));
    let mock = fixtures::with_entity(mock, "fujifilm_xt5", "Fujifilm X-T5", true);
    let mock = Arc::new(fixtures::with_entity(mock, "sony_a7iv", "Sony a7 IV", false));

    let mut orch = Orchestrator::builder()
        .fetcher(mock.clone())
        .extractor(EntityExtractor::new(Arc::new(LabelMap::builtin())))
        .sink(Arc::new(YamlDirectory::new(out)))
        .progress(ProgressStore::load(state.join("progress.json")).unwrap())
        .base_url(BASE_URL)
        .build();
    let mut entities = ListEnumerator::new(mock, LISTING_URL, BASE_URL, DateFilter::default(), None);
    let summary = orch.run(&mut entities).await.unwrap();
    assert_eq!(summary.completed, 2);
}

#[tokio::test]
async fn scraped_records_validate_before_and_after_backfill() {
    let out = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();
    scrape_into(out.path(), state.path()).await;

    let report = validate_directory(out.path()).unwrap();
    assert_eq!(report.files.len(), 2);
    assert!(report.is_valid(), "{report}");

    let snapshots = MockSnapshots::new().capture_result("https://web.archive.org/web/2024/x");
    let resolver = ArchiveResolver::new(
        Arc::new(snapshots),
        fast_limiter(),
        SnapshotStrategy::Latest,
        Duration::ZERO,
    );
    let options = BackfillOptions {
        create: true,
        ..Default::default()
    };
    let backfilled = backfill_directory(out.path(), &resolver, options).await.unwrap();
    assert_eq!(backfilled.updated, 2);

    let report = validate_directory(out.path()).unwrap();
    assert!(report.is_valid(), "{report}");
}

#[tokio::test]
async fn damaged_records_are_reported_per_file() {
    let out = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();
    scrape_into(out.path(), state.path()).await;

    // Drop a required key from one record and corrupt another file entirely.
    let path = out.path().join("sony_a7iv.yaml");
    let text = std::fs::read_to_string(&path).unwrap();
    let damaged: String = text
        .lines()
        .filter(|l| !l.starts_with("Award:"))
        .map(|l| format!("{l}\n"))
        .collect();
    std::fs::write(&path, damaged).unwrap();
    std::fs::write(out.path().join("zz_garbage.yaml"), "ProductCode: [unclosed").unwrap();

    let report = validate_directory(out.path()).unwrap();
    assert_eq!(report.files.len(), 3);
    assert_eq!(report.invalid_count(), 2);

    let sony = report
        .files
        .iter()
        .find(|f| f.path.ends_with("sony_a7iv.yaml"))
        .unwrap();
    assert_eq!(sony.problems, vec![Problem::MissingKey("Award".into())]);

    let garbage = report.files.last().unwrap();
    assert!(matches!(garbage.problems.as_slice(), [Problem::Unparseable(_)]));

    let text = report.to_string();
    assert!(text.contains("OK      "));
    assert!(text.ends_with("3 file(s) checked, 2 invalid"));
}
