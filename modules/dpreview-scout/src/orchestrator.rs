//! Run driver: enumerate, skip completed, fetch, extract, archive, write, commit.
//!
//! Entities are processed one at a time in enumeration order. A failed entity
//! is logged and left out of the progress store so the next run retries it;
//! only progress-store persistence errors end the run early.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result};
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use typed_builder::TypedBuilder;

use dpreview_common::{EntitySummary, NormalizedRecord};

use crate::archive::ArchiveResolver;
use crate::extract::parse_utils::{absolutize, selector};
use crate::extract::{EntityExtractor, ExtractionContext, UnmappedLabel};
use crate::fetch::{FetchError, WaitConditions, OVERVIEW_READY, REVIEW_READY, SPECS_READY};
use crate::listing::ListEnumerator;
use crate::progress::ProgressStore;
use crate::stats::RunSummary;
use crate::traits::{PageFetcher, RecordSink};

static REVIEW_LINK: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"a.actionButtonLink[href*="/reviews/"]"#));

/// Per-entity lifecycle. Only `Complete` is ever persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Pending,
    Fetching,
    Extracting,
    Archiving,
    Writing,
    Complete,
    Skipped,
    Failed,
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityState::Pending => "PENDING",
            EntityState::Fetching => "FETCHING",
            EntityState::Extracting => "EXTRACTING",
            EntityState::Archiving => "ARCHIVING",
            EntityState::Writing => "WRITING",
            EntityState::Complete => "COMPLETE",
            EntityState::Skipped => "SKIPPED",
            EntityState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Why one entity did not complete.
#[derive(Debug, Error)]
pub enum EntityError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("output write failed: {0:#}")]
    Write(anyhow::Error),

    #[error("cancelled")]
    Cancelled,
}

struct Processed {
    archived: Option<bool>,
    unmapped: Vec<UnmappedLabel>,
}

#[derive(TypedBuilder)]
pub struct Orchestrator {
    /// Paced fetcher; every call consumes rate-limit tokens.
    fetcher: Arc<dyn PageFetcher>,
    extractor: EntityExtractor,
    sink: Arc<dyn RecordSink>,
    progress: ProgressStore,
    #[builder(default, setter(strip_option))]
    archive: Option<ArchiveResolver>,
    /// Ask the snapshot service for a capture when none exists.
    #[builder(default)]
    create_archives: bool,
    #[builder(default = Arc::new(AtomicBool::new(false)))]
    cancelled: Arc<AtomicBool>,
    #[builder(default = "https://www.dpreview.com".to_string(), setter(into))]
    base_url: String,
}

impl Orchestrator {
    pub fn progress(&self) -> &ProgressStore {
        &self.progress
    }

    pub fn into_progress(self) -> ProgressStore {
        self.progress
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Drive `entities` to exhaustion. Returns `Err` only for progress-store
    /// failures; per-entity failures are counted in the summary.
    pub async fn run(&mut self, entities: &mut ListEnumerator) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        info!(run_id = %summary.run_id, "Scrape run starting");
        self.progress.begin_run().context("Failed to record run start")?;

        loop {
            if self.is_cancelled() {
                info!("Scrape run cancelled, stopping at entity boundary");
                summary.cancelled = true;
                break;
            }
            let Some(entity) = entities.next().await else { break };
            summary.enumerated += 1;
            let id = entity.id.clone();

            if self.progress.is_complete(&id) {
                transition(&id, EntityState::Pending, EntityState::Skipped);
                summary.skipped += 1;
                continue;
            }

            let mut state = EntityState::Pending;
            match self.process(&entity, &mut state).await {
                Ok(done) => {
                    self.progress
                        .mark_complete(&id)
                        .with_context(|| format!("Failed to record completion of {id}"))?;
                    advance(&id, &mut state, EntityState::Complete);
                    summary.completed += 1;
                    match done.archived {
                        Some(true) => summary.archived += 1,
                        Some(false) => summary.archive_misses += 1,
                        None => {}
                    }
                    for u in done.unmapped {
                        *summary.unmapped_labels.entry(u.label).or_default() += 1;
                    }
                    info!(product_code = %id, completed = summary.completed, "Entity complete");
                }
                Err(EntityError::Cancelled) => {
                    info!(product_code = %id, "Entity abandoned on cancellation; not recorded");
                    summary.cancelled = true;
                    break;
                }
                Err(e) => {
                    let stage = state;
                    advance(&id, &mut state, EntityState::Failed);
                    error!(product_code = %id, stage = %stage, error = %e, "Entity failed");
                    self.progress
                        .mark_failed(&id, &e.to_string())
                        .with_context(|| format!("Failed to record failure of {id}"))?;
                    summary.failed += 1;
                    summary.failures.push((id, e.to_string()));
                }
            }
        }

        let listing = entities.stats();
        summary.filtered_by_date = listing.filtered_by_date as u32;
        summary.undated_included = listing.undated_included as u32;
        summary.listing_errors = listing.page_errors as u32;

        if !summary.cancelled {
            let total = self.progress.record().total.max(summary.enumerated as usize);
            self.progress.set_total(total).context("Failed to record total")?;
        }

        info!(
            run_id = %summary.run_id,
            completed = summary.completed,
            skipped = summary.skipped,
            failed = summary.failed,
            filtered_by_date = summary.filtered_by_date,
            "Scrape run finished"
        );
        Ok(summary)
    }

    /// One entity from fetch through write. Nothing here touches the progress
    /// store. `state` tracks the stage reached, so a failure reports where it happened.
    async fn process(&self, entity: &EntitySummary, state: &mut EntityState) -> Result<Processed, EntityError> {
        let id = entity.id.as_str();

        advance(id, state, EntityState::Fetching);
        let overview_html = self
            .fetcher
            .fetch(&entity.url, &WaitConditions::selector(OVERVIEW_READY))
            .await?;
        self.check_cancelled()?;

        let specs_url = format!("{}/specifications", entity.url.trim_end_matches('/'));
        let specs_html = self
            .fetcher
            .fetch(&specs_url, &WaitConditions::selector(SPECS_READY))
            .await?;
        self.check_cancelled()?;

        let review_html = match self.review_url(&overview_html) {
            Some(url) => match self.fetcher.fetch(&url, &WaitConditions::selector(REVIEW_READY)).await {
                Ok(html) => Some(html),
                Err(e) => {
                    warn!(product_code = %id, url = %url, error = %e, "Review page unavailable, continuing without it");
                    None
                }
            },
            None => {
                debug!(product_code = %id, "No review link on overview page");
                None
            }
        };
        self.check_cancelled()?;

        advance(id, state, EntityState::Extracting);
        let ctx = ExtractionContext {
            summary: entity.clone(),
            overview_html,
            specs_html,
            review_html,
        };
        let extraction = self.extractor.extract(&ctx);
        drop(ctx);
        let mut record: NormalizedRecord = extraction.record;

        // Snapshots target the detail page (`record.url`), never the review
        // page, so backfill (which only has `URL`) resolves the same snapshot.
        let archived = match &self.archive {
            Some(resolver) => {
                advance(id, state, EntityState::Archiving);
                record.archive_url = resolver.resolve(&record.url, self.create_archives).await;
                self.check_cancelled()?;
                Some(record.archive_url.is_some())
            }
            None => None,
        };

        advance(id, state, EntityState::Writing);
        self.sink.write(record).await.map_err(EntityError::Write)?;

        Ok(Processed {
            archived,
            unmapped: extraction.unmapped,
        })
    }

    fn check_cancelled(&self) -> Result<(), EntityError> {
        if self.is_cancelled() {
            return Err(EntityError::Cancelled);
        }
        Ok(())
    }

    fn review_url(&self, overview_html: &str) -> Option<String> {
        let doc = Html::parse_document(overview_html);
        let href = doc.select(&REVIEW_LINK).next()?.value().attr("href")?;
        Some(absolutize(&self.base_url, href))
    }
}

/// Raise the cancellation flag. Returns `true` if it was already raised,
/// meaning the caller asked twice and wants out now.
pub fn request_cancel(flag: &AtomicBool) -> bool {
    flag.swap(true, Ordering::Relaxed)
}

fn transition(id: &str, from: EntityState, to: EntityState) {
    debug!(product_code = %id, from = %from, to = %to, "Entity state");
}

fn advance(id: &str, state: &mut EntityState, to: EntityState) {
    transition(id, *state, to);
    *state = to;
}
