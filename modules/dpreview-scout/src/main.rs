use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dpreview_common::{parse_cutoff, LabelMap, ScoutConfig, SnapshotStrategy};
use dpreview_scout::archive::ArchiveResolver;
use dpreview_scout::backfill::{backfill_directory, BackfillOptions};
use dpreview_scout::extract::EntityExtractor;
use dpreview_scout::fetch::{BrowserlessFetcher, PacedFetcher, RetryPolicy};
use dpreview_scout::listing::{DateFilter, ListEnumerator};
use dpreview_scout::orchestrator::{request_cancel, Orchestrator};
use dpreview_scout::progress::ProgressStore;
use dpreview_scout::rate_limiter::RateLimiter;
use dpreview_scout::sink::YamlDirectory;
use dpreview_scout::traits::PageFetcher;
use dpreview_scout::validate::validate_directory;
use wayback_client::WaybackClient;

#[derive(Parser)]
#[command(name = "dpreview-scout", about = "Resumable camera specification scraper")]
struct Cli {
    /// Debug-level logging for this crate
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Full run: enumerate, fetch, extract, write
    Scrape(ScrapeArgs),
    /// Enumerate matching entities without fetching details
    List(ListArgs),
    /// Check every record in a directory against the output schema
    Validate { dir: PathBuf },
    /// Add archive references to existing records
    Backfill(BackfillArgs),
    /// Print progress statistics
    Progress,
    /// Reset the progress store
    ClearProgress,
}

#[derive(Args)]
struct ListArgs {
    /// Only entities announced on or after this date (YYYY-MM-DD)
    #[arg(long)]
    after: Option<String>,
    /// Stop after this many entities
    #[arg(long)]
    limit: Option<usize>,
    /// Requests per minute
    #[arg(long)]
    rpm: Option<u32>,
}

#[derive(Args)]
struct ScrapeArgs {
    #[command(flatten)]
    list: ListArgs,
    #[arg(long)]
    output: Option<PathBuf>,
    /// Resolve archive references during the run
    #[arg(long)]
    archive: bool,
    /// Request captures when no snapshot exists (implies --archive)
    #[arg(long)]
    create_archives: bool,
    /// latest, earliest or closest:YYYYMMDD
    #[arg(long)]
    archive_strategy: Option<String>,
    /// Clear the progress store before running
    #[arg(long)]
    no_resume: bool,
    /// TOML file with extra `[labels]` entries
    #[arg(long)]
    label_map: Option<PathBuf>,
}

#[derive(Args)]
struct BackfillArgs {
    dir: PathBuf,
    #[arg(long)]
    create: bool,
    #[arg(long)]
    overwrite: bool,
    #[arg(long)]
    archive_strategy: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("dpreview={level}").parse()?)
                .add_directive(format!("dpreview_scout={level}").parse()?)
                .add_directive(format!("dpreview_common={level}").parse()?),
        )
        .init();

    let mut config = ScoutConfig::from_env().context("Invalid configuration")?;

    match cli.command {
        Command::Scrape(args) => scrape(&mut config, args).await,
        Command::List(args) => list(&mut config, args).await,
        Command::Validate { dir } => validate(&dir),
        Command::Backfill(args) => backfill(&mut config, args).await,
        Command::Progress => {
            let store = ProgressStore::load(&config.progress_file)?;
            println!("{}", store.stats());
            Ok(())
        }
        Command::ClearProgress => {
            ProgressStore::clear_path(&config.progress_file)?;
            println!("Progress cleared: {}", config.progress_file.display());
            Ok(())
        }
    }
}

fn apply_list_args(config: &mut ScoutConfig, args: &ListArgs) -> Result<()> {
    if let Some(after) = &args.after {
        config.after_date = parse_cutoff(after)?;
    }
    if args.limit.is_some() {
        config.max_entities = args.limit;
    }
    if let Some(rpm) = args.rpm {
        config.requests_per_minute = rpm;
    }
    config.validate()?;
    Ok(())
}

fn parse_strategy(config: &mut ScoutConfig, raw: Option<&str>) -> Result<()> {
    if let Some(raw) = raw {
        config.archive_strategy = raw.parse::<SnapshotStrategy>()?;
    }
    Ok(())
}

fn build_limiter(config: &ScoutConfig) -> Arc<RateLimiter> {
    Arc::new(
        RateLimiter::new(config.requests_per_minute).with_jitter(config.jitter_min, config.jitter_max),
    )
}

fn build_fetcher(config: &ScoutConfig, limiter: Arc<RateLimiter>) -> Result<Arc<dyn PageFetcher>> {
    let browserless = BrowserlessFetcher::new(
        &config.browserless_url,
        config.browserless_token.as_deref(),
        config.request_timeout,
    )
    .context("Failed to create Browserless client")?;

    Ok(Arc::new(PacedFetcher::new(
        Arc::new(browserless),
        limiter,
        config.request_timeout,
        RetryPolicy {
            attempts: config.retry_attempts,
            base_delay: config.retry_base_delay,
        },
    )))
}

fn build_resolver(config: &ScoutConfig, limiter: Arc<RateLimiter>) -> Result<ArchiveResolver> {
    let wayback = WaybackClient::new(config.request_timeout).context("Failed to create Wayback client")?;
    Ok(ArchiveResolver::new(
        Arc::new(wayback),
        limiter,
        config.archive_strategy.clone(),
        config.archive_save_interval,
    ))
}

fn enumerator(config: &ScoutConfig, fetcher: Arc<dyn PageFetcher>) -> ListEnumerator {
    ListEnumerator::new(
        fetcher,
        config.listing_url.clone(),
        config.base_url.clone(),
        DateFilter::new(Some(config.after_date)),
        config.max_entities,
    )
}

async fn scrape(config: &mut ScoutConfig, args: ScrapeArgs) -> Result<()> {
    apply_list_args(config, &args.list)?;
    parse_strategy(config, args.archive_strategy.as_deref())?;
    if let Some(output) = args.output {
        config.output_dir = output;
    }
    if let Some(path) = args.label_map {
        config.label_map = Some(path);
    }
    config.fetch_archives |= args.archive || args.create_archives;
    config.create_archives |= args.create_archives;
    config.log_redacted();

    // Configuration errors surface before any network work.
    let labels = match &config.label_map {
        Some(path) => LabelMap::with_overlay(path)?,
        None => LabelMap::builtin(),
    };
    if args.no_resume {
        warn!("--no-resume: clearing progress store");
        ProgressStore::clear_path(&config.progress_file)?;
    }
    let progress = ProgressStore::load(&config.progress_file)?;

    let cancelled = Arc::new(AtomicBool::new(false));
    {
        let cancelled = cancelled.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if request_cancel(&cancelled) {
                    warn!("Second interrupt, exiting without waiting");
                    std::process::exit(130);
                }
                warn!("Interrupt received, finishing at the next entity boundary (Ctrl-C again to force exit)");
            }
        });
    }

    let limiter = build_limiter(config);
    let fetcher = build_fetcher(config, limiter.clone())?;
    let sink = Arc::new(YamlDirectory::new(config.output_dir.clone()));

    let builder = Orchestrator::builder()
        .fetcher(fetcher.clone())
        .extractor(EntityExtractor::new(Arc::new(labels)))
        .sink(sink)
        .progress(progress)
        .create_archives(config.create_archives)
        .cancelled(cancelled)
        .base_url(config.base_url.clone());
    let mut orchestrator = if config.fetch_archives {
        builder.archive(build_resolver(config, limiter)?).build()
    } else {
        builder.build()
    };

    let mut entities = enumerator(config, fetcher);
    let summary = orchestrator.run(&mut entities).await?;

    println!("{summary}");
    println!("{}", orchestrator.progress().stats());
    Ok(())
}

async fn list(config: &mut ScoutConfig, args: ListArgs) -> Result<()> {
    apply_list_args(config, &args)?;
    let fetcher = build_fetcher(config, build_limiter(config))?;
    let mut entities = enumerator(config, fetcher);

    let mut count = 0;
    while let Some(entity) = entities.next().await {
        count += 1;
        println!(
            "{:<32} {:<40} {}",
            entity.id,
            entity.name,
            entity.announced_text.as_deref().unwrap_or("-")
        );
    }
    let stats = entities.stats();
    info!(
        count,
        pages = stats.pages_fetched,
        filtered_by_date = stats.filtered_by_date,
        undated_included = stats.undated_included,
        "Listing complete"
    );
    println!("\n{count} entities");
    Ok(())
}

fn validate(dir: &std::path::Path) -> Result<()> {
    let report = validate_directory(dir)?;
    println!("{report}");
    if !report.is_valid() {
        anyhow::bail!("{} invalid record(s) in {}", report.invalid_count(), dir.display());
    }
    Ok(())
}

async fn backfill(config: &mut ScoutConfig, args: BackfillArgs) -> Result<()> {
    parse_strategy(config, args.archive_strategy.as_deref())?;
    let resolver = build_resolver(config, build_limiter(config))?;
    let report = backfill_directory(
        &args.dir,
        &resolver,
        BackfillOptions {
            create: args.create,
            overwrite: args.overwrite,
        },
    )
    .await?;
    println!("{report}");
    Ok(())
}
