use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::info;

use crate::error::{DpreviewError, Result};
use crate::types::SnapshotStrategy;

const ENV_PREFIX: &str = "DPREVIEW_";

/// Scraper configuration loaded from `DPREVIEW_*` environment variables.
/// CLI flags override individual fields after loading.
#[derive(Debug, Clone)]
pub struct ScoutConfig {
    // Source
    pub base_url: String,
    pub listing_url: String,

    // Pacing
    pub requests_per_minute: u32,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
    pub request_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,

    // Fetcher
    pub browserless_url: String,
    pub browserless_token: Option<String>,

    // Storage
    pub output_dir: PathBuf,
    pub progress_file: PathBuf,
    pub label_map: Option<PathBuf>,

    // Filtering
    pub after_date: NaiveDate,
    pub max_entities: Option<usize>,

    // Archive
    pub fetch_archives: bool,
    pub create_archives: bool,
    pub archive_strategy: SnapshotStrategy,
    pub archive_save_interval: Duration,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.dpreview.com".to_string(),
            listing_url: "https://www.dpreview.com/products/cameras/all?view=list".to_string(),
            requests_per_minute: 20,
            jitter_min: Duration::from_millis(500),
            jitter_max: Duration::from_millis(2000),
            request_timeout: Duration::from_secs(30),
            retry_attempts: 3,
            retry_base_delay: Duration::from_secs(2),
            browserless_url: "http://localhost:3000".to_string(),
            browserless_token: None,
            output_dir: PathBuf::from("output"),
            progress_file: PathBuf::from(".scrape_progress.json"),
            label_map: None,
            after_date: NaiveDate::from_ymd_opt(2023, 3, 1).expect("valid default cutoff"),
            max_entities: None,
            fetch_archives: false,
            create_archives: false,
            archive_strategy: SnapshotStrategy::Latest,
            archive_save_interval: Duration::from_secs(5),
        }
    }
}

impl ScoutConfig {
    /// Load configuration from the environment (and `.env`, if present).
    /// Unset variables keep their defaults; malformed values are errors.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Keys are given without the prefix.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(&format!("{ENV_PREFIX}{key}")).filter(|v| !v.trim().is_empty())
        };
        let d = Self::default();

        let config = Self {
            base_url: get("BASE_URL").unwrap_or(d.base_url),
            listing_url: get("SEARCH_URL").unwrap_or(d.listing_url),
            requests_per_minute: parse_or(get("RATE_LIMIT_PER_MINUTE"), "RATE_LIMIT_PER_MINUTE", d.requests_per_minute)?,
            jitter_min: millis_or(get("JITTER_MIN_MS"), "JITTER_MIN_MS", d.jitter_min)?,
            jitter_max: millis_or(get("JITTER_MAX_MS"), "JITTER_MAX_MS", d.jitter_max)?,
            request_timeout: secs_or(get("REQUEST_TIMEOUT"), "REQUEST_TIMEOUT", d.request_timeout)?,
            retry_attempts: parse_or(get("RETRY_ATTEMPTS"), "RETRY_ATTEMPTS", d.retry_attempts)?,
            retry_base_delay: secs_or(get("RETRY_DELAY"), "RETRY_DELAY", d.retry_base_delay)?,
            browserless_url: get("BROWSERLESS_URL").unwrap_or(d.browserless_url),
            browserless_token: get("BROWSERLESS_TOKEN"),
            output_dir: get("OUTPUT_DIR").map(PathBuf::from).unwrap_or(d.output_dir),
            progress_file: get("PROGRESS_FILE").map(PathBuf::from).unwrap_or(d.progress_file),
            label_map: get("LABEL_MAP").map(PathBuf::from),
            after_date: parse_date_or(get("AFTER_DATE"), d.after_date)?,
            max_entities: get("LIMIT")
                .map(|v| parse_value::<usize>(&v, "LIMIT"))
                .transpose()?,
            fetch_archives: parse_or(get("FETCH_ARCHIVES"), "FETCH_ARCHIVES", d.fetch_archives)?,
            create_archives: parse_or(get("CREATE_ARCHIVES"), "CREATE_ARCHIVES", d.create_archives)?,
            archive_strategy: get("ARCHIVE_STRATEGY")
                .map(|v| v.parse::<SnapshotStrategy>())
                .transpose()?
                .unwrap_or(d.archive_strategy),
            archive_save_interval: secs_or(get("ARCHIVE_SAVE_INTERVAL"), "ARCHIVE_SAVE_INTERVAL", d.archive_save_interval)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the run meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.requests_per_minute == 0 {
            return Err(DpreviewError::Config(
                "requests per minute must be at least 1".to_string(),
            ));
        }
        if self.jitter_min > self.jitter_max {
            return Err(DpreviewError::Config(format!(
                "jitter bounds inverted ({:?} > {:?})",
                self.jitter_min, self.jitter_max
            )));
        }
        if self.retry_attempts == 0 {
            return Err(DpreviewError::Config(
                "retry attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Log the effective configuration with secrets masked.
    pub fn log_redacted(&self) {
        info!(
            base_url = self.base_url.as_str(),
            listing_url = self.listing_url.as_str(),
            rpm = self.requests_per_minute,
            timeout_secs = self.request_timeout.as_secs(),
            retries = self.retry_attempts,
            output_dir = %self.output_dir.display(),
            progress_file = %self.progress_file.display(),
            after = %self.after_date,
            limit = ?self.max_entities,
            archives = self.fetch_archives,
            archive_strategy = %self.archive_strategy,
            browserless_url = self.browserless_url.as_str(),
            browserless_token = %redact(self.browserless_token.as_deref()),
            "Configuration loaded"
        );
    }
}

fn redact(secret: Option<&str>) -> String {
    match secret {
        Some(s) if s.chars().count() > 4 => format!("{}...", s.chars().take(4).collect::<String>()),
        Some(_) => "****".to_string(),
        None => "(not set)".to_string(),
    }
}

fn parse_value<T: FromStr>(raw: &str, key: &str) -> Result<T> {
    raw.trim().parse::<T>().map_err(|_| {
        DpreviewError::Config(format!("{ENV_PREFIX}{key} has invalid value '{raw}'"))
    })
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    match raw {
        Some(v) => parse_value(&v, key),
        None => Ok(default),
    }
}

fn secs_or(raw: Option<String>, key: &str, default: Duration) -> Result<Duration> {
    match raw {
        Some(v) => {
            let secs: f64 = parse_value(&v, key)?;
            Duration::try_from_secs_f64(secs).map_err(|_| {
                DpreviewError::Config(format!("{ENV_PREFIX}{key} must be a non-negative number"))
            })
        }
        None => Ok(default),
    }
}

fn millis_or(raw: Option<String>, key: &str, default: Duration) -> Result<Duration> {
    parse_or(raw, key, default.as_millis() as u64).map(Duration::from_millis)
}

/// Parse a `YYYY-MM-DD` cutoff date.
pub fn parse_cutoff(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        DpreviewError::Config(format!("invalid cutoff date '{raw}' (expected YYYY-MM-DD)"))
    })
}

fn parse_date_or(raw: Option<String>, default: NaiveDate) -> Result<NaiveDate> {
    match raw {
        Some(v) => parse_cutoff(&v),
        None => Ok(default),
    }
}
