// src/models/config.rs

//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP fetching behavior (timeouts, retries, rate limits, concurrency)
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Sync pass defaults (auction target, page cap, dry-run)
    #[serde(default)]
    pub sync: SyncConfig,

    /// Live worker scheduling
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Selector profile for the bundled page parser
    #[serde(default)]
    pub parser: ParserConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults on any failure.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity. Runs before any
    /// network activity.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetch.user_agent is empty"));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(AppError::validation("fetch.timeout_secs must be > 0"));
        }
        if self.fetch.max_concurrent == 0 {
            return Err(AppError::validation("fetch.max_concurrent must be > 0"));
        }
        if !(self.fetch.requests_per_second.is_finite() && self.fetch.requests_per_second > 0.0) {
            return Err(AppError::validation(
                "fetch.requests_per_second must be a positive number",
            ));
        }
        if self.sync.max_pages == Some(0) {
            return Err(AppError::validation("sync.max_pages must be > 0 when set"));
        }
        if self.worker.interval_secs == Some(0) {
            return Err(AppError::validation(
                "worker.interval_secs must be > 0 when set (omit for a single pass)",
            ));
        }
        Ok(())
    }
}

/// HTTP fetching behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-attempt request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Retries after the first attempt (timeout, transport error, status >= 400)
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Base backoff delay in milliseconds; attempt n waits base * 2^n
    #[serde(default = "defaults::retry_base_ms")]
    pub retry_base_ms: u64,

    /// Per-host request rate ceiling
    #[serde(default = "defaults::requests_per_second")]
    pub requests_per_second: f64,

    /// In-flight cap for bulk detail fetches
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Bulk fetch backend
    #[serde(default)]
    pub backend: ConcurrencyBackend,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_retries: defaults::max_retries(),
            retry_base_ms: defaults::retry_base_ms(),
            requests_per_second: defaults::requests_per_second(),
            max_concurrent: defaults::max_concurrent(),
            backend: ConcurrencyBackend::default(),
        }
    }
}

/// Strategy for running bulk fetches under the concurrency cap.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ConcurrencyBackend {
    /// Buffered stream on the current task
    #[default]
    Cooperative,

    /// Spawned worker tasks draining a shared queue
    WorkerPool,
}

impl ConcurrencyBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cooperative => "cooperative",
            Self::WorkerPool => "worker-pool",
        }
    }
}

impl FromStr for ConcurrencyBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "cooperative" => Ok(Self::Cooperative),
            "worker-pool" => Ok(Self::WorkerPool),
            other => Err(AppError::config(format!(
                "unknown fetch backend '{other}' (expected 'cooperative' or 'worker-pool')"
            ))),
        }
    }
}

/// Sync pass defaults. The auction target can also come from CLI arguments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Auction code to sync
    #[serde(default)]
    pub auction_code: Option<String>,

    /// First listing page URL
    #[serde(default)]
    pub listing_url: Option<String>,

    /// Cap on listing pages per pass (first page included)
    #[serde(default)]
    pub max_pages: Option<u32>,

    /// Fetch and diff without writing auctions or lots
    #[serde(default)]
    pub dry_run: bool,

    /// Refetch every detail page regardless of hashes
    #[serde(default)]
    pub force_detail: bool,
}

/// Live worker scheduling settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Seconds between passes; omit to run a single pass and stop
    #[serde(default)]
    pub interval_secs: Option<u64>,
}

/// Selector profile for the bundled page parser. Site specifics live here,
/// not in code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// CSS selector for one lot row on a listing page
    #[serde(default = "defaults::entry_selector")]
    pub entry_selector: String,

    /// CSS selector for the lot code within a row
    #[serde(default = "defaults::code_selector")]
    pub code_selector: String,

    /// CSS selector for the lot title within a row
    #[serde(default = "defaults::title_selector")]
    pub title_selector: String,

    /// CSS selector for the detail link within a row
    #[serde(default = "defaults::link_selector")]
    pub link_selector: String,

    /// CSS selector for the status text within a row
    #[serde(default = "defaults::state_selector")]
    pub state_selector: String,

    /// CSS selector for the closing time within a row
    #[serde(default = "defaults::closing_selector")]
    pub closing_selector: String,

    /// CSS selector for the current bid within a row
    #[serde(default = "defaults::bid_selector")]
    pub bid_selector: String,

    /// CSS selector for the bid count within a row
    #[serde(default = "defaults::bid_count_selector")]
    pub bid_count_selector: String,

    /// CSS selector for the auction title on a listing page
    #[serde(default = "defaults::auction_title_selector")]
    pub auction_title_selector: String,

    /// CSS selector for the element carrying the total page count
    #[serde(default = "defaults::page_count_selector")]
    pub page_count_selector: String,

    /// Regex extracting the total page count from that element's text
    #[serde(default = "defaults::page_count_pattern")]
    pub page_count_pattern: String,

    /// Template for building page URLs from the count route, with `{base}`
    /// and `{page}` placeholders; when unset, page links are scraped instead
    #[serde(default)]
    pub page_url_template: Option<String>,

    /// CSS selector for pagination links (the fallback discovery route)
    #[serde(default = "defaults::page_link_selector")]
    pub page_link_selector: String,

    /// Selectors applied to detail pages
    #[serde(default)]
    pub detail: DetailSelectors,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            entry_selector: defaults::entry_selector(),
            code_selector: defaults::code_selector(),
            title_selector: defaults::title_selector(),
            link_selector: defaults::link_selector(),
            state_selector: defaults::state_selector(),
            closing_selector: defaults::closing_selector(),
            bid_selector: defaults::bid_selector(),
            bid_count_selector: defaults::bid_count_selector(),
            auction_title_selector: defaults::auction_title_selector(),
            page_count_selector: defaults::page_count_selector(),
            page_count_pattern: defaults::page_count_pattern(),
            page_url_template: None,
            page_link_selector: defaults::page_link_selector(),
            detail: DetailSelectors::default(),
        }
    }
}

/// CSS selectors applied to a lot detail page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailSelectors {
    #[serde(default = "defaults::detail_title_selector")]
    pub title_selector: String,

    #[serde(default = "defaults::detail_state_selector")]
    pub state_selector: String,

    #[serde(default = "defaults::detail_opens_selector")]
    pub opens_selector: String,

    #[serde(default = "defaults::detail_closing_selector")]
    pub closing_selector: String,

    #[serde(default = "defaults::detail_original_closing_selector")]
    pub original_closing_selector: String,

    #[serde(default = "defaults::detail_opening_bid_selector")]
    pub opening_bid_selector: String,

    #[serde(default = "defaults::detail_current_bid_selector")]
    pub current_bid_selector: String,

    #[serde(default = "defaults::detail_bid_count_selector")]
    pub bid_count_selector: String,

    #[serde(default = "defaults::detail_bidder_selector")]
    pub bidder_selector: String,

    #[serde(default = "defaults::detail_location_selector")]
    pub location_selector: String,
}

impl Default for DetailSelectors {
    fn default() -> Self {
        Self {
            title_selector: defaults::detail_title_selector(),
            state_selector: defaults::detail_state_selector(),
            opens_selector: defaults::detail_opens_selector(),
            closing_selector: defaults::detail_closing_selector(),
            original_closing_selector: defaults::detail_original_closing_selector(),
            opening_bid_selector: defaults::detail_opening_bid_selector(),
            current_bid_selector: defaults::detail_current_bid_selector(),
            bid_count_selector: defaults::detail_bid_count_selector(),
            bidder_selector: defaults::detail_bidder_selector(),
            location_selector: defaults::detail_location_selector(),
        }
    }
}

mod defaults {
    // Fetch defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; lotwatch/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_retries() -> u32 {
        3
    }
    pub fn retry_base_ms() -> u64 {
        500
    }
    pub fn requests_per_second() -> f64 {
        2.0
    }
    pub fn max_concurrent() -> usize {
        4
    }

    // Listing selectors
    pub fn entry_selector() -> String {
        ".lot-card".into()
    }
    pub fn code_selector() -> String {
        ".lot-code".into()
    }
    pub fn title_selector() -> String {
        ".lot-title".into()
    }
    pub fn link_selector() -> String {
        "a.lot-link".into()
    }
    pub fn state_selector() -> String {
        ".lot-status".into()
    }
    pub fn closing_selector() -> String {
        ".lot-closing".into()
    }
    pub fn bid_selector() -> String {
        ".lot-current-bid".into()
    }
    pub fn bid_count_selector() -> String {
        ".lot-bid-count".into()
    }
    pub fn auction_title_selector() -> String {
        "h1.auction-title".into()
    }

    // Pagination
    pub fn page_count_selector() -> String {
        ".pagination .page-info".into()
    }
    pub fn page_count_pattern() -> String {
        r"(?i)page\s*\d+\s*of\s*(\d+)".into()
    }
    pub fn page_link_selector() -> String {
        ".pagination a[href]".into()
    }

    // Detail selectors
    pub fn detail_title_selector() -> String {
        ".lot-detail-title".into()
    }
    pub fn detail_state_selector() -> String {
        ".lot-detail-status".into()
    }
    pub fn detail_opens_selector() -> String {
        ".lot-detail-opens".into()
    }
    pub fn detail_closing_selector() -> String {
        ".lot-detail-closing".into()
    }
    pub fn detail_original_closing_selector() -> String {
        ".lot-detail-closing-original".into()
    }
    pub fn detail_opening_bid_selector() -> String {
        ".lot-detail-opening-bid".into()
    }
    pub fn detail_current_bid_selector() -> String {
        ".lot-detail-current-bid".into()
    }
    pub fn detail_bid_count_selector() -> String {
        ".lot-detail-bid-count".into()
    }
    pub fn detail_bidder_selector() -> String {
        ".lot-detail-bidder".into()
    }
    pub fn detail_location_selector() -> String {
        ".lot-detail-location".into()
    }
}
