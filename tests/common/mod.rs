//! Shared fixtures for integration tests: a scripted fetcher, HTML builders
//! matching the default selector profile, and store wrappers.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use lotwatch::diff::StoredHashes;
use lotwatch::error::{AppError, Result};
use lotwatch::fetch::{FetchFailure, FetchOutcome, FetchResponse, Fetcher};
use lotwatch::models::{Config, RunCounters, RunStatus};
use lotwatch::store::{LotUpsert, MemoryStore, Store};

/// Serves canned bodies by URL and records every request.
#[derive(Default)]
pub struct StubFetcher {
    bodies: HashMap<String, String>,
    fail: HashSet<String>,
    requests: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, body: impl Into<String>) -> Self {
        self.bodies.insert(url.to_string(), body.into());
        self
    }

    pub fn with_failure(mut self, url: &str) -> Self {
        self.fail.insert(url.to_string());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|seen| seen.as_str() == url)
            .count()
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        self.requests.lock().unwrap().push(url.to_string());
        if self.fail.contains(url) {
            return Err(FetchFailure {
                url: url.to_string(),
                status: Some(503),
                attempts: 1,
                error: "HTTP status 503".to_string(),
            });
        }
        match self.bodies.get(url) {
            Some(body) => Ok(FetchResponse {
                url: url.to_string(),
                status: 200,
                body: body.clone(),
                attempts: 1,
            }),
            None => Err(FetchFailure {
                url: url.to_string(),
                status: Some(404),
                attempts: 1,
                error: "HTTP status 404".to_string(),
            }),
        }
    }
}

/// One lot row in the shape the default listing selectors expect.
pub fn lot_row(code: &str, title: &str, href: &str, state: &str, bid: &str, count: &str) -> String {
    format!(
        r#"<div class="lot-card">
  <span class="lot-code">{code}</span>
  <span class="lot-title">{title}</span>
  <a class="lot-link" href="{href}">view lot</a>
  <span class="lot-status">{state}</span>
  <span class="lot-current-bid">{bid}</span>
  <span class="lot-bid-count">{count}</span>
</div>"#
    )
}

/// A listing page with optional pagination links.
pub fn listing_page(auction_title: &str, rows: &[String], nav: &[&str]) -> String {
    let nav_links: String = nav
        .iter()
        .map(|href| format!(r#"<a href="{href}">page</a>"#))
        .collect();
    format!(
        r#"<html><body>
<h1 class="auction-title">{auction_title}</h1>
{rows}
<div class="pagination">{nav_links}</div>
</body></html>"#,
        rows = rows.join("\n")
    )
}

/// A detail page in the shape the default detail selectors expect.
pub fn detail_page(title: &str, state: &str, bid: &str, count: &str, bidder: &str) -> String {
    format!(
        r#"<html><body><div class="lot-detail">
  <h1 class="lot-detail-title">{title}</h1>
  <span class="lot-detail-status">{state}</span>
  <span class="lot-detail-current-bid">{bid}</span>
  <span class="lot-detail-bid-count">{count}</span>
  <span class="lot-detail-bidder">{bidder}</span>
  <span class="lot-detail-location">Hall B</span>
</div></body></html>"#
    )
}

/// Config pointed at a stub auction. Everything else stays at defaults.
pub fn test_config(auction_code: &str, listing_url: &str) -> Config {
    let mut config = Config::default();
    config.sync.auction_code = Some(auction_code.to_string());
    config.sync.listing_url = Some(listing_url.to_string());
    config
}

/// Store whose lot reconciliation always fails, for finalization tests.
#[derive(Default)]
pub struct FailingStore {
    pub inner: MemoryStore,
}

#[async_trait]
impl Store for FailingStore {
    async fn existing_hashes(&self, auction_id: i64) -> Result<HashMap<String, StoredHashes>> {
        self.inner.existing_hashes(auction_id).await
    }

    async fn upsert_auction(
        &self,
        code: &str,
        url: &str,
        title: &str,
        discovered_pages: &[String],
    ) -> Result<i64> {
        self.inner
            .upsert_auction(code, url, title, discovered_pages)
            .await
    }

    async fn upsert_lots(
        &self,
        _auction_id: i64,
        _writes: &[LotUpsert],
        _last_seen_at: DateTime<Utc>,
    ) -> Result<()> {
        Err(AppError::store("injected write failure"))
    }

    async fn create_run(
        &self,
        auction_code: &str,
        started_at: DateTime<Utc>,
        max_pages: Option<u32>,
        dry_run: bool,
    ) -> Result<i64> {
        self.inner
            .create_run(auction_code, started_at, max_pages, dry_run)
            .await
    }

    async fn finalize_run(
        &self,
        run_id: i64,
        status: RunStatus,
        finished_at: DateTime<Utc>,
        counters: &RunCounters,
        errors: &[String],
    ) -> Result<()> {
        self.inner
            .finalize_run(run_id, status, finished_at, counters, errors)
            .await
    }
}
