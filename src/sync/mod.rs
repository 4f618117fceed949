// src/sync/mod.rs

//! One-pass sync engine: scan the listing pages of an auction, detect which
//! lots changed, fetch their detail pages, and reconcile the store.
//!
//! A pass always leaves a finished run row behind. The pass body runs inside
//! a panic boundary and finalization executes on every exit path, so an
//! aborted pass is still visible as `Failed` in the run history.

mod pages;

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use futures::FutureExt;

use crate::diff::{ChangeDetector, StoredHashes};
use crate::error::{AppError, Result};
use crate::fetch::{
    self, BulkFetcher, FetchFailure, FetchOutcome, Fetcher, RetryingFetcher,
};
use crate::models::{Config, ListingEntry, RunCounters, RunStatus, SyncRunResult};
use crate::parse::PageParser;
use crate::store::{LotUpsert, Store};

use pages::FirstPageError;

/// Options for a single engine, resolved from the `[sync]` config section.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub auction_code: String,
    pub listing_url: String,
    pub max_pages: Option<u32>,
    pub dry_run: bool,
    pub force_detail: bool,
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        let auction_code = config
            .sync
            .auction_code
            .clone()
            .filter(|code| !code.trim().is_empty())
            .ok_or_else(|| AppError::config("sync.auction_code is required"))?;
        let listing_url = config
            .sync
            .listing_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| AppError::config("sync.listing_url is required"))?;
        Ok(Self {
            auction_code,
            listing_url,
            max_pages: config.sync.max_pages,
            dry_run: config.sync.dry_run,
            force_detail: config.sync.force_detail,
        })
    }
}

/// Mutable pass state, kept outside the panic boundary so finalization sees
/// the counters and errors collected up to the point of failure.
#[derive(Debug, Default)]
struct PassState {
    failed: bool,
    counters: RunCounters,
    errors: Vec<String>,
}

fn lock_state(state: &Mutex<PassState>) -> MutexGuard<'_, PassState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// What a planned lot needs from the detail side.
struct LotPlan {
    entry: ListingEntry,
    listing_hash: String,
    prior_detail_hash: Option<String>,
    needs_detail: bool,
}

pub struct SyncEngine {
    store: Arc<dyn Store>,
    parser: Arc<dyn PageParser>,
    fetcher: Arc<dyn Fetcher>,
    bulk: Arc<dyn BulkFetcher>,
    detector: ChangeDetector,
    options: SyncOptions,
}

impl SyncEngine {
    /// Wire an engine from config, building the production HTTP fetcher.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn Store>,
        parser: Arc<dyn PageParser>,
    ) -> Result<Self> {
        let fetcher: Arc<dyn Fetcher> = Arc::new(RetryingFetcher::from_config(&config.fetch)?);
        Self::with_fetcher(config, store, parser, fetcher)
    }

    /// Wire an engine around an existing fetch capability. Tests inject stub
    /// fetchers here; the bulk backend is still built from config.
    pub fn with_fetcher(
        config: &Config,
        store: Arc<dyn Store>,
        parser: Arc<dyn PageParser>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        config.validate()?;
        let options = SyncOptions::from_config(config)?;
        let bulk = fetch::build_backend(
            config.fetch.backend,
            Arc::clone(&fetcher),
            config.fetch.max_concurrent,
        );
        let detector = if options.force_detail {
            ChangeDetector::forced()
        } else {
            ChangeDetector::new()
        };
        Ok(Self {
            store,
            parser,
            fetcher,
            bulk,
            detector,
            options,
        })
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Run one pass. Lot-level and page-level problems become error entries
    /// in the result, not an `Err`: the returned `Err` is reserved for
    /// failures before the run row exists.
    pub async fn run(&self) -> Result<SyncRunResult> {
        let started_at = Utc::now();
        let run_id = self
            .store
            .create_run(
                &self.options.auction_code,
                started_at,
                self.options.max_pages,
                self.options.dry_run,
            )
            .await?;
        log::info!(
            "run {} started for auction {} (dry_run={})",
            run_id,
            self.options.auction_code,
            self.options.dry_run
        );

        let state = Mutex::new(PassState::default());
        if let Err(panic) = AssertUnwindSafe(self.execute(&state)).catch_unwind().await {
            let message = panic_message(panic);
            log::error!("run {run_id}: pass panicked: {message}");
            let mut pass = lock_state(&state);
            pass.failed = true;
            pass.errors.push(format!("pass panicked: {message}"));
        }

        let PassState {
            failed,
            counters,
            mut errors,
        } = state
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let status = if failed {
            RunStatus::Failed
        } else {
            RunStatus::Success
        };

        if let Err(e) = self
            .store
            .finalize_run(run_id, status, Utc::now(), &counters, &errors)
            .await
        {
            log::error!("run {run_id}: finalization failed: {e}");
            errors.push(format!("finalization failed: {e}"));
        }

        let result = SyncRunResult {
            run_id,
            status,
            counters,
            errors,
        };
        log::info!("{result}");
        Ok(result)
    }

    async fn execute(&self, state: &Mutex<PassState>) {
        let opts = &self.options;

        let collection = match pages::collect(
            self.fetcher.as_ref(),
            self.parser.as_ref(),
            &opts.listing_url,
            opts.max_pages,
        )
        .await
        {
            Ok(collection) => collection,
            Err(FirstPageError(message)) => {
                let mut pass = lock_state(state);
                pass.failed = true;
                pass.errors.push(format!("first listing page: {message}"));
                return;
            }
        };
        {
            let mut pass = lock_state(state);
            pass.counters.pages_scanned = collection.pages_scanned;
            pass.errors.extend(collection.errors.iter().cloned());
        }

        // The auction row is written before the lots so the discovered page
        // set survives even when reconciliation later fails.
        let auction_title = collection
            .auction_title
            .clone()
            .unwrap_or_else(|| opts.auction_code.clone());
        let auction_id = if opts.dry_run {
            None
        } else {
            match self
                .store
                .upsert_auction(
                    &opts.auction_code,
                    &opts.listing_url,
                    &auction_title,
                    &collection.discovered_urls,
                )
                .await
            {
                Ok(id) => Some(id),
                Err(e) => {
                    let mut pass = lock_state(state);
                    pass.failed = true;
                    pass.errors.push(format!("auction upsert: {e}"));
                    return;
                }
            }
        };

        // Dry runs skip the hash lookup, so every lot reads as changed.
        let priors: HashMap<String, StoredHashes> = match auction_id {
            Some(id) => match self.store.existing_hashes(id).await {
                Ok(map) => map,
                Err(e) => {
                    let mut pass = lock_state(state);
                    pass.failed = true;
                    pass.errors.push(format!("hash lookup: {e}"));
                    return;
                }
            },
            None => HashMap::new(),
        };

        let plans = self.plan_lots(&collection, &priors, state);
        let writes = self.resolve_details(plans, state).await;

        if let Some(id) = auction_id {
            if !writes.is_empty() {
                if let Err(e) = self.store.upsert_lots(id, &writes, Utc::now()).await {
                    let mut pass = lock_state(state);
                    pass.failed = true;
                    pass.errors.push(format!("lot reconcile: {e}"));
                }
            }
        }
    }

    /// Fingerprint every entry and decide which lots need their detail page.
    /// Duplicate lot codes across pages count as scanned but are planned
    /// once; the first occurrence wins.
    fn plan_lots(
        &self,
        collection: &pages::PageCollection,
        priors: &HashMap<String, StoredHashes>,
        state: &Mutex<PassState>,
    ) -> Vec<LotPlan> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut plans = Vec::new();
        let mut scanned: u32 = 0;

        for entry in &collection.entries {
            scanned += 1;
            if !seen.insert(entry.lot_code.clone()) {
                log::debug!("duplicate listing entry for lot {}", entry.lot_code);
                continue;
            }
            let listing_hash = self.detector.listing_fingerprint(entry);
            let prior = priors.get(&entry.lot_code);
            let needs_detail = self.detector.needs_detail(prior, &listing_hash);
            plans.push(LotPlan {
                entry: entry.clone(),
                listing_hash,
                prior_detail_hash: prior.and_then(|hashes| hashes.detail_hash.clone()),
                needs_detail,
            });
        }

        lock_state(state).counters.lots_scanned = scanned;
        plans
    }

    /// Fetch detail pages for the lots that need them and turn every plan
    /// into a write. Detail failures degrade to a listing-only write with a
    /// cleared detail hash, which forces a retry on the next pass.
    async fn resolve_details(
        &self,
        plans: Vec<LotPlan>,
        state: &Mutex<PassState>,
    ) -> Vec<LotUpsert> {
        let jobs: Vec<(usize, String)> = plans
            .iter()
            .enumerate()
            .filter(|(_, plan)| plan.needs_detail)
            .filter_map(|(i, plan)| plan.entry.detail_url.clone().map(|url| (i, url)))
            .collect();
        let urls: Vec<String> = jobs.iter().map(|(_, url)| url.clone()).collect();
        log::info!(
            "{} of {} lots need a detail fetch",
            jobs.len(),
            plans.len()
        );

        let outcomes = self.bulk.fetch_many(urls).await;
        let mut by_plan: HashMap<usize, FetchOutcome> = jobs
            .into_iter()
            .map(|(i, _)| i)
            .zip(outcomes)
            .collect();

        let now = Utc::now();
        let mut writes = Vec::with_capacity(plans.len());
        let mut updated: u32 = 0;

        for (i, plan) in plans.into_iter().enumerate() {
            if !plan.needs_detail {
                writes.push(LotUpsert::touch(
                    plan.entry,
                    plan.listing_hash,
                    plan.prior_detail_hash,
                ));
                continue;
            }

            let lot_code = plan.entry.lot_code.clone();
            let outcome = match plan.entry.detail_url {
                Some(ref url) => by_plan.remove(&i).unwrap_or_else(|| {
                    Err(FetchFailure {
                        url: url.clone(),
                        status: None,
                        attempts: 0,
                        error: "detail fetch produced no outcome".to_string(),
                    })
                }),
                None => Err(FetchFailure {
                    url: String::new(),
                    status: None,
                    attempts: 0,
                    error: "listing entry has no detail link".to_string(),
                }),
            };

            match outcome {
                Ok(response) => {
                    match self.parser.parse_detail_page(&response.body, &lot_code) {
                        Ok(detail) => {
                            let detail_hash = self.detector.detail_fingerprint(&plan.entry, &detail);
                            writes.push(LotUpsert::full(
                                plan.entry,
                                detail,
                                plan.listing_hash,
                                detail_hash,
                                now,
                            ));
                        }
                        Err(e) => {
                            log::warn!("lot {lot_code}: detail parse failed: {e}");
                            lock_state(state)
                                .errors
                                .push(format!("lot {lot_code}: {e}"));
                            writes.push(LotUpsert::degraded(plan.entry, plan.listing_hash));
                        }
                    }
                }
                Err(failure) => {
                    log::warn!("lot {lot_code}: detail fetch failed: {}", failure.error);
                    lock_state(state)
                        .errors
                        .push(format!("lot {lot_code}: {failure}"));
                    writes.push(LotUpsert::degraded(plan.entry, plan.listing_hash));
                }
            }
            updated += 1;
        }

        lock_state(state).counters.lots_updated = updated;
        writes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyncConfig;

    fn config_with_sync(sync: SyncConfig) -> Config {
        Config {
            sync,
            ..Config::default()
        }
    }

    #[test]
    fn test_options_require_auction_code_and_url() {
        let config = config_with_sync(SyncConfig {
            auction_code: None,
            listing_url: Some("https://example.com/a".to_string()),
            ..SyncConfig::default()
        });
        assert!(SyncOptions::from_config(&config).is_err());

        let config = config_with_sync(SyncConfig {
            auction_code: Some("SPRING".to_string()),
            listing_url: Some("  ".to_string()),
            ..SyncConfig::default()
        });
        assert!(SyncOptions::from_config(&config).is_err());

        let config = config_with_sync(SyncConfig {
            auction_code: Some("SPRING".to_string()),
            listing_url: Some("https://example.com/a".to_string()),
            ..SyncConfig::default()
        });
        let options = SyncOptions::from_config(&config).unwrap();
        assert_eq!(options.auction_code, "SPRING");
        assert!(!options.dry_run);
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed), "boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new("owned".to_string());
        assert_eq!(panic_message(boxed), "owned");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(17_u8);
        assert_eq!(panic_message(boxed), "unknown panic");
    }
}
