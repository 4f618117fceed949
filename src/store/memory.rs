// src/store/memory.rs

//! In-memory store backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::diff::StoredHashes;
use crate::error::{AppError, Result};
use crate::models::{Auction, Lot, RunCounters, RunStatus, SyncRun};
use crate::store::{LotUpsert, Store};

#[derive(Debug, Default)]
struct Inner {
    next_auction_id: i64,
    next_run_id: i64,
    ids_by_code: HashMap<String, i64>,
    auctions: HashMap<i64, Auction>,
    lots: HashMap<(i64, String), Lot>,
    runs: HashMap<i64, SyncRun>,
}

/// Store backend holding everything behind one async mutex. The default
/// choice for tests and dry experimentation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an auction row by code.
    pub async fn auction(&self, code: &str) -> Option<Auction> {
        let inner = self.inner.lock().await;
        let id = inner.ids_by_code.get(code)?;
        inner.auctions.get(id).cloned()
    }

    /// Look up one lot.
    pub async fn lot(&self, auction_code: &str, lot_code: &str) -> Option<Lot> {
        let inner = self.inner.lock().await;
        let id = inner.ids_by_code.get(auction_code)?;
        inner.lots.get(&(*id, lot_code.to_string())).cloned()
    }

    /// All lots of an auction, ordered by lot code.
    pub async fn lots_of(&self, auction_code: &str) -> Vec<Lot> {
        let inner = self.inner.lock().await;
        let Some(id) = inner.ids_by_code.get(auction_code) else {
            return Vec::new();
        };
        let mut lots: Vec<Lot> = inner
            .lots
            .iter()
            .filter(|((aid, _), _)| aid == id)
            .map(|(_, lot)| lot.clone())
            .collect();
        lots.sort_by(|a, b| a.lot_code.cmp(&b.lot_code));
        lots
    }

    /// Look up a run audit row.
    pub async fn run(&self, run_id: i64) -> Option<SyncRun> {
        self.inner.lock().await.runs.get(&run_id).cloned()
    }

    /// All run audit rows, oldest first.
    pub async fn runs(&self) -> Vec<SyncRun> {
        let inner = self.inner.lock().await;
        let mut runs: Vec<SyncRun> = inner.runs.values().cloned().collect();
        runs.sort_by_key(|r| r.id);
        runs
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn existing_hashes(&self, auction_id: i64) -> Result<HashMap<String, StoredHashes>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .lots
            .iter()
            .filter(|((aid, _), _)| *aid == auction_id)
            .map(|((_, code), lot)| {
                (
                    code.clone(),
                    StoredHashes {
                        listing_hash: lot.listing_hash.clone(),
                        detail_hash: lot.detail_hash.clone(),
                    },
                )
            })
            .collect())
    }

    async fn upsert_auction(
        &self,
        code: &str,
        url: &str,
        title: &str,
        discovered_pages: &[String],
    ) -> Result<i64> {
        let mut inner = self.inner.lock().await;
        let id = match inner.ids_by_code.get(code) {
            Some(id) => *id,
            None => {
                inner.next_auction_id += 1;
                let id = inner.next_auction_id;
                inner.ids_by_code.insert(code.to_string(), id);
                id
            }
        };
        inner.auctions.insert(
            id,
            Auction {
                code: code.to_string(),
                url: url.to_string(),
                title: title.to_string(),
                discovered_pages: discovered_pages.to_vec(),
            },
        );
        Ok(id)
    }

    async fn upsert_lots(
        &self,
        auction_id: i64,
        writes: &[LotUpsert],
        last_seen_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let auction_code = inner
            .auctions
            .get(&auction_id)
            .map(|a| a.code.clone())
            .ok_or_else(|| AppError::store(format!("unknown auction id {auction_id}")))?;

        for write in writes {
            let key = (auction_id, write.listing.lot_code.clone());
            let existing = inner.lots.get(&key).cloned();
            let lot = write.apply_to(existing, &auction_code, last_seen_at);
            inner.lots.insert(key, lot);
        }
        Ok(())
    }

    async fn create_run(
        &self,
        auction_code: &str,
        started_at: DateTime<Utc>,
        max_pages: Option<u32>,
        dry_run: bool,
    ) -> Result<i64> {
        let mut inner = self.inner.lock().await;
        inner.next_run_id += 1;
        let id = inner.next_run_id;
        inner.runs.insert(
            id,
            SyncRun {
                id,
                auction_code: auction_code.to_string(),
                started_at,
                finished_at: None,
                status: RunStatus::Running,
                counters: RunCounters::default(),
                error_count: 0,
                errors: Vec::new(),
                max_pages,
                dry_run,
            },
        );
        Ok(id)
    }

    async fn finalize_run(
        &self,
        run_id: i64,
        status: RunStatus,
        finished_at: DateTime<Utc>,
        counters: &RunCounters,
        errors: &[String],
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let run = inner
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| AppError::store(format!("unknown run id {run_id}")))?;
        run.status = status;
        run.finished_at = Some(finished_at);
        run.counters = *counters;
        run.error_count = errors.len() as u32;
        run.errors = errors.to_vec();
        Ok(())
    }
}
