// src/store/json.rs

//! Single-file JSON store backend.
//!
//! Keeps the whole store in one JSON document and rewrites it atomically
//! (write to temp, then rename) on every mutation. Mutations build the next
//! state first and only adopt it after the file write succeeds, so a failed
//! write leaves both file and memory on the previous state. Intended for
//! development and small deployments.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::diff::StoredHashes;
use crate::error::{AppError, Result};
use crate::models::{Auction, Lot, RunCounters, RunStatus, SyncRun};
use crate::store::{LotUpsert, Store};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct State {
    #[serde(default)]
    next_auction_id: i64,

    #[serde(default)]
    next_run_id: i64,

    #[serde(default)]
    auctions: Vec<AuctionRow>,

    #[serde(default)]
    lots: Vec<Lot>,

    #[serde(default)]
    runs: Vec<SyncRun>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AuctionRow {
    id: i64,

    #[serde(flatten)]
    auction: Auction,
}

impl State {
    fn auction_code(&self, auction_id: i64) -> Option<&str> {
        self.auctions
            .iter()
            .find(|row| row.id == auction_id)
            .map(|row| row.auction.code.as_str())
    }
}

/// File-backed store backend.
pub struct JsonStore {
    path: PathBuf,
    state: Mutex<State>,
}

impl JsonStore {
    /// Open a store file, starting empty when the file does not exist.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => State::default(),
            Err(e) => return Err(AppError::Io(e)),
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Write the given state atomically.
    async fn flush(&self, state: &State) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let bytes = serde_json::to_vec_pretty(state)?;

        let tmp = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// All auctions on file.
    pub async fn auctions(&self) -> Vec<Auction> {
        let state = self.state.lock().await;
        state.auctions.iter().map(|row| row.auction.clone()).collect()
    }

    /// All lots of an auction, ordered by lot code.
    pub async fn lots_of(&self, auction_code: &str) -> Vec<Lot> {
        let state = self.state.lock().await;
        let mut lots: Vec<Lot> = state
            .lots
            .iter()
            .filter(|lot| lot.auction_code == auction_code)
            .cloned()
            .collect();
        lots.sort_by(|a, b| a.lot_code.cmp(&b.lot_code));
        lots
    }

    /// Run audit rows, oldest first.
    pub async fn runs(&self) -> Vec<SyncRun> {
        let state = self.state.lock().await;
        let mut runs = state.runs.clone();
        runs.sort_by_key(|r| r.id);
        runs
    }
}

#[async_trait]
impl Store for JsonStore {
    async fn existing_hashes(&self, auction_id: i64) -> Result<HashMap<String, StoredHashes>> {
        let state = self.state.lock().await;
        let Some(code) = state.auction_code(auction_id) else {
            return Ok(HashMap::new());
        };
        Ok(state
            .lots
            .iter()
            .filter(|lot| lot.auction_code == code)
            .map(|lot| {
                (
                    lot.lot_code.clone(),
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
        let mut state = self.state.lock().await;
        let mut next = state.clone();

        let auction = Auction {
            code: code.to_string(),
            url: url.to_string(),
            title: title.to_string(),
            discovered_pages: discovered_pages.to_vec(),
        };
        let id = match next.auctions.iter_mut().find(|row| row.auction.code == code) {
            Some(row) => {
                row.auction = auction;
                row.id
            }
            None => {
                next.next_auction_id += 1;
                let id = next.next_auction_id;
                next.auctions.push(AuctionRow { id, auction });
                id
            }
        };

        self.flush(&next).await?;
        *state = next;
        Ok(id)
    }

    async fn upsert_lots(
        &self,
        auction_id: i64,
        writes: &[LotUpsert],
        last_seen_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();

        let code = next
            .auction_code(auction_id)
            .ok_or_else(|| AppError::store(format!("unknown auction id {auction_id}")))?
            .to_string();

        for write in writes {
            let position = next.lots.iter().position(|lot| {
                lot.auction_code == code && lot.lot_code == write.listing.lot_code
            });
            match position {
                Some(i) => {
                    let merged = write.apply_to(Some(next.lots[i].clone()), &code, last_seen_at);
                    next.lots[i] = merged;
                }
                None => next.lots.push(write.apply_to(None, &code, last_seen_at)),
            }
        }

        self.flush(&next).await?;
        *state = next;
        Ok(())
    }

    async fn create_run(
        &self,
        auction_code: &str,
        started_at: DateTime<Utc>,
        max_pages: Option<u32>,
        dry_run: bool,
    ) -> Result<i64> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();

        next.next_run_id += 1;
        let id = next.next_run_id;
        next.runs.push(SyncRun {
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
        });

        self.flush(&next).await?;
        *state = next;
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
        let mut state = self.state.lock().await;
        let mut next = state.clone();

        let run = next
            .runs
            .iter_mut()
            .find(|r| r.id == run_id)
            .ok_or_else(|| AppError::store(format!("unknown run id {run_id}")))?;
        run.status = status;
        run.finished_at = Some(finished_at);
        run.counters = *counters;
        run.error_count = errors.len() as u32;
        run.errors = errors.to_vec();

        self.flush(&next).await?;
        *state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ListingEntry, LotState};
    use tempfile::TempDir;

    fn entry(code: &str) -> ListingEntry {
        ListingEntry {
            lot_code: code.to_string(),
            title: format!("Lot {code}"),
            detail_url: None,
            state: LotState::Running,
            closing_time: None,
            current_bid: Some(10.0),
            bid_count: None,
        }
    }

    #[tokio::test]
    async fn test_open_missing_file_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let store = JsonStore::open(tmp.path().join("store.json")).await.unwrap();
        assert!(store.auctions().await.is_empty());
        assert!(store.runs().await.is_empty());
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.json");

        {
            let store = JsonStore::open(&path).await.unwrap();
            let id = store
                .upsert_auction("SPRING", "https://x/1", "Spring", &["https://x/1".to_string()])
                .await
                .unwrap();
            let writes = vec![LotUpsert::degraded(entry("L-001"), "lh-1".to_string())];
            store.upsert_lots(id, &writes, Utc::now()).await.unwrap();

            let run_id = store.create_run("SPRING", Utc::now(), None, false).await.unwrap();
            store
                .finalize_run(
                    run_id,
                    RunStatus::Success,
                    Utc::now(),
                    &RunCounters::default(),
                    &[],
                )
                .await
                .unwrap();
        }

        let reopened = JsonStore::open(&path).await.unwrap();
        let auctions = reopened.auctions().await;
        assert_eq!(auctions.len(), 1);
        assert_eq!(auctions[0].code, "SPRING");

        let lots = reopened.lots_of("SPRING").await;
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].listing_hash, "lh-1");

        let runs = reopened.runs().await;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Success);
    }

    #[tokio::test]
    async fn test_no_temp_file_left_behind() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.json");
        let store = JsonStore::open(&path).await.unwrap();
        store
            .upsert_auction("SPRING", "https://x/1", "Spring", &[])
            .await
            .unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_hash_lookup_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = JsonStore::open(tmp.path().join("store.json")).await.unwrap();
        let id = store
            .upsert_auction("SPRING", "https://x/1", "Spring", &[])
            .await
            .unwrap();

        let writes = vec![
            LotUpsert::degraded(entry("L-001"), "lh-1".to_string()),
            LotUpsert::degraded(entry("L-002"), "lh-2".to_string()),
        ];
        store.upsert_lots(id, &writes, Utc::now()).await.unwrap();

        let hashes = store.existing_hashes(id).await.unwrap();
        assert_eq!(hashes.len(), 2);
        assert_eq!(hashes["L-002"].listing_hash, "lh-2");
    }

    #[tokio::test]
    async fn test_unknown_auction_id_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = JsonStore::open(tmp.path().join("store.json")).await.unwrap();
        let writes = vec![LotUpsert::degraded(entry("L-001"), "lh-1".to_string())];
        assert!(store.upsert_lots(42, &writes, Utc::now()).await.is_err());
    }
}
