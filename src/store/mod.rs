// src/store/mod.rs

//! Persistence contract and bundled backends.
//!
//! The sync engine talks to the [`Store`] trait only. Bundled backends:
//! [`MemoryStore`] for tests and dry experimentation, [`JsonStore`] for a
//! single-file development store. Production deployments implement [`Store`]
//! over their own database; the contract is five calls per pass at most.

pub mod json;
pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::diff::StoredHashes;
use crate::error::Result;
use crate::models::{ListingEntry, Lot, LotDetail, LotState, RunCounters, RunStatus};

pub use json::JsonStore;
pub use memory::MemoryStore;

/// One lot row to reconcile at the end of a pass.
///
/// The payload encodes the write kind: a full write carries a detail record
/// and a fresh detail hash, a degraded write carries neither (clearing the
/// stored hash so the next pass retries the detail), and a touch write
/// carries no detail but keeps the prior hash.
#[derive(Debug, Clone, PartialEq)]
pub struct LotUpsert {
    /// Freshly parsed listing entry
    pub listing: ListingEntry,

    /// Detail payload; `None` preserves stored detail fields
    pub detail: Option<LotDetail>,

    /// Fresh listing fingerprint
    pub listing_hash: String,

    /// `Some` stores the hash, `None` clears it
    pub detail_hash: Option<String>,

    /// Set only when the detail page was fetched this pass
    pub detail_seen_at: Option<DateTime<Utc>>,
}

impl LotUpsert {
    /// Write with a freshly fetched detail record.
    pub fn full(
        listing: ListingEntry,
        detail: LotDetail,
        listing_hash: String,
        detail_hash: String,
        detail_seen_at: DateTime<Utc>,
    ) -> Self {
        Self {
            listing,
            detail: Some(detail),
            listing_hash,
            detail_hash: Some(detail_hash),
            detail_seen_at: Some(detail_seen_at),
        }
    }

    /// Listing-only write after a failed or impossible detail fetch. Clears
    /// the stored detail hash so the next pass retries.
    pub fn degraded(listing: ListingEntry, listing_hash: String) -> Self {
        Self {
            listing,
            detail: None,
            listing_hash,
            detail_hash: None,
            detail_seen_at: None,
        }
    }

    /// Freshness-only write for an unchanged lot.
    pub fn touch(
        listing: ListingEntry,
        listing_hash: String,
        prior_detail_hash: Option<String>,
    ) -> Self {
        Self {
            listing,
            detail: None,
            listing_hash,
            detail_hash: prior_detail_hash,
            detail_seen_at: None,
        }
    }

    /// Merge this write into an existing row, or create one. Shared by the
    /// bundled backends so both honor the same preserve-on-`None` rules.
    pub fn apply_to(
        &self,
        existing: Option<Lot>,
        auction_code: &str,
        last_seen_at: DateTime<Utc>,
    ) -> Lot {
        let mut lot = existing.unwrap_or_else(|| Lot {
            auction_code: auction_code.to_string(),
            lot_code: self.listing.lot_code.clone(),
            title: String::new(),
            state: LotState::Unknown,
            opens_at: None,
            closing_time_current: None,
            closing_time_original: None,
            opening_bid: None,
            current_bid: None,
            bid_count: None,
            current_bidder: None,
            location: None,
            listing_hash: String::new(),
            detail_hash: None,
            last_seen_at,
            detail_last_seen_at: None,
        });

        lot.title = self.listing.title.clone();
        lot.state = self.listing.state;
        if let Some(t) = self.listing.closing_time {
            lot.closing_time_current = Some(t);
        }
        if let Some(b) = self.listing.current_bid {
            lot.current_bid = Some(b);
        }
        if let Some(c) = self.listing.bid_count {
            lot.bid_count = Some(c);
        }

        if let Some(detail) = &self.detail {
            if let Some(title) = &detail.title {
                lot.title = title.clone();
            }
            if let Some(state) = detail.state {
                lot.state = state;
            }
            if let Some(t) = detail.opens_at {
                lot.opens_at = Some(t);
            }
            if let Some(t) = detail.closing_time_current {
                lot.closing_time_current = Some(t);
            }
            if let Some(t) = detail.closing_time_original {
                lot.closing_time_original = Some(t);
            }
            if let Some(b) = detail.opening_bid {
                lot.opening_bid = Some(b);
            }
            if let Some(b) = detail.current_bid {
                lot.current_bid = Some(b);
            }
            if let Some(c) = detail.bid_count {
                lot.bid_count = Some(c);
            }
            if let Some(bidder) = &detail.current_bidder {
                lot.current_bidder = Some(bidder.clone());
            }
            if let Some(location) = &detail.location {
                lot.location = Some(location.clone());
            }
        }

        lot.listing_hash = self.listing_hash.clone();
        lot.detail_hash = self.detail_hash.clone();
        lot.last_seen_at = last_seen_at;
        if let Some(seen) = self.detail_seen_at {
            lot.detail_last_seen_at = Some(seen);
        }
        lot
    }
}

/// Persistence contract for the sync engine.
#[async_trait]
pub trait Store: Send + Sync {
    /// Prior fingerprints for every stored lot of the auction, keyed by lot
    /// code. One call per pass.
    async fn existing_hashes(&self, auction_id: i64) -> Result<HashMap<String, StoredHashes>>;

    /// Create or update the auction row, returning its id.
    async fn upsert_auction(
        &self,
        code: &str,
        url: &str,
        title: &str,
        discovered_pages: &[String],
    ) -> Result<i64>;

    /// Reconcile all lot writes of one pass in a single transaction.
    /// `last_seen_at` applies to every write in the batch.
    async fn upsert_lots(
        &self,
        auction_id: i64,
        writes: &[LotUpsert],
        last_seen_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Open a run audit row in `Running` state, returning the run id.
    async fn create_run(
        &self,
        auction_code: &str,
        started_at: DateTime<Utc>,
        max_pages: Option<u32>,
        dry_run: bool,
    ) -> Result<i64>;

    /// Write the run's terminal status, counters, and errors.
    async fn finalize_run(
        &self,
        run_id: i64,
        status: RunStatus,
        finished_at: DateTime<Utc>,
        counters: &RunCounters,
        errors: &[String],
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry() -> ListingEntry {
        ListingEntry {
            lot_code: "L-001".to_string(),
            title: "Vintage Clock".to_string(),
            detail_url: Some("https://example.com/lots/l-001".to_string()),
            state: LotState::Running,
            closing_time: None,
            current_bid: Some(120.0),
            bid_count: Some(3),
        }
    }

    fn full_lot() -> Lot {
        let detail = LotDetail {
            current_bidder: Some("bidder-9".to_string()),
            location: Some("Hall B".to_string()),
            opening_bid: Some(50.0),
            ..LotDetail::default()
        };
        let write = LotUpsert::full(
            entry(),
            detail,
            "lh-1".to_string(),
            "dh-1".to_string(),
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        );
        write.apply_to(
            None,
            "SPRING",
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_full_write_applies_detail_fields() {
        let lot = full_lot();
        assert_eq!(lot.current_bidder.as_deref(), Some("bidder-9"));
        assert_eq!(lot.opening_bid, Some(50.0));
        assert_eq!(lot.detail_hash.as_deref(), Some("dh-1"));
        assert!(lot.detail_last_seen_at.is_some());
    }

    #[test]
    fn test_touch_preserves_detail_fields_and_hash() {
        let stored = full_lot();
        let later = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let touch = LotUpsert::touch(entry(), "lh-1".to_string(), Some("dh-1".to_string()));
        let lot = touch.apply_to(Some(stored.clone()), "SPRING", later);

        assert_eq!(lot.current_bidder.as_deref(), Some("bidder-9"));
        assert_eq!(lot.detail_hash.as_deref(), Some("dh-1"));
        assert_eq!(lot.last_seen_at, later);
        // detail freshness unchanged by a touch
        assert_eq!(lot.detail_last_seen_at, stored.detail_last_seen_at);
    }

    #[test]
    fn test_degraded_clears_hash_but_keeps_display_fields() {
        let stored = full_lot();
        let later = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let degraded = LotUpsert::degraded(entry(), "lh-2".to_string());
        let lot = degraded.apply_to(Some(stored), "SPRING", later);

        assert_eq!(lot.detail_hash, None);
        assert_eq!(lot.listing_hash, "lh-2");
        // stale display data beats no data
        assert_eq!(lot.current_bidder.as_deref(), Some("bidder-9"));
    }

    #[test]
    fn test_degraded_write_creates_listing_only_row() {
        let degraded = LotUpsert::degraded(entry(), "lh-1".to_string());
        let lot = degraded.apply_to(None, "SPRING", Utc::now());
        assert_eq!(lot.title, "Vintage Clock");
        assert_eq!(lot.current_bid, Some(120.0));
        assert_eq!(lot.detail_hash, None);
        assert_eq!(lot.current_bidder, None);
    }
}
