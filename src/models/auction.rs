// src/models/auction.rs

//! Auction and lot data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An auction event tracked by the crawler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Auction {
    /// Unique auction code (the upsert key)
    pub code: String,

    /// Canonical listing URL
    pub url: String,

    /// Auction display title
    pub title: String,

    /// Listing page URLs in discovery order, refreshed each pass
    pub discovered_pages: Vec<String>,
}

/// Lifecycle state of a lot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LotState {
    Scheduled,
    Running,
    Closed,
    Unknown,
}

impl LotState {
    /// Stable lowercase name, used in canonical fingerprints.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::Closed => "closed",
            Self::Unknown => "unknown",
        }
    }

    /// Map free-form status text onto a state, defaulting to `Unknown`.
    pub fn parse(text: &str) -> Self {
        let lower = text.trim().to_lowercase();
        if lower.is_empty() {
            return Self::Unknown;
        }
        const RUNNING: [&str; 4] = ["running", "live", "open", "bidding"];
        const CLOSED: [&str; 4] = ["closed", "ended", "sold", "finished"];
        const SCHEDULED: [&str; 3] = ["scheduled", "upcoming", "preview"];

        if RUNNING.iter().any(|k| lower.contains(k)) {
            Self::Running
        } else if CLOSED.iter().any(|k| lower.contains(k)) {
            Self::Closed
        } else if SCHEDULED.iter().any(|k| lower.contains(k)) {
            Self::Scheduled
        } else {
            Self::Unknown
        }
    }
}

impl std::fmt::Display for LotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lot persisted in the store, keyed by `(auction_code, lot_code)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lot {
    pub auction_code: String,
    pub lot_code: String,
    pub title: String,
    pub state: LotState,

    /// When bidding opens
    pub opens_at: Option<DateTime<Utc>>,

    /// Current closing time (moves on extensions)
    pub closing_time_current: Option<DateTime<Utc>>,

    /// Originally scheduled closing time
    pub closing_time_original: Option<DateTime<Utc>>,

    pub opening_bid: Option<f64>,
    pub current_bid: Option<f64>,
    pub bid_count: Option<u32>,
    pub current_bidder: Option<String>,
    pub location: Option<String>,

    /// Fingerprint of the listing-level field subset
    pub listing_hash: String,

    /// Fingerprint of the detail-level field subset; absent until a detail
    /// page has been fetched, cleared on a degraded write
    pub detail_hash: Option<String>,

    /// Last pass that observed this lot on a listing page
    pub last_seen_at: DateTime<Utc>,

    /// Last pass that refreshed this lot from its detail page
    pub detail_last_seen_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_parse_keywords() {
        assert_eq!(LotState::parse("Live bidding"), LotState::Running);
        assert_eq!(LotState::parse("SOLD"), LotState::Closed);
        assert_eq!(LotState::parse("Upcoming"), LotState::Scheduled);
        assert_eq!(LotState::parse("???"), LotState::Unknown);
        assert_eq!(LotState::parse(""), LotState::Unknown);
    }

    #[test]
    fn test_state_as_str_roundtrip() {
        for state in [
            LotState::Scheduled,
            LotState::Running,
            LotState::Closed,
            LotState::Unknown,
        ] {
            assert_eq!(LotState::parse(state.as_str()), state);
        }
    }
}
