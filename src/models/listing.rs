// src/models/listing.rs

//! Parser output types: what a listing page and a detail page yield.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::LotState;

/// One lot row extracted from a listing page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingEntry {
    /// Lot code, unique within the auction
    pub lot_code: String,

    /// Lot title as shown on the listing
    pub title: String,

    /// Absolute URL of the lot's detail page, when the listing links one
    pub detail_url: Option<String>,

    pub state: LotState,
    pub closing_time: Option<DateTime<Utc>>,
    pub current_bid: Option<f64>,
    pub bid_count: Option<u32>,
}

/// Parsed view of one listing page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedListing {
    /// Auction title, when the page carries one
    pub auction_title: Option<String>,

    /// Lot entries in page order
    pub entries: Vec<ListingEntry>,

    /// Further listing page URLs in discovery order (absolute, deduplicated,
    /// excluding the page they were found on)
    pub page_urls: Vec<String>,
}

/// Detail-page fields for a lot. Every field is optional: detail layouts
/// vary and a missing field never fails the parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LotDetail {
    pub title: Option<String>,
    pub state: Option<LotState>,
    pub opens_at: Option<DateTime<Utc>>,
    pub closing_time_current: Option<DateTime<Utc>>,
    pub closing_time_original: Option<DateTime<Utc>>,
    pub opening_bid: Option<f64>,
    pub current_bid: Option<f64>,
    pub bid_count: Option<u32>,
    pub current_bidder: Option<String>,
    pub location: Option<String>,
}
