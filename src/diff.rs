// src/diff.rs

//! Change detection for lots.
//!
//! Computes canonical fingerprints over a fixed subset of listing and detail
//! fields, and decides whether a lot's detail page needs refetching. Both
//! sides of a comparison must canonicalize identically, so all formatting
//! rules live here and nowhere else.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::{ListingEntry, LotDetail, LotState};

/// Separator between canonical fields. Never appears in normalized text.
const FIELD_SEP: char = '\u{1f}';

/// Prior fingerprints for one lot, as loaded from the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredHashes {
    pub listing_hash: String,
    pub detail_hash: Option<String>,
}

/// Detector deciding which lots need a detail refetch.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector {
    /// Refetch every detail page regardless of stored hashes
    force_detail: bool,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self {
            force_detail: false,
        }
    }

    /// Create a detector that always schedules detail refetches.
    pub fn forced() -> Self {
        Self { force_detail: true }
    }

    /// Fingerprint of the listing-level field subset.
    ///
    /// Field order is fixed; changing it would invalidate every stored hash.
    pub fn listing_fingerprint(&self, entry: &ListingEntry) -> String {
        digest(&[
            normalize(&entry.lot_code),
            normalize(&entry.title),
            entry.state.as_str().to_string(),
            fmt_time(entry.closing_time),
            fmt_amount(entry.current_bid),
            fmt_count(entry.bid_count),
        ])
    }

    /// Fingerprint of the merged listing + detail field subset.
    pub fn detail_fingerprint(&self, entry: &ListingEntry, detail: &LotDetail) -> String {
        let title = detail.title.as_deref().unwrap_or(&entry.title);
        let state: LotState = detail.state.unwrap_or(entry.state);
        let closing = detail.closing_time_current.or(entry.closing_time);
        let current_bid = detail.current_bid.or(entry.current_bid);
        let bid_count = detail.bid_count.or(entry.bid_count);

        digest(&[
            normalize(&entry.lot_code),
            normalize(title),
            state.as_str().to_string(),
            fmt_time(detail.opens_at),
            fmt_time(closing),
            fmt_time(detail.closing_time_original),
            fmt_amount(detail.opening_bid),
            fmt_amount(current_bid),
            fmt_count(bid_count),
            normalize(detail.current_bidder.as_deref().unwrap_or("")),
            normalize(detail.location.as_deref().unwrap_or("")),
        ])
    }

    /// Whether the lot's detail page must be fetched this pass.
    ///
    /// True when forcing, when the lot has never been stored, when the stored
    /// record has no detail hash (first sight or degraded), or when the fresh
    /// listing fingerprint differs from the stored one.
    pub fn needs_detail(&self, prior: Option<&StoredHashes>, listing_hash: &str) -> bool {
        if self.force_detail {
            return true;
        }
        match prior {
            None => true,
            Some(stored) => stored.detail_hash.is_none() || stored.listing_hash != listing_hash,
        }
    }
}

fn digest(fields: &[String]) -> String {
    let mut hasher = Sha256::new();
    let mut first = true;
    for field in fields {
        if !first {
            hasher.update(FIELD_SEP.to_string().as_bytes());
        }
        first = false;
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Collapse runs of whitespace and strip control characters, so cosmetic
/// markup changes do not register as content changes and scraped text can
/// never contain the field separator.
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(|word| word.replace(|c: char| c.is_control(), ""))
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// RFC 3339 at second precision; `None` canonicalizes to the empty string.
fn fmt_time(time: Option<chrono::DateTime<chrono::Utc>>) -> String {
    match time {
        Some(t) => t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        None => String::new(),
    }
}

/// Two-decimal fixed point; `None` canonicalizes to the empty string.
fn fmt_amount(amount: Option<f64>) -> String {
    match amount {
        Some(a) => format!("{a:.2}"),
        None => String::new(),
    }
}

fn fmt_count(count: Option<u32>) -> String {
    match count {
        Some(c) => c.to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn entry(code: &str, title: &str, bid: Option<f64>) -> ListingEntry {
        ListingEntry {
            lot_code: code.to_string(),
            title: title.to_string(),
            detail_url: Some(format!("https://example.com/lots/{code}")),
            state: LotState::Running,
            closing_time: Some(Utc.with_ymd_and_hms(2026, 3, 14, 15, 0, 0).unwrap()),
            current_bid: bid,
            bid_count: Some(4),
        }
    }

    #[test]
    fn test_listing_fingerprint_deterministic() {
        let detector = ChangeDetector::new();
        let a = entry("L-001", "Vintage Clock", Some(120.0));
        assert_eq!(
            detector.listing_fingerprint(&a),
            detector.listing_fingerprint(&a.clone())
        );
    }

    #[test]
    fn test_whitespace_is_canonicalized() {
        let detector = ChangeDetector::new();
        let a = entry("L-001", "Vintage Clock", Some(120.0));
        let b = entry("L-001", "  Vintage \n  Clock ", Some(120.0));
        assert_eq!(
            detector.listing_fingerprint(&a),
            detector.listing_fingerprint(&b)
        );
    }

    #[test]
    fn test_control_characters_are_stripped() {
        let detector = ChangeDetector::new();
        // An embedded separator byte in scraped text is inert: it cannot
        // shift field boundaries inside the fingerprint.
        let a = entry("L-001", "Vintage Clock", Some(120.0));
        let b = entry("L-001", "Vintage\u{1f} Clock", Some(120.0));
        assert_eq!(
            detector.listing_fingerprint(&a),
            detector.listing_fingerprint(&b)
        );

        let c = entry("L-001", "Vintage\u{1f}Clock", Some(120.0));
        let d = entry("L-001", "VintageClock", Some(120.0));
        assert_eq!(
            detector.listing_fingerprint(&c),
            detector.listing_fingerprint(&d)
        );
    }

    #[test]
    fn test_bid_change_changes_fingerprint() {
        let detector = ChangeDetector::new();
        let a = entry("L-001", "Vintage Clock", Some(120.0));
        let b = entry("L-001", "Vintage Clock", Some(130.0));
        assert_ne!(
            detector.listing_fingerprint(&a),
            detector.listing_fingerprint(&b)
        );
    }

    #[test]
    fn test_amounts_quantize_to_cents() {
        let detector = ChangeDetector::new();
        let a = entry("L-001", "Vintage Clock", Some(120.0));
        let b = entry("L-001", "Vintage Clock", Some(120.0004));
        assert_eq!(
            detector.listing_fingerprint(&a),
            detector.listing_fingerprint(&b)
        );
    }

    #[test]
    fn test_missing_field_differs_from_present() {
        let detector = ChangeDetector::new();
        let a = entry("L-001", "Vintage Clock", Some(0.0));
        let b = entry("L-001", "Vintage Clock", None);
        assert_ne!(
            detector.listing_fingerprint(&a),
            detector.listing_fingerprint(&b)
        );
    }

    #[test]
    fn test_detail_fingerprint_uses_detail_overrides() {
        let detector = ChangeDetector::new();
        let e = entry("L-001", "Vintage Clock", Some(120.0));
        let base = LotDetail {
            current_bidder: Some("bidder-9".to_string()),
            ..LotDetail::default()
        };
        let changed = LotDetail {
            current_bidder: Some("bidder-12".to_string()),
            ..LotDetail::default()
        };
        assert_ne!(
            detector.detail_fingerprint(&e, &base),
            detector.detail_fingerprint(&e, &changed)
        );
    }

    #[test]
    fn test_needs_detail_matrix() {
        let detector = ChangeDetector::new();
        let stored = StoredHashes {
            listing_hash: "abc".to_string(),
            detail_hash: Some("def".to_string()),
        };

        // never stored
        assert!(detector.needs_detail(None, "abc"));
        // stored without a detail hash (degraded or listing-only)
        let degraded = StoredHashes {
            listing_hash: "abc".to_string(),
            detail_hash: None,
        };
        assert!(detector.needs_detail(Some(&degraded), "abc"));
        // listing changed
        assert!(detector.needs_detail(Some(&stored), "xyz"));
        // unchanged
        assert!(!detector.needs_detail(Some(&stored), "abc"));
        // force overrides everything
        assert!(ChangeDetector::forced().needs_detail(Some(&stored), "abc"));
    }
}
