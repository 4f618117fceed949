// src/parse/mod.rs

//! Page parsing contract and the bundled selector-profile parser.
//!
//! Site-specific extraction heuristics sit behind [`PageParser`]; the sync
//! engine never touches HTML itself. [`SelectorPageParser`] is the bundled
//! implementation, driven entirely by the `[parser]` config section.

mod selectors;

pub use selectors::SelectorPageParser;

use crate::error::Result;
use crate::models::{LotDetail, ParsedListing};

/// Extracts structured data from fetched pages. Implementations are
/// synchronous; parsing is CPU-bound and pages are already in memory.
pub trait PageParser: Send + Sync {
    /// Parse a listing page into lot entries, further listing page URLs
    /// (absolute, deduplicated, in discovery order), and the auction title.
    fn parse_listing_page(&self, html: &str, base_url: &str) -> Result<ParsedListing>;

    /// Parse a lot's detail page. Individual missing fields are tolerated; a
    /// page yielding nothing at all is an error.
    fn parse_detail_page(&self, html: &str, lot_code: &str) -> Result<LotDetail>;
}
