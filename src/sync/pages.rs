// src/sync/pages.rs

//! Listing-side collection: first page, pagination discovery, and sequential
//! fetches of the remaining pages.

use crate::fetch::Fetcher;
use crate::models::ListingEntry;
use crate::parse::PageParser;

/// Everything gathered from the listing side of a pass.
pub(crate) struct PageCollection {
    /// Pages fetched, whether or not they parsed.
    pub pages_scanned: u32,
    /// Lot entries in page order. Duplicate lot codes are kept; the planner
    /// decides what to do with them.
    pub entries: Vec<ListingEntry>,
    /// Every page URL the pass intended to cover, fetched or not.
    pub discovered_urls: Vec<String>,
    /// Auction title from the first page, when it carried one.
    pub auction_title: Option<String>,
    /// One entry per page-level fetch or parse failure.
    pub errors: Vec<String>,
}

/// The first listing page could not be fetched. There is nothing to scan
/// without it, so the pass terminates.
pub(crate) struct FirstPageError(pub String);

/// Fetch the first listing page, discover the remaining pages from it, and
/// fetch those sequentially. Page failures after the first are tolerated and
/// recorded; the affected page simply contributes no entries.
pub(crate) async fn collect(
    fetcher: &dyn Fetcher,
    parser: &dyn PageParser,
    listing_url: &str,
    max_pages: Option<u32>,
) -> Result<PageCollection, FirstPageError> {
    let mut collection = PageCollection {
        pages_scanned: 0,
        entries: Vec::new(),
        discovered_urls: vec![listing_url.to_string()],
        auction_title: None,
        errors: Vec::new(),
    };

    let first = match fetcher.fetch(listing_url).await {
        Ok(response) => response,
        Err(failure) => return Err(FirstPageError(failure.to_string())),
    };
    collection.pages_scanned = 1;

    // Pagination is discovered from the first page only.
    let mut remaining: Vec<String> = Vec::new();
    match parser.parse_listing_page(&first.body, listing_url) {
        Ok(parsed) => {
            collection.auction_title = parsed.auction_title;
            collection.entries.extend(parsed.entries);
            remaining = parsed.page_urls;
        }
        Err(e) => {
            log::warn!("listing page {listing_url} did not parse: {e}");
            collection.errors.push(format!("listing page {listing_url}: {e}"));
        }
    }

    // The cap counts the first page.
    if let Some(cap) = max_pages {
        remaining.truncate(cap.saturating_sub(1) as usize);
    }

    for url in remaining {
        collection.discovered_urls.push(url.clone());
        match fetcher.fetch(&url).await {
            Ok(response) => {
                collection.pages_scanned += 1;
                match parser.parse_listing_page(&response.body, &url) {
                    Ok(parsed) => collection.entries.extend(parsed.entries),
                    Err(e) => {
                        log::warn!("listing page {url} did not parse: {e}");
                        collection.errors.push(format!("listing page {url}: {e}"));
                    }
                }
            }
            Err(failure) => {
                log::warn!("{failure}");
                collection.errors.push(failure.to_string());
            }
        }
    }

    Ok(collection)
}
