// src/parse/selectors.rs

//! Configuration-driven listing and detail page parser.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{DetailSelectors, ListingEntry, LotDetail, LotState, ParsedListing, ParserConfig};
use crate::parse::PageParser;
use crate::utils::url::resolve;

/// Parser built from a `[parser]` selector profile. All selectors and
/// patterns are compiled at construction, so a broken profile fails before
/// any page is fetched.
pub struct SelectorPageParser {
    entry_sel: Selector,
    code_sel: Selector,
    title_sel: Selector,
    link_sel: Selector,
    state_sel: Selector,
    closing_sel: Selector,
    bid_sel: Selector,
    bid_count_sel: Selector,
    auction_title_sel: Selector,
    page_count_sel: Selector,
    page_count_re: Regex,
    page_url_template: Option<String>,
    page_link_sel: Selector,
    detail: DetailProfile,
    amount_re: Regex,
    count_re: Regex,
}

struct DetailProfile {
    title_sel: Selector,
    state_sel: Selector,
    opens_sel: Selector,
    closing_sel: Selector,
    original_closing_sel: Selector,
    opening_bid_sel: Selector,
    current_bid_sel: Selector,
    bid_count_sel: Selector,
    bidder_sel: Selector,
    location_sel: Selector,
}

impl SelectorPageParser {
    pub fn new(config: &ParserConfig) -> Result<Self> {
        Ok(Self {
            entry_sel: parse_selector(&config.entry_selector)?,
            code_sel: parse_selector(&config.code_selector)?,
            title_sel: parse_selector(&config.title_selector)?,
            link_sel: parse_selector(&config.link_selector)?,
            state_sel: parse_selector(&config.state_selector)?,
            closing_sel: parse_selector(&config.closing_selector)?,
            bid_sel: parse_selector(&config.bid_selector)?,
            bid_count_sel: parse_selector(&config.bid_count_selector)?,
            auction_title_sel: parse_selector(&config.auction_title_selector)?,
            page_count_sel: parse_selector(&config.page_count_selector)?,
            page_count_re: Regex::new(&config.page_count_pattern)
                .map_err(|e| AppError::config(format!("bad page_count_pattern: {e}")))?,
            page_url_template: config.page_url_template.clone(),
            page_link_sel: parse_selector(&config.page_link_selector)?,
            detail: DetailProfile::new(&config.detail)?,
            amount_re: Regex::new(r"[0-9][0-9,]*(?:\.[0-9]+)?")
                .map_err(|e| AppError::config(format!("bad amount pattern: {e}")))?,
            count_re: Regex::new(r"[0-9]+")
                .map_err(|e| AppError::config(format!("bad count pattern: {e}")))?,
        })
    }

    fn parse_entry(&self, row: ElementRef<'_>, base_url: &str) -> Option<ListingEntry> {
        let lot_code = select_text(row, &self.code_sel)?;
        let title = select_text(row, &self.title_sel)?;

        let detail_url = row
            .select(&self.link_sel)
            .next()
            .and_then(|el| el.value().attr("href"))
            .map(|href| resolve(base_url, href));

        let state = select_text(row, &self.state_sel)
            .map(|text| LotState::parse(&text))
            .unwrap_or(LotState::Unknown);

        Some(ListingEntry {
            lot_code,
            title,
            detail_url,
            state,
            closing_time: select_time(row, &self.closing_sel),
            current_bid: select_text(row, &self.bid_sel).and_then(|t| self.parse_amount(&t)),
            bid_count: select_text(row, &self.bid_count_sel).and_then(|t| self.parse_count(&t)),
        })
    }

    /// Discover further listing page URLs. Prefers an embedded page-count
    /// indicator combined with the URL template; falls back to scraping
    /// pagination links.
    fn discover_page_urls(&self, document: &Html, base_url: &str) -> Vec<String> {
        if let Some(urls) = self.pages_from_count(document, base_url) {
            return urls;
        }
        self.pages_from_links(document, base_url)
    }

    fn pages_from_count(&self, document: &Html, base_url: &str) -> Option<Vec<String>> {
        let template = self.page_url_template.as_deref()?;
        let text: String = document
            .select(&self.page_count_sel)
            .next()
            .map(|el| el.text().collect())?;
        let captures = self.page_count_re.captures(&text)?;
        let count: u32 = captures
            .get(1)
            .or_else(|| captures.get(0))?
            .as_str()
            .parse()
            .ok()?;

        Some(
            (2..=count)
                .map(|page| {
                    template
                        .replace("{base}", base_url)
                        .replace("{page}", &page.to_string())
                })
                .collect(),
        )
    }

    fn pages_from_links(&self, document: &Html, base_url: &str) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut urls = Vec::new();
        for link in document.select(&self.page_link_sel) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let absolute = resolve(base_url, href);
            if absolute == base_url {
                continue;
            }
            if seen.insert(absolute.clone()) {
                urls.push(absolute);
            }
        }
        urls
    }

    fn parse_amount(&self, text: &str) -> Option<f64> {
        let matched = self.amount_re.find(text)?;
        matched.as_str().replace(',', "").parse().ok()
    }

    fn parse_count(&self, text: &str) -> Option<u32> {
        self.count_re.find(text)?.as_str().parse().ok()
    }
}

impl PageParser for SelectorPageParser {
    fn parse_listing_page(&self, html: &str, base_url: &str) -> Result<ParsedListing> {
        let document = Html::parse_document(html);

        let mut entries = Vec::new();
        for row in document.select(&self.entry_sel) {
            match self.parse_entry(row, base_url) {
                Some(entry) => entries.push(entry),
                None => log::debug!("skipping listing row without code or title on {base_url}"),
            }
        }
        if entries.is_empty() {
            return Err(AppError::parse(base_url, "no lot entries matched"));
        }

        let auction_title = document
            .select(&self.auction_title_sel)
            .next()
            .map(element_text)
            .filter(|t| !t.is_empty());

        let page_urls = self.discover_page_urls(&document, base_url);

        Ok(ParsedListing {
            auction_title,
            entries,
            page_urls,
        })
    }

    fn parse_detail_page(&self, html: &str, lot_code: &str) -> Result<LotDetail> {
        let document = Html::parse_document(html);
        let root = document.root_element();
        let d = &self.detail;

        let record = LotDetail {
            title: select_text(root, &d.title_sel),
            state: select_text(root, &d.state_sel).map(|t| LotState::parse(&t)),
            opens_at: select_time(root, &d.opens_sel),
            closing_time_current: select_time(root, &d.closing_sel),
            closing_time_original: select_time(root, &d.original_closing_sel),
            opening_bid: select_text(root, &d.opening_bid_sel).and_then(|t| self.parse_amount(&t)),
            current_bid: select_text(root, &d.current_bid_sel).and_then(|t| self.parse_amount(&t)),
            bid_count: select_text(root, &d.bid_count_sel).and_then(|t| self.parse_count(&t)),
            current_bidder: select_text(root, &d.bidder_sel),
            location: select_text(root, &d.location_sel),
        };

        if record == LotDetail::default() {
            return Err(AppError::parse(lot_code, "no detail fields matched"));
        }
        Ok(record)
    }
}

impl DetailProfile {
    fn new(config: &DetailSelectors) -> Result<Self> {
        Ok(Self {
            title_sel: parse_selector(&config.title_selector)?,
            state_sel: parse_selector(&config.state_selector)?,
            opens_sel: parse_selector(&config.opens_selector)?,
            closing_sel: parse_selector(&config.closing_selector)?,
            original_closing_sel: parse_selector(&config.original_closing_selector)?,
            opening_bid_sel: parse_selector(&config.opening_bid_selector)?,
            current_bid_sel: parse_selector(&config.current_bid_selector)?,
            bid_count_sel: parse_selector(&config.bid_count_selector)?,
            bidder_sel: parse_selector(&config.bidder_selector)?,
            location_sel: parse_selector(&config.location_selector)?,
        })
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn select_text(scope: ElementRef<'_>, sel: &Selector) -> Option<String> {
    scope
        .select(sel)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
}

/// Timestamps prefer a machine-readable `datetime` attribute over the
/// element's display text.
fn select_time(scope: ElementRef<'_>, sel: &Selector) -> Option<DateTime<Utc>> {
    let el = scope.select(sel).next()?;
    if let Some(attr) = el.value().attr("datetime") {
        if let Some(time) = parse_time(attr) {
            return Some(time);
        }
    }
    parse_time(&element_text(el))
}

/// Parse a timestamp from the formats auction sites commonly emit.
fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(time) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(time.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    None
}
