// src/utils/url.rs

//! URL manipulation utilities.

use url::Url;

/// Resolve a potentially relative URL against a base URL.
///
/// Falls back to returning `href` unchanged when the base cannot be parsed,
/// so callers never lose the original link text.
///
/// # Examples
/// ```
/// use lotwatch::utils::url::resolve;
///
/// assert_eq!(
///     resolve("https://example.com/auctions/", "lot-17.html"),
///     "https://example.com/auctions/lot-17.html"
/// );
/// ```
pub fn resolve(base: &str, href: &str) -> String {
    match Url::parse(base) {
        Ok(parsed) => parsed
            .join(href)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| href.to_string()),
        Err(_) => href.to_string(),
    }
}

/// Extract the lowercased host from a URL.
///
/// # Examples
/// ```
/// use lotwatch::utils::url::host_of;
///
/// assert_eq!(
///     host_of("https://Bid.Example.COM/auctions/42"),
///     Some("bid.example.com".to_string())
/// );
/// ```
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
}
