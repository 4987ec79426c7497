//! Marketplace URL classification and listing identity normalization.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Normalized identity of a single marketplace listing.
///
/// Holds the absolute origin + path of the listing with query and fragment
/// stripped, so two anchors that differ only in tracking parameters compare
/// equal. This is the dedup key for the whole pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingUrl(String);

impl ListingUrl {
    /// Returns the normalized URL string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListingUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reports whether a page URL belongs to a supported marketplace.
///
/// Supported: Facebook Marketplace (`facebook.com/marketplace/...` or the
/// dedicated `marketplace.facebook.com` host) and Craigslist including all
/// regional subdomains.
pub fn is_supported_marketplace(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();

    if host == "facebook.com" || host == "www.facebook.com" {
        return parsed.path().starts_with("/marketplace");
    }
    if host == "marketplace.facebook.com" {
        return true;
    }
    host == "craigslist.org" || host.ends_with(".craigslist.org")
}

/// Resolves a possibly-relative href against `base` and normalizes it into a
/// [`ListingUrl`].
///
/// Query string and fragment are dropped. Returns `None` for anything that
/// does not parse as an absolute `http(s)`-style URL (empty hrefs,
/// `javascript:` pseudo-links, malformed input); callers treat `None` as
/// "skip this element", never as an error.
pub fn normalize_listing_url(href: &str, base: &Url) -> Option<ListingUrl> {
    let resolved = Url::options().base_url(Some(base)).parse(href).ok()?;
    if !resolved.has_host() {
        return None;
    }
    let origin = resolved.origin();
    if !origin.is_tuple() {
        return None;
    }
    Some(ListingUrl(format!(
        "{}{}",
        origin.ascii_serialization(),
        resolved.path()
    )))
}

/// Reports whether a normalized URL points at an individual listing rather
/// than a search or category page.
///
/// Facebook listing paths carry both `marketplace` and `item` segments;
/// Craigslist postings carry a `/d/` segment or end in an `.html` leaf.
pub fn is_listing_url(url: &ListingUrl) -> bool {
    let Ok(parsed) = Url::parse(url.as_str()) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    let path = parsed.path();

    if host.ends_with("facebook.com") {
        return path.contains("marketplace") && path.contains("item");
    }
    if host == "craigslist.org" || host.ends_with(".craigslist.org") {
        return path.contains("/d/") || path.ends_with(".html");
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://www.facebook.com/marketplace/boston").expect("base url")
    }

    #[test]
    fn recognizes_supported_marketplaces() {
        assert!(is_supported_marketplace(
            "https://www.facebook.com/marketplace/item/123"
        ));
        assert!(is_supported_marketplace(
            "https://marketplace.facebook.com/item/123"
        ));
        assert!(is_supported_marketplace(
            "https://boston.craigslist.org/search/sss"
        ));
        assert!(is_supported_marketplace("https://craigslist.org/about"));
    }

    #[test]
    fn rejects_unsupported_pages() {
        assert!(!is_supported_marketplace("https://www.facebook.com/groups/1"));
        assert!(!is_supported_marketplace("https://example.com/marketplace"));
        assert!(!is_supported_marketplace("not a url"));
    }

    #[test]
    fn normalization_strips_query_and_fragment() {
        let url = normalize_listing_url(
            "https://www.facebook.com/marketplace/item/123?ref=feed&tracking=abc#photos",
            &base(),
        )
        .expect("normalized");
        assert_eq!(url.as_str(), "https://www.facebook.com/marketplace/item/123");
    }

    #[test]
    fn normalization_resolves_relative_hrefs() {
        let url = normalize_listing_url("/marketplace/item/456?x=1", &base()).expect("normalized");
        assert_eq!(url.as_str(), "https://www.facebook.com/marketplace/item/456");
    }

    #[test]
    fn malformed_hrefs_yield_none() {
        assert!(normalize_listing_url("javascript:void(0)", &base()).is_none());
        assert!(normalize_listing_url("mailto:seller@example.com", &base()).is_none());
        // Scheme-only garbage resolves against the base and stays well-formed,
        // so the only hard failures are inputs the URL parser itself rejects.
        assert!(normalize_listing_url("http://[:::1", &base()).is_none());
    }

    #[test]
    fn listing_paths_are_distinguished_from_browse_pages() {
        let item =
            normalize_listing_url("https://www.facebook.com/marketplace/item/123", &base()).unwrap();
        let browse =
            normalize_listing_url("https://www.facebook.com/marketplace/boston", &base()).unwrap();
        assert!(is_listing_url(&item));
        assert!(!is_listing_url(&browse));

        let cl_post = normalize_listing_url(
            "https://boston.craigslist.org/gbs/d/boston-bike/7612345678.html",
            &base(),
        )
        .unwrap();
        let cl_search =
            normalize_listing_url("https://boston.craigslist.org/search/sss", &base()).unwrap();
        assert!(is_listing_url(&cl_post));
        assert!(!is_listing_url(&cl_search));
    }
}
