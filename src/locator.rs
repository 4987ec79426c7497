//! Listing discovery over the page document.

use crate::classifier::{is_listing_url, normalize_listing_url, ListingUrl};
use crate::dom::PageDom;
use ego_tree::NodeId;
use scraper::Selector;
use std::collections::HashSet;

/// Anchor selectors that surface listing links, in priority order.
///
/// Marketplace markup is unstable, so the rows deliberately overlap; a later
/// row catching an anchor an earlier row missed is expected, and duplicates
/// are collapsed by normalized URL.
const LISTING_LINK_SELECTORS: &[&str] = &[
    "a[href*=\"/marketplace/item/\"]",
    "a[href*=\"marketplace/item\"]",
    "[role=\"article\"] a",
    ".marketplace-listing-item a",
    ".cl-static-search-result a",
    "a.result-title",
];

/// One listing found on the page: its normalized URL and the anchor element
/// it was first seen on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedListing {
    /// Dedup key for the listing.
    pub url: ListingUrl,
    /// Anchor node the URL was extracted from (first occurrence wins).
    pub node: NodeId,
}

/// Selector-driven listing locator.
pub struct ListingLocator {
    selectors: Vec<Selector>,
}

impl ListingLocator {
    /// Compiles the selector table.
    pub fn new() -> Self {
        Self {
            selectors: LISTING_LINK_SELECTORS
                .iter()
                .map(|row| Selector::parse(row).expect("static listing selector"))
                .collect(),
        }
    }

    /// Scans the document for listing anchors.
    ///
    /// Hrefs that fail normalization or do not point at an individual
    /// listing are skipped silently. When several anchors normalize to the
    /// same [`ListingUrl`], the first one encountered wins. Running this
    /// twice over an unchanged document yields the same result; an empty
    /// result is not an error.
    pub fn find_listings(&self, dom: &PageDom) -> Vec<DetectedListing> {
        let base = dom.url();
        let mut seen: HashSet<ListingUrl> = HashSet::new();
        let mut found = Vec::new();

        for selector in &self.selectors {
            for anchor in dom.document().select(selector) {
                let Some(href) = anchor.value().attr("href") else {
                    continue;
                };
                let Some(url) = normalize_listing_url(href, base) else {
                    continue;
                };
                if !is_listing_url(&url) {
                    continue;
                }
                if seen.insert(url.clone()) {
                    found.push(DetectedListing {
                        url,
                        node: anchor.id(),
                    });
                }
            }
        }

        found
    }
}

impl Default for ListingLocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn page(html: &str) -> PageDom {
        PageDom::parse(
            html,
            Url::parse("https://www.facebook.com/marketplace/boston").expect("url"),
        )
    }

    #[test]
    fn finds_listing_anchors_and_dedupes_by_normalized_url() {
        let dom = page(
            r#"<html><body>
                <a id="first" href="/marketplace/item/123?ref=feed">Bike</a>
                <a id="second" href="/marketplace/item/123?ref=search">Bike again</a>
                <a href="/marketplace/item/456">Desk</a>
            </body></html>"#,
        );
        let locator = ListingLocator::new();
        let listings = locator.find_listings(&dom);

        assert_eq!(listings.len(), 2);
        assert_eq!(
            listings[0].url.as_str(),
            "https://www.facebook.com/marketplace/item/123"
        );

        // The first anchor in document order owns the deduped URL.
        let owner = dom.element(listings[0].node).expect("anchor");
        assert_eq!(owner.value().attr("id"), Some("first"));
    }

    #[test]
    fn skips_non_listing_and_malformed_hrefs() {
        let dom = page(
            r#"<html><body>
                <div role="article">
                    <a href="/marketplace/boston">Browse more</a>
                    <a href="javascript:void(0)">Menu</a>
                    <a>No href at all</a>
                </div>
            </body></html>"#,
        );
        let locator = ListingLocator::new();
        assert!(locator.find_listings(&dom).is_empty());
    }

    #[test]
    fn repeated_runs_over_unchanged_document_agree() {
        let dom = page(
            r#"<html><body>
                <div role="article"><a href="/marketplace/item/9">Couch</a></div>
                <a href="https://boston.craigslist.org/gbs/d/couch/7600000001.html">Couch (CL)</a>
            </body></html>"#,
        );
        let locator = ListingLocator::new();
        let first = locator.find_listings(&dom);
        let second = locator.find_listings(&dom);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn craigslist_rows_surface_postings() {
        let dom = PageDom::parse(
            r#"<html><body>
                <li class="cl-static-search-result">
                    <a href="/gbs/d/boston-road-bike/7612345678.html">Road bike</a>
                </li>
            </body></html>"#,
            Url::parse("https://boston.craigslist.org/search/sss").expect("url"),
        );
        let locator = ListingLocator::new();
        let listings = locator.find_listings(&dom);
        assert_eq!(listings.len(), 1);
        assert_eq!(
            listings[0].url.as_str(),
            "https://boston.craigslist.org/gbs/d/boston-road-bike/7612345678.html"
        );
    }
}
