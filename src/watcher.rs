//! Mutation filtering and re-scan scheduling.

use crate::dom::{self, PageDom};
use ego_tree::NodeId;
use scraper::Selector;
use std::time::Duration;

/// Selectors that identify listing-bearing markup, used to decide whether a
/// mutation is worth a re-scan. Broader than the locator's anchor table on
/// purpose: a card container arriving without its anchors yet is still a
/// signal that listings are loading.
const LISTING_MARKUP_SELECTORS: &[&str] = &[
    "[role=\"article\"]",
    "a[href*=\"/marketplace/item/\"]",
    "[data-testid^=\"marketplace\"]",
    ".marketplace-item",
    "[href*=\"marketplace/item\"]",
    ".cl-static-search-result",
    "a.result-title",
];

/// One batch of host-reported DOM additions.
#[derive(Debug, Clone)]
pub struct MutationRecord {
    /// Ids of the nodes added to the document.
    pub added: Vec<NodeId>,
}

/// Timing knobs for the watcher-driven pipeline.
#[derive(Debug, Clone, Copy)]
pub struct WatcherConfig {
    /// Quiet period after the last qualifying mutation before re-scanning.
    pub debounce: Duration,
    /// Delay after a detected navigation before the pipeline is rebuilt.
    pub settle: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1000),
            settle: Duration::from_millis(1000),
        }
    }
}

/// Decides which mutation batches warrant a re-scan.
pub struct MutationWatcher {
    selectors: Vec<Selector>,
}

impl MutationWatcher {
    /// Compiles the listing-markup selector table.
    pub fn new() -> Self {
        Self {
            selectors: LISTING_MARKUP_SELECTORS
                .iter()
                .map(|row| Selector::parse(row).expect("static watcher selector"))
                .collect(),
        }
    }

    /// True when any added node is, or contains, listing markup.
    ///
    /// Non-element additions (text, comments) never qualify.
    pub fn qualifies(&self, dom: &PageDom, record: &MutationRecord) -> bool {
        record.added.iter().any(|&id| {
            dom.element(id)
                .map(|element| {
                    self.selectors
                        .iter()
                        .any(|selector| dom::matches_or_contains(element, selector))
                })
                .unwrap_or(false)
        })
    }
}

impl Default for MutationWatcher {
    fn default() -> Self {
        Self::new()
    }
}
