//! Safety badge and title-flag rendering.
//!
//! Markup is injected as parsed fragments; rendering the same listing twice
//! replaces the previous badge and flag instead of stacking them.

use crate::analysis::{SafetyRating, ScanResult};
use crate::dom::{self, PageDom};
use ego_tree::NodeId;
use scraper::{ElementRef, Selector};

/// Class carried by every injected badge.
pub const BADGE_CLASS: &str = "marketshield-safety-badge";
/// Class carried by every injected title flag.
pub const TITLE_FLAG_CLASS: &str = "marketshield-title-flag";
/// Class of the overlay marker injected into unsafe listing containers.
pub const UNSAFE_OVERLAY_CLASS: &str = "marketshield-unsafe-overlay";
/// Id of the page-level branding marker.
pub const BRANDING_ID: &str = "marketshield-branding";

/// Card-level container selectors, best container first.
const CARD_SELECTORS: &[&str] = &[
    "[role=\"article\"]",
    ".marketplace-item",
    "[data-testid^=\"marketplace\"]",
];

/// Title selectors, tried in order within each search scope.
const TITLE_SELECTORS: &[&str] = &[
    "h3 a[href*=\"/marketplace/item/\"]",
    "h2 a[href*=\"/marketplace/item/\"]",
    "div[role=\"heading\"] a",
    "span[dir=\"auto\"] a",
    "a[href*=\"/marketplace/item/\"] span",
    "a[aria-label] span",
    "[role=\"link\"] span",
];

/// Card-level scopes searched for a title when the anchor itself holds none.
const TITLE_SCOPE_SELECTORS: &[&str] = &[
    "[data-pagelet]",
    "div[role=\"article\"]",
    "[data-testid^=\"marketplace\"]",
];

/// Text hosts tried inside a marketplace link, in order.
const LINK_TEXT_SELECTORS: &[&str] = &["span[dir=\"auto\"]", "span", "[role=\"heading\"]"];

/// Icon for a rating (question mark for anything unrecognized).
pub fn safety_icon(rating: SafetyRating) -> &'static str {
    match rating {
        SafetyRating::Safe => "\u{2705}",
        SafetyRating::Caution => "\u{26a0}\u{fe0f}",
        SafetyRating::Unsafe => "\u{1f6a8}",
        SafetyRating::Pending | SafetyRating::Unknown => "\u{2753}",
    }
}

/// Renders badges and title flags for scanned listings.
pub struct BadgeRenderer {
    cards: Vec<Selector>,
    titles: Vec<Selector>,
    title_scopes: Vec<Selector>,
    link_texts: Vec<Selector>,
    image: Selector,
    badge: Selector,
    title_flag: Selector,
    unsafe_overlay: Selector,
    branding: Selector,
    marketplace_link: Selector,
}

impl BadgeRenderer {
    /// Compiles the selector tables.
    pub fn new() -> Self {
        let compile = |rows: &[&str]| {
            rows.iter()
                .map(|row| Selector::parse(row).expect("static badge selector"))
                .collect::<Vec<_>>()
        };
        Self {
            cards: compile(CARD_SELECTORS),
            titles: compile(TITLE_SELECTORS),
            title_scopes: compile(TITLE_SCOPE_SELECTORS),
            link_texts: compile(LINK_TEXT_SELECTORS),
            image: Selector::parse("img").expect("img selector"),
            badge: Selector::parse(".marketshield-safety-badge").expect("badge selector"),
            title_flag: Selector::parse(".marketshield-title-flag").expect("flag selector"),
            unsafe_overlay: Selector::parse(".marketshield-unsafe-overlay")
                .expect("overlay selector"),
            branding: Selector::parse("#marketshield-branding").expect("branding selector"),
            marketplace_link: Selector::parse("a[href*=\"/marketplace/item/\"]")
                .expect("link selector"),
        }
    }

    /// Attaches (or replaces) the safety badge and title flag for one
    /// listing element.
    pub fn render_badge(&self, dom: &mut PageDom, listing: NodeId, result: &ScanResult) {
        let Some(container) = self.resolve_container(dom, listing) else {
            return;
        };

        let stale: Vec<NodeId> = match dom.element(container) {
            Some(el) => dom::descendant_matches(el, &self.badge),
            None => Vec::new(),
        };
        for id in stale {
            dom.detach(id);
        }
        dom.append_fragment(container, &badge_markup(result));

        self.render_title_flag(dom, listing, result);
    }

    /// Resolves the best container for a listing's badge: the closest card
    /// ancestor, else the parent of the listing's image, else the listing
    /// element itself.
    pub fn resolve_container(&self, dom: &PageDom, listing: NodeId) -> Option<NodeId> {
        let element = dom.element(listing)?;

        let mut container = listing;
        for selector in &self.cards {
            if let Some(card) = dom::closest(element, selector) {
                container = card;
                break;
            }
        }

        if container == listing {
            if let Some(image) = dom::first_match_within(element, &self.image) {
                if let Some(parent) = dom
                    .element(image)
                    .and_then(|img| img.parent())
                    .map(|parent| parent.id())
                {
                    container = parent;
                }
            }
        }

        Some(container)
    }

    fn render_title_flag(&self, dom: &mut PageDom, listing: NodeId, result: &ScanResult) {
        let Some(title) = self.resolve_title(dom, listing) else {
            return;
        };

        self.clear_title_flags(dom, title);
        dom.prepend_fragment(title, &flag_markup(result));
    }

    /// Finds the listing title: first within the element, then within its
    /// closest card-level scope, then through the marketplace link fallback.
    fn resolve_title(&self, dom: &PageDom, listing: NodeId) -> Option<NodeId> {
        let element = dom.element(listing)?;

        if let Some(title) = self.title_in(dom, element) {
            return Some(title);
        }

        for scope_selector in &self.title_scopes {
            if let Some(scope) = dom::closest(element, scope_selector) {
                if let Some(scope_el) = dom.element(scope) {
                    if let Some(title) = self.title_in(dom, scope_el) {
                        return Some(title);
                    }
                }
                break;
            }
        }

        let link = dom::closest(element, &self.marketplace_link)
            .or_else(|| dom::first_match_within(element, &self.marketplace_link))?;
        let link_el = dom.element(link)?;
        for selector in &self.link_texts {
            if let Some(host) = dom::first_match_within(link_el, selector) {
                if self.has_text(dom, host) {
                    return Some(host);
                }
            }
        }
        None
    }

    fn title_in(&self, dom: &PageDom, scope: ElementRef<'_>) -> Option<NodeId> {
        for selector in &self.titles {
            if let Some(candidate) = dom::first_match_within(scope, selector) {
                if self.has_text(dom, candidate) {
                    return Some(candidate);
                }
            }
        }
        None
    }

    fn has_text(&self, dom: &PageDom, id: NodeId) -> bool {
        dom.element(id)
            .map(|el| !dom::element_text(el).is_empty())
            .unwrap_or(false)
    }

    /// Removes flags already attached to this title or its parent. Cleanup
    /// is deliberately scoped: flags on unrelated listings that merely share
    /// a distant ancestor are left alone.
    fn clear_title_flags(&self, dom: &mut PageDom, title: NodeId) {
        let mut stale: Vec<NodeId> = Vec::new();
        if let Some(title_el) = dom.element(title) {
            stale.extend(dom::descendant_matches(title_el, &self.title_flag));
            if let Some(parent) = title_el.parent().and_then(ElementRef::wrap) {
                for id in dom::descendant_matches(parent, &self.title_flag) {
                    if !stale.contains(&id) {
                        stale.push(id);
                    }
                }
            }
        }
        for id in stale {
            dom.detach(id);
        }
    }

    /// Marks an unsafe listing's container with an overlay child. Idempotent.
    pub fn mark_unsafe(&self, dom: &mut PageDom, listing: NodeId) {
        let Some(container) = self.resolve_container(dom, listing) else {
            return;
        };
        let already_marked = dom
            .element(container)
            .map(|el| dom::first_match_within(el, &self.unsafe_overlay).is_some())
            .unwrap_or(false);
        if !already_marked {
            dom.append_fragment(
                container,
                &format!("<div class=\"{UNSAFE_OVERLAY_CLASS}\"></div>"),
            );
        }
    }

    /// Injects the page-level branding marker once.
    pub fn inject_branding(&self, dom: &mut PageDom) {
        if dom.select_first(&self.branding).is_some() {
            return;
        }
        dom.append_body_fragment(&format!(
            "<div id=\"{BRANDING_ID}\" class=\"marketshield-branding\">\
             <span class=\"marketshield-shield\">\u{1f6e1}\u{fe0f}</span>\
             <span class=\"marketshield-brand-text\">Protected by MarketShield</span>\
             </div>"
        ));
    }
}

impl Default for BadgeRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn badge_markup(result: &ScanResult) -> String {
    let rating = result.safety_rating.as_str();
    let mut tooltip = format!(
        "MarketShield: {rating} ({}% confidence)",
        result.confidence_score
    );
    if !result.risk_factors.is_empty() {
        tooltip.push('\n');
        tooltip.push_str("Risk factors: ");
        tooltip.push_str(&result.risk_factors.join(", "));
    }
    format!(
        "<div class=\"{BADGE_CLASS} marketshield-{rating}\" title=\"{}\">\
         <span class=\"marketshield-icon\">{}</span>\
         <span class=\"marketshield-text\">{}</span>\
         </div>",
        escape_attr(&tooltip),
        safety_icon(result.safety_rating),
        rating.to_ascii_uppercase(),
    )
}

fn flag_markup(result: &ScanResult) -> String {
    let rating = result.safety_rating.as_str();
    let tooltip = format!(
        "MarketShield Safety: {} ({}% confidence)",
        rating.to_ascii_uppercase(),
        result.confidence_score
    );
    format!(
        "<span class=\"{TITLE_FLAG_CLASS} marketshield-flag-{rating}\" title=\"{}\">\u{25cf}</span>",
        escape_attr(&tooltip)
    )
}

fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\n' => escaped.push_str("&#10;"),
            other => escaped.push(other),
        }
    }
    escaped
}
