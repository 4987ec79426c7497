//! Owned page document: parsing, querying, and fragment-level mutation.
//!
//! The engine never constructs HTML nodes by hand. All insertions go through
//! fragment parsing followed by a node-by-node graft into the document tree,
//! and all removals are detaches. Node ids stay valid across mutation, so
//! callers can collect ids during an immutable query pass and mutate
//! afterwards.

use ego_tree::{NodeId, Tree};
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

/// A parsed page plus the URL it was captured from.
pub struct PageDom {
    doc: Html,
    url: Url,
    body: Selector,
}

impl PageDom {
    /// Parses a full document.
    pub fn parse(html: &str, url: Url) -> Self {
        Self {
            doc: Html::parse_document(html),
            url,
            body: Selector::parse("body").expect("body selector"),
        }
    }

    /// URL the page currently claims to be at.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Updates the page URL, as an in-page (SPA) navigation would.
    pub fn set_url(&mut self, url: Url) {
        self.url = url;
    }

    /// The underlying parsed document, for selector iteration.
    pub fn document(&self) -> &Html {
        &self.doc
    }

    /// Serializes the document back to HTML.
    pub fn html(&self) -> String {
        self.doc.root_element().html()
    }

    /// Wraps a node id as an element, when it refers to one.
    pub fn element(&self, id: NodeId) -> Option<ElementRef<'_>> {
        self.doc.tree.get(id).and_then(ElementRef::wrap)
    }

    /// First element in document order matching `selector`.
    pub fn select_first(&self, selector: &Selector) -> Option<ElementRef<'_>> {
        self.doc.select(selector).next()
    }

    fn body_id(&self) -> NodeId {
        self.doc
            .select(&self.body)
            .next()
            .map(|el| el.id())
            .unwrap_or_else(|| self.doc.root_element().id())
    }

    /// Parses `html` as a fragment and appends its nodes to `<body>`,
    /// returning the ids of the inserted top-level nodes.
    ///
    /// This is the host-side stand-in for DOM insertion: test harnesses and
    /// snapshot drivers use it to simulate content arriving on the page.
    pub fn append_body_fragment(&mut self, html: &str) -> Vec<NodeId> {
        let body = self.body_id();
        self.append_fragment(body, html)
    }

    /// Appends a parsed fragment as the last children of `target`.
    pub fn append_fragment(&mut self, target: NodeId, html: &str) -> Vec<NodeId> {
        let roots = self.graft_fragment(html);
        if self.doc.tree.get(target).is_none() {
            tracing::debug!("fragment append target no longer in document");
            return Vec::new();
        }
        for &id in &roots {
            self.doc
                .tree
                .get_mut(target)
                .expect("target checked above")
                .append_id(id);
        }
        roots
    }

    /// Inserts a parsed fragment before the first child of `target`
    /// (appending when `target` has no children).
    pub fn prepend_fragment(&mut self, target: NodeId, html: &str) -> Vec<NodeId> {
        let first_child = self
            .doc
            .tree
            .get(target)
            .and_then(|node| node.first_child())
            .map(|child| child.id());
        match first_child {
            None => self.append_fragment(target, html),
            Some(anchor) => {
                let roots = self.graft_fragment(html);
                for &id in &roots {
                    self.doc
                        .tree
                        .get_mut(anchor)
                        .expect("anchor is a live child")
                        .insert_id_before(id);
                }
                roots
            }
        }
    }

    /// Detaches a node (and its subtree) from the document.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(mut node) = self.doc.tree.get_mut(id) {
            node.detach();
        }
    }

    /// Parses `html` as a fragment and copies its top-level nodes (with
    /// subtrees) into this document's tree as orphans.
    fn graft_fragment(&mut self, html: &str) -> Vec<NodeId> {
        let fragment = Html::parse_fragment(html);
        let root = fragment.root_element();
        root.children()
            .map(|child| graft_subtree(&mut self.doc.tree, child))
            .collect()
    }
}

/// Recursively copies `source` (a node of another tree) into `dest`,
/// returning the id of the copy. The copy is left detached.
fn graft_subtree(dest: &mut Tree<Node>, source: ego_tree::NodeRef<'_, Node>) -> NodeId {
    let id = dest.orphan(source.value().clone()).id();
    for child in source.children() {
        let child_id = graft_subtree(dest, child);
        dest.get_mut(id)
            .expect("freshly grafted node exists")
            .append_id(child_id);
    }
    id
}

/// Nearest self-or-ancestor element matching `selector`.
pub fn closest(element: ElementRef<'_>, selector: &Selector) -> Option<NodeId> {
    if selector.matches(&element) {
        return Some(element.id());
    }
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| selector.matches(ancestor))
        .map(|ancestor| ancestor.id())
}

/// First descendant element (excluding `element` itself) matching `selector`.
pub fn first_match_within(element: ElementRef<'_>, selector: &Selector) -> Option<NodeId> {
    descendant_matches(element, selector).into_iter().next()
}

/// All descendant elements (excluding `element` itself) matching `selector`,
/// in document order.
pub fn descendant_matches(element: ElementRef<'_>, selector: &Selector) -> Vec<NodeId> {
    element
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .filter(|el| selector.matches(el))
        .map(|el| el.id())
        .collect()
}

/// Whether `element` itself matches `selector` or contains a match.
pub fn matches_or_contains(element: ElementRef<'_>, selector: &Selector) -> bool {
    selector.matches(&element) || first_match_within(element, selector).is_some()
}

/// Collapsed visible text of an element.
pub fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}
