//! Page document abstraction.
//!
//! The engine never owns page nodes. It refers to them by [`ElementId`] and
//! reads or mutates them through [`PageDom`], so tracking state holds no
//! references that could keep a removed node alive.

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::RwLock;
use serde::Serialize;

/// Stable identifier of one element for the lifetime of a page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Layout box in CSS pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

impl Rect {
    /// Construct a rect.
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Whether the box has positive area.
    pub fn is_visible(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// Action offered by a filter tooltip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TooltipAction {
    /// Remove the filter and never filter this element again on this page.
    UnfilterAndIgnore,
}

/// Hover tooltip attached to a blurred element.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tooltip {
    /// Explanation of why the element is filtered.
    pub text: String,
    /// Button offered to the user.
    pub action: TooltipAction,
}

/// Read/write access to the live page.
pub trait PageDom: Send + Sync {
    /// Hostname of the page.
    fn hostname(&self) -> String;

    /// Whether the element is still attached to the document.
    fn is_connected(&self, el: ElementId) -> bool;

    /// Parent element, `None` at the root or when detached.
    fn parent(&self, el: ElementId) -> Option<ElementId>;

    /// Child elements in document order.
    fn children(&self, el: ElementId) -> Vec<ElementId>;

    /// Rendered text of the element and its descendants, excluding any
    /// filter-added badge.
    fn text_content(&self, el: ElementId) -> String;

    /// Layout box, `None` when the element is not rendered.
    fn bounding_rect(&self, el: ElementId) -> Option<Rect>;

    /// Read an attribute.
    fn attribute(&self, el: ElementId, name: &str) -> Option<String>;

    /// Write an attribute.
    fn set_attribute(&self, el: ElementId, name: &str, value: &str);

    /// Delete an attribute.
    fn remove_attribute(&self, el: ElementId, name: &str);

    /// Connected elements matching a selector list, in document order.
    fn query_selector_all(&self, selector: &str) -> Vec<ElementId>;

    /// Connected elements that directly contain non-blank text.
    fn text_elements(&self) -> Vec<ElementId>;

    /// Prepend a label bubble to the element.
    fn insert_badge(&self, el: ElementId, label: &str);

    /// Remove the label bubble, if any.
    fn remove_badge(&self, el: ElementId);

    /// Attach a hover tooltip.
    fn attach_tooltip(&self, el: ElementId, tooltip: Tooltip);

    /// Detach the hover tooltip, if any.
    fn detach_tooltip(&self, el: ElementId);
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryDom
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Node {
    tag: String,
    classes: Vec<String>,
    attributes: BTreeMap<String, String>,
    text: String,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
    rect: Option<Rect>,
    connected: bool,
    badge: Option<String>,
    tooltip: Option<Tooltip>,
}

/// Arena-backed [`PageDom`] for tests and headless use.
///
/// Selectors support `tag`, `.class`, `tag.class.other`, and comma lists.
pub struct MemoryDom {
    hostname: String,
    nodes: RwLock<Vec<Node>>,
}

impl MemoryDom {
    /// Empty document with a connected `body` root.
    pub fn new(hostname: impl Into<String>) -> Self {
        let root = Node {
            tag: "body".into(),
            connected: true,
            ..Node::default()
        };
        Self {
            hostname: hostname.into(),
            nodes: RwLock::new(vec![root]),
        }
    }

    /// The `body` element.
    pub fn root(&self) -> ElementId {
        ElementId(0)
    }

    /// Append a child. `spec` is a tag optionally followed by `.class` parts.
    pub fn append(&self, parent: ElementId, spec: &str) -> ElementId {
        let mut parts = spec.split('.');
        let tag = parts.next().unwrap_or_default();
        let tag = if tag.is_empty() { "div" } else { tag };
        let mut nodes = self.nodes.write();
        let id = ElementId(nodes.len() as u64);
        let connected = nodes.get(index(parent)).is_some_and(|p| p.connected);
        nodes.push(Node {
            tag: tag.to_ascii_lowercase(),
            classes: parts.filter(|c| !c.is_empty()).map(str::to_string).collect(),
            parent: Some(parent),
            connected,
            ..Node::default()
        });
        if let Some(p) = nodes.get_mut(index(parent)) {
            p.children.push(id);
        }
        id
    }

    /// Append a child carrying direct text.
    pub fn append_text(&self, parent: ElementId, spec: &str, text: &str) -> ElementId {
        let id = self.append(parent, spec);
        self.set_text(id, text);
        id
    }

    /// Replace an element's direct text.
    pub fn set_text(&self, el: ElementId, text: &str) {
        if let Some(node) = self.nodes.write().get_mut(index(el)) {
            node.text = text.to_string();
        }
    }

    /// Set an element's layout box.
    pub fn set_rect(&self, el: ElementId, rect: Rect) {
        if let Some(node) = self.nodes.write().get_mut(index(el)) {
            node.rect = Some(rect);
        }
    }

    /// Remove an element (and its subtree) from the document.
    pub fn detach(&self, el: ElementId) {
        let mut nodes = self.nodes.write();
        let parent = nodes.get(index(el)).and_then(|n| n.parent);
        if let Some(p) = parent.and_then(|p| nodes.get_mut(index(p))) {
            p.children.retain(|c| *c != el);
        }
        let mut stack = vec![el];
        while let Some(id) = stack.pop() {
            if let Some(node) = nodes.get_mut(index(id)) {
                node.connected = false;
                stack.extend(node.children.iter().copied());
            }
        }
        if let Some(node) = nodes.get_mut(index(el)) {
            node.parent = None;
        }
    }

    /// Current badge label.
    pub fn badge(&self, el: ElementId) -> Option<String> {
        self.nodes.read().get(index(el)).and_then(|n| n.badge.clone())
    }

    /// Current tooltip.
    pub fn tooltip(&self, el: ElementId) -> Option<Tooltip> {
        self.nodes.read().get(index(el)).and_then(|n| n.tooltip.clone())
    }

    fn preorder(nodes: &[Node], root: ElementId, out: &mut Vec<ElementId>) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(node) = nodes.get(index(id)) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
    }

    fn collect_text(nodes: &[Node], el: ElementId, out: &mut Vec<String>) {
        let Some(node) = nodes.get(index(el)) else {
            return;
        };
        if !node.text.trim().is_empty() {
            out.push(node.text.clone());
        }
        for child in &node.children {
            Self::collect_text(nodes, *child, out);
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn index(el: ElementId) -> usize {
    el.0 as usize
}

fn matches_simple(node: &Node, selector: &str) -> bool {
    let mut parts = selector.split('.');
    let tag = parts.next().unwrap_or_default();
    if !tag.is_empty() && tag != "*" && !tag.eq_ignore_ascii_case(&node.tag) {
        return false;
    }
    parts.all(|class| !class.is_empty() && node.classes.iter().any(|c| c == class))
}

impl PageDom for MemoryDom {
    fn hostname(&self) -> String {
        self.hostname.clone()
    }

    fn is_connected(&self, el: ElementId) -> bool {
        self.nodes.read().get(index(el)).is_some_and(|n| n.connected)
    }

    fn parent(&self, el: ElementId) -> Option<ElementId> {
        self.nodes.read().get(index(el)).and_then(|n| n.parent)
    }

    fn children(&self, el: ElementId) -> Vec<ElementId> {
        self.nodes
            .read()
            .get(index(el))
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn text_content(&self, el: ElementId) -> String {
        let nodes = self.nodes.read();
        let mut parts = Vec::new();
        Self::collect_text(&nodes, el, &mut parts);
        parts.join(" ")
    }

    fn bounding_rect(&self, el: ElementId) -> Option<Rect> {
        self.nodes.read().get(index(el)).and_then(|n| n.rect)
    }

    fn attribute(&self, el: ElementId, name: &str) -> Option<String> {
        self.nodes
            .read()
            .get(index(el))
            .and_then(|n| n.attributes.get(name).cloned())
    }

    fn set_attribute(&self, el: ElementId, name: &str, value: &str) {
        if let Some(node) = self.nodes.write().get_mut(index(el)) {
            let _ = node.attributes.insert(name.to_string(), value.to_string());
        }
    }

    fn remove_attribute(&self, el: ElementId, name: &str) {
        if let Some(node) = self.nodes.write().get_mut(index(el)) {
            let _ = node.attributes.remove(name);
        }
    }

    fn query_selector_all(&self, selector: &str) -> Vec<ElementId> {
        let selectors: Vec<&str> = selector
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        let nodes = self.nodes.read();
        let mut order = Vec::with_capacity(nodes.len());
        Self::preorder(&nodes, self.root(), &mut order);
        order
            .into_iter()
            .filter(|id| {
                nodes
                    .get(index(*id))
                    .is_some_and(|n| n.connected && selectors.iter().any(|s| matches_simple(n, s)))
            })
            .collect()
    }

    fn text_elements(&self) -> Vec<ElementId> {
        let nodes = self.nodes.read();
        let mut order = Vec::with_capacity(nodes.len());
        Self::preorder(&nodes, self.root(), &mut order);
        order
            .into_iter()
            .filter(|id| {
                nodes
                    .get(index(*id))
                    .is_some_and(|n| n.connected && !n.text.trim().is_empty())
            })
            .collect()
    }

    fn insert_badge(&self, el: ElementId, label: &str) {
        if let Some(node) = self.nodes.write().get_mut(index(el)) {
            node.badge = Some(label.to_string());
        }
    }

    fn remove_badge(&self, el: ElementId) {
        if let Some(node) = self.nodes.write().get_mut(index(el)) {
            node.badge = None;
        }
    }

    fn attach_tooltip(&self, el: ElementId, tooltip: Tooltip) {
        if let Some(node) = self.nodes.write().get_mut(index(el)) {
            node.tooltip = Some(tooltip);
        }
    }

    fn detach_tooltip(&self, el: ElementId) {
        if let Some(node) = self.nodes.write().get_mut(index(el)) {
            node.tooltip = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed() -> (MemoryDom, ElementId, ElementId) {
        let dom = MemoryDom::new("news.example");
        let list = dom.append(dom.root(), "div.feed");
        let first = dom.append(list, "article.post");
        let _ = dom.append_text(first, "p", "hello");
        let second = dom.append(list, "article.post.pinned");
        let _ = dom.append_text(second, "p", "world");
        (dom, first, second)
    }

    #[test]
    fn selectors_match_tag_class_and_lists() {
        let (dom, first, second) = feed();
        assert_eq!(dom.query_selector_all("article"), vec![first, second]);
        assert_eq!(dom.query_selector_all(".pinned"), vec![second]);
        assert_eq!(dom.query_selector_all("article.post.pinned"), vec![second]);
        assert_eq!(dom.query_selector_all("span, .pinned"), vec![second]);
        assert!(dom.query_selector_all("section").is_empty());
    }

    #[test]
    fn text_content_joins_descendants() {
        let (dom, first, _) = feed();
        assert_eq!(dom.text_content(dom.root()), "hello world");
        assert_eq!(dom.text_content(first), "hello");
    }

    #[test]
    fn badge_is_not_part_of_text() {
        let (dom, first, _) = feed();
        dom.insert_badge(first, "Filtered");
        assert_eq!(dom.text_content(first), "hello");
        assert_eq!(dom.badge(first).as_deref(), Some("Filtered"));
    }

    #[test]
    fn detach_disconnects_subtree() {
        let (dom, first, second) = feed();
        let paragraph = dom.children(first)[0];
        dom.detach(first);
        assert!(!dom.is_connected(first));
        assert!(!dom.is_connected(paragraph));
        assert!(dom.is_connected(second));
        assert_eq!(dom.query_selector_all("article"), vec![second]);
        assert_eq!(dom.text_elements().len(), 1);
    }

    #[test]
    fn attributes_roundtrip() {
        let (dom, first, _) = feed();
        dom.set_attribute(first, "style", "color: red");
        assert_eq!(dom.attribute(first, "style").as_deref(), Some("color: red"));
        dom.remove_attribute(first, "style");
        assert!(dom.attribute(first, "style").is_none());
    }
}
