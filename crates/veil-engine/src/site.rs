//! Site-support strategies: which elements of a page are filter candidates.

use std::collections::{BTreeMap, HashSet};

use veil_core::text::collapse_whitespace;
use veil_store::blacklist::normalize_host;

use crate::dom::{ElementId, PageDom};
use crate::region::RegionHeuristic;

/// Picks candidate elements and extracts their text.
pub trait SiteSupport: Send + Sync {
    /// Elements to evaluate on the current page, in document order.
    fn candidates(&self, dom: &dyn PageDom) -> Vec<ElementId>;

    /// Normalized text of a candidate.
    fn text_of(&self, dom: &dyn PageDom, el: ElementId) -> String {
        collapse_whitespace(&dom.text_content(el))
    }
}

/// Per-host selector lists. Unsupported hosts yield no candidates unless a
/// fallback strategy is set.
#[derive(Default)]
pub struct SelectorSiteSupport {
    sites: BTreeMap<String, String>,
    fallback: Option<Box<dyn SiteSupport>>,
}

impl SelectorSiteSupport {
    /// No sites configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Selectors for a handful of well-known feeds.
    pub fn with_defaults() -> Self {
        Self::new()
            .with_site("reddit.com", "shreddit-post, .thing.link")
            .with_site("news.ycombinator.com", "tr.athing, .comment")
            .with_site("x.com", "article")
            .with_site("twitter.com", "article")
            .with_site("youtube.com", "ytd-rich-item-renderer, ytd-video-renderer")
    }

    /// Register a selector list for a host and its subdomains.
    #[must_use]
    pub fn with_site(mut self, host: &str, selectors: &str) -> Self {
        let _ = self.sites.insert(normalize_host(host), selectors.to_string());
        self
    }

    /// Strategy used for hosts without selectors.
    #[must_use]
    pub fn with_fallback(mut self, fallback: impl SiteSupport + 'static) -> Self {
        self.fallback = Some(Box::new(fallback));
        self
    }

    /// Selector list for a host, matching exact host or parent domain.
    pub fn selectors_for(&self, hostname: &str) -> Option<&str> {
        let host = normalize_host(hostname);
        self.sites
            .iter()
            .find(|(site, _)| {
                host == **site
                    || host
                        .strip_suffix(site.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            })
            .map(|(_, selectors)| selectors.as_str())
    }
}

impl SiteSupport for SelectorSiteSupport {
    fn candidates(&self, dom: &dyn PageDom) -> Vec<ElementId> {
        match (self.selectors_for(&dom.hostname()), &self.fallback) {
            (Some(selectors), _) => dom.query_selector_all(selectors),
            (None, Some(fallback)) => fallback.candidates(dom),
            (None, None) => Vec::new(),
        }
    }
}

/// Maps every text-bearing element to its feed item.
#[derive(Clone, Copy, Debug, Default)]
pub struct GenericSiteSupport {
    heuristic: RegionHeuristic,
}

impl GenericSiteSupport {
    /// Create with a region heuristic.
    pub fn new(heuristic: RegionHeuristic) -> Self {
        Self { heuristic }
    }
}

impl SiteSupport for GenericSiteSupport {
    fn candidates(&self, dom: &dyn PageDom) -> Vec<ElementId> {
        let mut seen = HashSet::new();
        dom.text_elements()
            .into_iter()
            .filter_map(|el| self.heuristic.find_feed_ancestor(dom, el))
            .filter(|item| seen.insert(*item))
            .collect()
    }
}
