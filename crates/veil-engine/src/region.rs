//! Feed-item detection for pages without site-specific selectors.
//!
//! Feeds render items as siblings of equal size stacked along one axis. The
//! walk climbs from a text element and picks the first ancestor that has
//! enough siblings of matching geometry.

use std::collections::HashMap;

use veil_settings::EngineSettings;

use crate::dom::{ElementId, PageDom, Rect};

/// Axis-aware sibling similarity search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegionHeuristic {
    min_similar_siblings: usize,
    tolerance: f64,
}

impl Default for RegionHeuristic {
    fn default() -> Self {
        Self::from_settings(&EngineSettings::default())
    }
}

impl RegionHeuristic {
    /// Create a heuristic.
    pub fn new(min_similar_siblings: usize, tolerance: f64) -> Self {
        Self {
            min_similar_siblings: min_similar_siblings.max(1),
            tolerance: tolerance.max(0.0),
        }
    }

    /// Create from engine settings.
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self::new(settings.min_similar_siblings, settings.geometry_tolerance_px)
    }

    /// Nearest ancestor of `start` (inclusive) that looks like a feed item.
    ///
    /// The document root is never returned.
    pub fn find_feed_ancestor(&self, dom: &dyn PageDom, start: ElementId) -> Option<ElementId> {
        let mut rects: HashMap<ElementId, Option<Rect>> = HashMap::new();
        let mut rect_of = |el: ElementId| *rects.entry(el).or_insert_with(|| dom.bounding_rect(el));

        let mut current = start;
        while let Some(parent) = dom.parent(current) {
            if let Some(own) = rect_of(current).filter(Rect::is_visible) {
                let similar = dom
                    .children(parent)
                    .into_iter()
                    .filter(|s| *s != current)
                    .filter(|s| rect_of(*s).is_some_and(|r| self.is_similar(&own, &r)))
                    .count();
                if similar >= self.min_similar_siblings {
                    return Some(current);
                }
            }
            current = parent;
        }
        None
    }

    fn is_similar(&self, a: &Rect, b: &Rect) -> bool {
        if !b.is_visible() {
            return false;
        }
        let close = |x: f64, y: f64| (x - y).abs() <= self.tolerance;
        let stacked_vertically = close(a.x, b.x) && close(a.width, b.width);
        let stacked_horizontally = close(a.y, b.y) && close(a.height, b.height);
        stacked_vertically || stacked_horizontally
    }
}
