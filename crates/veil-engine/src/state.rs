//! Reconciler-owned tracking state.
//!
//! Everything is keyed by [`ElementId`], so entries never keep a page node
//! alive and can be pruned once the node leaves the document.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use veil_core::FilterAction;

use crate::dom::ElementId;

/// Why an element is filtered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FilterCause {
    /// A lexical match.
    Word {
        /// Matched word, lowercased.
        word: String,
        /// List that contained it.
        list: String,
    },
    /// A semantic match.
    Subject {
        /// Description of the matching subject.
        description: String,
    },
}

impl FilterCause {
    /// Tooltip text explaining the filter.
    pub fn describe(&self) -> String {
        match self {
            Self::Word { word, list } => format!("Filtered word \"{word}\" from list \"{list}\""),
            Self::Subject { description } => format!("Filtered subject \"{description}\""),
        }
    }

    /// Short text for a tag badge.
    pub fn badge_label(&self) -> &str {
        match self {
            Self::Word { word, .. } => word,
            Self::Subject { description } => description,
        }
    }

    /// Triggering word, for statistics.
    pub fn word(&self) -> Option<&str> {
        match self {
            Self::Word { word, .. } => Some(word),
            Self::Subject { .. } => None,
        }
    }
}

/// One filtered element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilteredEntry {
    /// Treatment currently applied.
    pub action: FilterAction,
    /// What triggered it.
    pub cause: FilterCause,
    /// `style` attribute before the treatment, `None` if absent.
    pub original_style: Option<String>,
}

#[derive(Debug)]
struct Processed {
    hash: String,
    generation: u64,
}

/// Filtered, processed, and ignored element sets for one page.
#[derive(Debug, Default)]
pub struct FilterState {
    filtered: HashMap<ElementId, FilteredEntry>,
    processed: HashMap<ElementId, Processed>,
    ignored: HashSet<ElementId>,
}

impl FilterState {
    /// Empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for a filtered element.
    pub fn filtered(&self, el: ElementId) -> Option<&FilteredEntry> {
        self.filtered.get(&el)
    }

    /// Whether the element is filtered.
    pub fn is_filtered(&self, el: ElementId) -> bool {
        self.filtered.contains_key(&el)
    }

    /// Filtered elements in id order.
    pub fn filtered_ids(&self) -> Vec<ElementId> {
        let mut ids: Vec<_> = self.filtered.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Filtered entries, unordered.
    pub fn filtered_entries(&self) -> impl Iterator<Item = (ElementId, &FilteredEntry)> {
        self.filtered.iter().map(|(id, entry)| (*id, entry))
    }

    /// Number of filtered elements.
    pub fn filtered_len(&self) -> usize {
        self.filtered.len()
    }

    /// Track a newly filtered element.
    pub fn insert_filtered(&mut self, el: ElementId, entry: FilteredEntry) {
        let _ = self.filtered.insert(el, entry);
    }

    /// Stop tracking a filtered element.
    pub fn remove_filtered(&mut self, el: ElementId) -> Option<FilteredEntry> {
        self.filtered.remove(&el)
    }

    /// Content hash recorded when the element was last evaluated.
    pub fn processed_hash(&self, el: ElementId) -> Option<&str> {
        self.processed.get(&el).map(|p| p.hash.as_str())
    }

    /// Record an evaluation started by pass `generation`.
    pub fn mark_processed(&mut self, el: ElementId, hash: String, generation: u64) {
        let _ = self.processed.insert(el, Processed { hash, generation });
    }

    /// Forget an evaluation so the element is looked at again.
    pub fn evict_processed(&mut self, el: ElementId) -> bool {
        self.processed.remove(&el).is_some()
    }

    /// Forget an evaluation only if pass `generation` recorded it.
    pub fn evict_processed_from(&mut self, el: ElementId, generation: u64) -> bool {
        if self.processed.get(&el).is_some_and(|p| p.generation == generation) {
            let _ = self.processed.remove(&el);
            return true;
        }
        false
    }

    /// Forget evaluations of elements that are neither filtered nor ignored.
    /// Returns how many were dropped.
    pub fn evict_unfiltered(&mut self) -> usize {
        let before = self.processed.len();
        let (filtered, ignored) = (&self.filtered, &self.ignored);
        self.processed
            .retain(|id, _| filtered.contains_key(id) || ignored.contains(id));
        before - self.processed.len()
    }

    /// Whether the user excluded the element.
    pub fn is_ignored(&self, el: ElementId) -> bool {
        self.ignored.contains(&el)
    }

    /// Exclude an element from evaluation.
    pub fn ignore(&mut self, el: ElementId) -> bool {
        self.ignored.insert(el)
    }

    /// Re-admit an excluded element.
    pub fn unignore(&mut self, el: ElementId) -> bool {
        self.ignored.remove(&el)
    }

    /// Drop filtered and processed tracking. Ignored marks survive.
    pub fn clear_tracking(&mut self) {
        self.filtered.clear();
        self.processed.clear();
    }

    /// Drop every entry whose element fails `is_live`. Returns the filtered
    /// elements that were dropped.
    pub fn retain_live(&mut self, is_live: impl Fn(ElementId) -> bool) -> Vec<ElementId> {
        let dead: Vec<ElementId> = self
            .filtered
            .keys()
            .copied()
            .filter(|id| !is_live(*id))
            .collect();
        for id in &dead {
            let _ = self.filtered.remove(id);
        }
        self.processed.retain(|id, _| is_live(*id));
        self.ignored.retain(|id| is_live(*id));
        dead
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(word: &str) -> FilteredEntry {
        FilteredEntry {
            action: FilterAction::Blur,
            cause: FilterCause::Word {
                word: word.into(),
                list: "l".into(),
            },
            original_style: None,
        }
    }

    #[test]
    fn cause_text() {
        let word = FilterCause::Word {
            word: "trigger".into(),
            list: "news".into(),
        };
        assert_eq!(word.describe(), "Filtered word \"trigger\" from list \"news\"");
        assert_eq!(word.word(), Some("trigger"));
        let subject = FilterCause::Subject {
            description: "politics".into(),
        };
        assert_eq!(subject.describe(), "Filtered subject \"politics\"");
        assert_eq!(subject.badge_label(), "politics");
        assert_eq!(subject.word(), None);
    }

    #[test]
    fn clear_tracking_keeps_ignored() {
        let mut state = FilterState::new();
        state.insert_filtered(ElementId(1), entry("a"));
        state.mark_processed(ElementId(1), "h".into(), 1);
        let _ = state.ignore(ElementId(2));
        state.clear_tracking();
        assert_eq!(state.filtered_len(), 0);
        assert!(state.processed_hash(ElementId(1)).is_none());
        assert!(state.is_ignored(ElementId(2)));
    }

    #[test]
    fn retain_live_prunes_all_sets() {
        let mut state = FilterState::new();
        state.insert_filtered(ElementId(1), entry("a"));
        state.insert_filtered(ElementId(2), entry("b"));
        state.mark_processed(ElementId(1), "h1".into(), 1);
        state.mark_processed(ElementId(3), "h3".into(), 1);
        let _ = state.ignore(ElementId(3));

        let dropped = state.retain_live(|id| id == ElementId(2));
        assert_eq!(dropped, vec![ElementId(1)]);
        assert_eq!(state.filtered_ids(), vec![ElementId(2)]);
        assert!(state.processed_hash(ElementId(3)).is_none());
        assert!(!state.is_ignored(ElementId(3)));
    }

    #[test]
    fn evict_unfiltered_keeps_filtered_and_ignored() {
        let mut state = FilterState::new();
        state.insert_filtered(ElementId(1), entry("a"));
        for id in 1..=3 {
            state.mark_processed(ElementId(id), format!("h{id}"), 1);
        }
        let _ = state.ignore(ElementId(3));

        assert_eq!(state.evict_unfiltered(), 1);
        assert_eq!(state.processed_hash(ElementId(1)), Some("h1"));
        assert!(state.processed_hash(ElementId(2)).is_none());
        assert_eq!(state.processed_hash(ElementId(3)), Some("h3"));
    }

    #[test]
    fn eviction_by_generation_spares_newer_marks() {
        let mut state = FilterState::new();
        state.mark_processed(ElementId(1), "h".into(), 2);
        assert!(!state.evict_processed_from(ElementId(1), 1));
        assert_eq!(state.processed_hash(ElementId(1)), Some("h"));
        assert!(state.evict_processed_from(ElementId(1), 2));
        assert!(state.processed_hash(ElementId(1)).is_none());
    }
}
