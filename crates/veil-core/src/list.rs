//! Persisted filter list: a named trie plus an optional action override.

use serde::{Deserialize, Serialize};

use crate::action::FilterAction;
use crate::trie::Trie;

/// A user word list and its matcher state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterList {
    /// Unique list name (also the storage key).
    pub list_name: String,
    /// Matcher state, persisted as the trie node tree.
    #[serde(rename = "trieNode", default)]
    pub trie: Trie,
    /// Per-list override of the global default action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_action: Option<FilterAction>,
}

impl FilterList {
    /// Create a list from a word array.
    pub fn new<I, S>(list_name: impl Into<String>, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            list_name: list_name.into(),
            trie: Trie::from_words(words),
            filter_action: None,
        }
    }

    /// The action to apply for matches in this list.
    pub fn effective_action(&self, default: FilterAction) -> FilterAction {
        self.filter_action.unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_is_camel_case() {
        let list = FilterList::new("spoilers", ["ending"]);
        let value = serde_json::to_value(&list).unwrap();
        assert_eq!(value["listName"], "spoilers");
        assert!(value["trieNode"]["children"].is_object());
        assert!(value.get("filterAction").is_none());
    }

    #[test]
    fn effective_action_prefers_override() {
        let mut list = FilterList::new("l", ["w"]);
        assert_eq!(list.effective_action(FilterAction::Hide), FilterAction::Hide);
        list.filter_action = Some(FilterAction::Tag);
        assert_eq!(list.effective_action(FilterAction::Hide), FilterAction::Tag);
    }

    #[test]
    fn missing_trie_defaults_to_empty() {
        let list: FilterList = serde_json::from_str(r#"{"listName": "empty"}"#).unwrap();
        assert!(list.trie.is_empty());
    }
}
