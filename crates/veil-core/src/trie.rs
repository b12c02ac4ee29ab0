//! Boundary-aware multi-word trie matcher.
//!
//! One [`Trie`] backs each filter list. Words are stored lowercased; blank
//! words are never stored, so the root is never a word end.
//!
//! # Scanning
//!
//! [`Trie::should_filter_text_content`] walks the lowercased, trimmed text
//! one character at a time. A word only counts when it starts at the
//! beginning of the text or right after a boundary character, and the
//! character right after it is a boundary (or the text ends). A boundary is
//! any character that is not a Unicode letter or digit.
//!
//! When a walk fails, scanning resumes just after the first boundary seen
//! inside the failed partial match, or, if there was none, just after the
//! next boundary at or beyond the failure point. Every valid start position
//! is tried exactly once, so the scan is linear in the number of starts
//! times the longest word, and overlapping phrases are not missed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::text::is_boundary;

/// A single node in the persisted trie tree.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrieNode {
    /// Whether a stored word ends at this node.
    #[serde(default)]
    pub is_end_of_word: bool,
    /// Child nodes keyed by their (lowercase) character.
    #[serde(default)]
    pub children: BTreeMap<char, TrieNode>,
}

impl TrieNode {
    fn is_prunable(&self) -> bool {
        !self.is_end_of_word && self.children.is_empty()
    }
}

/// Result of scanning text against a trie.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextMatch {
    /// Whether a boundary-delimited word was found.
    pub should_filter: bool,
    /// The first word that matched, if any.
    pub triggering_word: Option<String>,
}

impl TextMatch {
    fn hit(word: String) -> Self {
        Self {
            should_filter: true,
            triggering_word: Some(word),
        }
    }
}

/// Word set with whole-word scanning over free text.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trie {
    root: TrieNode,
}

impl Trie {
    /// Create an empty trie.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a trie from a word list. Blank entries are ignored.
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut trie = Self::new();
        for word in words {
            let _ = trie.add_word(word.as_ref());
        }
        trie
    }

    /// Rehydrate a trie from a persisted node tree.
    pub fn from_node(root: TrieNode) -> Self {
        Self { root }
    }

    /// Borrow the root node (for persistence).
    pub fn root(&self) -> &TrieNode {
        &self.root
    }

    /// Insert a word. Returns `false` for blank input or an existing word.
    pub fn add_word(&mut self, word: &str) -> bool {
        let Some(normalized) = normalize_word(word) else {
            return false;
        };
        let mut node = &mut self.root;
        for c in normalized.chars() {
            node = node.children.entry(c).or_default();
        }
        let inserted = !node.is_end_of_word;
        node.is_end_of_word = true;
        inserted
    }

    /// Remove an exact word, pruning branches that no longer lead anywhere.
    ///
    /// Returns `false` if the word was not stored.
    pub fn remove_word(&mut self, word: &str) -> bool {
        let Some(normalized) = normalize_word(word) else {
            return false;
        };
        let chars: Vec<char> = normalized.chars().collect();
        remove_from(&mut self.root, &chars)
    }

    /// Exact full-word lookup.
    pub fn word_exists(&self, word: &str) -> bool {
        let Some(normalized) = normalize_word(word) else {
            return false;
        };
        let mut node = &self.root;
        for c in normalized.chars() {
            match node.children.get(&c) {
                Some(next) => node = next,
                None => return false,
            }
        }
        node.is_end_of_word
    }

    /// All stored words in lexicographic order.
    pub fn words(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut prefix = String::new();
        collect_words(&self.root, &mut prefix, &mut out);
        out
    }

    /// Number of stored words.
    pub fn len(&self) -> usize {
        count_words(&self.root)
    }

    /// Whether no words are stored.
    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    /// Scan `text` for the first boundary-delimited stored word.
    pub fn should_filter_text_content(&self, text: &str) -> TextMatch {
        if self.is_empty() {
            return TextMatch::default();
        }
        let lowered = text.trim().to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();
        let n = chars.len();

        let mut start = 0;
        while start < n {
            let mut node = &self.root;
            let mut pos = start;
            let mut first_boundary: Option<usize> = None;

            loop {
                if node.is_end_of_word && (pos == n || is_boundary(chars[pos])) {
                    return TextMatch::hit(chars[start..pos].iter().collect());
                }
                if pos == n {
                    break;
                }
                let c = chars[pos];
                let Some(next) = node.children.get(&c) else {
                    break;
                };
                if first_boundary.is_none() && is_boundary(c) {
                    first_boundary = Some(pos);
                }
                node = next;
                pos += 1;
            }

            start = match first_boundary {
                Some(boundary) => boundary + 1,
                None => {
                    let mut skip = pos;
                    while skip < n && !is_boundary(chars[skip]) {
                        skip += 1;
                    }
                    skip + 1
                }
            };
        }

        TextMatch::default()
    }
}

fn normalize_word(word: &str) -> Option<String> {
    let trimmed = word.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

fn remove_from(node: &mut TrieNode, chars: &[char]) -> bool {
    let Some((first, rest)) = chars.split_first() else {
        if !node.is_end_of_word {
            return false;
        }
        node.is_end_of_word = false;
        return true;
    };
    let Some(child) = node.children.get_mut(first) else {
        return false;
    };
    let removed = remove_from(child, rest);
    if removed && child.is_prunable() {
        let _ = node.children.remove(first);
    }
    removed
}

fn collect_words(node: &TrieNode, prefix: &mut String, out: &mut Vec<String>) {
    if node.is_end_of_word {
        out.push(prefix.clone());
    }
    for (c, child) in &node.children {
        prefix.push(*c);
        collect_words(child, prefix, out);
        let _ = prefix.pop();
    }
}

fn count_words(node: &TrieNode) -> usize {
    usize::from(node.is_end_of_word) + node.children.values().map(count_words).sum::<usize>()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
