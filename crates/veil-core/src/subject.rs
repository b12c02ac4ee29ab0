//! Semantic filtering subjects.

use serde::{Deserialize, Serialize};

use crate::action::{FilterAction, MlMethod};

/// A natural-language filtering criterion.
///
/// Created with only a description. The first classification that needs it
/// populates `embedding_keywords` and then the averaged `embedding`; both
/// are persisted so population happens once per subject.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MlSubject {
    /// Human description of what to filter (also the storage key).
    pub description: String,
    /// Related phrases whose embeddings are averaged into `embedding`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_keywords: Option<Vec<String>>,
    /// Mean embedding of the keywords.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Per-subject override of the global default action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_action: Option<FilterAction>,
    /// Per-subject override of the global classification method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_method: Option<MlMethod>,
}

impl MlSubject {
    /// Create an unpopulated subject.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    /// Whether keywords and embedding are both present.
    pub fn is_populated(&self) -> bool {
        self.embedding_keywords.as_ref().is_some_and(|k| !k.is_empty()) && self.embedding.is_some()
    }

    /// Replace keywords, dropping the embedding computed from the old ones.
    ///
    /// An empty keyword list clears keywords too, so the next population
    /// regenerates them.
    pub fn set_keywords(&mut self, keywords: Vec<String>) {
        let cleaned: Vec<String> = keywords
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        self.embedding_keywords = if cleaned.is_empty() { None } else { Some(cleaned) };
        self.embedding = None;
    }

    /// The action to apply when this subject matches.
    pub fn effective_action(&self, default: FilterAction) -> FilterAction {
        self.filter_action.unwrap_or(default)
    }

    /// The classification method for this subject.
    pub fn effective_method(&self, default: MlMethod) -> MlMethod {
        self.filter_method.unwrap_or(default)
    }
}
