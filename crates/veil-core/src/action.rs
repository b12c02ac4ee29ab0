//! Filter actions and semantic classification methods.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Visual treatment applied to a matched element.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterAction {
    /// Blur the element and attach an explanatory tooltip.
    #[default]
    Blur,
    /// Hide the element entirely (`display: none`).
    Hide,
    /// Prepend a small label bubble, leaving content visible.
    Tag,
}

impl FilterAction {
    /// Wire name of the action, as written to the `applied-action` attribute.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blur => "blur",
            Self::Hide => "hide",
            Self::Tag => "tag",
        }
    }
}

impl fmt::Display for FilterAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blur" => Ok(Self::Blur),
            "hide" => Ok(Self::Hide),
            "tag" => Ok(Self::Tag),
            other => Err(format!("unknown filter action: {other}")),
        }
    }
}

/// Which stages of the semantic pipeline a subject goes through.
///
/// The method narrows what the configured providers allow; it never enables
/// a stage whose provider is `none`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MlMethod {
    /// Use every configured stage: embedding gate, then LLM confirmation.
    #[default]
    Auto,
    /// Embedding similarity only; a pass is final.
    Embeddings,
    /// LLM classification only; embeddings are skipped.
    Llm,
}

impl MlMethod {
    /// Whether the embedding stage may run under this method.
    pub fn allows_embeddings(self) -> bool {
        !matches!(self, Self::Llm)
    }

    /// Whether the LLM stage may run under this method.
    pub fn allows_llm(self) -> bool {
        !matches!(self, Self::Embeddings)
    }
}
