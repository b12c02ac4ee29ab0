//! Text helpers shared by the lexical and semantic pipelines.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

/// Minimum preprocessed length for a text to be worth classifying.
pub const DEFAULT_MIN_ML_TEXT_LENGTH: usize = 20;

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:https?://|www\.)\S+").unwrap());

static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// Whether `c` delimits words: anything that is not a Unicode letter or digit.
pub fn is_boundary(c: char) -> bool {
    !c.is_alphanumeric()
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Prepare text for embedding and classification.
///
/// Strips URLs and digits, then collapses whitespace. Case is preserved.
pub fn preprocess_for_ml(text: &str) -> String {
    let without_urls = URL_RE.replace_all(text, " ");
    let without_digits = DIGITS_RE.replace_all(&without_urls, "");
    collapse_whitespace(&without_digits)
}

/// Whether a preprocessed text is too short to classify.
pub fn should_text_be_skipped_ml(preprocessed: &str, min_length: usize) -> bool {
    preprocessed.chars().count() < min_length
}

/// Stable content hash of rendered element text (hex SHA-256).
pub fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
