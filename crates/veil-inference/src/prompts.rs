//! Prompt construction and strict JSON extraction.

use std::fmt::Write as _;

use serde::Deserialize;

/// System prompt for YES/NO/IDK classification.
pub const CLASSIFY_SYSTEM_PROMPT: &str = "You are a content classifier. You receive a numbered list of topic \
descriptions and a text. For each description, answer YES if the text is about that topic, NO if it is not, \
and IDK if you cannot tell. Respond with JSON only, no prose, in exactly this shape: \
{\"results\": [\"YES\" | \"NO\" | \"IDK\", ...]} with one entry per description, in the same order.";

/// One classification answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// The text is about the description.
    Yes,
    /// The text is not about the description.
    No,
    /// The model could not decide.
    Idk,
}

impl Verdict {
    /// Only `YES` counts as a match.
    pub fn is_match(self) -> bool {
        matches!(self, Self::Yes)
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "YES" => Some(Self::Yes),
            "NO" => Some(Self::No),
            "IDK" => Some(Self::Idk),
            _ => None,
        }
    }
}

/// User message listing descriptions and the text to classify.
pub fn classification_user_message(text: &str, descriptions: &[&str]) -> String {
    let mut out = String::from("Descriptions:\n");
    for (i, d) in descriptions.iter().enumerate() {
        let _ = writeln!(out, "{}. {d}", i + 1);
    }
    let _ = write!(out, "\nText:\n{text}");
    out
}

/// System prompt asking for `count` related phrases.
pub fn keyword_system_prompt(count: usize) -> String {
    format!(
        "You generate search phrases for a content filter. Given a topic description, produce {count} \
diverse short phrases (one to four words each) that commonly appear in text about that topic. \
Respond with JSON only, no prose, in exactly this shape: {{\"keywords\": [\"...\", ...]}}"
    )
}

/// User message for keyword synthesis.
pub fn keyword_user_message(description: &str) -> String {
    format!("Topic description: {description}")
}

/// Slice from the first `{` to the last `}`, if both exist in order.
pub fn extract_json(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}

#[derive(Deserialize)]
struct ClassificationPayload {
    results: Vec<String>,
}

/// Parse a classification reply. `None` unless it has exactly `expected`
/// valid answers.
pub fn parse_classification(raw: &str, expected: usize) -> Option<Vec<Verdict>> {
    let payload: ClassificationPayload = serde_json::from_str(extract_json(raw)?).ok()?;
    if payload.results.len() != expected {
        return None;
    }
    payload.results.iter().map(|r| Verdict::parse(r)).collect()
}

#[derive(Deserialize)]
struct KeywordPayload {
    keywords: Vec<String>,
}

/// Parse a keyword reply into trimmed, non-empty, de-duplicated phrases.
pub fn parse_keywords(raw: &str) -> Option<Vec<String>> {
    let payload: KeywordPayload = serde_json::from_str(extract_json(raw)?).ok()?;
    let mut out: Vec<String> = Vec::with_capacity(payload.keywords.len());
    for k in payload.keywords {
        let k = k.trim();
        if !k.is_empty() && !out.iter().any(|o| o.eq_ignore_ascii_case(k)) {
            out.push(k.to_string());
        }
    }
    (!out.is_empty()).then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_numbers_descriptions() {
        let msg = classification_user_message("some text", &["politics", "sports"]);
        assert_eq!(msg, "Descriptions:\n1. politics\n2. sports\n\nText:\nsome text");
    }

    #[test]
    fn extract_json_from_wrapped_reply() {
        let raw = "Sure! ```json\n{\"results\": [\"YES\"]}\n``` hope that helps";
        assert_eq!(extract_json(raw), Some("{\"results\": [\"YES\"]}"));
        assert_eq!(extract_json("no braces"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[test]
    fn classification_parsing() {
        assert_eq!(
            parse_classification("{\"results\": [\"yes\", \"NO\", \" idk \"]}", 3),
            Some(vec![Verdict::Yes, Verdict::No, Verdict::Idk])
        );
        assert_eq!(parse_classification("{\"results\": [\"YES\"]}", 2), None);
        assert_eq!(parse_classification("{\"results\": [\"MAYBE\"]}", 1), None);
        assert_eq!(parse_classification("{\"answer\": \"YES\"}", 1), None);
        assert_eq!(parse_classification("YES", 1), None);
    }

    #[test]
    fn only_yes_matches() {
        assert!(Verdict::Yes.is_match());
        assert!(!Verdict::No.is_match());
        assert!(!Verdict::Idk.is_match());
    }

    #[test]
    fn keyword_parsing_cleans() {
        let raw = "{\"keywords\": [\" ballot \", \"Ballot\", \"\", \"senate race\"]}";
        assert_eq!(
            parse_keywords(raw),
            Some(vec!["ballot".to_string(), "senate race".to_string()])
        );
        assert_eq!(parse_keywords("{\"keywords\": []}"), None);
        assert_eq!(parse_keywords("garbage"), None);
    }

    #[test]
    fn keyword_prompt_mentions_count() {
        assert!(keyword_system_prompt(10).contains("produce 10"));
    }
}
