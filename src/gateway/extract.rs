//! Best-effort reply extraction from provider responses.
//!
//! Providers have shipped several response shapes over time, so the reply is
//! looked up through an ordered list of JSON pointers. The first pointer
//! that resolves to non-empty text wins. If none do, the caller gets a
//! bounded serialization of the whole response instead of an error.

use serde_json::Value;

use crate::utils::sanitize::{truncate_chars, MAX_FALLBACK_CHARS};

/// One candidate location of the reply text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionRule {
    /// RFC 6901 JSON pointer into the response.
    pub pointer: &'static str,
}

impl ExtractionRule {
    pub const fn new(pointer: &'static str) -> Self {
        Self { pointer }
    }

    /// Resolve this rule against `response`, if it yields non-empty text.
    pub fn apply(&self, response: &Value) -> Option<String> {
        response.pointer(self.pointer).and_then(text_of)
    }
}

/// Known reply locations, highest priority first.
pub const DEFAULT_RULES: &[ExtractionRule] = &[
    // Cohere v2 style: {"message": {"content": [{"type": "text", "text": ..}]}}
    ExtractionRule::new("/message/content"),
    ExtractionRule::new("/output/0/content"),
    ExtractionRule::new("/output/0/text"),
    // Cohere generate
    ExtractionRule::new("/generations/0/text"),
    // OpenAI chat completions
    ExtractionRule::new("/choices/0/message/content"),
    ExtractionRule::new("/result/content"),
    ExtractionRule::new("/text"),
];

/// Applies extraction rules in order with a serialization fallback.
#[derive(Debug, Clone)]
pub struct ReplyExtractor {
    rules: Vec<ExtractionRule>,
    fallback_max_chars: usize,
}

impl Default for ReplyExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_RULES.to_vec(), MAX_FALLBACK_CHARS)
    }
}

impl ReplyExtractor {
    pub fn new(rules: Vec<ExtractionRule>, fallback_max_chars: usize) -> Self {
        Self {
            rules,
            fallback_max_chars,
        }
    }

    /// First matching rule and its text, if any rule matches.
    pub fn try_rules(&self, response: &Value) -> Option<(ExtractionRule, String)> {
        self.rules
            .iter()
            .find_map(|rule| rule.apply(response).map(|text| (*rule, text)))
    }

    /// Extract the reply text. Never fails.
    pub fn extract(&self, response: &Value) -> String {
        match self.try_rules(response) {
            Some((_, text)) => text,
            None => {
                let serialized = response.to_string();
                truncate_chars(&serialized, self.fallback_max_chars).to_string()
            }
        }
    }
}

/// Text carried by a JSON node.
///
/// Strings count when non-blank. Arrays of content parts (strings or
/// objects with a `text` field) are concatenated. Objects with a `text`
/// field use it.
fn text_of(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(s) => Some(s.as_str()),
                Value::Object(_) => part.get("text").and_then(Value::as_str),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(""),
        Value::Object(_) => value.get("text").and_then(Value::as_str)?.to_string(),
        _ => return None,
    };
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}
