//! Repository link mining from free-form field values.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::{extract_text, RichTextNode};

/// GitHub repository link: scheme, host, then a run of characters that
/// cannot be whitespace, angle brackets, quotes, pipes, or square brackets.
const REPOSITORY_PATTERN: &str = r#"https?://github\.com/[^\s<>"'|\[\]]+"#;

/// Punctuation that commonly trails a link in prose.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')'];

fn repository_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(REPOSITORY_PATTERN).ok())
        .as_ref()
}

/// Text to scan for a field value: strings as-is, document trees
/// flattened, anything else serialized as JSON.
fn field_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        _ if RichTextNode::is_document(value) => extract_text(value),
        other => other.to_string(),
    }
}

/// Normalize one raw match: drop trailing punctuation, then a `.git` suffix.
fn normalize(raw: &str) -> &str {
    let trimmed = raw.trim_end_matches(TRAILING_PUNCTUATION);
    trimmed.strip_suffix(".git").unwrap_or(trimmed)
}

/// Extract repository links from plain text, de-duplicated in first-seen order.
#[must_use]
pub fn mine_text(text: &str) -> Vec<String> {
    let Some(pattern) = repository_regex() else {
        return Vec::new();
    };

    let mut urls: Vec<String> = Vec::new();
    for found in pattern.find_iter(text) {
        let url = normalize(found.as_str());
        if !url.is_empty() && !urls.iter().any(|seen| seen == url) {
            urls.push(url.to_owned());
        }
    }
    urls
}

/// Extract repository links from a tracker field value.
#[must_use]
pub fn mine_repository_urls(value: &Value) -> Vec<String> {
    mine_text(&field_text(value))
}
