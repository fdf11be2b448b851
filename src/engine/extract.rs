//! Pull a JSON object out of free-form model output.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::intent::QueryIntent;
use crate::error::SearchError;

/// Extract and validate the query intent embedded in `raw`.
pub fn extract(raw: &str) -> Result<QueryIntent, SearchError> {
    let value = extract_json_object(raw).ok_or_else(|| {
        tracing::warn!(len = raw.len(), "No JSON object found in model output");
        tracing::debug!(raw, "Unparseable model output");
        SearchError::Format
    })?;
    QueryIntent::from_value(&value)
}

/// First JSON object found by, in order: the whole text, a fenced code block,
/// or a brace-delimited span.
pub fn extract_json_object(raw: &str) -> Option<Value> {
    parse_object(raw.trim())
        .or_else(|| extract_fenced_json(raw))
        .or_else(|| extract_braced_json(raw))
}

fn parse_object(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text).ok().filter(Value::is_object)
}

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"```(?:json|JSON)?\s*\n([\s\S]*?)\n\s*```").expect("valid fence regex")
    })
}

/// Content of the first fenced block (optionally tagged `json`) that parses as an object.
fn extract_fenced_json(output: &str) -> Option<Value> {
    fence_regex()
        .captures_iter(output)
        .filter_map(|c| c.get(1))
        .find_map(|m| parse_object(m.as_str().trim()))
}

/// First `{` to its matching `}`; failing that, first `{` to the last `}`.
fn extract_braced_json(output: &str) -> Option<Value> {
    let start = output.find('{')?;
    if let Some(end) = find_matching_brace(output, start) {
        if let Some(v) = parse_object(&output[start..=end]) {
            return Some(v);
        }
    }
    let last = output.rfind('}')?;
    if last <= start {
        return None;
    }
    parse_object(&output[start..=last])
}

/// Byte index of the brace closing the one at `start`, skipping braces inside strings.
fn find_matching_brace(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if ch == '\\' && in_string {
            escape_next = true;
            continue;
        }
        if ch == '"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + i);
                }
            }
            _ => {}
        }
    }

    None
}
