//! Lenient recovery of a JSON object from free-text provider output.
//!
//! Search-grounded responses cannot be forced into JSON mode, so the model may
//! wrap the payload in prose or code fences. This step only locates the
//! object; schema validation happens afterwards in `AnalysisResult::decode`.

use serde_json::Value;

use crate::error::ExtractError;

/// Extract the embedded JSON object from `text`.
///
/// Tries, in order: the whole (fence-stripped) text, every top-level balanced
/// `{...}` span from largest to smallest, then the first-`{`-to-last-`}` span.
pub fn extract_json_object(text: &str) -> Result<Value, ExtractError> {
    let cleaned = strip_code_fences(text);
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Err(ExtractError::Empty);
    }

    if cleaned.starts_with('{') {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(cleaned) {
            return Ok(value);
        }
    }

    let mut spans = balanced_object_spans(cleaned);
    spans.sort_by(|a, b| (b.1 - b.0).cmp(&(a.1 - a.0)));
    for (start, end) in spans {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&cleaned[start..end]) {
            return Ok(value);
        }
    }

    match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => {
            match serde_json::from_str::<Value>(&cleaned[start..=end]) {
                Ok(value @ Value::Object(_)) => Ok(value),
                Ok(_) => Err(ExtractError::NoObject),
                Err(err) => Err(ExtractError::Malformed(err.to_string())),
            }
        }
        _ => Err(ExtractError::NoObject),
    }
}

fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```JSON", "").replace("```", "")
}

/// Byte ranges of top-level `{...}` spans, ignoring braces inside strings.
fn balanced_object_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = idx;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    spans.push((start, idx + ch.len_utf8()));
                }
            }
            _ => {}
        }
    }
    spans
}
