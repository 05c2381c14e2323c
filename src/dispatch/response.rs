//! Lenient decoding of model output
//!
//! Models wrap JSON in markdown fences, prepend prose, or return a bare
//! array where an object was requested. These helpers recover the JSON
//! value when one is present.

use serde_json::Value;

/// Removes a surrounding ```` ``` ```` / ```` ```json ```` fence, if any
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string (e.g. `json`) on the opening fence line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches("json"),
    };

    body.trim_end().trim_end_matches("```").trim()
}

/// Parses the first JSON value that can be recovered from model output
///
/// Tries the fence-stripped text as a whole, then the outermost `{...}` or
/// `[...]` span, whichever opens first.
pub fn parse_lenient_json(text: &str) -> Option<Value> {
    let cleaned = strip_code_fences(text);

    if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
        return Some(value);
    }

    let mut spans: Vec<(usize, usize)> = [('{', '}'), ('[', ']')]
        .iter()
        .filter_map(|&(open, close)| {
            let start = cleaned.find(open)?;
            let end = cleaned.rfind(close)?;
            (end > start).then_some((start, end))
        })
        .collect();
    spans.sort();

    spans
        .into_iter()
        .find_map(|(start, end)| serde_json::from_str::<Value>(&cleaned[start..=end]).ok())
}
