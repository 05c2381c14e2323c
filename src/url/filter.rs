//! Candidate link filters used during discovery

/// Returns true if `url` lives under the normalized `base` prefix
pub fn is_under_base(url: &str, base: &str) -> bool {
    url.starts_with(base)
}

/// Case-insensitive substring check against the excluded keyword list
pub fn contains_excluded_keyword(url: &str, keywords: &[String]) -> bool {
    let lowered = url.to_lowercase();
    keywords
        .iter()
        .any(|keyword| lowered.contains(&keyword.to_lowercase()))
}

/// Content-likeness heuristic for a URL under `base`
///
/// The path relative to the base (trailing `/` removed) must be non-empty
/// and either have at least two segments or end in `.html`.
pub fn is_content_url(url: &str, base: &str) -> bool {
    let Some(relative) = url.strip_prefix(base) else {
        return false;
    };

    let path = relative.trim_end_matches('/');
    if path.is_empty() {
        return false;
    }

    let segments = path.split('/').filter(|s| !s.is_empty()).count();
    segments >= 2 || path.ends_with(".html")
}
