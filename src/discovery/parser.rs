//! HTML link extraction for discovery
//!
//! Links come from `<a href>` tags only. Each one is resolved against the
//! page URL and stripped of its fragment.

use crate::url::strip_fragment;
use scraper::{Html, Selector};
use url::Url;

/// Extracts all followable links from an HTML page
///
/// # Arguments
///
/// * `html` - The HTML content to parse
/// * `page_url` - The URL the page was served from
///
/// # Returns
///
/// Absolute, fragment-free http(s) URLs in document order
///
/// # Example
///
/// ```
/// use blog_sentinel::discovery::extract_links;
/// use url::Url;
///
/// let html = r#"<a href="/2024/post#comments">Post</a>"#;
/// let page = Url::parse("https://example.com/").unwrap();
/// assert_eq!(extract_links(html, &page), vec!["https://example.com/2024/post"]);
/// ```
pub fn extract_links(html: &str, page_url: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut links = Vec::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if let Some(href) = element.value().attr("href") {
                if let Some(absolute_url) = resolve_link(href, page_url) {
                    links.push(absolute_url);
                }
            }
        }
    }

    links
}

/// Resolves a link href to an absolute URL without its fragment
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only (same page) links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, page_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if lowered.starts_with("javascript:")
        || lowered.starts_with("mailto:")
        || lowered.starts_with("tel:")
        || lowered.starts_with("data:")
    {
        return None;
    }

    let mut absolute_url = page_url.join(href).ok()?;
    if absolute_url.scheme() != "http" && absolute_url.scheme() != "https" {
        return None;
    }

    strip_fragment(&mut absolute_url);
    Some(absolute_url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_url() -> Url {
        Url::parse("https://example.com/blog/").unwrap()
    }

    #[test]
    fn test_extract_absolute_link() {
        let html = r#"<html><body><a href="https://other.com/page">Link</a></body></html>"#;
        assert_eq!(extract_links(html, &page_url()), vec!["https://other.com/page"]);
    }

    #[test]
    fn test_extract_root_relative_link() {
        let html = r#"<a href="/other">Link</a>"#;
        assert_eq!(extract_links(html, &page_url()), vec!["https://example.com/other"]);
    }

    #[test]
    fn test_extract_path_relative_link() {
        let html = r#"<a href="2024/post">Link</a>"#;
        assert_eq!(
            extract_links(html, &page_url()),
            vec!["https://example.com/blog/2024/post"]
        );
    }

    #[test]
    fn test_fragment_is_stripped() {
        let html = r#"<a href="/a/b#frag">Link</a>"#;
        assert_eq!(extract_links(html, &page_url()), vec!["https://example.com/a/b"]);
    }

    #[test]
    fn test_skip_special_schemes() {
        let html = r#"
            <a href="javascript:void(0)">js</a>
            <a href="mailto:test@example.com">mail</a>
            <a href="tel:+1234567890">tel</a>
            <a href="data:text/html,<h1>Test</h1>">data</a>
            <a href="ftp://example.com/file">ftp</a>
        "#;
        assert!(extract_links(html, &page_url()).is_empty());
    }

    #[test]
    fn test_skip_fragment_only() {
        let html = r##"<a href="#section">Jump</a>"##;
        assert!(extract_links(html, &page_url()).is_empty());
    }

    #[test]
    fn test_mixed_valid_and_invalid_links() {
        let html = r#"
            <html>
            <body>
                <a href="/valid">Valid</a>
                <a href="javascript:alert('no')">Invalid</a>
                <a href="mailto:test@example.com">Invalid</a>
                <a href="/another-valid">Valid</a>
                <a>No href</a>
            </body>
            </html>
        "#;
        assert_eq!(extract_links(html, &page_url()).len(), 2);
    }
}
