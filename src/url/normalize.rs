use crate::UrlError;
use url::Url;

/// Normalizes a parent blog URL into the base used for discovery
///
/// # Normalization Steps
///
/// 1. Trim surrounding whitespace and parse; reject if malformed
/// 2. Require an http or https scheme and a host
/// 3. Drop the query string and fragment
/// 4. Ensure the path ends with a trailing `/`
///
/// # Examples
///
/// ```
/// use blog_sentinel::url::normalize_base_url;
///
/// let url = normalize_base_url("https://Blog.Example.com/research").unwrap();
/// assert_eq!(url.as_str(), "https://blog.example.com/research/");
/// ```
pub fn normalize_base_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    url.set_query(None);
    url.set_fragment(None);

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

/// Removes the `#fragment` part of a URL in place
pub fn strip_fragment(url: &mut Url) {
    url.set_fragment(None);
}
