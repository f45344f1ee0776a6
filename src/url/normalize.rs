use crate::UrlError;
use url::Url;

/// Normalizes a URL into the form used for identity comparisons
///
/// Two URLs that normalize to the same string are treated as the same
/// document: a sitemap is fetched at most once per resolution run and a
/// page is enqueued at most once per task.
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Require an http or https scheme (the scheme itself is preserved)
/// 3. Lowercase the host; default ports are dropped by the parser
/// 4. Normalize path:
///    - Remove dot segments (. and ..)
///    - Collapse repeated slashes
///    - Remove trailing slash (except for root /)
///    - Empty path becomes /
/// 5. Remove fragment (everything after #)
/// 6. Sort query parameters by key, dropping an empty query string
///
/// # Arguments
///
/// * `url_str` - The URL string to normalize
///
/// # Returns
///
/// * `Ok(Url)` - Normalized URL
/// * `Err(UrlError)` - Failed to parse or normalize the URL
///
/// # Examples
///
/// ```
/// use sitemap_harvest::url::normalize_url;
///
/// let url = normalize_url("http://EXAMPLE.COM/a//b/?z=1&a=2#top").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/a/b?a=2&z=1");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url.host_str().ok_or(UrlError::MissingDomain)?.to_lowercase();
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if url.query().is_some() {
        let params = sorted_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            let query_string = params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            url.set_query(Some(&query_string));
        }
    }

    Ok(url)
}

/// Resolves a `<loc>` value against the URL of the sitemap that contained it
///
/// Absolute values are returned as-is; relative values are joined onto
/// `base`. Anything that does not end up as an http(s) URL is rejected.
///
/// # Arguments
///
/// * `base` - URL of the sitemap document
/// * `loc` - Raw, already-trimmed `<loc>` text
///
/// # Returns
///
/// * `Some(Url)` - The absolute URL
/// * `None` - The value is empty, unparseable, or not http(s)
pub fn resolve_loc(base: &Url, loc: &str) -> Option<Url> {
    if loc.is_empty() {
        return None;
    }

    let url = base.join(loc).ok()?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Some(url),
        _ => None,
    }
}

/// Normalizes a URL path by removing dot segments and trailing slashes
fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut normalized_segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                normalized_segments.pop();
            }
            _ => normalized_segments.push(segment),
        }
    }

    if normalized_segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", normalized_segments.join("/"))
}

/// Sorts query parameters by key, keeping the relative order of equal keys
fn sorted_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    params.sort_by(|a, b| a.0.cmp(&b.0));

    params
}
