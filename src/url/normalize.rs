use crate::url::is_article_path;
use crate::UrlError;
use url::Url;

/// Query parameters that never identify a different article
const IGNORED_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_eid",
    "ref",
    "source",
    "replytocom",
    "share",
    "amp",
    "noamp",
];

/// Canonicalizes an article URL so that every spelling of it maps to one key
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or not http(s)
/// 2. Lowercase the host and remove a `www.` prefix
/// 3. Normalize path:
///    - Remove dot segments and empty segments
///    - Drop a trailing `comment-page-N` segment
///    - Always end with a trailing slash (WordPress permalink form)
/// 4. Remove fragment
/// 5. Remove tracking and reply query parameters, sort the rest
/// 6. Reject paths that are not dated article permalinks
///
/// # Examples
///
/// ```
/// use wp_harvest::url::canonicalize_article_url;
///
/// let url = canonicalize_article_url(
///     "https://WWW.Example.com/2017/01/20/inauguration/comment-page-3/#comments",
/// )
/// .unwrap();
/// assert_eq!(url.as_str(), "https://example.com/2017/01/20/inauguration/");
/// ```
pub fn canonicalize_article_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    // Plain http is kept so that local mirrors and mock servers work
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url.host_str().ok_or(UrlError::MissingDomain)?;
    let mut normalized_host = host.to_lowercase();
    if let Some(stripped) = normalized_host.strip_prefix("www.") {
        normalized_host = stripped.to_string();
    }
    url.set_host(Some(&normalized_host))
        .map_err(|e| UrlError::Parse(format!("Failed to set host: {}", e)))?;

    let normalized_path = normalize_path(url.path());
    if !is_article_path(&normalized_path) {
        return Err(UrlError::NotAnArticle(url_str.to_string()));
    }
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if url.query().is_some() {
        let kept = filter_and_sort_query_params(&url);
        if kept.is_empty() {
            url.set_query(None);
        } else {
            let query_string = kept
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            url.set_query(Some(&query_string));
        }
    }

    Ok(url)
}

/// Normalizes a permalink path, always returning a trailing slash
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.last().map_or(false, |s| is_comment_page_segment(s)) {
        segments.pop();
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}/", segments.join("/"))
}

fn is_comment_page_segment(segment: &str) -> bool {
    segment
        .strip_prefix("comment-page-")
        .map_or(false, |n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_ignored_param(key))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    params.sort_by(|a, b| a.0.cmp(&b.0));

    params
}

fn is_ignored_param(key: &str) -> bool {
    IGNORED_PARAMS.contains(&key) || key.starts_with("utm_")
}
