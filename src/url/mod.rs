//! URL handling module for wp-harvest
//!
//! This module provides canonical article URLs, stable article identifiers,
//! and the archive and comment-page URL layouts of a WordPress site.

mod normalize;

pub use normalize::canonicalize_article_url;

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use url::Url;

/// Splits a URL path into its non-empty segments
fn path_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn is_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.chars().all(|c| c.is_ascii_digit())
}

/// Checks whether a path is a dated WordPress permalink
///
/// Accepts `/YYYY/MM/DD/slug/` and `/YYYY/MM/slug/`. Archive listings such
/// as `/YYYY/MM/`, `/YYYY/MM/page/N/` and `/YYYY/MM/DD/` are rejected.
pub fn is_article_path(path: &str) -> bool {
    match path_segments(path).as_slice() {
        [y, m, d, slug] => {
            is_digits(y, 4) && is_digits(m, 2) && is_digits(d, 2) && is_slug(slug)
        }
        [y, m, slug] => {
            is_digits(y, 4) && is_digits(m, 2) && is_slug(slug) && !is_digits(slug, 2)
        }
        _ => false,
    }
}

fn is_slug(s: &str) -> bool {
    !s.is_empty() && s != "page" && !s.starts_with("comment-page-")
}

/// Derives the stable article identifier from a canonical article URL
///
/// `/YYYY/MM/DD/slug/` becomes `YYYYMMDD_slug`, `/YYYY/MM/slug/` becomes
/// `YYYYMM_slug`. Anything else falls back to the first 12 hex characters of
/// the SHA-256 of the URL.
pub fn article_id_for(url: &str) -> String {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_default();

    match path_segments(&path).as_slice() {
        [y, m, d, slug, ..] if is_digits(y, 4) && is_digits(m, 2) && is_digits(d, 2) => {
            format!("{}{}{}_{}", y, m, d, slug)
        }
        [y, m, slug, ..] if is_digits(y, 4) && is_digits(m, 2) => format!("{}{}_{}", y, m, slug),
        _ => {
            let digest = Sha256::digest(url.as_bytes());
            hex::encode(digest)[..12].to_string()
        }
    }
}

/// Extracts the publication date encoded in a `/YYYY/MM/DD/` permalink
pub fn date_from_url(url: &Url) -> Option<NaiveDate> {
    match path_segments(url.path()).as_slice() {
        [y, m, d, ..] if is_digits(y, 4) && is_digits(m, 2) && is_digits(d, 2) => {
            NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
        }
        _ => None,
    }
}

/// Extracts the `(year, month)` encoded in a permalink, when present
pub fn month_from_url(url: &Url) -> Option<(i32, u32)> {
    match path_segments(url.path()).as_slice() {
        [y, m, ..] if is_digits(y, 4) && is_digits(m, 2) => Some((y.parse().ok()?, m.parse().ok()?)),
        _ => None,
    }
}

/// Builds the URL of one listing page of a monthly archive
///
/// Page 1 is `{base}/{YYYY}/{MM}/`; later pages are `{base}/{YYYY}/{MM}/page/{N}/`.
pub fn archive_url(base_url: &str, year: i32, month: u32, page: u32) -> String {
    let base = base_url.trim_end_matches('/');
    if page <= 1 {
        format!("{}/{:04}/{:02}/", base, year, month)
    } else {
        format!("{}/{:04}/{:02}/page/{}/", base, year, month, page)
    }
}

/// Builds the URL of a comment page of an article
///
/// Page 1 is the article page itself; page k is `{article}comment-page-{k}/`.
pub fn comment_page_url(article_url: &str, page: u32) -> String {
    if page <= 1 {
        return article_url.to_string();
    }
    if article_url.ends_with('/') {
        format!("{}comment-page-{}/", article_url, page)
    } else {
        format!("{}/comment-page-{}/", article_url, page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_article_id_from_dated_permalink() {
        assert_eq!(
            article_id_for("https://example.com/2017/01/20/inauguration/"),
            "20170120_inauguration"
        );
        assert_eq!(
            article_id_for("https://example.com/2009/11/climategate/"),
            "200911_climategate"
        );
    }

    #[test]
    fn test_article_id_fallback_is_stable_hash() {
        let id = article_id_for("https://example.com/about/");
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, article_id_for("https://example.com/about/"));
        assert_ne!(id, article_id_for("https://example.com/contact/"));
    }

    #[test]
    fn test_is_article_path() {
        assert!(is_article_path("/2017/01/20/inauguration/"));
        assert!(is_article_path("/2009/11/climategate/"));
        assert!(!is_article_path("/2017/01/"));
        assert!(!is_article_path("/2017/01/20/"));
        assert!(!is_article_path("/2017/01/page/3/"));
        assert!(!is_article_path("/tag/co2/"));
    }

    #[test]
    fn test_date_from_url() {
        let url = Url::parse("https://example.com/2017/01/20/inauguration/").unwrap();
        assert_eq!(date_from_url(&url), NaiveDate::from_ymd_opt(2017, 1, 20));

        let undated = Url::parse("https://example.com/2009/11/climategate/").unwrap();
        assert_eq!(date_from_url(&undated), None);
        assert_eq!(month_from_url(&undated), Some((2009, 11)));

        let invalid = Url::parse("https://example.com/2017/02/31/nope/").unwrap();
        assert_eq!(date_from_url(&invalid), None);
    }

    #[test]
    fn test_archive_url() {
        assert_eq!(
            archive_url("https://example.com/", 2017, 1, 1),
            "https://example.com/2017/01/"
        );
        assert_eq!(
            archive_url("https://example.com", 2017, 1, 4),
            "https://example.com/2017/01/page/4/"
        );
    }

    #[test]
    fn test_comment_page_url() {
        let article = "https://example.com/2017/01/20/inauguration/";
        assert_eq!(comment_page_url(article, 1), article);
        assert_eq!(
            comment_page_url(article, 3),
            "https://example.com/2017/01/20/inauguration/comment-page-3/"
        );
    }
}
