//! HTML extraction for WordPress archive, article and comment pages
//!
//! This module turns fetched HTML into:
//! - Article links found on monthly archive listings
//! - Article fields (title, author, body text, taxonomy, reported comment count)
//! - Flat comment records for one comment page
//! - The number of comment pages an article has

use crate::thread::timestamp::parse_timestamp;
use crate::thread::RawCommentRecord;
use crate::url::canonicalize_article_url;
use chrono::NaiveDateTime;
use regex::Regex;
use scraper::node::Element;
use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use thiserror::Error;
use url::Url;

/// Errors produced while extracting data from a page
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("No article body found on {0}")]
    MissingBody(String),

    #[error("Unparseable page: {0}")]
    Unparseable(String),
}

/// A link to an article found on a listing page
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleLink {
    /// Canonical article URL
    pub url: Url,
    pub title: String,
}

/// Fields extracted from an article page
#[derive(Debug, Clone, Default)]
pub struct ArticleFields {
    pub title: String,
    pub author: String,
    pub published: Option<NaiveDateTime>,
    /// Paragraphs separated by blank lines
    pub body_text: String,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    /// Comment count the page itself reports, when it shows one
    pub comment_count: Option<u32>,
}

/// Pure HTML-to-data extraction used by discovery and article processing
pub trait HtmlExtractor: Send + Sync {
    /// Extracts canonical article links from an archive listing page
    fn extract_article_links(&self, html: &str, page_url: &Url) -> Vec<ArticleLink>;

    /// Extracts the article's own fields
    fn extract_article_fields(&self, html: &str, page_url: &Url)
        -> Result<ArticleFields, ExtractError>;

    /// Extracts the comments rendered on one comment page
    fn extract_comment_records(&self, html: &str, page_number: u32) -> Vec<RawCommentRecord>;

    /// Returns the total number of comment pages (at least 1)
    fn extract_pagination_info(&self, html: &str) -> u32;
}

struct Selectors {
    listing_links: Vec<Selector>,
    title: Vec<Selector>,
    og_title: Selector,
    author: Vec<Selector>,
    author_meta: Selector,
    published: Vec<Selector>,
    content: Vec<Selector>,
    paragraph: Selector,
    categories: Vec<Selector>,
    tags: Vec<Selector>,
    comment_count: Vec<Selector>,
    comment: Selector,
    comment_author: Selector,
    comment_author_link: Selector,
    comment_time: Selector,
    comment_date_text: Selector,
    comment_text: Selector,
    reply_link: Selector,
    vote_up: Selector,
    vote_down: Selector,
    vote_result: Selector,
    image: Selector,
    link: Selector,
    comment_pagination: Selector,
}

fn parse_one(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Unparseable(format!("selector {}: {:?}", css, e)))
}

fn parse_all(list: &[&str]) -> Result<Vec<Selector>, ExtractError> {
    list.iter().map(|css| parse_one(css)).collect()
}

impl Selectors {
    fn new() -> Result<Self, ExtractError> {
        Ok(Self {
            listing_links: parse_all(&[
                "article h2 a",
                "h2.entry-title a",
                ".post-title a",
                "article .entry-title a",
                ".hentry h2 a",
                "article a[href]",
            ])?,
            title: parse_all(&["h1.entry-title", "h1.post-title", "article h1", ".entry-header h1", "h1"])?,
            og_title: parse_one("meta[property=\"og:title\"]")?,
            author: parse_all(&[
                ".author a",
                ".entry-author a",
                ".post-author a",
                "a[rel=\"author\"]",
                ".byline a",
                ".author-name",
            ])?,
            author_meta: parse_one("meta[name=\"author\"]")?,
            published: parse_all(&[
                "meta[property=\"article:published_time\"]",
                "time.entry-date[datetime]",
                "time[datetime]",
            ])?,
            content: parse_all(&[".entry-content", "article .content", ".post-content", ".article-content", "article"])?,
            paragraph: parse_one("p, blockquote, h2, h3, h4, li")?,
            categories: parse_all(&[
                "a[rel~=\"category\"]",
                ".cat-links a",
                ".entry-categories a",
                ".post-categories a",
            ])?,
            tags: parse_all(&["a[rel=\"tag\"]", ".tag-links a", ".entry-tags a", ".post-tags a"])?,
            comment_count: parse_all(&[
                ".comments-title",
                "#comments h2",
                "#comments h3",
                ".comments-link",
                ".comment-count",
                ".wpd-thread-info",
            ])?,
            comment: parse_one("li.comment, li.pingback, li.trackback, div.wpd-comment")?,
            comment_author: parse_one(".comment-author .fn, .wpd-comment-author, .comment-author, .fn")?,
            comment_author_link: parse_one(".comment-author a[href], .wpd-comment-author a[href]")?,
            comment_time: parse_one("time[datetime]")?,
            comment_date_text: parse_one(".comment-metadata a, .comment-meta a, .wpd-comment-date, .comment-date")?,
            comment_text: parse_one(".comment-content, .wpd-comment-text, .comment-text")?,
            reply_link: parse_one("a.comment-reply-link[href], a.wpd-reply-button[href]")?,
            vote_up: parse_one(".wpd-vote-up .wpd-vote-count, .wpd-up .wpd-vote-count, .vote-up")?,
            vote_down: parse_one(".wpd-vote-down .wpd-vote-count, .wpd-down .wpd-vote-count, .vote-down")?,
            vote_result: parse_one(".wpd-vote-result")?,
            image: parse_one("img")?,
            link: parse_one("a[href]")?,
            comment_pagination: parse_one(
                "a.page-numbers[href], .comment-navigation a[href], .comments-pagination a[href], \
                 .comment-nav a[href], .nav-links a[href], .wpd-comment-pagination a[href]",
            )?,
        })
    }
}

struct Patterns {
    comment_id: Regex,
    replytocom: Regex,
    comment_page: Regex,
    count_phrase: Regex,
    number: Regex,
    image_link: Regex,
}

impl Patterns {
    fn new() -> Result<Self, ExtractError> {
        let compile = |p: &str| Regex::new(p).map_err(|e| ExtractError::Unparseable(e.to_string()));
        Ok(Self {
            comment_id: compile(r"(?:comment|comm)-(\d+)")?,
            replytocom: compile(r"replytocom=(\d+)")?,
            comment_page: compile(r"comment-page-(\d+)")?,
            count_phrase: compile(r"(?i)(\d[\d,]*)\s*(?:comments?|responses?|thoughts?|replies)")?,
            number: compile(r"-?\d[\d,]*")?,
            image_link: compile(r"(?i)\.(?:jpe?g|png|gif|webp)(?:\?|$)")?,
        })
    }
}

/// Extractor for standard WordPress themes and the wpDiscuz comment plugin
pub struct WordPressExtractor {
    base_url: Url,
    selectors: Selectors,
    patterns: Patterns,
}

impl WordPressExtractor {
    /// Creates an extractor resolving relative URLs against `base_url`
    pub fn new(base_url: Url) -> Result<Self, ExtractError> {
        Ok(Self {
            base_url,
            selectors: Selectors::new()?,
            patterns: Patterns::new()?,
        })
    }

    fn comment_id(&self, comment: ElementRef<'_>) -> String {
        let attrs = comment.value();
        let explicit = attrs
            .attr("data-comment-id")
            .or_else(|| attrs.attr("data-wpd-id"))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        if let Some(id) = explicit {
            return id;
        }

        if let Some(id) = attrs
            .attr("id")
            .and_then(|id| self.patterns.comment_id.captures(id))
            .and_then(|c| c.get(1))
        {
            return id.as_str().to_string();
        }

        // No id in the markup: derive one from the content
        let mut hasher = Sha256::new();
        hasher.update(self.comment_author(comment).as_bytes());
        hasher.update(self.comment_timestamp(comment).as_bytes());
        hasher.update(self.comment_text(comment).as_bytes());
        hex::encode(hasher.finalize())[..12].to_string()
    }

    fn comment_author(&self, comment: ElementRef<'_>) -> String {
        own_first(comment, &self.selectors.comment_author)
            .map(|e| normalize_whitespace(&element_text(e)))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Anonymous".to_string())
    }

    fn comment_timestamp(&self, comment: ElementRef<'_>) -> String {
        if let Some(dt) = own_first(comment, &self.selectors.comment_time)
            .and_then(|e| e.value().attr("datetime"))
        {
            return dt.trim().to_string();
        }
        own_first(comment, &self.selectors.comment_date_text)
            .map(|e| normalize_whitespace(&element_text(e)))
            .unwrap_or_default()
    }

    fn comment_text(&self, comment: ElementRef<'_>) -> String {
        own_first(comment, &self.selectors.comment_text)
            .map(|e| normalize_whitespace(&element_text(e)))
            .unwrap_or_default()
    }

    fn comment_parent(&self, comment: ElementRef<'_>, own_id: &str) -> Option<String> {
        let attrs = comment.value();
        let declared = attrs
            .attr("data-parent-id")
            .or_else(|| attrs.attr("data-wpd-parent"))
            .map(str::trim)
            .filter(|p| !p.is_empty() && *p != "0" && *p != "null");
        if let Some(parent) = declared {
            return Some(parent.to_string());
        }

        // Nested inside another comment's reply list
        let enclosing = comment
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|e| is_comment_element(e.value()));
        if let Some(parent) = enclosing {
            return Some(self.comment_id(parent));
        }

        // A reply link naming a different comment
        own_first(comment, &self.selectors.reply_link)
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| self.patterns.replytocom.captures(href))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|id| id != own_id)
    }

    fn vote_count(&self, element: Option<ElementRef<'_>>) -> Option<i64> {
        let text = element_text(element?);
        let raw = self.patterns.number.find(&text)?;
        raw.as_str().replace(',', "").parse().ok()
    }

    fn comment_votes(&self, comment: ElementRef<'_>) -> (i64, i64) {
        let up = self.vote_count(own_first(comment, &self.selectors.vote_up));
        let down = self.vote_count(own_first(comment, &self.selectors.vote_down));

        match (up, down) {
            (None, None) => match self.vote_count(own_first(comment, &self.selectors.vote_result)) {
                Some(score) if score >= 0 => (score, 0),
                Some(score) => (0, -score),
                None => (0, 0),
            },
            (up, down) => (up.unwrap_or(0), down.unwrap_or(0).abs()),
        }
    }

    fn comment_images(&self, comment: ElementRef<'_>) -> Vec<String> {
        let Some(text) = own_first(comment, &self.selectors.comment_text) else {
            return Vec::new();
        };

        let mut images: Vec<String> = Vec::new();
        for img in text.select(&self.selectors.image) {
            let src = img.value().attr("src").or_else(|| img.value().attr("data-src"));
            if let Some(url) = src.and_then(|s| self.base_url.join(s.trim()).ok()) {
                if !images.contains(&url.to_string()) {
                    images.push(url.to_string());
                }
            }
        }
        for link in text.select(&self.selectors.link) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            if !self.patterns.image_link.is_match(href) {
                continue;
            }
            if let Ok(url) = self.base_url.join(href.trim()) {
                if !images.contains(&url.to_string()) {
                    images.push(url.to_string());
                }
            }
        }
        images
    }

    fn extract_title(&self, document: &Html) -> String {
        for selector in &self.selectors.title {
            if let Some(title) = document
                .select(selector)
                .map(|e| normalize_whitespace(&element_text(e)))
                .find(|t| !t.is_empty())
            {
                return title;
            }
        }
        document
            .select(&self.selectors.og_title)
            .next()
            .and_then(|m| m.value().attr("content"))
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }

    fn extract_author(&self, document: &Html) -> String {
        for selector in &self.selectors.author {
            if let Some(author) = document
                .select(selector)
                .map(|e| normalize_whitespace(&element_text(e)))
                .find(|t| !t.is_empty())
            {
                return author;
            }
        }
        document
            .select(&self.selectors.author_meta)
            .next()
            .and_then(|m| m.value().attr("content"))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    fn extract_published(&self, document: &Html, page_url: &Url) -> Option<NaiveDateTime> {
        for selector in &self.selectors.published {
            for element in document.select(selector) {
                let value = element
                    .value()
                    .attr("content")
                    .or_else(|| element.value().attr("datetime"));
                if let Some(parsed) = value.and_then(parse_timestamp) {
                    return Some(parsed);
                }
            }
        }
        crate::url::date_from_url(page_url).and_then(|d| d.and_hms_opt(0, 0, 0))
    }

    fn extract_body(&self, document: &Html) -> Option<String> {
        let content = self
            .selectors
            .content
            .iter()
            .find_map(|s| document.select(s).next())?;

        let paragraphs: Vec<String> = content
            .select(&self.selectors.paragraph)
            .filter(|p| !inside_excluded(*p, content))
            // Nested blocks are covered by their outermost block
            .filter(|p| {
                !p.ancestors()
                    .take_while(|a| a.id() != content.id())
                    .filter_map(ElementRef::wrap)
                    .any(|a| self.selectors.paragraph.matches(&a))
            })
            .map(|p| normalize_whitespace(&element_text(p)))
            .filter(|t| !t.is_empty())
            .collect();

        if paragraphs.is_empty() {
            let text = normalize_whitespace(&element_text(content));
            return Some(text);
        }
        Some(paragraphs.join("\n\n"))
    }

    fn extract_terms(&self, document: &Html, selectors: &[Selector]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut terms = Vec::new();
        for selector in selectors {
            for element in document.select(selector) {
                let term = normalize_whitespace(&element_text(element));
                if !term.is_empty() && seen.insert(term.clone()) {
                    terms.push(term);
                }
            }
        }
        terms
    }

    fn extract_comment_count(&self, document: &Html) -> Option<u32> {
        for selector in &self.selectors.comment_count {
            for element in document.select(selector) {
                let text = element_text(element);
                let found = self
                    .patterns
                    .count_phrase
                    .captures(&text)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str())
                    .or_else(|| self.patterns.number.find(&text).map(|m| m.as_str()));
                if let Some(count) = found.and_then(|n| n.replace(',', "").parse().ok()) {
                    return Some(count);
                }
            }
        }
        None
    }
}

impl HtmlExtractor for WordPressExtractor {
    fn extract_article_links(&self, html: &str, page_url: &Url) -> Vec<ArticleLink> {
        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut links = Vec::new();
        let site_host = page_url
            .host_str()
            .map(|h| h.to_lowercase().trim_start_matches("www.").to_string());

        for selector in &self.selectors.listing_links {
            for element in document.select(selector) {
                let Some(href) = element.value().attr("href") else {
                    continue;
                };
                let Ok(absolute) = page_url.join(href.trim()) else {
                    continue;
                };
                let Ok(canonical) = canonicalize_article_url(absolute.as_str()) else {
                    continue;
                };
                if canonical.host_str() != site_host.as_deref() {
                    continue;
                }
                if seen.insert(canonical.to_string()) {
                    links.push(ArticleLink {
                        url: canonical,
                        title: normalize_whitespace(&element_text(element)),
                    });
                }
            }
        }

        links
    }

    fn extract_article_fields(
        &self,
        html: &str,
        page_url: &Url,
    ) -> Result<ArticleFields, ExtractError> {
        let document = Html::parse_document(html);

        let body_text = self
            .extract_body(&document)
            .ok_or_else(|| ExtractError::MissingBody(page_url.to_string()))?;

        Ok(ArticleFields {
            title: self.extract_title(&document),
            author: self.extract_author(&document),
            published: self.extract_published(&document, page_url),
            body_text,
            categories: self.extract_terms(&document, &self.selectors.categories),
            tags: self.extract_terms(&document, &self.selectors.tags),
            comment_count: self.extract_comment_count(&document),
        })
    }

    fn extract_comment_records(&self, html: &str, page_number: u32) -> Vec<RawCommentRecord> {
        let document = Html::parse_document(html);
        let mut records = Vec::new();

        for (position, comment) in document.select(&self.selectors.comment).enumerate() {
            let comment_id = self.comment_id(comment);
            let parent_id = self.comment_parent(comment, &comment_id);
            let (upvotes, downvotes) = self.comment_votes(comment);
            let author_url = own_first(comment, &self.selectors.comment_author_link)
                .and_then(|a| a.value().attr("href"))
                .map(|s| s.trim().to_string());

            records.push(RawCommentRecord {
                parent_id,
                author: self.comment_author(comment),
                author_url,
                timestamp: self.comment_timestamp(comment),
                text: self.comment_text(comment),
                upvotes,
                downvotes,
                page_number,
                position: position as u32,
                image_urls: self.comment_images(comment),
                comment_id,
            });
        }

        records
    }

    /// Only comment navigation counts; widgets and body text link to other
    /// articles' comment pages too
    fn extract_pagination_info(&self, html: &str) -> u32 {
        let document = Html::parse_document(html);
        document
            .select(&self.selectors.comment_pagination)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| self.patterns.comment_page.captures(href))
            .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse::<u32>().ok()))
            .max()
            .unwrap_or(1)
            .max(1)
    }
}

fn is_comment_element(element: &Element) -> bool {
    element.classes().any(|c| c == "comment" || c == "wpd-comment")
}

fn is_comment_boundary(element: &Element) -> bool {
    element
        .classes()
        .any(|c| c == "children" || c == "comment" || c == "wpd-comment" || c == "wpd-reply")
}

/// First match of `selector` that belongs to `comment` itself, not a reply
fn own_first<'a>(comment: ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    comment.select(selector).find(|candidate| {
        for ancestor in candidate.ancestors() {
            if ancestor.id() == comment.id() {
                return true;
            }
            if let Some(element) = ancestor.value().as_element() {
                if is_comment_boundary(element) {
                    return false;
                }
            }
        }
        false
    })
}

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "blockquote", "h1", "h2", "h3", "h4", "h5", "h6", "pre",
    "table", "tr", "td", "th", "article", "section", "footer", "header",
];

fn is_excluded(element: &Element) -> bool {
    matches!(element.name(), "script" | "style" | "noscript")
        || element.id() == Some("comments")
        || element
            .classes()
            .any(|c| c == "sharedaddy" || c == "jp-relatedposts" || c == "comments")
}

fn inside_excluded(element: ElementRef<'_>, root: ElementRef<'_>) -> bool {
    if is_excluded(element.value()) {
        return true;
    }
    for ancestor in element.ancestors() {
        if ancestor.id() == root.id() {
            return false;
        }
        if let Some(parent) = ancestor.value().as_element() {
            if is_excluded(parent) {
                return true;
            }
        }
    }
    false
}

/// Text of an element, skipping scripts, styles and share widgets
fn element_text(element: ElementRef<'_>) -> String {
    let mut text = String::new();
    collect_text(element, &mut text);
    text
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(t) = child.value().as_text() {
            out.push_str(t);
        } else if let Some(child) = ElementRef::wrap(child) {
            if is_excluded(child.value()) {
                continue;
            }
            let block = BLOCK_ELEMENTS.contains(&child.value().name());
            if block {
                out.push(' ');
            }
            collect_text(child, out);
            if block {
                out.push(' ');
            }
        }
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
