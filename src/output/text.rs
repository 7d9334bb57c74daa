//! Plain-text corpus writer
//!
//! One `{article_id}.txt` file per article: a header block, the article body,
//! then every comment indented by depth with a reference to the comment it
//! replies to.

use crate::crawler::ArticleFields;
use crate::output::traits::{ArticleWriter, OutputResult};
use crate::storage::ArticleRecord;
use crate::thread::timestamp::parse_timestamp;
use crate::thread::CommentNode;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

const RULE_WIDTH: usize = 80;
const INDENT: &str = "    ";

/// Writes articles as human-readable text files under a corpus directory
pub struct PlainTextWriter {
    corpus_dir: PathBuf,
}

impl PlainTextWriter {
    pub fn new(corpus_dir: impl Into<PathBuf>) -> Self {
        Self {
            corpus_dir: corpus_dir.into(),
        }
    }

    /// Returns the file an article is written to
    pub fn path_for(&self, article_id: &str) -> PathBuf {
        self.corpus_dir.join(format!("{}.txt", article_id))
    }
}

impl ArticleWriter for PlainTextWriter {
    fn write_article(
        &self,
        article: &ArticleRecord,
        fields: &ArticleFields,
        comments: &[CommentNode],
    ) -> OutputResult<()> {
        fs::create_dir_all(&self.corpus_dir)?;

        let content = render_article(article, fields, comments);
        let target = self.path_for(&article.article_id);
        write_replacing(&target, &content)?;

        tracing::debug!("Wrote {}", target.display());
        Ok(())
    }
}

/// Writes through a temporary sibling so a crash never leaves half a file
fn write_replacing(target: &Path, content: &str) -> std::io::Result<()> {
    let tmp = target.with_extension("txt.tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, target)
}

/// Renders an article and its thread as plain text
pub fn render_article(
    article: &ArticleRecord,
    fields: &ArticleFields,
    comments: &[CommentNode],
) -> String {
    let heavy = "=".repeat(RULE_WIDTH);
    let mut out = String::new();

    let _ = writeln!(out, "{}", heavy);
    let _ = writeln!(out, "TITLE: {}", fields.title);
    let _ = writeln!(out, "AUTHOR: {}", fields.author);
    let date = fields
        .published
        .map(|p| p.date())
        .or(article.published_on);
    if let Some(date) = date {
        let _ = writeln!(out, "DATE: {}", date.format("%Y-%m-%d"));
    }
    let _ = writeln!(out, "URL: {}", article.url);
    if !fields.categories.is_empty() {
        let _ = writeln!(out, "CATEGORIES: {}", fields.categories.join(", "));
    }
    if !fields.tags.is_empty() {
        let _ = writeln!(out, "TAGS: {}", fields.tags.join(", "));
    }
    let _ = writeln!(out, "{}", heavy);
    let _ = writeln!(out);

    let _ = writeln!(out, "ARTICLE CONTENT:");
    let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH / 2));
    let _ = writeln!(out, "{}", fields.body_text);
    let _ = writeln!(out);

    if comments.is_empty() {
        return out;
    }

    let _ = writeln!(out, "{}", heavy);
    let _ = writeln!(out, "COMMENTS ({} total):", comments.len());
    let _ = writeln!(out, "{}", heavy);
    let _ = writeln!(out);

    // Display numbers are 1-based positions in the output sequence
    let numbers: HashMap<&str, usize> = comments
        .iter()
        .enumerate()
        .map(|(i, c)| (c.comment_id(), i + 1))
        .collect();

    for (i, comment) in comments.iter().enumerate() {
        let reply_to = comment
            .parent_id()
            .filter(|_| !comment.orphaned)
            .and_then(|p| numbers.get(p).copied());
        render_comment(&mut out, comment, i + 1, reply_to);
        let _ = writeln!(out);
    }

    out
}

fn render_comment(out: &mut String, comment: &CommentNode, number: usize, reply_to: Option<usize>) {
    let depth = comment.depth as usize;
    let indent = INDENT.repeat(depth);

    let (prefix, marker) = if depth == 0 {
        (String::new(), String::new())
    } else {
        let marker = reply_to
            .map(|n| format!("[REPLY to Comment #{}] ", n))
            .unwrap_or_default();
        (format!("{}  |__ ", INDENT.repeat(depth - 1)), marker)
    };

    let record = &comment.record;
    let date = parse_timestamp(&record.timestamp)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "Unknown date".to_string());

    let _ = writeln!(out, "{}--- Comment #{} {}---", prefix, number, marker);
    let _ = writeln!(out, "{}[ID]: {}", indent, record.comment_id);
    let _ = writeln!(out, "{}[Author]: {}", indent, record.author);
    let _ = writeln!(out, "{}[Date]: {}", indent, date);
    let _ = writeln!(
        out,
        "{}[Votes]: +{} / -{} (score: {})",
        indent,
        record.upvotes,
        record.downvotes,
        comment.vote_score()
    );
    let _ = writeln!(out, "{}[Depth]: {}", indent, comment.depth);
    if comment.orphaned {
        let parent = record.parent_id.as_deref().unwrap_or("?");
        let _ = writeln!(out, "{}[Orphaned]: parent {} not found", indent, parent);
    }
    for url in &record.image_urls {
        let _ = writeln!(out, "{}[Image]: {}", indent, url);
    }
    let _ = writeln!(out, "{}", indent);

    for line in record.text.lines().filter(|l| !l.trim().is_empty()) {
        let _ = writeln!(out, "{}{}", indent, line.trim());
    }
}
