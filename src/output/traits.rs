//! Writer traits and error types
//!
//! A writer receives one fully processed article: its store record, the
//! extracted fields and the reconstructed comment thread in output order.

use crate::crawler::ArticleFields;
use crate::storage::ArticleRecord;
use crate::thread::CommentNode;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Destination for scraped articles
///
/// Invoked exactly once per article reaching `scraped`. Writing the same
/// article again (after a crash before the status update) must replace the
/// earlier output, never append to it.
pub trait ArticleWriter: Send + Sync {
    /// Writes one article and its comment thread
    ///
    /// # Arguments
    ///
    /// * `article` - The article's progress store record
    /// * `fields` - Fields extracted from the article page
    /// * `comments` - Reconstructed comments, depth-first in display order
    fn write_article(
        &self,
        article: &ArticleRecord,
        fields: &ArticleFields,
        comments: &[CommentNode],
    ) -> OutputResult<()>;
}
