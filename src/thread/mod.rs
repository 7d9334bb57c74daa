//! Comment thread reconstruction
//!
//! Comment pages deliver a flat, paginated stream of records. This module
//! turns that stream into a deduplicated, depth-annotated, deterministically
//! ordered thread.

mod reconstruct;
pub mod timestamp;

pub use reconstruct::{check_reconciliation, reconstruct, Reconstruction};

use serde::{Deserialize, Serialize};
use std::fmt;

/// One comment as extracted from a single comment page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCommentRecord {
    /// Site-wide unique comment identifier
    pub comment_id: String,

    /// Parent comment id; `None` for top-level comments
    #[serde(default)]
    pub parent_id: Option<String>,

    pub author: String,

    #[serde(default)]
    pub author_url: Option<String>,

    /// Timestamp exactly as it appeared in the page
    pub timestamp: String,

    pub text: String,

    #[serde(default)]
    pub upvotes: i64,

    #[serde(default)]
    pub downvotes: i64,

    /// Comment page this record was read from (1-based)
    pub page_number: u32,

    /// Index of the record within its page
    pub position: u32,

    #[serde(default)]
    pub image_urls: Vec<String>,
}

/// A comment placed in its reconstructed thread
#[derive(Debug, Clone, PartialEq)]
pub struct CommentNode {
    pub record: RawCommentRecord,

    /// 0 for roots, parent depth + 1 otherwise (capped)
    pub depth: u32,

    /// Ids of direct replies, in output order
    pub children: Vec<String>,

    /// The declared parent was never observed
    pub orphaned: bool,

    /// The real nesting exceeded the configured maximum depth
    pub depth_capped: bool,
}

impl CommentNode {
    pub fn comment_id(&self) -> &str {
        &self.record.comment_id
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.record.parent_id.as_deref()
    }

    pub fn vote_score(&self) -> i64 {
        self.record.upvotes - self.record.downvotes
    }
}

/// Data quality problems found while rebuilding a thread
///
/// None of these abort an article; they are logged and persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataQualityWarning {
    OrphanedComment {
        comment_id: String,
        parent_id: String,
    },
    DepthCapExceeded {
        comment_id: String,
        depth: u32,
        max_depth: u32,
    },
    ParentCycle {
        promoted: String,
        members: Vec<String>,
    },
    CommentCountMismatch {
        expected: u32,
        reconstructed: usize,
    },
    CrossArticleDuplicate {
        comment_id: String,
    },
}

impl DataQualityWarning {
    /// Stable identifier used when persisting the warning
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OrphanedComment { .. } => "orphaned_comment",
            Self::DepthCapExceeded { .. } => "depth_cap_exceeded",
            Self::ParentCycle { .. } => "parent_cycle",
            Self::CommentCountMismatch { .. } => "comment_count_mismatch",
            Self::CrossArticleDuplicate { .. } => "cross_article_duplicate",
        }
    }
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OrphanedComment {
                comment_id,
                parent_id,
            } => write!(
                f,
                "comment {} references missing parent {}",
                comment_id, parent_id
            ),
            Self::DepthCapExceeded {
                comment_id,
                depth,
                max_depth,
            } => write!(
                f,
                "comment {} nested at depth {} collapsed to {}",
                comment_id, depth, max_depth
            ),
            Self::ParentCycle { promoted, members } => write!(
                f,
                "parent cycle among [{}], promoted {} to root",
                members.join(", "),
                promoted
            ),
            Self::CommentCountMismatch {
                expected,
                reconstructed,
            } => write!(
                f,
                "page reported {} comments, reconstructed {}",
                expected, reconstructed
            ),
            Self::CrossArticleDuplicate { comment_id } => write!(
                f,
                "comment {} already belongs to another article",
                comment_id
            ),
        }
    }
}
