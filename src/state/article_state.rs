/// Article and comment-page state definitions
///
/// An article moves through a small state machine that is persisted in the
/// progress store. Records are never deleted, only transitioned.
use std::fmt;

/// Represents the current status of an article in the progress store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArticleStatus {
    /// Discovered and waiting to be scraped (also the state after a retry reset)
    Pending,

    // ===== Terminal States =====
    /// Body and all reachable comment pages were processed and written
    Scraped,

    /// Processing failed; eligible for a manual retry
    Failed,

    /// The article page returned HTTP 404
    Unavailable,
}

impl ArticleStatus {
    /// Returns true if the article still needs processing
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Returns true if no further automatic processing will happen
    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }

    /// Checks whether moving from this status to `next` is a legal transition
    ///
    /// Legal transitions are `pending -> scraped | failed | unavailable` and
    /// `failed -> pending` (retry). Everything else is rejected.
    pub fn can_transition_to(&self, next: ArticleStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Scraped)
                | (Self::Pending, Self::Failed)
                | (Self::Pending, Self::Unavailable)
                | (Self::Failed, Self::Pending)
        )
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scraped => "scraped",
            Self::Failed => "failed",
            Self::Unavailable => "unavailable",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "scraped" => Some(Self::Scraped),
            "failed" => Some(Self::Failed),
            "unavailable" => Some(Self::Unavailable),
            _ => None,
        }
    }

    /// Returns all possible article statuses
    pub fn all_states() -> Vec<Self> {
        vec![Self::Pending, Self::Scraped, Self::Failed, Self::Unavailable]
    }
}

impl fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Outcome of fetching one comment page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageFetchStatus {
    Done,
    Failed,
}

impl PageFetchStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for PageFetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
