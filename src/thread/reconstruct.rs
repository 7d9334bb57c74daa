use crate::thread::timestamp::parse_timestamp;
use crate::thread::{CommentNode, DataQualityWarning, RawCommentRecord};
use chrono::NaiveDateTime;
use std::collections::{HashMap, HashSet};

/// Output of a thread reconstruction
#[derive(Debug, Clone, Default)]
pub struct Reconstruction {
    /// Depth-first, sibling-ordered sequence of comments
    pub nodes: Vec<CommentNode>,

    pub warnings: Vec<DataQualityWarning>,
}

impl Reconstruction {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Numeric ids order numerically and before any non-numeric id
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum IdKey {
    Numeric(u64),
    Text(String),
}

/// Total order used among siblings and when breaking cycles
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct SiblingKey {
    unparsed: bool,
    timestamp: Option<NaiveDateTime>,
    id: IdKey,
}

impl SiblingKey {
    fn for_record(record: &RawCommentRecord) -> Self {
        let timestamp = parse_timestamp(&record.timestamp);
        let id = match record.comment_id.parse::<u64>() {
            Ok(n) => IdKey::Numeric(n),
            Err(_) => IdKey::Text(record.comment_id.clone()),
        };
        Self {
            unparsed: timestamp.is_none(),
            timestamp,
            id,
        }
    }
}

/// Rebuilds one article's comment thread from all of its collected records
///
/// # Arguments
///
/// * `records` - Every record from every comment page, in any order
/// * `max_depth` - Replies nested deeper than this are collapsed to it
///
/// # Returns
///
/// The nodes in output order plus every data quality warning raised. Each
/// distinct comment id appears exactly once; no comment is ever dropped.
pub fn reconstruct(records: Vec<RawCommentRecord>, max_depth: u32) -> Reconstruction {
    let mut ordered = records;
    ordered.sort_by_key(|r| (r.page_number, r.position));

    // Overlapping pages repeat comments; the earliest sighting wins
    let mut seen = HashSet::new();
    let unique: Vec<RawCommentRecord> = ordered
        .into_iter()
        .filter(|r| seen.insert(r.comment_id.clone()))
        .collect();

    let count = unique.len();
    let ids: Vec<String> = unique.iter().map(|r| r.comment_id.clone()).collect();
    let index: HashMap<&str, usize> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    let keys: Vec<SiblingKey> = unique.iter().map(SiblingKey::for_record).collect();

    let mut warnings = Vec::new();
    let mut parent_of: Vec<Option<usize>> = vec![None; count];
    let mut orphaned = vec![false; count];

    for (i, record) in unique.iter().enumerate() {
        let Some(parent_id) = record.parent_id.as_deref() else {
            continue;
        };
        match index.get(parent_id) {
            Some(&p) if p != i => parent_of[i] = Some(p),
            _ => {
                orphaned[i] = true;
                tracing::debug!(
                    "Comment {} references missing parent {}",
                    record.comment_id,
                    parent_id
                );
                warnings.push(DataQualityWarning::OrphanedComment {
                    comment_id: record.comment_id.clone(),
                    parent_id: parent_id.to_string(),
                });
            }
        }
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut roots = Vec::new();
    for (i, parent) in parent_of.iter().enumerate() {
        match parent {
            Some(p) => children[*p].push(i),
            None => roots.push(i),
        }
    }
    for list in children.iter_mut() {
        list.sort_by(|a, b| keys[*a].cmp(&keys[*b]));
    }
    roots.sort_by(|a, b| keys[*a].cmp(&keys[*b]));

    let mut walker = Walker {
        ids: &ids,
        children: &children,
        orphaned: &orphaned,
        slots: unique.into_iter().map(Some).collect(),
        discovered: vec![false; count],
        nodes: Vec::with_capacity(count),
        warnings,
        max_depth,
    };

    walker.walk(&roots);

    // Whatever is still undiscovered hangs off a parent cycle
    if walker.nodes.len() < count {
        let mut by_key: Vec<usize> = (0..count).collect();
        by_key.sort_by(|a, b| keys[*a].cmp(&keys[*b]));

        for start in by_key {
            if walker.discovered[start] {
                continue;
            }
            let mut members = find_cycle(start, &parent_of);
            members.sort_by(|a, b| keys[*a].cmp(&keys[*b]));
            let promoted = members[0];

            let warning = DataQualityWarning::ParentCycle {
                promoted: ids[promoted].clone(),
                members: members.iter().map(|m| ids[*m].clone()).collect(),
            };
            tracing::debug!("{}", warning);
            walker.warnings.push(warning);

            walker.walk(&[promoted]);
        }
    }

    Reconstruction {
        nodes: walker.nodes,
        warnings: walker.warnings,
    }
}

/// Follows parent links from `start` until a node repeats
///
/// Returns the members of the cycle that was entered. The chain cannot end
/// at a root, since every descendant of a root was already discovered.
fn find_cycle(start: usize, parent_of: &[Option<usize>]) -> Vec<usize> {
    let mut position: HashMap<usize, usize> = HashMap::new();
    let mut path = Vec::new();
    let mut current = start;

    loop {
        if let Some(&pos) = position.get(&current) {
            return path[pos..].to_vec();
        }
        position.insert(current, path.len());
        path.push(current);
        match parent_of[current] {
            Some(parent) => current = parent,
            None => return vec![current],
        }
    }
}

struct Walker<'a> {
    ids: &'a [String],
    children: &'a [Vec<usize>],
    orphaned: &'a [bool],
    slots: Vec<Option<RawCommentRecord>>,
    discovered: Vec<bool>,
    nodes: Vec<CommentNode>,
    warnings: Vec<DataQualityWarning>,
    max_depth: u32,
}

impl Walker<'_> {
    /// Iterative pre-order traversal from the given roots
    fn walk(&mut self, roots: &[usize]) {
        let mut stack: Vec<(usize, u32)> = Vec::new();
        for &root in roots.iter().rev() {
            if !self.discovered[root] {
                self.discovered[root] = true;
                stack.push((root, 0));
            }
        }

        while let Some((idx, depth)) = stack.pop() {
            let Some(record) = self.slots[idx].take() else {
                continue;
            };

            let capped = depth > self.max_depth;
            if capped {
                tracing::debug!(
                    "Comment {} nested at depth {} exceeds cap {}",
                    record.comment_id,
                    depth,
                    self.max_depth
                );
                self.warnings.push(DataQualityWarning::DepthCapExceeded {
                    comment_id: record.comment_id.clone(),
                    depth,
                    max_depth: self.max_depth,
                });
            }

            let kids: Vec<usize> = self.children[idx]
                .iter()
                .copied()
                .filter(|c| !self.discovered[*c])
                .collect();
            for &child in kids.iter().rev() {
                self.discovered[child] = true;
                stack.push((child, depth.saturating_add(1)));
            }

            self.nodes.push(CommentNode {
                record,
                depth: depth.min(self.max_depth),
                children: kids.iter().map(|c| self.ids[*c].clone()).collect(),
                orphaned: self.orphaned[idx],
                depth_capped: capped,
            });
        }
    }
}

/// Checks a reconstructed thread against the count the article page reported
///
/// Only a reported non-zero count with nothing reconstructed is flagged;
/// smaller differences are expected as comments get removed or held for
/// moderation between the listing and the detail fetch.
pub fn check_reconciliation(
    expected: Option<u32>,
    reconstructed: usize,
) -> Option<DataQualityWarning> {
    match expected {
        Some(expected) if expected > 0 && reconstructed == 0 => {
            Some(DataQualityWarning::CommentCountMismatch {
                expected,
                reconstructed,
            })
        }
        _ => None,
    }
}
