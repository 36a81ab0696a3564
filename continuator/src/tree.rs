// Prefix memory tree: a forest of reversed-prefix trees indexed by root pitch.
//
// For a trained sequence [n1, ..., nK] and a split point i, the prefix
// [n1..ni] is stored reversed: ni is a root, n(i-1) its child, and so on down
// to n1. Every node on that path records the id of n(i+1), the note that
// followed. At generation time the most recent notes are read in the same
// reverse order (last played first), so walking root-to-leaf is exactly a
// longest-suffix-context match.
//
// Each node exclusively owns its children; the forest is a plain tree of
// values with no sharing and no cycles. Children keep insertion order, which
// is the first-match order used during training.
//
// Matching:
// - Training uses one `MatchTolerance` (exact pitch by default) and takes the
//   first matching root/child, creating one when none matches.
// - Generation uses a cascade of tolerances, tight to loose. The first level
//   that yields any candidate wins and all of its candidates are returned so
//   the caller can break the tie at random.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::continuation::ContinuationId;
use crate::note::{MatchTolerance, Note};

/// One context step: a matched note plus what followed the context it ends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrefixTreeNode {
    pub note: Note,
    pub children: Vec<PrefixTreeNode>,
    /// Training order, duplicates kept: a continuation observed k times under
    /// this context is k times as likely to be drawn.
    pub continuations: Vec<ContinuationId>,
}

impl PrefixTreeNode {
    fn new(note: Note) -> Self {
        Self {
            note,
            children: Vec::new(),
            continuations: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Children matching `target` under the first cascade level that matches
    /// any of them.
    pub fn matching_children(&self, target: &Note, cascade: &[MatchTolerance]) -> Vec<&PrefixTreeNode> {
        for tolerance in effective_cascade(cascade) {
            let found: Vec<&PrefixTreeNode> = self
                .children
                .iter()
                .filter(|child| target.matches(&child.note, tolerance))
                .collect();
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    /// The child whose note has exactly `pitch`, if any.
    pub fn child_with_pitch(&self, pitch: u8) -> Option<&PrefixTreeNode> {
        self.children.iter().find(|c| c.note.pitch == pitch)
    }

    fn node_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.node_count()).sum::<usize>()
    }

    fn depth(&self) -> usize {
        1 + self.children.iter().map(|c| c.depth()).max().unwrap_or(0)
    }
}

/// Root pitch → roots sharing that pitch.
///
/// A bucket holds several roots only when the training tolerance also looks
/// at duration or velocity and two same-pitch notes fall outside it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RootForest {
    roots: BTreeMap<u8, Vec<PrefixTreeNode>>,
}

impl RootForest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Insert one reversed prefix (`reversed_context[0]` is the root note)
    /// and record `continuation` on every node of its path.
    ///
    /// An empty context is ignored.
    pub fn insert(
        &mut self,
        reversed_context: &[Note],
        continuation: ContinuationId,
        tolerance: &MatchTolerance,
    ) {
        let Some((root_note, rest)) = reversed_context.split_first() else {
            return;
        };

        let bucket = self.roots.entry(root_note.pitch).or_default();
        let root_pos = match bucket.iter().position(|r| root_note.matches(&r.note, tolerance)) {
            Some(i) => i,
            None => {
                bucket.push(PrefixTreeNode::new(root_note.clone()));
                bucket.len() - 1
            }
        };
        let mut node = &mut bucket[root_pos];
        node.continuations.push(continuation);

        for note in rest {
            let child_pos = match node.children.iter().position(|c| note.matches(&c.note, tolerance)) {
                Some(i) => i,
                None => {
                    node.children.push(PrefixTreeNode::new(note.clone()));
                    node.children.len() - 1
                }
            };
            node = &mut node.children[child_pos];
            node.continuations.push(continuation);
        }
    }

    /// Roots stored under exactly `pitch`.
    pub fn roots_for_pitch(&self, pitch: u8) -> &[PrefixTreeNode] {
        self.roots.get(&pitch).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Roots matching `note` under the first cascade level that matches any.
    pub fn matching_roots(&self, note: &Note, cascade: &[MatchTolerance]) -> Vec<&PrefixTreeNode> {
        for tolerance in effective_cascade(cascade) {
            let found: Vec<&PrefixTreeNode> = self
                .roots
                .range(tolerance.pitch_range(note.pitch))
                .flat_map(|(_, bucket)| bucket.iter())
                .filter(|root| note.matches(&root.note, tolerance))
                .collect();
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    /// Follow a reversed context by exact pitch, returning the node it ends
    /// at. Used for inspection; generation goes through `matching_roots` /
    /// `PrefixTreeNode::matching_children`.
    pub fn find_path(&self, reversed_pitches: &[u8]) -> Option<&PrefixTreeNode> {
        let (first, rest) = reversed_pitches.split_first()?;
        let mut node = self.roots_for_pitch(*first).first()?;
        for pitch in rest {
            node = node.child_with_pitch(*pitch)?;
        }
        Some(node)
    }

    /// All roots in ascending pitch order.
    pub fn roots(&self) -> impl Iterator<Item = &PrefixTreeNode> {
        self.roots.values().flat_map(|bucket| bucket.iter())
    }

    pub fn root_count(&self) -> usize {
        self.roots.values().map(Vec::len).sum()
    }

    pub fn node_count(&self) -> usize {
        self.roots().map(PrefixTreeNode::node_count).sum()
    }

    /// Longest root-to-leaf path, in nodes.
    pub fn max_depth(&self) -> usize {
        self.roots().map(PrefixTreeNode::depth).max().unwrap_or(0)
    }
}

/// An empty cascade means exact pitch matching.
fn effective_cascade(cascade: &[MatchTolerance]) -> &[MatchTolerance] {
    const EXACT: &[MatchTolerance] = &[MatchTolerance::exact()];
    if cascade.is_empty() { EXACT } else { cascade }
}
