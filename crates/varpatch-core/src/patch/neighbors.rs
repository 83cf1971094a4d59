//! Locating changes by their sibling context.
//!
//! A changed subtree is anchored by up to `context_size` unchanged siblings
//! on each side in the source. Those context sequences are searched among the
//! children of the target node. Both sides operate on *relevant* sibling lists
//! from which nodes controlled by deselected features have been removed; the
//! deselected nodes only reappear when a position in the relevant list is
//! mapped back to the real child list (see [`resolve_position`]).

use crate::matching::{is_same_as, TreeView};
use crate::variation::{DiffType, NodeId, VariationDiff};

/// Where an addition goes among the real children of its target node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    /// The context pins down exactly one index.
    Exact(usize),
    /// Any index in `from..=to` is consistent with the context, because the
    /// children in between are controlled by deselected features. The change
    /// is inserted at `at`.
    AlignmentProblem { from: usize, to: usize, at: usize },
}

impl InsertPosition {
    pub fn index(&self) -> usize {
        match *self {
            InsertPosition::Exact(index) => index,
            InsertPosition::AlignmentProblem { at, .. } => at,
        }
    }

    pub fn is_alignment_problem(&self) -> bool {
        matches!(self, InsertPosition::AlignmentProblem { .. })
    }
}

/// Which context side a position was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Insert right after the preceding context.
    Before,
    /// Insert right before the following context.
    After,
}

/// A position in the relevant child list of the target node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub position: usize,
    pub anchor: Anchor,
}

/// Why no placement could be derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementError {
    NotFound(String),
    Ambiguous,
    WrongOrder,
}

/// Context search between a source view and a target view.
pub struct NeighborSearch<'a, S: TreeView, T: TreeView> {
    pub source: &'a S,
    pub target: &'a T,
    pub context_size: usize,
}

impl<S: TreeView, T: TreeView> NeighborSearch<'_, S, T> {
    /// Up to `context_size` siblings before and after `siblings[index]`.
    fn context<'s>(&self, siblings: &'s [NodeId], index: usize) -> (&'s [NodeId], &'s [NodeId]) {
        let start = index.saturating_sub(self.context_size);
        let end = (index + 1 + self.context_size).min(siblings.len());
        (&siblings[start..index], &siblings[index + 1..end])
    }

    /// Whether `context` occurs in `targets` starting at `start`.
    fn matches_at(&self, context: &[NodeId], targets: &[NodeId], start: usize) -> bool {
        start + context.len() <= targets.len()
            && context
                .iter()
                .zip(&targets[start..])
                .all(|(&s, &t)| is_same_as(self.source, s, self.target, t))
    }

    /// Start positions of every occurrence of a non-empty `context`.
    fn runs(&self, context: &[NodeId], targets: &[NodeId]) -> Vec<usize> {
        if context.is_empty() || context.len() > targets.len() {
            return Vec::new();
        }
        (0..=targets.len() - context.len())
            .filter(|&start| self.matches_at(context, targets, start))
            .collect()
    }

    /// End positions of the longest suffix of `context` found in `targets`.
    fn before_runs(&self, context: &[NodeId], targets: &[NodeId]) -> Vec<usize> {
        for len in (1..=context.len()).rev() {
            let runs = self.runs(&context[context.len() - len..], targets);
            if !runs.is_empty() {
                return runs.into_iter().map(|start| start + len).collect();
            }
        }
        Vec::new()
    }

    /// Start positions of the longest prefix of `context` found in `targets`.
    fn after_runs(&self, context: &[NodeId], targets: &[NodeId]) -> Vec<usize> {
        for len in (1..=context.len()).rev() {
            let runs = self.runs(&context[..len], targets);
            if !runs.is_empty() {
                return runs;
            }
        }
        Vec::new()
    }

    /// Position in `targets` for the source node `siblings[index]`.
    ///
    /// `siblings` and `targets` are relevant sibling lists: the source list
    /// holds the node itself, the target list holds no added nodes.
    pub fn find_insert_position(
        &self,
        siblings: &[NodeId],
        index: usize,
        targets: &[NodeId],
    ) -> Result<Placement, PlacementError> {
        let (before, after) = self.context(siblings, index);
        let ends = self.before_runs(before, targets);
        let starts = self.after_runs(after, targets);

        match (ends.is_empty(), starts.is_empty()) {
            (false, false) => {
                let adjacent: Vec<usize> = ends
                    .iter()
                    .copied()
                    .filter(|end| starts.contains(end))
                    .collect();
                match adjacent.as_slice() {
                    [position] => Ok(Placement {
                        position: *position,
                        anchor: Anchor::Before,
                    }),
                    [] if ends.iter().all(|&end| starts.iter().all(|&start| start < end)) => {
                        Err(PlacementError::WrongOrder)
                    }
                    [] => Err(PlacementError::NotFound(
                        "context found on both sides with unrelated content between".to_string(),
                    )),
                    _ => Err(PlacementError::Ambiguous),
                }
            }
            (false, true) => {
                let valid: Vec<usize> = ends
                    .into_iter()
                    .filter(|&end| targets.len() - end <= 1)
                    .collect();
                single(valid, Anchor::Before, "preceding context is not near the end")
            }
            (true, false) => {
                let valid: Vec<usize> = starts.into_iter().filter(|&start| start <= 1).collect();
                single(valid, Anchor::After, "following context is not near the start")
            }
            (true, true) if targets.is_empty() => Ok(Placement {
                position: 0,
                anchor: Anchor::Before,
            }),
            (true, true) => Err(PlacementError::NotFound(
                "no context found in the target".to_string(),
            )),
        }
    }

    /// How well the target child `targets[candidate]` sits in the context of
    /// the source node `siblings[index]`.
    ///
    /// Returns the number of directly adjacent context nodes that match, or
    /// `None` when the candidate is disqualified.
    pub fn neighbor_score(
        &self,
        siblings: &[NodeId],
        index: usize,
        targets: &[NodeId],
        candidate: usize,
    ) -> Option<usize> {
        let (before, after) = self.context(siblings, index);
        let matched_before = before
            .iter()
            .rev()
            .zip(targets[..candidate].iter().rev())
            .take_while(|&(&s, &t)| is_same_as(self.source, s, self.target, t))
            .count();
        let matched_after = after
            .iter()
            .zip(&targets[candidate + 1..])
            .take_while(|&(&s, &t)| is_same_as(self.source, s, self.target, t))
            .count();

        let valid = match (matched_before > 0, matched_after > 0) {
            (true, true) => true,
            (true, false) => targets.len() - (candidate + 1) <= 1,
            (false, true) => candidate <= 1,
            (false, false) => targets.len() == 1,
        };
        valid.then_some(matched_before + matched_after)
    }

    /// Whether the target child `targets[candidate]` sits in the same context
    /// as the source node `siblings[index]`.
    pub fn check_neighbors(
        &self,
        siblings: &[NodeId],
        index: usize,
        targets: &[NodeId],
        candidate: usize,
    ) -> bool {
        self.neighbor_score(siblings, index, targets, candidate).is_some()
    }
}

fn single(
    positions: Vec<usize>,
    anchor: Anchor,
    detail: &str,
) -> Result<Placement, PlacementError> {
    match positions.as_slice() {
        [position] => Ok(Placement {
            position: *position,
            anchor,
        }),
        [] => Err(PlacementError::NotFound(detail.to_string())),
        _ => Err(PlacementError::Ambiguous),
    }
}

/// Map a placement in the relevant child list back to the real child list.
///
/// The real children between the two relevant neighbors of the placement are
/// either deselected-controlled or additions of this same patch. Additions
/// are always passed, so changes keep their source order; deselected content
/// makes the position an alignment problem.
pub fn resolve_position(
    diff: &VariationDiff,
    relevant: &[NodeId],
    real: &[NodeId],
    placement: Placement,
) -> InsertPosition {
    let real_index = |id: NodeId| real.iter().position(|&r| r == id);
    let p = placement.position;
    let from = if p == 0 {
        0
    } else {
        real_index(relevant[p - 1]).map_or(0, |i| i + 1)
    };
    let to = relevant
        .get(p)
        .and_then(|&id| real_index(id))
        .unwrap_or(real.len());

    let is_added = |index: usize| diff.node(real[index]).diff_type == DiffType::Add;
    let at = match placement.anchor {
        Anchor::Before => (from..to)
            .rev()
            .find(|&index| is_added(index))
            .map_or(from, |index| index + 1),
        Anchor::After => to,
    };

    if (from..to).all(is_added) {
        InsertPosition::Exact(at)
    } else {
        InsertPosition::AlignmentProblem { from, to, at }
    }
}
