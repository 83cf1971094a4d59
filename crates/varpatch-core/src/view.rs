//! Relevance filtering of variation diffs.
//!
//! A diff view keeps only the nodes that can still be part of some variant
//! once the features of a deselection formula are forced off. Pruning is done
//! per time, so a node that is relevant before the edit but not after turns
//! into a removal in the view.

use std::collections::HashSet;

use tracing::debug;

use crate::formula::{and, is_satisfiable, Formula};
use crate::variation::{DiffType, NodeId, Time, VariationDiff};

/// Relevance predicate: a node is relevant iff its presence condition is
/// satisfiable together with a fixed configuration formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configure {
    formula: Formula,
}

impl Configure {
    pub fn new(formula: Formula) -> Self {
        Configure { formula }
    }

    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    pub fn is_relevant(&self, diff: &VariationDiff, id: NodeId, time: Time) -> bool {
        if diff.node(id).is_root() {
            return true;
        }
        is_satisfiable(&and([
            diff.presence_condition(id, time),
            self.formula.clone(),
        ]))
    }

    /// Nodes to keep at `time`: relevant nodes and their ancestors.
    fn kept_at(&self, diff: &VariationDiff, time: Time) -> HashSet<NodeId> {
        let mut kept = HashSet::new();
        self.collect_kept(diff, diff.root(), time, &mut kept);
        kept
    }

    fn collect_kept(
        &self,
        diff: &VariationDiff,
        id: NodeId,
        time: Time,
        kept: &mut HashSet<NodeId>,
    ) -> bool {
        let mut keep = self.is_relevant(diff, id, time);
        for &child in diff.children(id, time) {
            // `#elif`/`#else` below an irrelevant `#if` may still be relevant
            keep |= self.collect_kept(diff, child, time, kept);
        }
        if keep {
            kept.insert(id);
        }
        keep
    }
}

/// Remove every node that cannot be present once `deselection` holds.
///
/// Node ids are preserved. Pruned nodes stay in the arena but are no longer
/// reachable from the root at the time they were pruned at.
pub fn optimize(diff: &VariationDiff, deselection: &Formula) -> VariationDiff {
    let configure = Configure::new(deselection.clone());
    let kept = Time::ALL.map(|time| configure.kept_at(diff, time));

    let mut view = diff.clone();
    let mut pruned = 0;
    for time in Time::ALL {
        for id in diff.nodes_at(time) {
            if !kept[time.index()].contains(&id) {
                view.isolate(id, time);
                pruned += 1;
            }
        }
    }

    for id in diff.all_nodes() {
        let exists = Time::ALL.map(|time| kept[time.index()].contains(&id));
        if let Some(diff_type) = DiffType::from_existence(exists[0], exists[1]) {
            view.node_mut(id).diff_type = diff_type;
        }
    }

    debug!(
        deselection = %deselection,
        pruned,
        "filtered diff"
    );
    view
}
