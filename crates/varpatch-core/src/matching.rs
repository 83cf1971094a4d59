//! Structural equality between subtrees of (possibly different) diffs.
//!
//! Comparisons go through a [`TreeView`], which decides which children of a
//! node take part: the children at one time, the children at one time minus
//! pending changes, or the children at either time. Both equalities are
//! cycle-safe: a node of the left side that is encountered a second time is
//! considered equal, so shared subtrees are not compared twice.

use std::collections::HashSet;

use crate::variation::{DiffType, NodeId, Time, VariationDiff, VariationTree};

// ============================================================================
// Views
// ============================================================================

/// Ordered-children view of a [`VariationDiff`].
pub trait TreeView {
    fn diff(&self) -> &VariationDiff;

    fn children(&self, id: NodeId) -> Vec<NodeId>;
}

/// Children at one time.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub diff: &'a VariationDiff,
    pub time: Time,
}

impl<'a> Snapshot<'a> {
    pub fn new(diff: &'a VariationDiff, time: Time) -> Self {
        Snapshot { diff, time }
    }
}

impl TreeView for Snapshot<'_> {
    fn diff(&self) -> &VariationDiff {
        self.diff
    }

    fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.diff.children(id, self.time).to_vec()
    }
}

/// Children at one time, leaving out added and moved nodes.
///
/// On a source diff this is the context a change can be anchored to; on a
/// target it hides content inserted by earlier steps of the same patch.
#[derive(Debug, Clone, Copy)]
pub struct Unchanged<'a> {
    pub diff: &'a VariationDiff,
    pub time: Time,
}

impl<'a> Unchanged<'a> {
    pub fn new(diff: &'a VariationDiff, time: Time) -> Self {
        Unchanged { diff, time }
    }

    pub fn is_unchanged(&self, id: NodeId) -> bool {
        let node = self.diff.node(id);
        node.diff_type != DiffType::Add && !node.is_moved()
    }
}

impl TreeView for Unchanged<'_> {
    fn diff(&self) -> &VariationDiff {
        self.diff
    }

    fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.diff
            .children(id, self.time)
            .iter()
            .copied()
            .filter(|&child| self.is_unchanged(child))
            .collect()
    }
}

/// Children at either time.
#[derive(Debug, Clone, Copy)]
pub struct AllTimes<'a>(pub &'a VariationDiff);

impl TreeView for AllTimes<'_> {
    fn diff(&self) -> &VariationDiff {
        self.0
    }

    fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.0.all_children(id)
    }
}

// ============================================================================
// Equality
// ============================================================================

/// Label-aware structural equality.
///
/// Node type, formula (syntactically) and label (ignoring surrounding
/// whitespace) must match, and so must the ordered children.
pub fn is_same_as(a: &impl TreeView, a_id: NodeId, b: &impl TreeView, b_id: NodeId) -> bool {
    same(a, a_id, b, b_id, true, &mut HashSet::new())
}

/// Structural equality ignoring labels.
pub fn is_same_as_structural(
    a: &impl TreeView,
    a_id: NodeId,
    b: &impl TreeView,
    b_id: NodeId,
) -> bool {
    same(a, a_id, b, b_id, false, &mut HashSet::new())
}

/// Whether a patched tree has the shape of the expected one.
///
/// Labels are ignored so that results differing only in text that the
/// annotations do not govern still count as equivalent.
pub fn is_equivalent_result(patched: &VariationTree, expected: &VariationTree) -> bool {
    is_same_as_structural(
        &Snapshot::new(patched.as_diff(), Time::Before),
        patched.root(),
        &Snapshot::new(expected.as_diff(), Time::Before),
        expected.root(),
    )
}

fn same(
    a: &impl TreeView,
    a_id: NodeId,
    b: &impl TreeView,
    b_id: NodeId,
    compare_labels: bool,
    visited: &mut HashSet<NodeId>,
) -> bool {
    if !visited.insert(a_id) {
        return true;
    }

    let left = a.diff().node(a_id);
    let right = b.diff().node(b_id);
    if left.node_type != right.node_type || left.formula != right.formula {
        return false;
    }
    if compare_labels && left.label.trim() != right.label.trim() {
        return false;
    }

    let left_children = a.children(a_id);
    let right_children = b.children(b_id);
    left_children.len() == right_children.len()
        && left_children
            .iter()
            .zip(&right_children)
            .all(|(&l, &r)| same(a, l, b, r, compare_labels, visited))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Dialect;

    fn tree(source: &str) -> VariationTree {
        VariationTree::parse("t.c", source, &Dialect::Cpp.parser()).unwrap()
    }

    fn same_trees(a: &VariationTree, b: &VariationTree) -> bool {
        is_same_as(
            &Snapshot::new(a.as_diff(), Time::Before),
            a.root(),
            &Snapshot::new(b.as_diff(), Time::Before),
            b.root(),
        )
    }

    mod label_aware_tests {
        use super::*;

        #[test]
        fn every_node_equals_itself() {
            let t = tree("a\n#if A\nb\n#elif B\nc\n#endif\nd\n");
            let view = Snapshot::new(t.as_diff(), Time::Before);
            for id in t.as_diff().all_nodes() {
                assert!(is_same_as(&view, id, &view, id));
            }
        }

        #[test]
        fn labels_matter() {
            assert!(same_trees(&tree("a\n#if A\nb\n#endif\n"), &tree("a\n#if A\n  b\n#endif\n")));
            assert!(!same_trees(&tree("a\n#if A\nb\n#endif\n"), &tree("a\n#if A\nc\n#endif\n")));
        }

        #[test]
        fn formulas_and_arity_matter() {
            assert!(!same_trees(&tree("#if A\nb\n#endif\n"), &tree("#if B\nb\n#endif\n")));
            assert!(!same_trees(&tree("#if A\nb\n#endif\n"), &tree("#if A\nb\nb\n#endif\n")));
        }

        #[test]
        fn transitive_on_equal_trees() {
            let a = tree("x\n#if A\ny\n#endif\n");
            let b = tree("x\n#if A\n y\n#endif\n");
            let c = tree(" x\n#if A\ny\n#endif\n");
            assert!(same_trees(&a, &b));
            assert!(same_trees(&b, &c));
            assert!(same_trees(&a, &c));
        }
    }

    mod structural_tests {
        use super::*;

        #[test]
        fn labels_are_ignored() {
            let a = tree("a\n#if A\nb\n#endif\n");
            let b = tree("z\n#if A\ny\n#endif\n");
            assert!(is_equivalent_result(&a, &b));
            assert!(!same_trees(&a, &b));
        }

        #[test]
        fn structure_still_matters() {
            let a = tree("a\n#if A\nb\n#endif\n");
            let b = tree("#if A\nb\n#endif\na\n");
            assert!(!is_equivalent_result(&a, &b));
        }
    }

    mod view_tests {
        use super::*;

        #[test]
        fn unchanged_view_hides_additions() {
            let diff =
                VariationDiff::from_sources("a\nb\n", "a\nx\nb\n", &Dialect::Cpp.parser()).unwrap();
            let before = tree("a\nb\n");
            assert!(is_same_as(
                &Unchanged::new(&diff, Time::After),
                diff.root(),
                &Snapshot::new(before.as_diff(), Time::Before),
                before.root(),
            ));
            assert!(!is_same_as(
                &Snapshot::new(&diff, Time::After),
                diff.root(),
                &Snapshot::new(before.as_diff(), Time::Before),
                before.root(),
            ));
        }

        #[test]
        fn shared_nodes_compare_once() {
            let diff =
                VariationDiff::from_sources("a\nb\n", "#if X\na\n#endif\nb\n", &Dialect::Cpp.parser())
                    .unwrap();
            let view = AllTimes(&diff);
            assert!(is_same_as(&view, diff.root(), &view, diff.root()));
        }
    }
}
