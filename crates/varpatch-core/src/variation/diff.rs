//! Arena-backed variation diff.
//!
//! Nodes are stored in a flat vector and refer to each other by [`NodeId`].
//! Parent and child edges are kept separately for [`Time::Before`] and
//! [`Time::After`], which is what allows a node to move between parents.

use std::collections::{BTreeSet, HashSet};
use std::fmt::Write as _;

use crate::formula::{and, not, Formula};

use super::{DiffType, LineRange, NodeId, NodeType, Time, VariationTree};

// ============================================================================
// Nodes
// ============================================================================

/// One node of a variation diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffNode {
    pub id: NodeId,
    pub diff_type: DiffType,
    pub node_type: NodeType,
    /// Formula of `#if`/`#elif` nodes and of the root (`True`).
    pub formula: Option<Formula>,
    /// Source line of this node, without the diff marker.
    pub label: String,
    /// The `#endif` line closing an `#if` node.
    pub end_label: Option<String>,
    lines: [Option<LineRange>; 2],
    parents: [Option<NodeId>; 2],
    children: [Vec<NodeId>; 2],
}

impl DiffNode {
    fn new(
        id: NodeId,
        diff_type: DiffType,
        node_type: NodeType,
        formula: Option<Formula>,
        label: String,
    ) -> Self {
        DiffNode {
            id,
            diff_type,
            node_type,
            formula,
            label,
            end_label: None,
            lines: [None, None],
            parents: [None, None],
            children: [Vec::new(), Vec::new()],
        }
    }

    pub fn exists_at(&self, time: Time) -> bool {
        self.diff_type.exists_at(time)
    }

    pub fn is_annotation(&self) -> bool {
        self.node_type.is_annotation()
    }

    pub fn is_artifact(&self) -> bool {
        self.node_type.is_artifact()
    }

    pub fn is_root(&self) -> bool {
        self.node_type == NodeType::Root
    }

    pub fn parent(&self, time: Time) -> Option<NodeId> {
        self.parents[time.index()]
    }

    pub fn children(&self, time: Time) -> &[NodeId] {
        &self.children[time.index()]
    }

    /// Source lines of this node at `time`, if it came from parsed input.
    pub fn lines(&self, time: Time) -> Option<LineRange> {
        self.lines[time.index()]
    }

    pub(crate) fn set_lines(&mut self, time: Time, lines: LineRange) {
        self.lines[time.index()] = Some(lines);
    }

    /// Whether the parent at BEFORE differs from the parent at AFTER.
    pub fn is_moved(&self) -> bool {
        self.diff_type == DiffType::Non && self.parents[0] != self.parents[1]
    }
}

// ============================================================================
// Variation Diff
// ============================================================================

/// Two annotated trees overlaid on one node arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariationDiff {
    nodes: Vec<DiffNode>,
    root: NodeId,
}

impl Default for VariationDiff {
    fn default() -> Self {
        VariationDiff::new()
    }
}

impl VariationDiff {
    /// A diff holding only the root annotation.
    pub fn new() -> Self {
        let root = NodeId::new(0);
        let node = DiffNode::new(
            root,
            DiffType::Non,
            NodeType::Root,
            Some(Formula::True),
            String::new(),
        );
        VariationDiff {
            nodes: vec![node],
            root,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &DiffNode {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut DiffNode {
        &mut self.nodes[id.index()]
    }

    /// Number of nodes in the arena, including detached ones.
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    /// Allocate a detached node.
    pub fn create_node(
        &mut self,
        diff_type: DiffType,
        node_type: NodeType,
        formula: Option<Formula>,
        label: impl Into<String>,
    ) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes
            .push(DiffNode::new(id, diff_type, node_type, formula, label.into()));
        id
    }

    // ------------------------------------------------------------------------
    // Edges
    // ------------------------------------------------------------------------

    pub fn parent(&self, id: NodeId, time: Time) -> Option<NodeId> {
        self.node(id).parent(time)
    }

    pub fn children(&self, id: NodeId, time: Time) -> &[NodeId] {
        self.node(id).children(time)
    }

    /// Children at BEFORE followed by the children only present at AFTER.
    pub fn all_children(&self, id: NodeId) -> Vec<NodeId> {
        let before = self.children(id, Time::Before);
        let mut all = before.to_vec();
        all.extend(
            self.children(id, Time::After)
                .iter()
                .filter(|child| !before.contains(child)),
        );
        all
    }

    /// Append `child` to the children of `parent` at `time`.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId, time: Time) {
        let index = self.children(parent, time).len();
        self.insert_child(parent, child, index, time);
    }

    /// Insert `child` at `index` among the children of `parent` at `time`.
    ///
    /// # Panics
    ///
    /// Panics if `child` already has a parent at `time`.
    pub fn insert_child(&mut self, parent: NodeId, child: NodeId, index: usize, time: Time) {
        let t = time.index();
        if let Some(current) = self.nodes[child.index()].parents[t] {
            panic!("{} already has parent {} at {:?}", child, current, time);
        }
        self.nodes[child.index()].parents[t] = Some(parent);
        self.nodes[parent.index()].children[t].insert(index, child);
    }

    /// Detach `child` from its parent at `time`.
    ///
    /// # Panics
    ///
    /// Panics if `child` has no parent at `time`.
    pub fn drop_node(&mut self, child: NodeId, time: Time) {
        let t = time.index();
        let Some(parent) = self.nodes[child.index()].parents[t].take() else {
            panic!("cannot drop {}: no parent at {:?}", child, time);
        };
        self.nodes[parent.index()].children[t].retain(|&c| c != child);
    }

    // ------------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------------

    /// All nodes reachable from the root at either time, in pre-order.
    pub fn all_nodes(&self) -> Vec<NodeId> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            order.push(id);
            stack.extend(self.all_children(id).into_iter().rev());
        }
        order
    }

    /// All nodes reachable from the root at `time`, in pre-order.
    pub fn nodes_at(&self, time: Time) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id, time).iter().rev());
        }
        order
    }

    /// `id` and everything below it at `time`, in pre-order.
    pub fn subtree(&self, id: NodeId, time: Time) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            order.push(current);
            stack.extend(self.children(current, time).iter().rev());
        }
        order
    }

    /// Whether `ancestor` is a proper ancestor of `id` at `time`.
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId, time: Time) -> bool {
        let mut current = self.parent(id, time);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent(parent, time);
        }
        false
    }

    // ------------------------------------------------------------------------
    // Formulas
    // ------------------------------------------------------------------------

    fn parent_at(&self, id: NodeId, time: Time) -> NodeId {
        match self.parent(id, time) {
            Some(parent) => parent,
            None => panic!("{} has no parent at {:?}", id, time),
        }
    }

    /// The `#if`/`#elif` chain an `#elif`/`#else` node continues, nearest
    /// first, and the node holding the `#if`.
    fn preceding_branches(&self, id: NodeId, time: Time) -> (Vec<NodeId>, Option<NodeId>) {
        let mut branches = Vec::new();
        let mut current = self.parent(id, time);
        while let Some(branch) = current {
            let node = self.node(branch);
            match node.node_type {
                NodeType::If => {
                    branches.push(branch);
                    return (branches, node.parent(time));
                }
                NodeType::Elif => {
                    branches.push(branch);
                    current = node.parent(time);
                }
                _ => return (branches, Some(branch)),
            }
        }
        (branches, None)
    }

    /// Formula of the branch chain an `#elif`/`#else` node belongs to.
    fn branch_mapping(&self, id: NodeId, branches: &[NodeId]) -> Formula {
        let own = self.node(id).formula.clone().unwrap_or(Formula::True);
        let excluded = branches
            .iter()
            .map(|&branch| not(self.node(branch).formula.clone().unwrap_or(Formula::True)));
        and(std::iter::once(own).chain(excluded))
    }

    /// The condition contributed by `id` itself at `time`.
    ///
    /// For `#if` this is its formula, for `#elif`/`#else` its formula
    /// conjoined with the negations of all preceding branches. Artifacts take
    /// the mapping of their parent.
    pub fn feature_mapping(&self, id: NodeId, time: Time) -> Formula {
        let node = self.node(id);
        match node.node_type {
            NodeType::Root => Formula::True,
            NodeType::If => node.formula.clone().unwrap_or(Formula::True),
            NodeType::Elif | NodeType::Else => {
                let (branches, _) = self.preceding_branches(id, time);
                self.branch_mapping(id, &branches)
            }
            NodeType::Artifact => self.feature_mapping(self.parent_at(id, time), time),
        }
    }

    /// Conjunction of all annotation formulas that decide whether `id` is
    /// part of a variant at `time`.
    ///
    /// # Panics
    ///
    /// Panics if `id` (or one of its ancestors) is detached at `time`.
    pub fn presence_condition(&self, id: NodeId, time: Time) -> Formula {
        let node = self.node(id);
        match node.node_type {
            NodeType::Root => Formula::True,
            NodeType::If => and([
                node.formula.clone().unwrap_or(Formula::True),
                self.presence_condition(self.parent_at(id, time), time),
            ]),
            NodeType::Elif | NodeType::Else => {
                let (branches, outer) = self.preceding_branches(id, time);
                let Some(outer) = outer else {
                    panic!("{} has no enclosing annotation at {:?}", id, time);
                };
                and([
                    self.branch_mapping(id, &branches),
                    self.presence_condition(outer, time),
                ])
            }
            NodeType::Artifact => self.presence_condition(self.parent_at(id, time), time),
        }
    }

    /// Features referenced by annotations reachable at either time.
    pub fn features(&self) -> BTreeSet<String> {
        self.all_nodes()
            .into_iter()
            .filter_map(|id| self.node(id).formula.as_ref())
            .flat_map(Formula::features)
            .collect()
    }

    // ------------------------------------------------------------------------
    // Transformations
    // ------------------------------------------------------------------------

    /// The tree of nodes existing at `time`, with that time's edges.
    pub fn project(&self, time: Time) -> VariationTree {
        let mut tree = VariationDiff::new();
        let root = tree.root;
        tree.node_mut(root).lines = [self.node(self.root).lines(time); 2];
        for &child in self.children(self.root, time) {
            let copy = tree.copy_from(self, child, time, DiffType::Non);
            tree.add_child(root, copy, Time::Before);
            tree.add_child(root, copy, Time::After);
        }
        VariationTree::from_diff_unchecked(tree)
    }

    /// Deep-copy the subtree of `source` rooted at `id` (at `time`) into this
    /// arena as added nodes.
    ///
    /// The copy receives fresh ids and is linked at AFTER only. Its root is
    /// left detached for the caller to insert.
    pub fn copy_subtree_into(&mut self, source: &VariationDiff, id: NodeId, time: Time) -> NodeId {
        self.copy_from(source, id, time, DiffType::Add)
    }

    fn copy_from(
        &mut self,
        source: &VariationDiff,
        id: NodeId,
        time: Time,
        diff_type: DiffType,
    ) -> NodeId {
        let original = source.node(id);
        let copy = self.create_node(
            diff_type,
            original.node_type,
            original.formula.clone(),
            original.label.clone(),
        );
        self.node_mut(copy).end_label = original.end_label.clone();
        if diff_type == DiffType::Non {
            self.node_mut(copy).lines = [original.lines(time); 2];
        }

        for &child in original.children(time) {
            let child_copy = self.copy_from(source, child, time, diff_type);
            for t in Time::ALL {
                if diff_type.exists_at(t) {
                    self.add_child(copy, child_copy, t);
                }
            }
        }
        copy
    }

    /// Mark `id` and its AFTER descendants as removed and detach them from
    /// the AFTER view.
    pub fn remove_subtree(&mut self, id: NodeId) {
        let subtree = self.subtree(id, Time::After);
        self.drop_node(id, Time::After);
        let t = Time::After.index();
        for node in subtree {
            let node = self.node_mut(node);
            if node.diff_type == DiffType::Non {
                node.diff_type = DiffType::Rem;
            }
            node.parents[t] = None;
            node.children[t].clear();
        }
    }

    /// Detach every edge of `id` at `time`, in both directions.
    pub(crate) fn isolate(&mut self, id: NodeId, time: Time) {
        let t = time.index();
        if self.nodes[id.index()].parents[t].is_some() {
            self.drop_node(id, time);
        }
        let children = std::mem::take(&mut self.nodes[id.index()].children[t]);
        for child in children {
            self.nodes[child.index()].parents[t] = None;
        }
    }

    /// Indented debug view with one node per line.
    ///
    /// ```text
    ///  root
    ///   + #if A
    ///   +   foo();
    /// ```
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut visited = HashSet::new();
        self.render_node(self.root, 0, &mut visited, &mut out);
        out
    }

    fn render_node(
        &self,
        id: NodeId,
        depth: usize,
        visited: &mut HashSet<NodeId>,
        out: &mut String,
    ) {
        if !visited.insert(id) {
            return;
        }
        let node = self.node(id);
        let text = if node.is_root() { "root" } else { node.label.as_str() };
        let moved = if node.is_moved() { " (moved)" } else { "" };
        let _ = writeln!(
            out,
            "{}{}{}{}",
            node.diff_type.symbol(),
            "  ".repeat(depth),
            text,
            moved
        );
        for child in self.all_children(id) {
            self.render_node(child, depth + 1, visited, out);
        }
        if let Some(end) = &node.end_label {
            let _ = writeln!(out, "{}{}{}", node.diff_type.symbol(), "  ".repeat(depth), end);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::var;

    /// root
    ///   #if A            (non)
    ///     x              (non)
    ///   #elif B          (non, child of #if)
    ///     y              (rem)
    ///   #else            (non, child of #elif)
    ///     z              (add)
    fn chain() -> (VariationDiff, [NodeId; 6]) {
        let mut diff = VariationDiff::new();
        let root = diff.root();
        let if_a = diff.create_node(DiffType::Non, NodeType::If, Some(var("A")), "#if A");
        let x = diff.create_node(DiffType::Non, NodeType::Artifact, None, "x");
        let elif_b = diff.create_node(DiffType::Non, NodeType::Elif, Some(var("B")), "#elif B");
        let y = diff.create_node(DiffType::Rem, NodeType::Artifact, None, "y");
        let else_ = diff.create_node(DiffType::Non, NodeType::Else, None, "#else");
        let z = diff.create_node(DiffType::Add, NodeType::Artifact, None, "z");
        for time in Time::ALL {
            diff.add_child(root, if_a, time);
            diff.add_child(if_a, x, time);
            diff.add_child(if_a, elif_b, time);
            diff.add_child(elif_b, else_, time);
        }
        diff.add_child(elif_b, y, Time::Before);
        diff.add_child(else_, z, Time::After);
        (diff, [if_a, x, elif_b, y, else_, z])
    }

    mod edge_tests {
        use super::*;

        #[test]
        fn children_are_kept_per_time() {
            let (diff, [_, _, elif_b, y, else_, z]) = chain();
            assert_eq!(diff.children(elif_b, Time::Before), &[else_, y]);
            assert_eq!(diff.children(elif_b, Time::After), &[else_]);
            assert_eq!(diff.parent(z, Time::After), Some(else_));
            assert_eq!(diff.parent(z, Time::Before), None);
        }

        #[test]
        fn all_children_lists_before_then_after_only() {
            let mut diff = VariationDiff::new();
            let root = diff.root();
            let a = diff.create_node(DiffType::Rem, NodeType::Artifact, None, "a");
            let b = diff.create_node(DiffType::Add, NodeType::Artifact, None, "b");
            let c = diff.create_node(DiffType::Non, NodeType::Artifact, None, "c");
            diff.add_child(root, a, Time::Before);
            diff.add_child(root, c, Time::Before);
            diff.add_child(root, b, Time::After);
            diff.add_child(root, c, Time::After);
            assert_eq!(diff.all_children(root), vec![a, c, b]);
        }

        #[test]
        fn insert_child_respects_index() {
            let mut diff = VariationDiff::new();
            let root = diff.root();
            let a = diff.create_node(DiffType::Non, NodeType::Artifact, None, "a");
            let b = diff.create_node(DiffType::Non, NodeType::Artifact, None, "b");
            diff.add_child(root, a, Time::After);
            diff.insert_child(root, b, 0, Time::After);
            assert_eq!(diff.children(root, Time::After), &[b, a]);
        }

        #[test]
        #[should_panic(expected = "no parent")]
        fn dropping_detached_node_panics() {
            let mut diff = VariationDiff::new();
            let a = diff.create_node(DiffType::Non, NodeType::Artifact, None, "a");
            diff.drop_node(a, Time::Before);
        }

        #[test]
        fn moved_nodes_have_two_parents() {
            let mut diff = VariationDiff::new();
            let root = diff.root();
            let if_a = diff.create_node(DiffType::Add, NodeType::If, Some(var("A")), "#if A");
            let x = diff.create_node(DiffType::Non, NodeType::Artifact, None, "x");
            diff.add_child(root, if_a, Time::After);
            diff.add_child(root, x, Time::Before);
            diff.add_child(if_a, x, Time::After);
            assert!(diff.node(x).is_moved());
            assert_eq!(diff.all_nodes(), vec![root, x, if_a]);
        }
    }

    mod formula_tests {
        use super::*;

        #[test]
        fn branch_chain_presence_conditions() {
            let (diff, [if_a, x, elif_b, y, else_, z]) = chain();
            assert_eq!(diff.presence_condition(if_a, Time::Before), var("A"));
            assert_eq!(diff.presence_condition(x, Time::After), var("A"));
            assert_eq!(
                diff.presence_condition(elif_b, Time::Before),
                and([var("B"), not(var("A"))])
            );
            assert_eq!(
                diff.presence_condition(y, Time::Before),
                and([var("B"), not(var("A"))])
            );
            assert_eq!(
                diff.presence_condition(else_, Time::After),
                and([not(var("B")), not(var("A"))])
            );
            assert_eq!(
                diff.presence_condition(z, Time::After),
                and([not(var("B")), not(var("A"))])
            );
        }

        #[test]
        fn nested_presence_condition_includes_outer_annotations() {
            let mut diff = VariationDiff::new();
            let root = diff.root();
            let outer = diff.create_node(DiffType::Non, NodeType::If, Some(var("A")), "#if A");
            let inner = diff.create_node(DiffType::Non, NodeType::If, Some(var("B")), "#if B");
            let else_ = diff.create_node(DiffType::Non, NodeType::Else, None, "#else");
            for time in Time::ALL {
                diff.add_child(root, outer, time);
                diff.add_child(outer, inner, time);
                diff.add_child(inner, else_, time);
            }
            assert_eq!(
                diff.presence_condition(else_, Time::Before),
                and([not(var("B")), var("A")])
            );
            assert_eq!(diff.feature_mapping(else_, Time::Before), not(var("B")));
            assert_eq!(diff.feature_mapping(inner, Time::Before), var("B"));
        }

        #[test]
        fn features_cover_both_times() {
            let (diff, _) = chain();
            let features: Vec<String> = diff.features().into_iter().collect();
            assert_eq!(features, vec!["A".to_string(), "B".to_string()]);
        }
    }

    mod transformation_tests {
        use super::*;

        #[test]
        fn project_keeps_nodes_of_one_time() {
            let (diff, _) = chain();
            let before = diff.project(Time::Before);
            let labels: Vec<&str> = before
                .as_diff()
                .nodes_at(Time::Before)
                .into_iter()
                .skip(1)
                .map(|id| before.as_diff().node(id).label.as_str())
                .collect();
            assert_eq!(labels, vec!["#if A", "x", "#elif B", "#else", "y"]);
        }

        #[test]
        fn remove_subtree_marks_descendants() {
            let (mut diff, [if_a, x, elif_b, _, else_, z]) = chain();
            diff.remove_subtree(elif_b);
            assert_eq!(diff.node(elif_b).diff_type, DiffType::Rem);
            assert_eq!(diff.node(else_).diff_type, DiffType::Rem);
            assert_eq!(diff.children(if_a, Time::After), &[x]);
            assert_eq!(diff.parent(z, Time::After), None);
            // BEFORE is untouched
            assert_eq!(diff.children(if_a, Time::Before), &[x, elif_b]);
        }

        #[test]
        fn copy_subtree_gets_fresh_ids() {
            let (source, [if_a, ..]) = chain();
            let mut target = VariationDiff::new();
            let copy = target.copy_subtree_into(&source, if_a, Time::After);
            let root = target.root();
            target.add_child(root, copy, Time::After);

            assert_ne!(copy, if_a);
            assert_eq!(target.node(copy).diff_type, DiffType::Add);
            let subtree = target.subtree(copy, Time::After);
            assert_eq!(subtree.len(), 5);
            assert!(target.children(copy, Time::Before).is_empty());
            assert!(subtree
                .iter()
                .all(|&id| target.node(id).diff_type == DiffType::Add));
        }

        #[test]
        fn render_marks_diff_types() {
            let (diff, _) = chain();
            let rendered = diff.render();
            assert!(rendered.contains("-      y"));
            assert!(rendered.contains("+        z"));
            assert!(rendered.starts_with(" root"));
        }
    }
}
