//! Transferring the changes of a variation diff onto another variant.
//!
//! A patch attempt runs through fixed stages:
//!
//! 1. **Deselection**: features known to only one of source and target are
//!    deselected and forced off by a formula `ρ`.
//! 2. **Filtering**: the diff is reduced to the nodes still relevant under
//!    `ρ` ([`crate::view::optimize`]).
//! 3. **Removal**: every maximal removed subtree is located in the target and
//!    dropped from its AFTER view.
//! 4. **Addition**: every maximal added subtree is copied into the target's
//!    AFTER view at a position derived from its sibling context.
//!
//! Any step that cannot be resolved unambiguously rejects the whole attempt.
//!
//! ## Usage
//!
//! ```
//! use varpatch_core::feature::Dialect;
//! use varpatch_core::patch::{patch, PatchOptions};
//! use varpatch_core::variation::{VariationDiff, VariationTree};
//!
//! let parser = Dialect::Cpp.parser();
//! let diff = VariationDiff::from_sources("a\nb\n", "a\nx\nb\n", &parser).unwrap();
//! let target = VariationTree::parse("target.c", "a\nb\nc\n", &parser).unwrap();
//! let outcome = patch(&diff, &target, &PatchOptions::default()).unwrap();
//! assert_eq!(outcome.result_tree().unparse(), "a\nx\nb\nc\n");
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span};

use crate::error::{PatchRejected, PatchStage, RejectReason};
use crate::formula::{and, not, var, Formula};
use crate::matching::{is_same_as, is_same_as_structural, Snapshot, TreeView, Unchanged};
use crate::variation::{DiffType, NodeId, Time, VariationDiff, VariationTree};
use crate::view::optimize;

pub mod neighbors;

pub use neighbors::{InsertPosition, NeighborSearch, Placement, PlacementError};

// ============================================================================
// Options and Outcome
// ============================================================================

/// Policy knobs of a patch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchOptions {
    /// Number of siblings on each side used to locate a change.
    pub context_size: usize,
    /// Keep features that the diff only adds out of the deselection, so new
    /// feature blocks are transferred instead of filtered away.
    pub patch_new_features: bool,
    /// Reject unless source and target agree before the edit once the
    /// deselected features are forced off.
    pub require_zero_variant_drift: bool,
}

impl Default for PatchOptions {
    fn default() -> Self {
        PatchOptions {
            context_size: 10,
            patch_new_features: false,
            require_zero_variant_drift: false,
        }
    }
}

/// A successfully patched target.
#[derive(Debug, Clone)]
pub struct PatchOutcome {
    /// The target as a diff: BEFORE is the original, AFTER the patched tree.
    pub diff: VariationDiff,
    pub removed_roots: usize,
    pub added_roots: usize,
    /// Changes placed among deselected content, where several positions
    /// would have been equally valid.
    pub alignment_problems: usize,
    pub deselected: BTreeSet<String>,
}

impl PatchOutcome {
    /// The patched target tree.
    pub fn result_tree(&self) -> VariationTree {
        self.diff.project(Time::After)
    }
}

// ============================================================================
// Deselection
// ============================================================================

/// Features occurring in exactly one of the two sets.
pub fn deselect(left: &BTreeSet<String>, right: &BTreeSet<String>) -> BTreeSet<String> {
    left.symmetric_difference(right).cloned().collect()
}

/// Features of the diff with the way they changed.
///
/// Every node existing at a time contributes the features of its feature
/// mapping at that time, so artifacts count through their annotation. A
/// feature reached by nodes of different diff types counts as unchanged.
pub fn feature_diff_types(diff: &VariationDiff) -> BTreeMap<String, DiffType> {
    let mut types = BTreeMap::new();
    for time in Time::ALL {
        for id in diff.nodes_at(time) {
            let diff_type = diff.node(id).diff_type;
            for feature in diff.feature_mapping(id, time).features() {
                types
                    .entry(feature)
                    .and_modify(|existing| {
                        if *existing != diff_type {
                            *existing = DiffType::Non;
                        }
                    })
                    .or_insert(diff_type);
            }
        }
    }
    types
}

/// Features to force off when transferring `diff` onto `target`.
pub fn deselected_features(
    diff: &VariationDiff,
    target: &VariationTree,
    patch_new_features: bool,
) -> BTreeSet<String> {
    let types = feature_diff_types(diff);
    let source: BTreeSet<String> = types.keys().cloned().collect();
    let mut deselected = deselect(&source, &target.as_diff().features());
    if patch_new_features {
        deselected.retain(|feature| types.get(feature) != Some(&DiffType::Add));
    }
    deselected
}

/// `ρ`: the conjunction of the negated deselected features.
pub fn deselection_formula(deselected: &BTreeSet<String>) -> Formula {
    and(deselected.iter().map(|feature| not(var(feature.as_str()))))
}

/// Whether the presence condition of `id` mentions a deselected feature.
pub fn is_controlled(
    diff: &VariationDiff,
    id: NodeId,
    time: Time,
    deselected: &BTreeSet<String>,
) -> bool {
    if diff.node(id).is_root() || deselected.is_empty() {
        return false;
    }
    diff.presence_condition(id, time)
        .features()
        .iter()
        .any(|feature| deselected.contains(feature))
}

// ============================================================================
// Change Classification
// ============================================================================

/// Roots of the maximal changed subtrees, in source order.
///
/// `changes` holds every changed node; a change is a root when its parent at
/// `time` is unchanged.
pub fn subtree_roots(diff: &VariationDiff, changes: &HashSet<NodeId>, time: Time) -> Vec<NodeId> {
    let mut roots: Vec<NodeId> = changes
        .iter()
        .copied()
        .filter(|&id| {
            diff.parent(id, time)
                .is_some_and(|parent| !changes.contains(&parent))
        })
        .collect();
    roots.sort_by_key(|&id| {
        let line = diff.node(id).lines(time).map_or(usize::MAX, |lines| lines.from);
        (line, id)
    });
    roots
}

fn removed_nodes(diff: &VariationDiff) -> HashSet<NodeId> {
    diff.nodes_at(Time::Before)
        .into_iter()
        .filter(|&id| {
            let node = diff.node(id);
            node.diff_type == DiffType::Rem || node.is_moved()
        })
        .collect()
}

fn added_nodes(diff: &VariationDiff) -> HashSet<NodeId> {
    diff.nodes_at(Time::After)
        .into_iter()
        .filter(|&id| {
            let node = diff.node(id);
            node.diff_type == DiffType::Add || node.is_moved()
        })
        .collect()
}

// ============================================================================
// Patching
// ============================================================================

/// Apply the changes of `diff` to `target`.
pub fn patch(
    diff: &VariationDiff,
    target: &VariationTree,
    options: &PatchOptions,
) -> Result<PatchOutcome, PatchRejected> {
    let span = info_span!("patch", context_size = options.context_size);
    let _enter = span.enter();

    let deselected = deselected_features(diff, target, options.patch_new_features);
    debug!(deselected = ?deselected, "deselection computed");

    let rho = deselection_formula(&deselected);
    let source = optimize(diff, &rho);

    let mut patcher = Patcher {
        options,
        source: &source,
        target: target.clone().into_diff(),
        deselected,
        stage: PatchStage::Filtered,
        alignment_problems: 0,
    };
    if options.require_zero_variant_drift {
        patcher.check_variant_drift(&rho)?;
    }

    let removals = subtree_roots(&source, &removed_nodes(&source), Time::Before);
    let additions = subtree_roots(&source, &added_nodes(&source), Time::After);

    patcher.stage = PatchStage::RemovalsApplied;
    for &root in &removals {
        patcher.apply_removal(root)?;
    }

    patcher.stage = PatchStage::AdditionsApplied;
    for &root in &additions {
        patcher.apply_addition(root)?;
    }

    info!(
        removed = removals.len(),
        added = additions.len(),
        alignment_problems = patcher.alignment_problems,
        "patch applied"
    );

    Ok(PatchOutcome {
        diff: patcher.target,
        removed_roots: removals.len(),
        added_roots: additions.len(),
        alignment_problems: patcher.alignment_problems,
        deselected: patcher.deselected,
    })
}

struct Patcher<'a> {
    options: &'a PatchOptions,
    /// Filtered source diff.
    source: &'a VariationDiff,
    /// Target being patched; its AFTER view receives the changes.
    target: VariationDiff,
    deselected: BTreeSet<String>,
    /// Stage currently being worked on.
    stage: PatchStage,
    alignment_problems: usize,
}

impl Patcher<'_> {
    fn reject(&self, reason: RejectReason) -> PatchRejected {
        debug!(stage = %self.stage, reason = %reason, "patch rejected");
        PatchRejected::new(self.stage, reason)
    }

    fn check_variant_drift(&self, rho: &Formula) -> Result<(), PatchRejected> {
        let source = self.source.project(Time::Before);
        let target = optimize(&self.target, rho).project(Time::Before);
        let same = is_same_as_structural(
            &Snapshot::new(source.as_diff(), Time::Before),
            source.root(),
            &Snapshot::new(target.as_diff(), Time::Before),
            target.root(),
        );
        if same {
            Ok(())
        } else {
            Err(self.reject(RejectReason::VariantDrift))
        }
    }

    /// Relevant children of `parent` in `view`, always including `keep`.
    fn relevant_children(
        &self,
        view: &impl TreeView,
        parent: NodeId,
        time: Time,
        keep: Option<NodeId>,
    ) -> Vec<NodeId> {
        view.children(parent)
            .into_iter()
            .filter(|&child| {
                Some(child) == keep || !is_controlled(view.diff(), child, time, &self.deselected)
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Target Resolution
    // ------------------------------------------------------------------------

    /// The source parent of `root` and its counterpart in the target.
    ///
    /// Candidates are target annotations with the same presence condition as
    /// the parent. Several candidates are narrowed down by comparing the
    /// sibling lists of their ancestors with those of the source parent.
    /// A single candidate is accepted without comparing ancestors; the
    /// neighbor check inside it still applies.
    fn find_target_node(
        &self,
        root: NodeId,
        source_view: &impl TreeView,
        target_view: &impl TreeView,
        time: Time,
    ) -> Result<(NodeId, NodeId), PatchRejected> {
        let Some(parent) = self.source.parent(root, time) else {
            return Err(self.reject(RejectReason::NoTargetNode {
                presence_condition: Formula::True.to_string(),
            }));
        };
        let wanted = self.source.presence_condition(parent, time);

        let candidates: Vec<NodeId> = self
            .target
            .nodes_at(time)
            .into_iter()
            .filter(|&id| {
                let node = self.target.node(id);
                node.is_annotation()
                    && node.diff_type != DiffType::Add
                    && self.target.presence_condition(id, time) == wanted
            })
            .collect();

        // ancestry only breaks ties
        let narrowed: Vec<NodeId> = if candidates.len() > 1 {
            candidates
                .iter()
                .copied()
                .filter(|&id| self.ancestors_match(source_view, parent, target_view, id, time))
                .collect()
        } else {
            candidates.clone()
        };

        match narrowed.as_slice() {
            [node] => {
                debug!(root = %root, target = %node, pc = %wanted, "target node resolved");
                Ok((parent, *node))
            }
            [] if candidates.is_empty() => Err(self.reject(RejectReason::NoTargetNode {
                presence_condition: wanted.to_string(),
            })),
            _ => Err(self.reject(RejectReason::AmbiguousTargetNode {
                presence_condition: wanted.to_string(),
                count: candidates.len(),
            })),
        }
    }

    /// Compare the relevant sibling labels and position of every ancestor.
    fn ancestors_match(
        &self,
        source_view: &impl TreeView,
        mut source: NodeId,
        target_view: &impl TreeView,
        mut target: NodeId,
        time: Time,
    ) -> bool {
        loop {
            let (source_parent, target_parent) = (
                self.source.parent(source, time),
                self.target.parent(target, time),
            );
            let (Some(source_parent), Some(target_parent)) = (source_parent, target_parent) else {
                return source_parent.is_none() && target_parent.is_none();
            };

            let source_siblings =
                self.relevant_children(source_view, source_parent, time, Some(source));
            let target_siblings =
                self.relevant_children(target_view, target_parent, time, Some(target));
            let labels = |diff: &VariationDiff, ids: &[NodeId]| -> Vec<String> {
                ids.iter()
                    .map(|&id| diff.node(id).label.trim().to_string())
                    .collect()
            };
            if labels(self.source, &source_siblings) != labels(&self.target, &target_siblings)
                || source_siblings.iter().position(|&id| id == source)
                    != target_siblings.iter().position(|&id| id == target)
            {
                return false;
            }

            source = source_parent;
            target = target_parent;
        }
    }

    // ------------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------------

    fn apply_removal(&mut self, root: NodeId) -> Result<(), PatchRejected> {
        let time = Time::Before;
        let source_view = Snapshot::new(self.source, time);
        let target_view = Snapshot::new(&self.target, time);
        let (source_parent, target_node) =
            self.find_target_node(root, &source_view, &target_view, time)?;
        let label = self.source.node(root).label.clone();

        let siblings = self.relevant_children(&source_view, source_parent, time, Some(root));
        let index = self
            .source
            .children(source_parent, time)
            .iter()
            .take_while(|&&id| id != root)
            .filter(|&&id| siblings.contains(&id))
            .count();
        let search = NeighborSearch {
            source: &source_view,
            target: &target_view,
            context_size: self.options.context_size,
        };

        let same: Vec<NodeId> = self
            .target
            .children(target_node, time)
            .iter()
            .copied()
            .filter(|&child| {
                self.target.parent(child, Time::After).is_some()
                    && is_same_as(&source_view, root, &target_view, child)
            })
            .collect();

        // every candidate in a matching context counts, however long the match
        let candidates: Vec<NodeId> = same
            .into_iter()
            .filter(|&candidate| {
                let targets =
                    self.relevant_children(&target_view, target_node, time, Some(candidate));
                targets
                    .iter()
                    .position(|&id| id == candidate)
                    .is_some_and(|position| {
                        search.check_neighbors(&siblings, index, &targets, position)
                    })
            })
            .collect();

        let removed = match candidates.as_slice() {
            [candidate] => *candidate,
            [] => return Err(self.reject(RejectReason::NoRemovalCandidate { label })),
            _ => {
                return Err(self.reject(RejectReason::AmbiguousRemovalCandidate {
                    label,
                    count: candidates.len(),
                }))
            }
        };

        if self.has_deselected_neighbor(target_node, removed) {
            self.alignment_problems += 1;
            debug!(root = %root, "removal next to deselected content");
        }
        debug!(root = %root, target = %removed, "removing subtree");
        self.target.remove_subtree(removed);
        Ok(())
    }

    /// Whether a direct neighbor of `child` is controlled by a deselected
    /// feature.
    fn has_deselected_neighbor(&self, parent: NodeId, child: NodeId) -> bool {
        let children = self.target.children(parent, Time::Before);
        let Some(index) = children.iter().position(|&id| id == child) else {
            return false;
        };
        [index.checked_sub(1), Some(index + 1)]
            .into_iter()
            .flatten()
            .filter_map(|i| children.get(i))
            .any(|&id| is_controlled(&self.target, id, Time::Before, &self.deselected))
    }

    // ------------------------------------------------------------------------
    // Addition
    // ------------------------------------------------------------------------

    fn apply_addition(&mut self, root: NodeId) -> Result<(), PatchRejected> {
        let time = Time::After;
        let label = self.source.node(root).label.clone();
        let source_view = Unchanged::new(self.source, time);
        let target_view = Unchanged::new(&self.target, time);
        let (source_parent, target_node) =
            self.find_target_node(root, &source_view, &target_view, time)?;

        let mut siblings = self.relevant_children(&source_view, source_parent, time, None);
        let index = self
            .source
            .children(source_parent, time)
            .iter()
            .take_while(|&&id| id != root)
            .filter(|&&id| siblings.contains(&id))
            .count();
        siblings.insert(index, root);

        let targets = self.relevant_children(&target_view, target_node, time, None);
        let search = NeighborSearch {
            source: &source_view,
            target: &target_view,
            context_size: self.options.context_size,
        };
        let placement = search
            .find_insert_position(&siblings, index, &targets)
            .map_err(|err| {
                self.reject(match err {
                    PlacementError::NotFound(detail) => {
                        RejectReason::NoInsertPosition { label, detail }
                    }
                    PlacementError::Ambiguous => RejectReason::AmbiguousInsertPosition { label },
                    PlacementError::WrongOrder => RejectReason::NeighborsInWrongOrder { label },
                })
            })?;

        let real = self.target.children(target_node, time).to_vec();
        let position = neighbors::resolve_position(&self.target, &targets, &real, placement);
        if let InsertPosition::AlignmentProblem { from, to, at } = position {
            self.alignment_problems += 1;
            debug!(root = %root, from, to, at, "alignment problem");
        }

        let copy = self.target.copy_subtree_into(self.source, root, time);
        debug!(root = %root, target = %target_node, index = position.index(), "inserting subtree");
        self.target
            .insert_child(target_node, copy, position.index(), time);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Dialect;

    fn diff(before: &str, after: &str) -> VariationDiff {
        VariationDiff::from_sources(before, after, &Dialect::Cpp.parser()).unwrap()
    }

    fn tree(source: &str) -> VariationTree {
        VariationTree::parse("target.c", source, &Dialect::Cpp.parser()).unwrap()
    }

    fn features(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn apply(before: &str, after: &str, target: &str) -> Result<PatchOutcome, PatchRejected> {
        patch(&diff(before, after), &tree(target), &PatchOptions::default())
    }

    mod deselection_tests {
        use super::*;

        #[test]
        fn deselect_is_symmetric() {
            let f1 = features(&["A", "B", "C"]);
            let f2 = features(&["B", "D"]);
            assert_eq!(deselect(&f1, &f2), deselect(&f2, &f1));
            assert_eq!(deselect(&f1, &f2), features(&["A", "C", "D"]));
        }

        #[test]
        fn added_features_survive_with_patch_new_features() {
            let d = diff("a\n", "a\n#if NEW\nx\n#endif\n#if A\ny\n#endif\n");
            let target = tree("#if B\nb\n#endif\n");
            assert_eq!(
                deselected_features(&d, &target, false),
                features(&["A", "B", "NEW"])
            );
            assert_eq!(deselected_features(&d, &target, true), features(&["B"]));
        }

        #[test]
        fn mixed_diff_types_count_as_unchanged() {
            let d = diff("#if A\nx\n#endif\n", "#if A && B\nx\n#endif\n#if B\ny\n#endif\n");
            let types = feature_diff_types(&d);
            assert_eq!(types.get("A"), Some(&DiffType::Non));
            // x is unchanged and mapped to A && B after the edit
            assert_eq!(types.get("B"), Some(&DiffType::Non));

            let d = diff("a\n", "a\n#if B\ny\n#endif\n");
            assert_eq!(feature_diff_types(&d).get("B"), Some(&DiffType::Add));
        }

        #[test]
        fn annotation_around_existing_code_is_not_new() {
            let d = diff("a\nb\n", "#if W\na\n#endif\n#if W\nw\n#endif\nb\n");
            let types = feature_diff_types(&d);
            assert_eq!(types.get("W"), Some(&DiffType::Non));
            assert_eq!(
                deselected_features(&d, &tree("a\nb\n"), true),
                features(&["W"])
            );
        }

        #[test]
        fn deselection_formula_negates_each_feature() {
            assert_eq!(
                deselection_formula(&features(&["A", "B"])),
                and([not(var("A")), not(var("B"))])
            );
            assert_eq!(deselection_formula(&BTreeSet::new()), Formula::True);
        }
    }

    mod classification_tests {
        use super::*;

        #[test]
        fn roots_are_maximal_and_ordered() {
            let d = diff("a\nb\nc\n", "#if X\nx\ny\n#endif\na\nc\nz\n");
            let added = added_nodes(&d);
            let roots = subtree_roots(&d, &added, Time::After);
            let labels: Vec<&str> = roots.iter().map(|&id| d.node(id).label.as_str()).collect();
            assert_eq!(labels, vec!["#if X", "z"]);

            let removed = removed_nodes(&d);
            let roots = subtree_roots(&d, &removed, Time::Before);
            let labels: Vec<&str> = roots.iter().map(|&id| d.node(id).label.as_str()).collect();
            assert_eq!(labels, vec!["b"]);
        }

        #[test]
        fn moved_nodes_are_removed_and_added() {
            let d = diff("a\nb\n", "#if X\na\n#endif\nb\n");
            let a = d.children(d.root(), Time::Before)[0];
            assert!(removed_nodes(&d).contains(&a));
            assert!(added_nodes(&d).contains(&a));
            let roots = subtree_roots(&d, &added_nodes(&d), Time::After);
            assert_eq!(roots.len(), 1);
            assert_eq!(d.node(roots[0]).label, "#if X");
        }
    }

    mod application_tests {
        use super::*;

        #[test]
        fn round_trip_on_identical_target() {
            let before = "a\n#if A\nb\n#endif\nc\n";
            let after = "a\n#if A\nb\nb2\n#endif\nd\n";
            let outcome = apply(before, after, before).unwrap();
            assert_eq!(outcome.result_tree().unparse(), after);
            assert_eq!(outcome.removed_roots, 1);
            assert_eq!(outcome.added_roots, 2);
            assert_eq!(outcome.alignment_problems, 0);
        }

        #[test]
        fn wrapping_in_new_annotation() {
            let before = "a\nb\nc\n";
            let after = "a\n#if A\nb\n#endif\nc\n";
            let target = "#if A\nq\n#endif\na\nb\nc\n";
            let outcome = apply(before, after, target).unwrap();
            assert_eq!(
                outcome.result_tree().unparse(),
                "#if A\nq\n#endif\na\n#if A\nb\n#endif\nc\n"
            );
        }

        #[test]
        fn removal_of_missing_content_is_rejected() {
            let err = apply("a\nb\nc\n", "a\nc\n", "a\nc\n").unwrap_err();
            assert_eq!(err.stage, PatchStage::RemovalsApplied);
            assert_eq!(
                err.reason,
                RejectReason::NoRemovalCandidate {
                    label: "b".to_string()
                }
            );
        }

        #[test]
        fn missing_target_annotation_is_rejected() {
            let err = apply(
                "#if A\nx\n#endif\n",
                "#if A\nx\ny\n#endif\n",
                "#if A && B\nx\n#endif\n",
            )
            .unwrap_err();
            assert!(matches!(err.reason, RejectReason::NoTargetNode { .. }));
        }

        #[test]
        fn removal_skips_deselected_source_siblings() {
            let outcome = apply(
                "a\n#if T\nt\n#endif\nx\nb\n",
                "a\n#if T\nt\n#endif\nb\n",
                "a\nx\nb\n",
            )
            .unwrap();
            assert_eq!(outcome.deselected, features(&["T"]));
            assert_eq!(outcome.result_tree().unparse(), "a\nb\n");
            assert_eq!(outcome.alignment_problems, 0);
        }

        #[test]
        fn single_target_annotation_is_used_despite_other_ancestry() {
            let outcome = apply(
                "x\n#if A\nb\n#endif\n",
                "x\n#if A\nb\nc\n#endif\n",
                "y\nz\n#if A\nb\n#endif\n",
            )
            .unwrap();
            assert_eq!(
                outcome.result_tree().unparse(),
                "y\nz\n#if A\nb\nc\n#endif\n"
            );
        }

        #[test]
        fn duplicate_target_annotations_are_told_apart_by_ancestry() {
            let before = "#if A\nb\n#endif\n#if A\nd\n#endif\n";
            let after = "#if A\nb\nc\n#endif\n#if A\nd\n#endif\n";
            let outcome = apply(before, after, before).unwrap();
            assert_eq!(outcome.result_tree().unparse(), after);
        }

        #[test]
        fn patched_target_keeps_original_before_view() {
            let outcome = apply("a\nb\n", "a\nc\n", "a\nb\n").unwrap();
            assert_eq!(outcome.diff.project(Time::Before).unparse(), "a\nb\n");
            assert_eq!(outcome.result_tree().unparse(), "a\nc\n");
        }
    }

    mod drift_tests {
        use super::*;

        #[test]
        fn drift_check_is_opt_in() {
            let (before, after, target) = ("a\nb\n", "a\nb\nc\n", "a\nx\nb\n");
            let options = PatchOptions {
                require_zero_variant_drift: true,
                ..PatchOptions::default()
            };
            let err = patch(&diff(before, after), &tree(target), &options).unwrap_err();
            assert_eq!(err.reason, RejectReason::VariantDrift);
            assert_eq!(err.stage, PatchStage::Filtered);

            let outcome = apply(before, after, target).unwrap();
            assert_eq!(outcome.result_tree().unparse(), "a\nx\nb\nc\n");
        }

        #[test]
        fn drift_ignores_deselected_features() {
            let options = PatchOptions {
                require_zero_variant_drift: true,
                ..PatchOptions::default()
            };
            let outcome = patch(
                &diff("a\nb\n", "a\nb\nc\n"),
                &tree("a\n#if T\nt\n#endif\nb\n"),
                &options,
            )
            .unwrap();
            assert_eq!(outcome.deselected, features(&["T"]));
        }
    }
}
