//! Variation trees: annotated trees of a single version.

use std::fmt;

use crate::error::DiffParseError;
use crate::feature::AnnotationParser;

use super::parse::{parse_lines, DiffLine, LineOrigin};
use super::{DiffType, NodeId, Time, VariationDiff};

/// An annotated tree of one source version.
///
/// Represented as a [`VariationDiff`] in which every node is unchanged, so
/// both time views coincide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariationTree(VariationDiff);

impl VariationTree {
    /// Parse `source` into its annotation tree.
    pub fn parse(
        source_name: &str,
        source: &str,
        parser: &dyn AnnotationParser,
    ) -> Result<Self, DiffParseError> {
        let lines = source
            .lines()
            .enumerate()
            .map(|(index, line)| (index + 1, DiffLine::new(DiffType::Non, line)));
        let diff = parse_lines(lines, LineOrigin::Sequence(source_name), parser)?;
        Ok(VariationTree(diff))
    }

    /// Wrap a diff whose nodes are all unchanged.
    pub(crate) fn from_diff_unchecked(diff: VariationDiff) -> Self {
        VariationTree(diff)
    }

    pub fn as_diff(&self) -> &VariationDiff {
        &self.0
    }

    /// Convert into a diff, for patching.
    pub fn into_diff(self) -> VariationDiff {
        self.0
    }

    pub fn root(&self) -> NodeId {
        self.0.root()
    }

    /// Number of nodes below the root.
    pub fn size(&self) -> usize {
        self.0.nodes_at(Time::Before).len() - 1
    }

    /// Regenerate the source text of this tree.
    ///
    /// Every label is emitted in pre-order, followed by the `#endif` line of
    /// each `#if` after the last line of its branch chain.
    pub fn unparse(&self) -> String {
        let mut out = String::new();
        for &child in self.0.children(self.0.root(), Time::Before) {
            self.unparse_node(child, &mut out);
        }
        out
    }

    fn unparse_node(&self, id: NodeId, out: &mut String) {
        let node = self.0.node(id);
        out.push_str(&node.label);
        out.push('\n');
        for &child in node.children(Time::Before) {
            self.unparse_node(child, out);
        }
        if let Some(end) = &node.end_label {
            out.push_str(end);
            out.push('\n');
        }
    }
}

impl fmt::Display for VariationTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.render())
    }
}
