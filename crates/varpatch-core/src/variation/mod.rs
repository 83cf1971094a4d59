//! Variation trees and variation diffs.
//!
//! A [`VariationDiff`] overlays the annotated trees of two versions of a
//! source file. All nodes live in one arena and are addressed by [`NodeId`].
//! Each node records, per [`Time`], its own parent and ordered children, so a
//! node can sit below different parents before and after the edit. A
//! [`VariationTree`] is a diff in which nothing changed.
//!
//! ## Building diffs
//!
//! - [`VariationDiff::from_sources`]: line diff of two texts
//! - [`VariationDiff::from_unified`]: body of a unified diff (`+`, `-`, ` ` lines)
//! - [`VariationDiff::from_trees`]: line diff of two unparsed trees
//! - [`VariationTree::parse`]: a single text

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod diff;
pub mod parse;
pub mod tree;

pub use diff::{DiffNode, VariationDiff};
pub use parse::DiffLine;
pub use tree::VariationTree;

// ============================================================================
// Identifiers
// ============================================================================

/// Arena index of a node within one [`VariationDiff`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord,
)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn new(id: u32) -> Self {
        NodeId(id)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node_{}", self.0)
    }
}

// ============================================================================
// Time and Diff Types
// ============================================================================

/// The two versions a variation diff relates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Time {
    Before,
    After,
}

impl Time {
    pub const ALL: [Time; 2] = [Time::Before, Time::After];

    pub(crate) fn index(self) -> usize {
        match self {
            Time::Before => 0,
            Time::After => 1,
        }
    }
}

/// How a node changed between the two versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffType {
    /// Exists only after the edit.
    Add,
    /// Exists only before the edit.
    Rem,
    /// Exists at both times.
    Non,
}

impl DiffType {
    /// Whether nodes of this type exist at `time`.
    pub fn exists_at(self, time: Time) -> bool {
        match (self, time) {
            (DiffType::Non, _) => true,
            (DiffType::Add, Time::After) => true,
            (DiffType::Rem, Time::Before) => true,
            _ => false,
        }
    }

    /// The diff type of a node existing at the given times, if any.
    pub fn from_existence(before: bool, after: bool) -> Option<DiffType> {
        match (before, after) {
            (true, true) => Some(DiffType::Non),
            (true, false) => Some(DiffType::Rem),
            (false, true) => Some(DiffType::Add),
            (false, false) => None,
        }
    }

    /// Line prefix of this diff type in a unified diff.
    pub fn symbol(self) -> char {
        match self {
            DiffType::Add => '+',
            DiffType::Rem => '-',
            DiffType::Non => ' ',
        }
    }
}

// ============================================================================
// Node Types
// ============================================================================

/// Kind of a node in a variation tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// The implicit top-level annotation with formula `True`.
    Root,
    If,
    Elif,
    /// `#else`, carrying no formula of its own.
    Else,
    /// Ordinary source content.
    Artifact,
}

impl NodeType {
    /// Every node type except artifacts is an annotation.
    pub fn is_annotation(self) -> bool {
        !matches!(self, NodeType::Artifact)
    }

    pub fn is_artifact(self) -> bool {
        matches!(self, NodeType::Artifact)
    }

    /// `#elif` and `#else` continue the branch chain of their parent.
    pub fn is_branch(self) -> bool {
        matches!(self, NodeType::Elif | NodeType::Else)
    }
}

/// Half-open range of 1-based line numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineRange {
    pub from: usize,
    pub to: usize,
}

impl LineRange {
    pub fn new(from: usize, to: usize) -> Self {
        LineRange { from, to }
    }

    /// A range covering only `line`.
    pub fn single(line: usize) -> Self {
        LineRange::new(line, line + 1)
    }
}
