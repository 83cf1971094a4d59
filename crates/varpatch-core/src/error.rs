//! Error types and error code constants for varpatch.
//!
//! This module provides a unified error type (`VarPatchError`) that bridges
//! domain-specific errors from the subsystems (formula abstraction, diff
//! parsing, patch transfer) into a common format suitable for JSON output.
//!
//! ## Error Code Mapping
//!
//! - `2`: Invalid arguments (bad input from caller)
//! - `3`: Parse errors (unparseable formula, malformed source or diff)
//! - `4`: Patch rejected (no unambiguous way to apply the edit)
//! - `10`: Internal errors (bugs, unexpected state)
//!
//! ## Design
//!
//! - **Domain errors**: `UnparseableFormula`, `DiffParseError`, `PatchRejected`
//!   are returned by the library operations that produce them.
//! - **Bridging**: `impl From<X> for VarPatchError` bridges domain errors
//! - **Code mapping**: `OutputErrorCode` provides stable integer codes for JSON

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Output Error Codes
// ============================================================================

/// Error codes for JSON output.
///
/// These codes map to CLI exit codes and appear in JSON error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    /// Invalid arguments from caller (bad input, unreadable file).
    InvalidArguments = 2,
    /// Formula, source or diff could not be parsed.
    ParseError = 3,
    /// The patch engine rejected the patch.
    PatchRejected = 4,
    /// Internal errors (bugs, unexpected state).
    InternalError = 10,
}

impl OutputErrorCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Formula Errors
// ============================================================================

/// A line was identified as a directive, but its argument could not be
/// abstracted into a formula.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unparseable formula '{text}': {reason}")]
pub struct UnparseableFormula {
    /// The offending directive argument.
    pub text: String,
    /// What went wrong.
    pub reason: String,
}

impl UnparseableFormula {
    pub fn new(text: impl Into<String>, reason: impl Into<String>) -> Self {
        UnparseableFormula {
            text: text.into(),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Diff Parse Errors
// ============================================================================

/// Why a source or diff could not be turned into a variation diff.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiffParseErrorKind {
    #[error(transparent)]
    UnparseableFormula(#[from] UnparseableFormula),

    /// `#elif` or `#else` without an enclosing `#if`.
    #[error("#elif or #else without matching #if")]
    BranchWithoutIf,

    /// `#elif` or `#else` following an `#else` of the same chain.
    #[error("#elif or #else after #else")]
    BranchAfterElse,

    /// `#endif` without an enclosing `#if`.
    #[error("#endif without matching #if")]
    EndifWithoutIf,

    /// The input ended while annotations were still open.
    #[error("missing #endif")]
    MissingEndif,
}

/// Malformed source input to tree or diff construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{source_name}:{line}: {kind}")]
pub struct DiffParseError {
    /// Name of the parsed input (file name or `<diff>`).
    pub source_name: String,
    /// 1-based line in the parsed input.
    pub line: usize,
    pub kind: DiffParseErrorKind,
}

// ============================================================================
// Patch Rejection
// ============================================================================

/// Processing stage of a patch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchStage {
    Start,
    DeselectionComputed,
    Filtered,
    RemovalsApplied,
    AdditionsApplied,
    Done,
}

impl fmt::Display for PatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PatchStage::Start => "start",
            PatchStage::DeselectionComputed => "deselection",
            PatchStage::Filtered => "filtering",
            PatchStage::RemovalsApplied => "removal",
            PatchStage::AdditionsApplied => "addition",
            PatchStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Why a patch could not be transferred.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    /// The BEFORE projections of diff and target differ under deselection.
    #[error("variants drift apart under the deselected features")]
    VariantDrift,

    /// No target node carries the presence condition the change needs.
    #[error("no target node with presence condition '{presence_condition}'")]
    NoTargetNode { presence_condition: String },

    /// Several target nodes qualify and ancestor comparison cannot narrow them.
    #[error("{count} target nodes with presence condition '{presence_condition}'")]
    AmbiguousTargetNode {
        presence_condition: String,
        count: usize,
    },

    /// The removed subtree does not occur below the target node.
    #[error("no node to remove matching '{label}'")]
    NoRemovalCandidate { label: String },

    /// Several children qualify for removal.
    #[error("{count} nodes to remove matching '{label}'")]
    AmbiguousRemovalCandidate { label: String, count: usize },

    /// The context of an addition cannot be located in the target.
    #[error("no insert position for '{label}': {detail}")]
    NoInsertPosition { label: String, detail: String },

    /// Several insert positions qualify.
    #[error("ambiguous insert position for '{label}'")]
    AmbiguousInsertPosition { label: String },

    /// The target holds the neighbors of an addition in inverted order.
    #[error("neighbors in wrong order for '{label}'")]
    NeighborsInWrongOrder { label: String },
}

/// The patch engine could not apply the patch unambiguously.
///
/// This is an expected outcome, not a defect. No partial result is ever
/// returned alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("patch rejected during {stage}: {reason}")]
pub struct PatchRejected {
    /// The stage that could not be completed.
    pub stage: PatchStage,
    pub reason: RejectReason,
}

impl PatchRejected {
    pub fn new(stage: PatchStage, reason: RejectReason) -> Self {
        PatchRejected { stage, reason }
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for CLI output.
#[derive(Debug, Error)]
pub enum VarPatchError {
    /// Invalid arguments from caller.
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    /// A directive could not be abstracted.
    #[error(transparent)]
    UnparseableFormula(#[from] UnparseableFormula),

    /// A source or diff could not be parsed.
    #[error(transparent)]
    DiffParse(#[from] DiffParseError),

    /// The patch was rejected.
    #[error(transparent)]
    PatchRejected(#[from] PatchRejected),

    /// Internal error (bug or unexpected state).
    #[error("internal error: {message}")]
    InternalError { message: String },
}

// ============================================================================
// Error Code Mapping
// ============================================================================

impl From<&VarPatchError> for OutputErrorCode {
    fn from(err: &VarPatchError) -> Self {
        match err {
            VarPatchError::InvalidArguments { .. } => OutputErrorCode::InvalidArguments,
            VarPatchError::UnparseableFormula(_) => OutputErrorCode::ParseError,
            VarPatchError::DiffParse(_) => OutputErrorCode::ParseError,
            VarPatchError::PatchRejected(_) => OutputErrorCode::PatchRejected,
            VarPatchError::InternalError { .. } => OutputErrorCode::InternalError,
        }
    }
}

impl From<VarPatchError> for OutputErrorCode {
    fn from(err: VarPatchError) -> Self {
        OutputErrorCode::from(&err)
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl VarPatchError {
    /// Create an invalid arguments error.
    pub fn invalid_args(message: impl Into<String>) -> Self {
        VarPatchError::InvalidArguments {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        VarPatchError::InternalError {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for VarPatchError {
    fn from(err: std::io::Error) -> Self {
        VarPatchError::InvalidArguments {
            message: format!("IO error: {}", err),
        }
    }
}
