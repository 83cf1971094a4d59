//! JSON output types and serialization for CLI responses.
//!
//! ## Design Principles
//!
//! 1. **Status first:** Every response has `status` as first field
//! 2. **Deterministic:** Same input -> same output (field order, array ordering)
//! 3. **Nullable vs absent:** Absent field means "not applicable"
//! 4. **Versioned:** Schema version in response enables forward compatibility

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::error::{OutputErrorCode, RejectReason, VarPatchError};
use crate::feature::{Annotation, AnnotationType};
use crate::patch::PatchOutcome;
use crate::variation::VariationTree;

/// Current schema version for all responses.
pub const SCHEMA_VERSION: &str = "1";

// ============================================================================
// Patch Response
// ============================================================================

/// Response for `varpatch patch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchResponse {
    /// Status: "ok".
    pub status: String,
    /// Schema version for compatibility.
    pub schema_version: String,
    /// The patched target source.
    pub result: String,
    /// Features forced off while patching.
    pub deselected: Vec<String>,
    pub removed_roots: usize,
    pub added_roots: usize,
    /// Insertions or removals made next to deselected-controlled siblings.
    pub alignment_problems: usize,
    /// Whether the result has the structure of the expected tree.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matches_expected: Option<bool>,
}

impl PatchResponse {
    pub fn new(outcome: &PatchOutcome, matches_expected: Option<bool>) -> Self {
        PatchResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            result: outcome.result_tree().unparse(),
            deselected: outcome.deselected.iter().cloned().collect(),
            removed_roots: outcome.removed_roots,
            added_roots: outcome.added_roots,
            alignment_problems: outcome.alignment_problems,
            matches_expected,
        }
    }
}

// ============================================================================
// Annotation Response
// ============================================================================

/// Response for `varpatch annotation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationResponse {
    pub status: String,
    pub schema_version: String,
    /// The classified line.
    pub line: String,
    pub kind: AnnotationType,
    /// Abstracted formula, for `if` and `elif`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    /// Features the formula mentions.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
}

impl AnnotationResponse {
    pub fn new(line: impl Into<String>, annotation: &Annotation) -> Self {
        let features = annotation
            .formula
            .as_ref()
            .map(|formula| formula.features().into_iter().collect())
            .unwrap_or_default();
        AnnotationResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            line: line.into(),
            kind: annotation.kind,
            formula: annotation.formula.as_ref().map(ToString::to_string),
            features,
        }
    }
}

// ============================================================================
// Tree Response
// ============================================================================

/// Response for `varpatch tree`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeResponse {
    pub status: String,
    pub schema_version: String,
    /// Nodes below the root.
    pub size: usize,
    /// Indented rendering of the tree.
    pub rendered: String,
}

impl TreeResponse {
    pub fn new(tree: &VariationTree) -> Self {
        TreeResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            size: tree.size(),
            rendered: tree.to_string(),
        }
    }
}

// ============================================================================
// Error Response
// ============================================================================

/// Error details for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Numeric error code.
    pub code: u8,
    /// Human-readable message.
    pub message: String,
    /// Error-specific structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorInfo {
    /// Create from a VarPatchError.
    pub fn from_error(err: &VarPatchError) -> Self {
        let code = OutputErrorCode::from(err).code();
        let message = err.to_string();

        let details = match err {
            VarPatchError::DiffParse(parse) => Some(serde_json::json!({
                "file": parse.source_name,
                "line": parse.line,
            })),
            VarPatchError::UnparseableFormula(formula) => Some(serde_json::json!({
                "text": formula.text,
            })),
            VarPatchError::PatchRejected(rejected) => {
                let mut details = serde_json::json!({ "stage": rejected.stage });
                if let RejectReason::AmbiguousTargetNode { count, .. }
                | RejectReason::AmbiguousRemovalCandidate { count, .. } = &rejected.reason
                {
                    details["candidates"] = serde_json::json!(count);
                }
                Some(details)
            }
            _ => None,
        };

        ErrorInfo {
            code,
            message,
            details,
        }
    }
}

/// Error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Status: "error".
    pub status: String,
    /// Schema version for compatibility.
    pub schema_version: String,
    /// Error information.
    pub error: ErrorInfo,
}

impl ErrorResponse {
    /// Create an error response from a VarPatchError.
    pub fn from_error(err: &VarPatchError) -> Self {
        ErrorResponse {
            status: "error".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            error: ErrorInfo::from_error(err),
        }
    }
}

// ============================================================================
// Emission
// ============================================================================

/// Emit a response as pretty-printed JSON to a writer.
pub fn emit_response<T: Serialize>(response: &T, writer: &mut impl Write) -> io::Result<()> {
    let json = serde_json::to_string_pretty(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{}", json)
}

// ============================================================================
// Tests
// ============================================================================
