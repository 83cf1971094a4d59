//! Core library for varpatch.
//!
//! This crate transfers edits between variants of preprocessor-annotated
//! source code:
//! - Propositional formulas with an in-crate satisfiability check
//! - Annotation parsing for C preprocessor, JPP and Marlin directives
//! - Variation trees and variation diffs over a node arena
//! - Structural matching of subtrees
//! - Relevance filtering of diffs under a deselection
//! - The patch engine
//! - Error types, error codes and JSON output types for CLI responses

pub mod error;
pub mod feature;
pub mod formula;
pub mod matching;
pub mod output;
pub mod patch;
pub mod variation;
pub mod view;
