//! Annotation parsing: classifying directive lines and abstracting their
//! arguments into formulas.
//!
//! A line is first matched against the directive pattern of its dialect. Lines
//! that are no directive yield [`AnnotationType::None`]. For `#if`/`#elif` the
//! argument is parsed with the dialect's expression grammar and reduced to its
//! boolean skeleton: `&&`, `||`, `!` and parentheses become formula
//! connectives, everything else (comparisons, arithmetic, macro calls,
//! ternaries, `defined`) becomes one opaque variable named by its canonical,
//! whitespace-free text.
//!
//! ## Dialects
//!
//! | Dialect | Directive syntax | Literals |
//! |---------|------------------|----------|
//! | `cpp` | `#if`, `#ifdef`, `#ifndef`, `#elif`, `#elifdef`, `#elifndef`, `#else`, `#endif` | C expressions |
//! | `jpp` | `//#if`, `//#elif`, `//#else`, `//#endif` | `defined(X)`, `${prop} == value`, `and`/`or` |
//! | `marlin` | as `cpp` | `ENABLED(X)` is `X`, `DISABLED(X)` is `!X` |

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::UnparseableFormula;
use crate::formula::{and, not, or, var, Formula};

pub mod cpp;
pub mod jpp;

// ============================================================================
// Annotations
// ============================================================================

/// Kind of a source line with respect to conditional compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationType {
    If,
    Elif,
    Else,
    Endif,
    /// Not a directive.
    None,
}

impl AnnotationType {
    /// Classify a directive keyword such as `ifndef` or `elifdef`.
    fn from_directive(directive: &str) -> AnnotationType {
        if directive.starts_with("if") {
            AnnotationType::If
        } else if directive.starts_with("elif") {
            AnnotationType::Elif
        } else if directive == "else" {
            AnnotationType::Else
        } else if directive == "endif" {
            AnnotationType::Endif
        } else {
            AnnotationType::None
        }
    }

    /// Whether directives of this type carry a formula.
    pub fn requires_formula(self) -> bool {
        matches!(self, AnnotationType::If | AnnotationType::Elif)
    }
}

/// The result of classifying one source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub kind: AnnotationType,
    /// Present iff `kind` requires a formula.
    pub formula: Option<Formula>,
}

impl Annotation {
    pub fn new(kind: AnnotationType, formula: Option<Formula>) -> Self {
        Annotation { kind, formula }
    }

    /// A line that is no directive.
    pub fn none() -> Self {
        Annotation::new(AnnotationType::None, None)
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            AnnotationType::If => "if",
            AnnotationType::Elif => "elif",
            AnnotationType::Else => "else",
            AnnotationType::Endif => "endif",
            AnnotationType::None => "none",
        };
        match &self.formula {
            Some(formula) => write!(f, "{} {}", kind, formula),
            None => f.write_str(kind),
        }
    }
}

/// Turns source lines into annotations.
///
/// Implementations are pluggable per annotation dialect; the tree parser only
/// depends on this trait.
pub trait AnnotationParser {
    /// Classify `line` and abstract its formula.
    ///
    /// Fails with [`UnparseableFormula`] when a line is positively identified
    /// as a directive but its argument cannot be abstracted, or when a
    /// directive that needs a formula has none.
    fn parse_annotation(&self, line: &str) -> Result<Annotation, UnparseableFormula>;
}

// ============================================================================
// Preprocessor Dialects
// ============================================================================

/// Supported annotation dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// C preprocessor.
    #[default]
    Cpp,
    /// Java preprocessor comments (`//#if`).
    Jpp,
    /// C preprocessor with Marlin's `ENABLED`/`DISABLED` macros resolved.
    Marlin,
}

impl Dialect {
    /// Annotation parser for this dialect.
    pub fn parser(self) -> PreprocessorAnnotationParser {
        PreprocessorAnnotationParser::new(self)
    }
}

static CPP_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[+-]?\s*#\s*(?P<directive>if|ifdef|ifndef|elif|elifdef|elifndef|else|endif)(?P<formula>[\s(].*)?$",
    )
    .unwrap()
});

static JPP_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?\s*//\s*#\s*(?P<directive>if|elif|else|endif)(?P<formula>[\s(].*)?$").unwrap()
});

/// Regex-driven directive classifier with a grammar-driven formula abstractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessorAnnotationParser {
    dialect: Dialect,
}

impl PreprocessorAnnotationParser {
    pub fn new(dialect: Dialect) -> Self {
        PreprocessorAnnotationParser { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn pattern(&self) -> &'static Regex {
        match self.dialect {
            Dialect::Cpp | Dialect::Marlin => &CPP_DIRECTIVE,
            Dialect::Jpp => &JPP_DIRECTIVE,
        }
    }

    /// Abstract the argument of an `#if`-like directive.
    pub fn parse_formula(&self, text: &str) -> Result<Formula, UnparseableFormula> {
        let tree = match self.dialect {
            Dialect::Cpp | Dialect::Marlin => cpp::parse_c_expression(text),
            Dialect::Jpp => jpp::parse_jpp_expression(text),
        }
        .map_err(|reason| UnparseableFormula::new(text.trim(), reason))?;
        Ok(tree.to_formula(self.dialect == Dialect::Marlin))
    }
}

impl AnnotationParser for PreprocessorAnnotationParser {
    fn parse_annotation(&self, line: &str) -> Result<Annotation, UnparseableFormula> {
        let Some(captures) = self.pattern().captures(line) else {
            return Ok(Annotation::none());
        };
        let directive = captures.name("directive").map_or("", |m| m.as_str());
        let kind = AnnotationType::from_directive(directive);
        if !kind.requires_formula() {
            return Ok(Annotation::new(kind, None));
        }

        let text = captures.name("formula").map_or("", |m| m.as_str());
        let formula = self.parse_formula(text)?;

        // ifdef/ifndef/elifdef/elifndef
        let formula = if directive.ends_with("def") {
            let Formula::Var(name) = formula else {
                return Err(UnparseableFormula::new(
                    text.trim(),
                    format!("#{} expects a single macro name", directive),
                ));
            };
            let defined = var(format!("defined({})", name));
            if directive.ends_with("ndef") {
                not(defined)
            } else {
                defined
            }
        } else {
            formula
        };

        Ok(Annotation::new(kind, Some(formula)))
    }
}

// ============================================================================
// Expression Skeleton
// ============================================================================

/// Boolean skeleton of a directive expression.
///
/// Only the boolean connectives are kept as structure; every other construct
/// is already rendered to its canonical text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ExprTree {
    Or(Vec<ExprTree>),
    And(Vec<ExprTree>),
    Not(Box<ExprTree>),
    Group(Box<ExprTree>),
    /// Macro call `name(args)`; `args` is whitespace-free.
    Call { name: String, args: String },
    Atom(String),
}

impl ExprTree {
    /// Canonical text: whitespace removed outside literals, comments gone.
    pub(crate) fn text(&self) -> String {
        match self {
            ExprTree::Or(operands) => join_text(operands, "||"),
            ExprTree::And(operands) => join_text(operands, "&&"),
            ExprTree::Not(inner) => format!("!{}", inner.text()),
            ExprTree::Group(inner) => format!("({})", inner.text()),
            ExprTree::Call { name, args } => format!("{}({})", name, args),
            ExprTree::Atom(text) => text.clone(),
        }
    }

    /// Abstract this skeleton into a formula.
    pub(crate) fn to_formula(&self, resolve_marlin_macros: bool) -> Formula {
        match self {
            ExprTree::Or(operands) => {
                or(operands.iter().map(|op| op.to_formula(resolve_marlin_macros)))
            }
            ExprTree::And(operands) => {
                and(operands.iter().map(|op| op.to_formula(resolve_marlin_macros)))
            }
            ExprTree::Not(inner) => not(inner.to_formula(resolve_marlin_macros)),
            ExprTree::Group(inner) => inner.to_formula(resolve_marlin_macros),
            ExprTree::Call { name, args } if resolve_marlin_macros && name == "ENABLED" => {
                var(args.clone())
            }
            ExprTree::Call { name, args } if resolve_marlin_macros && name == "DISABLED" => {
                not(var(args.clone()))
            }
            ExprTree::Call { .. } => var(self.text()),
            ExprTree::Atom(text) => var(text.clone()),
        }
    }
}

fn join_text(operands: &[ExprTree], separator: &str) -> String {
    operands
        .iter()
        .map(ExprTree::text)
        .collect::<Vec<_>>()
        .join(separator)
}
