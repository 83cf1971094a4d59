//! Propositional formulas over feature names.
//!
//! Formulas are built with the smart constructors [`and`], [`or`] and [`not`],
//! which flatten nested connectives and treat `True`/`False` as identity and
//! absorbing elements. Two formulas built the same way from the same parts are
//! syntactically equal, which is what presence-condition lookup relies on.
//! Semantic questions (satisfiability, tautology, equivalence) go through the
//! [`sat`] module.
//!
//! ## Usage
//!
//! ```
//! use varpatch_core::formula::{and, not, var, is_satisfiable, Formula};
//!
//! let f = and([var("A"), not(var("A"))]);
//! assert!(!is_satisfiable(&f));
//! assert_eq!(and([Formula::True, var("B")]), var("B"));
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub mod sat;

pub use sat::{equivalent, is_satisfiable, is_tautology, Cnf};

/// A propositional formula.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Formula {
    True,
    False,
    /// A named feature or an opaque abstracted expression such as `defined(A)`.
    Var(String),
    Not(Box<Formula>),
    And(Vec<Formula>),
    Or(Vec<Formula>),
}

/// A variable named `name`.
pub fn var(name: impl Into<String>) -> Formula {
    Formula::Var(name.into())
}

/// Negation. Constants flip and double negations cancel.
pub fn not(formula: Formula) -> Formula {
    match formula {
        Formula::True => Formula::False,
        Formula::False => Formula::True,
        Formula::Not(inner) => *inner,
        other => Formula::Not(Box::new(other)),
    }
}

/// Conjunction of `operands`.
///
/// Nested conjunctions are flattened, `True` operands dropped, and a `False`
/// operand makes the result `False`. An empty conjunction is `True`.
pub fn and(operands: impl IntoIterator<Item = Formula>) -> Formula {
    let mut flat = Vec::new();
    for operand in operands {
        match operand {
            Formula::True => {}
            Formula::False => return Formula::False,
            Formula::And(inner) => flat.extend(inner),
            other => flat.push(other),
        }
    }
    collapse(flat, Formula::True, Formula::And)
}

/// Disjunction of `operands`.
///
/// Dual of [`and`]: `False` operands are dropped, a `True` operand makes the
/// result `True`, and an empty disjunction is `False`.
pub fn or(operands: impl IntoIterator<Item = Formula>) -> Formula {
    let mut flat = Vec::new();
    for operand in operands {
        match operand {
            Formula::False => {}
            Formula::True => return Formula::True,
            Formula::Or(inner) => flat.extend(inner),
            other => flat.push(other),
        }
    }
    collapse(flat, Formula::False, Formula::Or)
}

/// `premise -> conclusion`
pub fn implies(premise: Formula, conclusion: Formula) -> Formula {
    or([not(premise), conclusion])
}

/// `left <-> right`
pub fn equiv(left: Formula, right: Formula) -> Formula {
    and([implies(left.clone(), right.clone()), implies(right, left)])
}

fn collapse(
    mut operands: Vec<Formula>,
    empty: Formula,
    build: fn(Vec<Formula>) -> Formula,
) -> Formula {
    match operands.len() {
        0 => empty,
        1 => operands.swap_remove(0),
        _ => build(operands),
    }
}

impl Formula {
    /// Rebuild this formula through the smart constructors.
    ///
    /// Formulas assembled directly from the enum variants may contain `True`
    /// and `False` below connectives; this removes them.
    pub fn eliminate_true_false(&self) -> Formula {
        match self {
            Formula::True | Formula::False | Formula::Var(_) => self.clone(),
            Formula::Not(inner) => not(inner.eliminate_true_false()),
            Formula::And(operands) => and(operands.iter().map(Formula::eliminate_true_false)),
            Formula::Or(operands) => or(operands.iter().map(Formula::eliminate_true_false)),
        }
    }

    /// Names of all variables occurring in this formula.
    pub fn features(&self) -> BTreeSet<String> {
        let mut features = BTreeSet::new();
        self.collect_features(&mut features);
        features
    }

    fn collect_features(&self, features: &mut BTreeSet<String>) {
        match self {
            Formula::True | Formula::False => {}
            Formula::Var(name) => {
                features.insert(name.clone());
            }
            Formula::Not(inner) => inner.collect_features(features),
            Formula::And(operands) | Formula::Or(operands) => {
                for operand in operands {
                    operand.collect_features(features);
                }
            }
        }
    }

    /// Evaluate under `assignment`. Unassigned variables are false.
    pub fn evaluate(&self, assignment: &BTreeMap<String, bool>) -> bool {
        match self {
            Formula::True => true,
            Formula::False => false,
            Formula::Var(name) => assignment.get(name).copied().unwrap_or(false),
            Formula::Not(inner) => !inner.evaluate(assignment),
            Formula::And(operands) => operands.iter().all(|f| f.evaluate(assignment)),
            Formula::Or(operands) => operands.iter().any(|f| f.evaluate(assignment)),
        }
    }

    /// Tseytin transformation into an equisatisfiable CNF.
    pub fn to_cnf(&self) -> Cnf {
        Cnf::tseytin(self)
    }

    fn is_compound(&self) -> bool {
        matches!(self, Formula::And(_) | Formula::Or(_))
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::True => f.write_str("True"),
            Formula::False => f.write_str("False"),
            Formula::Var(name) => f.write_str(name),
            Formula::Not(inner) if inner.is_compound() => write!(f, "!({})", inner),
            Formula::Not(inner) => write!(f, "!{}", inner),
            Formula::And(operands) => write_joined(f, operands, " && "),
            Formula::Or(operands) => write_joined(f, operands, " || "),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, operands: &[Formula], separator: &str) -> fmt::Result {
    for (index, operand) in operands.iter().enumerate() {
        if index > 0 {
            f.write_str(separator)?;
        }
        if operand.is_compound() {
            write!(f, "({})", operand)?;
        } else {
            write!(f, "{}", operand)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    mod constructor_tests {
        use super::*;

        #[test]
        fn and_drops_true_and_absorbs_false() {
            assert_eq!(and([Formula::True, var("A")]), var("A"));
            assert_eq!(and([Formula::False, var("A")]), Formula::False);
            assert_eq!(and(Vec::new()), Formula::True);
        }

        #[test]
        fn or_drops_false_and_absorbs_true() {
            assert_eq!(or([Formula::False, var("A")]), var("A"));
            assert_eq!(or([Formula::True, var("A")]), Formula::True);
            assert_eq!(or(Vec::new()), Formula::False);
        }

        #[test]
        fn nested_connectives_are_flattened() {
            let f = and([var("A"), and([var("B"), var("C")])]);
            assert_eq!(f, Formula::And(vec![var("A"), var("B"), var("C")]));
        }

        #[test]
        fn double_negation_cancels() {
            assert_eq!(not(not(var("A"))), var("A"));
            assert_eq!(not(Formula::True), Formula::False);
        }

        #[test]
        fn implication_with_constants() {
            assert_eq!(implies(var("A"), Formula::False), not(var("A")));
            assert_eq!(implies(Formula::True, var("A")), var("A"));
            assert_eq!(implies(Formula::False, var("A")), Formula::True);
            assert_eq!(equiv(var("A"), Formula::True), var("A"));
            assert_eq!(equiv(var("A"), Formula::False), not(var("A")));
        }
    }

    mod true_false_elimination_tests {
        use super::*;

        #[test]
        fn raw_formulas_are_simplified() {
            let raw = Formula::And(vec![Formula::True, var("A")]);
            assert_eq!(raw.eliminate_true_false(), var("A"));

            let raw = Formula::Or(vec![Formula::False, var("A")]);
            assert_eq!(raw.eliminate_true_false(), var("A"));

            let raw = Formula::And(vec![Formula::False, var("A")]);
            assert_eq!(raw.eliminate_true_false(), Formula::False);

            let raw = Formula::Or(vec![Formula::True, var("A")]);
            assert_eq!(raw.eliminate_true_false(), Formula::True);
        }

        #[test]
        fn simplification_reaches_through_negation() {
            let raw = Formula::Not(Box::new(Formula::And(vec![Formula::True, Formula::True])));
            assert_eq!(raw.eliminate_true_false(), Formula::False);

            let raw = Formula::Or(vec![
                Formula::Not(Box::new(Formula::True)),
                Formula::And(vec![var("A"), Formula::True]),
            ]);
            assert_eq!(raw.eliminate_true_false(), var("A"));
        }
    }

    mod display_tests {
        use super::*;

        #[test]
        fn renders_with_minimal_parentheses() {
            let f = and([or([var("A"), var("B")]), not(var("C"))]);
            assert_eq!(f.to_string(), "(A || B) && !C");
            assert_eq!(not(and([var("A"), var("B")])).to_string(), "!(A && B)");
            assert_eq!(var("defined(X)").to_string(), "defined(X)");
        }
    }

    mod feature_tests {
        use super::*;

        #[test]
        fn features_are_unique_and_sorted() {
            let f = or([and([var("B"), var("A")]), not(var("B")), Formula::False]);
            let features: Vec<String> = f.features().into_iter().collect();
            assert_eq!(features, vec!["A".to_string(), "B".to_string()]);
        }

        #[test]
        fn evaluate_defaults_missing_variables_to_false() {
            let mut assignment = BTreeMap::new();
            assignment.insert("A".to_string(), true);
            assert!(or([var("A"), var("B")]).evaluate(&assignment));
            assert!(!and([var("A"), var("B")]).evaluate(&assignment));
        }
    }
}
