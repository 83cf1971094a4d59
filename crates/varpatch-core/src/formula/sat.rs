//! Satisfiability checking.
//!
//! Formulas are converted to conjunctive normal form with the Tseytin
//! transformation and decided by a DPLL search with unit propagation.
//! Presence conditions are small, so the solver favors simplicity over
//! clause learning.

use std::collections::HashMap;

use super::{and, not, or, Formula};

/// A clause literal: variable index (1-based), negative when negated.
pub type Literal = i32;

/// A formula in conjunctive normal form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cnf {
    /// Number of variables, including auxiliary Tseytin variables.
    pub variable_count: usize,
    /// Original variable names, in order of first occurrence.
    pub variables: Vec<String>,
    pub clauses: Vec<Vec<Literal>>,
}

impl Cnf {
    /// Equisatisfiable CNF of `formula`.
    pub fn tseytin(formula: &Formula) -> Cnf {
        let mut encoder = Encoder::default();
        let top = encoder.encode(formula);
        encoder.clauses.push(vec![top]);
        Cnf {
            variable_count: encoder.next_variable as usize,
            variables: encoder.variables,
            clauses: encoder.clauses,
        }
    }

    /// Whether some assignment satisfies every clause.
    pub fn is_satisfiable(&self) -> bool {
        let mut solver = Solver {
            clauses: &self.clauses,
            assignment: vec![None; self.variable_count + 1],
        };
        solver.search()
    }
}

#[derive(Default)]
struct Encoder {
    next_variable: i32,
    names: HashMap<String, Literal>,
    variables: Vec<String>,
    clauses: Vec<Vec<Literal>>,
}

impl Encoder {
    fn fresh(&mut self) -> Literal {
        self.next_variable += 1;
        self.next_variable
    }

    fn encode(&mut self, formula: &Formula) -> Literal {
        match formula {
            Formula::True => {
                let t = self.fresh();
                self.clauses.push(vec![t]);
                t
            }
            Formula::False => {
                let f = self.fresh();
                self.clauses.push(vec![-f]);
                f
            }
            Formula::Var(name) => {
                if let Some(&literal) = self.names.get(name) {
                    return literal;
                }
                let literal = self.fresh();
                self.names.insert(name.clone(), literal);
                self.variables.push(name.clone());
                literal
            }
            Formula::Not(inner) => -self.encode(inner),
            Formula::And(operands) => {
                let literals: Vec<Literal> = operands.iter().map(|op| self.encode(op)).collect();
                let gate = self.fresh();
                // gate -> each operand
                for &literal in &literals {
                    self.clauses.push(vec![-gate, literal]);
                }
                // all operands -> gate
                let mut clause: Vec<Literal> = literals.iter().map(|l| -l).collect();
                clause.push(gate);
                self.clauses.push(clause);
                gate
            }
            Formula::Or(operands) => {
                let literals: Vec<Literal> = operands.iter().map(|op| self.encode(op)).collect();
                let gate = self.fresh();
                // each operand -> gate
                for &literal in &literals {
                    self.clauses.push(vec![gate, -literal]);
                }
                // gate -> some operand
                let mut clause = literals;
                clause.push(-gate);
                self.clauses.push(clause);
                gate
            }
        }
    }
}

struct Solver<'a> {
    clauses: &'a [Vec<Literal>],
    assignment: Vec<Option<bool>>,
}

impl Solver<'_> {
    fn value(&self, literal: Literal) -> Option<bool> {
        let value = self.assignment[literal.unsigned_abs() as usize]?;
        Some(if literal > 0 { value } else { !value })
    }

    fn assign(&mut self, literal: Literal, trail: &mut Vec<usize>) {
        let index = literal.unsigned_abs() as usize;
        self.assignment[index] = Some(literal > 0);
        trail.push(index);
    }

    fn undo(&mut self, trail: &[usize]) {
        for &index in trail {
            self.assignment[index] = None;
        }
    }

    /// Unit propagation to a fixpoint. Returns false on conflict.
    fn propagate(&mut self, trail: &mut Vec<usize>) -> bool {
        loop {
            let mut changed = false;
            for clause in self.clauses {
                let mut unassigned = None;
                let mut unassigned_count = 0;
                let mut satisfied = false;
                for &literal in clause {
                    match self.value(literal) {
                        Some(true) => {
                            satisfied = true;
                            break;
                        }
                        Some(false) => {}
                        None => {
                            unassigned_count += 1;
                            unassigned = Some(literal);
                        }
                    }
                }
                if satisfied {
                    continue;
                }
                match (unassigned_count, unassigned) {
                    (0, _) => return false,
                    (1, Some(literal)) => {
                        self.assign(literal, trail);
                        changed = true;
                    }
                    _ => {}
                }
            }
            if !changed {
                return true;
            }
        }
    }

    /// First unassigned literal of some clause that is not yet satisfied.
    fn branch_literal(&self) -> Option<Literal> {
        self.clauses
            .iter()
            .filter(|clause| !clause.iter().any(|&l| self.value(l) == Some(true)))
            .flat_map(|clause| clause.iter())
            .copied()
            .find(|&l| self.value(l).is_none())
    }

    fn search(&mut self) -> bool {
        let mut trail = Vec::new();
        if !self.propagate(&mut trail) {
            self.undo(&trail);
            return false;
        }
        let Some(literal) = self.branch_literal() else {
            return true;
        };
        for choice in [literal, -literal] {
            let mut decision = Vec::new();
            self.assign(choice, &mut decision);
            if self.search() {
                return true;
            }
            self.undo(&decision);
        }
        self.undo(&trail);
        false
    }
}

/// Whether some assignment satisfies `formula`.
pub fn is_satisfiable(formula: &Formula) -> bool {
    match formula {
        Formula::True => true,
        Formula::False => false,
        _ => Cnf::tseytin(formula).is_satisfiable(),
    }
}

/// Whether every assignment satisfies `formula`.
pub fn is_tautology(formula: &Formula) -> bool {
    !is_satisfiable(&not(formula.clone()))
}

/// Whether `left` and `right` agree under every assignment.
pub fn equivalent(left: &Formula, right: &Formula) -> bool {
    let differ = or([
        and([left.clone(), not(right.clone())]),
        and([not(left.clone()), right.clone()]),
    ]);
    !is_satisfiable(&differ)
}
