//! Formula trees for LTL-over-literals and theory-over-literals formulas.
//!
//! One closed sum type is shared by the whole pipeline: the parsed
//! specification (temporal operators over theory atoms), the abstracted
//! formula handed to the synthesis backend (temporal operators over
//! literals), and the literal-level edge guards of the automaton.

pub mod parser;

use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::theory::Term;

/// Reserved symbol name for constant true.
pub const TRUE_SYM: &str = "t";
/// Reserved symbol name for constant false.
pub const FALSE_SYM: &str = "f";

/// A formula tree.
///
/// `Sym` carries either one of the two reserved constant names or an
/// abstract literal; `Atom` wraps a theory expression and by invariant never
/// the constant true/false (those normalize to `Sym`). The temporal
/// variants only occur in the pre-abstraction specification; surface sugar
/// (`F`, `R`, `W`) is desugared by the parser and never reaches this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Formula {
    Sym(String),
    Atom(Term),
    Not(Box<Formula>),
    And(Box<Formula>, Box<Formula>),
    Or(Box<Formula>, Box<Formula>),
    Next(Box<Formula>),
    Globally(Box<Formula>),
    Until(Box<Formula>, Box<Formula>),
    Implies(Box<Formula>, Box<Formula>),
    Iff(Box<Formula>, Box<Formula>),
}

impl Formula {
    pub fn tt() -> Self {
        Formula::Sym(TRUE_SYM.to_string())
    }

    pub fn ff() -> Self {
        Formula::Sym(FALSE_SYM.to_string())
    }

    pub fn sym(name: impl Into<String>) -> Self {
        Formula::Sym(name.into())
    }

    /// Wrap a theory expression, normalizing the constants.
    pub fn atom(term: Term) -> Self {
        match term {
            Term::True => Formula::tt(),
            Term::False => Formula::ff(),
            other => Formula::Atom(other),
        }
    }

    pub fn neg(self) -> Self {
        Formula::Not(Box::new(self))
    }

    pub fn and(self, other: Formula) -> Self {
        Formula::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Formula) -> Self {
        Formula::Or(Box::new(self), Box::new(other))
    }

    pub fn next(self) -> Self {
        Formula::Next(Box::new(self))
    }

    pub fn globally(self) -> Self {
        Formula::Globally(Box::new(self))
    }

    pub fn until(self, other: Formula) -> Self {
        Formula::Until(Box::new(self), Box::new(other))
    }

    pub fn implies(self, other: Formula) -> Self {
        Formula::Implies(Box::new(self), Box::new(other))
    }

    pub fn iff(self, other: Formula) -> Self {
        Formula::Iff(Box::new(self), Box::new(other))
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Formula::Sym(name) if name == TRUE_SYM)
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Formula::Sym(name) if name == FALSE_SYM)
    }

    pub fn is_constant(&self) -> bool {
        self.is_true() || self.is_false()
    }

    /// Conjunction of a list, or `None` when it is empty.
    pub fn conjoin(formulas: &[Formula]) -> Option<Formula> {
        let mut iter = formulas.iter().cloned();
        let first = iter.next()?;
        Some(iter.fold(first, Formula::and))
    }

    /// All theory atoms of a full-theory formula.
    ///
    /// # Errors
    ///
    /// A non-constant symbol in such a formula is a broken invariant.
    pub fn literals(&self) -> Result<Vec<&Term>> {
        match self {
            Formula::Sym(name) if name == TRUE_SYM || name == FALSE_SYM => Ok(Vec::new()),
            Formula::Sym(name) => Err(Error::InvalidFormula(format!(
                "bool symbol '{}' in full theory expression",
                name
            ))),
            Formula::Atom(term) => Ok(vec![term]),
            Formula::Not(a) | Formula::Next(a) | Formula::Globally(a) => a.literals(),
            Formula::And(a, b)
            | Formula::Or(a, b)
            | Formula::Until(a, b)
            | Formula::Implies(a, b)
            | Formula::Iff(a, b) => {
                let mut out = a.literals()?;
                out.extend(b.literals()?);
                Ok(out)
            }
        }
    }

    /// Substitute literal symbols by the formulas of `table` (typically
    /// literal -> theory atom). Constants stay as they are.
    pub fn replace_literals(&self, table: &HashMap<String, Formula>) -> Result<Formula> {
        match self {
            Formula::Sym(name) if name == TRUE_SYM || name == FALSE_SYM => Ok(self.clone()),
            Formula::Sym(name) => table
                .get(name)
                .cloned()
                .ok_or_else(|| Error::InvalidFormula(format!("unknown literal '{}'", name))),
            Formula::Atom(_) => Err(Error::InvalidFormula(
                "theory element while replacing literals".into(),
            )),
            Formula::Not(a) => Ok(a.replace_literals(table)?.neg()),
            Formula::And(a, b) => Ok(a.replace_literals(table)?.and(b.replace_literals(table)?)),
            Formula::Or(a, b) => Ok(a.replace_literals(table)?.or(b.replace_literals(table)?)),
            Formula::Next(a) => Ok(a.replace_literals(table)?.next()),
            Formula::Globally(a) => Ok(a.replace_literals(table)?.globally()),
            Formula::Until(a, b) => Ok(a.replace_literals(table)?.until(b.replace_literals(table)?)),
            Formula::Implies(a, b) => {
                Ok(a.replace_literals(table)?.implies(b.replace_literals(table)?))
            }
            Formula::Iff(a, b) => Ok(a.replace_literals(table)?.iff(b.replace_literals(table)?)),
        }
    }

    /// Lower a Boolean-connective formula over theory atoms into one theory
    /// expression.
    ///
    /// # Errors
    ///
    /// Temporal operators and non-constant symbols have no theory meaning.
    pub fn to_term(&self) -> Result<Term> {
        match self {
            Formula::Sym(name) if name == TRUE_SYM => Ok(Term::True),
            Formula::Sym(name) if name == FALSE_SYM => Ok(Term::False),
            Formula::Sym(name) => Err(Error::InvalidFormula(format!(
                "non-constant bool symbol '{}' in theory context",
                name
            ))),
            Formula::Atom(term) => match Formula::from_term(term)? {
                Formula::Atom(normalized) => Ok(normalized),
                other => other.to_term(),
            },
            Formula::Not(a) => Ok(a.to_term()?.negated()),
            Formula::And(a, b) => Ok(Term::And(vec![a.to_term()?, b.to_term()?])),
            Formula::Or(a, b) => Ok(Term::Or(vec![a.to_term()?, b.to_term()?])),
            other => Err(Error::InvalidFormula(format!(
                "temporal operator in theory context: {}",
                other
            ))),
        }
    }

    /// Raise a quantifier-free theory expression into a formula whose atoms
    /// are strict `<` comparisons only. The normalization
    /// (`a >= b` to `!(a < b)`, `a = b` to a conjunction of two negated
    /// strict comparisons, and so on) is what makes structurally equal
    /// atoms deduplicate in the literal table.
    pub fn from_term(term: &Term) -> Result<Formula> {
        match term {
            Term::True => Ok(Formula::tt()),
            Term::False => Ok(Formula::ff()),
            Term::And(ts) => fold_connective(ts, Formula::and),
            Term::Or(ts) => fold_connective(ts, Formula::or),
            Term::Not(a) => Ok(Formula::from_term(a)?.neg()),
            Term::Implies(a, b) => {
                Ok(Formula::from_term(a)?.neg().or(Formula::from_term(b)?))
            }
            Term::Lt(a, b) => Ok(Formula::atom(Term::Lt(a.clone(), b.clone()))),
            Term::Gt(a, b) => Ok(Formula::atom(Term::Lt(b.clone(), a.clone()))),
            Term::Ge(a, b) => Ok(Formula::atom(Term::Lt(a.clone(), b.clone())).neg()),
            Term::Le(a, b) => Ok(Formula::atom(Term::Lt(b.clone(), a.clone())).neg()),
            Term::Eq(a, b) => Ok(Formula::atom(Term::Lt(b.clone(), a.clone()))
                .neg()
                .and(Formula::atom(Term::Lt(a.clone(), b.clone())).neg())),
            // quantified leftovers stay opaque atoms
            Term::Forall(_, _) | Term::Exists(_, _) => Ok(Formula::Atom(term.clone())),
            other => Err(Error::UnhandledShape(format!(
                "cannot lift arithmetic term {} into a formula",
                other
            ))),
        }
    }

    /// Whether every history reference is covered by enough `Next`
    /// operators: an atom of fetch depth `k` needs at least `k` enclosing
    /// `Next`s, each of which raises the available budget by exactly one.
    pub fn check_fetch_level(&self) -> bool {
        fn walk(formula: &Formula, level: usize) -> bool {
            match formula {
                Formula::Sym(_) => true,
                Formula::Atom(term) => term.fetch_depth() <= level,
                Formula::Next(a) => walk(a, level + 1),
                Formula::Not(a) | Formula::Globally(a) => walk(a, level),
                Formula::And(a, b)
                | Formula::Or(a, b)
                | Formula::Until(a, b)
                | Formula::Implies(a, b)
                | Formula::Iff(a, b) => walk(a, level) && walk(b, level),
            }
        }
        walk(self, 0)
    }
}

fn fold_connective<F>(terms: &[Term], combine: F) -> Result<Formula>
where
    F: Fn(Formula, Formula) -> Formula,
{
    let mut iter = terms.iter();
    let first = iter
        .next()
        .ok_or_else(|| Error::UnhandledShape("empty connective".into()))?;
    iter.try_fold(Formula::from_term(first)?, |acc, t| {
        Ok(combine(acc, Formula::from_term(t)?))
    })
}

impl fmt::Display for Formula {
    /// The surface syntax consumed by the synthesis backend. Theory atoms
    /// only show up when printing pre-abstraction formulas for diagnostics.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::Sym(name) => write!(f, "{}", name),
            Formula::Atom(term) => write!(f, "[{}]", term),
            Formula::Not(a) => write!(f, "!({})", a),
            Formula::Next(a) => write!(f, "X({})", a),
            Formula::Globally(a) => write!(f, "G({})", a),
            Formula::And(a, b) => write!(f, "({} & {})", a, b),
            Formula::Or(a, b) => write!(f, "({} | {})", a, b),
            Formula::Until(a, b) => write!(f, "({} U {})", a, b),
            Formula::Implies(a, b) => write!(f, "({} -> {})", a, b),
            Formula::Iff(a, b) => write!(f, "({} <-> {})", a, b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theory::VarType;

    fn atom(t: Term) -> Formula {
        Formula::atom(t)
    }

    fn d() -> Term {
        Term::var("d", VarType::Int)
    }

    fn r() -> Term {
        Term::var("r", VarType::Int)
    }

    #[test]
    fn normalization_uses_strict_comparisons_only() {
        // r <= d becomes !(d < r)
        let f = Formula::from_term(&r().le(d())).unwrap();
        assert_eq!(f, atom(d().lt(r())).neg());
        // r = d becomes !(d < r) & !(r < d)
        let f = Formula::from_term(&Term::Eq(Box::new(r()), Box::new(d()))).unwrap();
        assert_eq!(
            f,
            atom(d().lt(r())).neg().and(atom(r().lt(d())).neg())
        );
    }

    #[test]
    fn constants_never_become_atoms() {
        assert_eq!(Formula::from_term(&Term::True).unwrap(), Formula::tt());
        assert_eq!(Formula::atom(Term::False), Formula::ff());
    }

    #[test]
    fn to_term_rejects_raw_symbols_and_temporal_operators() {
        assert!(Formula::sym("l0").to_term().is_err());
        assert!(atom(d().lt(r())).globally().to_term().is_err());
        assert!(Formula::tt().to_term().is_ok());
    }

    #[test]
    fn literals_collects_atoms_and_rejects_symbols() {
        let f = atom(d().lt(r())).neg().and(atom(r().lt(d())));
        let lits = f.literals().unwrap();
        assert_eq!(lits.len(), 2);
        assert!(Formula::sym("l0").and(atom(d().lt(r()))).literals().is_err());
    }

    #[test]
    fn next_raises_the_fetch_budget_by_exactly_one() {
        let once = Term::var("FETCH_d", VarType::Int).lt(d());
        assert!(!atom(once.clone()).check_fetch_level());
        assert!(atom(once.clone()).next().check_fetch_level());
        let twice = Term::var("FETCH_FETCH_d", VarType::Int).lt(d());
        assert!(!atom(twice.clone()).next().check_fetch_level());
        assert!(atom(twice).next().next().check_fetch_level());
        assert!(atom(once).next().globally().check_fetch_level());
    }

    #[test]
    fn display_matches_backend_surface_syntax() {
        let f = Formula::sym("l0")
            .neg()
            .and(Formula::sym("l1"))
            .globally();
        assert_eq!(f.to_string(), "G((!(l0) & l1))");
    }
}
