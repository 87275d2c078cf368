//! Capability contract of the background theory solver.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::theory::Term;

/// A typed value of the background theory.
///
/// Reals are exact rationals so that model values can be substituted back
/// into terms without rounding.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    /// Numerator and denominator.
    Real(i64, i64),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Real(n, d) => write!(f, "{}/{}", n, d),
        }
    }
}

/// A variable assignment, e.g. one step of the runtime stream.
pub type Assignment = HashMap<String, Value>;

/// A model extracted from a satisfiable query.
#[derive(Debug, Clone, Default)]
pub struct Model {
    values: HashMap<String, Value>,
}

impl Model {
    pub fn new(values: HashMap<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.get(name).copied()
    }
}

/// The operations the abstraction needs from a theory solver.
///
/// Quantifier construction and value substitution are plain [`Term`]
/// operations; only satisfiability, quantifier elimination, unsatisfiable
/// cores and model search require the solver itself. Keeping the contract
/// this narrow lets the refinement loop run against a scripted solver in
/// tests.
pub trait TheorySolver {
    /// Whether the closed or partially free term is satisfiable.
    fn is_sat(&self, term: &Term) -> Result<bool>;

    /// Best-effort quantifier elimination; the result is expected to be
    /// quantifier-free for linear arithmetic.
    fn eliminate_quantifiers(&self, term: &Term) -> Result<Term>;

    /// Indices of a minimal subset of `assertions` whose conjunction is
    /// unsatisfiable.
    ///
    /// # Errors
    ///
    /// Fails if the conjunction is satisfiable.
    fn unsat_core(&self, assertions: &[Term]) -> Result<Vec<usize>>;

    /// A model of the term, or `None` if it is unsatisfiable.
    fn model(&self, term: &Term) -> Result<Option<Model>>;

    /// Validity of the universal closure over all free variables.
    fn is_valid_closed(&self, term: &Term) -> Result<bool> {
        self.is_sat(&Term::forall(term.vars(), term.clone()))
    }
}
