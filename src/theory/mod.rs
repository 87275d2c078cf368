//! Solver-agnostic theory expressions over linear arithmetic.
//!
//! Terms are plain values with structural equality; nothing in here talks to
//! a solver. The [`solver`] module defines the narrow solver contract and
//! [`z3`] implements it.

pub mod parser;
pub mod solver;
pub mod z3;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use solver::Value;

/// Marker prefix on a variable name denoting one step of temporal lookback.
/// `k` repetitions denote the value the plain variable held `k` macro-steps
/// in the past.
pub const FETCH_PREFIX: &str = "FETCH_";

/// The closed set of variable types supported by the background theory.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarType {
    Int,
    Real,
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarType::Int => write!(f, "Int"),
            VarType::Real => write!(f, "Real"),
        }
    }
}

/// A theory expression.
///
/// Comparisons and connectives carry their operands boxed; `And`/`Or` are
/// n-ary like the solver's own representation. Quantifiers over an empty
/// variable list are the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Var(String, VarType),
    Int(i64),
    /// Rational constant as numerator/denominator.
    Real(i64, i64),
    Add(Box<Term>, Box<Term>),
    Sub(Box<Term>, Box<Term>),
    Mul(Box<Term>, Box<Term>),
    Neg(Box<Term>),
    Lt(Box<Term>, Box<Term>),
    Le(Box<Term>, Box<Term>),
    Gt(Box<Term>, Box<Term>),
    Ge(Box<Term>, Box<Term>),
    Eq(Box<Term>, Box<Term>),
    Not(Box<Term>),
    And(Vec<Term>),
    Or(Vec<Term>),
    Implies(Box<Term>, Box<Term>),
    Forall(Vec<(String, VarType)>, Box<Term>),
    Exists(Vec<(String, VarType)>, Box<Term>),
    True,
    False,
}

impl Term {
    pub fn var(name: impl Into<String>, ty: VarType) -> Self {
        Term::Var(name.into(), ty)
    }

    pub fn int(value: i64) -> Self {
        Term::Int(value)
    }

    pub fn lt(self, other: Term) -> Self {
        Term::Lt(Box::new(self), Box::new(other))
    }

    pub fn le(self, other: Term) -> Self {
        Term::Le(Box::new(self), Box::new(other))
    }

    pub fn add(self, other: Term) -> Self {
        Term::Add(Box::new(self), Box::new(other))
    }

    pub fn sub(self, other: Term) -> Self {
        Term::Sub(Box::new(self), Box::new(other))
    }

    pub fn negated(self) -> Self {
        Term::Not(Box::new(self))
    }

    pub fn implies(self, other: Term) -> Self {
        Term::Implies(Box::new(self), Box::new(other))
    }

    /// Conjunction without redundant nesting.
    pub fn and(terms: Vec<Term>) -> Self {
        match terms.len() {
            0 => Term::True,
            1 => terms.into_iter().next().unwrap(),
            _ => Term::And(terms),
        }
    }

    /// Universal closure; identity for an empty variable list.
    pub fn forall(vars: Vec<(String, VarType)>, body: Term) -> Self {
        if vars.is_empty() {
            body
        } else {
            Term::Forall(vars, Box::new(body))
        }
    }

    /// Existential closure; identity for an empty variable list.
    pub fn exists(vars: Vec<(String, VarType)>, body: Term) -> Self {
        if vars.is_empty() {
            body
        } else {
            Term::Exists(vars, Box::new(body))
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Term::True)
    }

    /// Free variables in first-occurrence order, without duplicates.
    pub fn vars(&self) -> Vec<(String, VarType)> {
        let mut out = Vec::new();
        self.collect_vars(&mut Vec::new(), &mut out);
        out
    }

    fn collect_vars(&self, bound: &mut Vec<String>, out: &mut Vec<(String, VarType)>) {
        match self {
            Term::Var(name, ty) => {
                if !bound.iter().any(|b| b == name) && !out.iter().any(|(n, _)| n == name) {
                    out.push((name.clone(), *ty));
                }
            }
            Term::Int(_) | Term::Real(_, _) | Term::True | Term::False => {}
            Term::Add(a, b)
            | Term::Sub(a, b)
            | Term::Mul(a, b)
            | Term::Lt(a, b)
            | Term::Le(a, b)
            | Term::Gt(a, b)
            | Term::Ge(a, b)
            | Term::Eq(a, b)
            | Term::Implies(a, b) => {
                a.collect_vars(bound, out);
                b.collect_vars(bound, out);
            }
            Term::Neg(a) | Term::Not(a) => a.collect_vars(bound, out),
            Term::And(ts) | Term::Or(ts) => {
                for t in ts {
                    t.collect_vars(bound, out);
                }
            }
            Term::Forall(vs, body) | Term::Exists(vs, body) => {
                let n = bound.len();
                bound.extend(vs.iter().map(|(name, _)| name.clone()));
                body.collect_vars(bound, out);
                bound.truncate(n);
            }
        }
    }

    /// Rename every free variable with `rename`, keeping its type.
    pub fn rename_vars<F: Fn(&str) -> String>(&self, rename: &F) -> Term {
        self.map_vars(&|name, ty| Term::Var(rename(name), ty))
    }

    /// Replace every free variable by `map(name, type)`.
    pub fn map_vars<F: Fn(&str, VarType) -> Term>(&self, map: &F) -> Term {
        match self {
            Term::Var(name, ty) => map(name, *ty),
            Term::Int(_) | Term::Real(_, _) | Term::True | Term::False => self.clone(),
            Term::Add(a, b) => Term::Add(Box::new(a.map_vars(map)), Box::new(b.map_vars(map))),
            Term::Sub(a, b) => Term::Sub(Box::new(a.map_vars(map)), Box::new(b.map_vars(map))),
            Term::Mul(a, b) => Term::Mul(Box::new(a.map_vars(map)), Box::new(b.map_vars(map))),
            Term::Neg(a) => Term::Neg(Box::new(a.map_vars(map))),
            Term::Lt(a, b) => Term::Lt(Box::new(a.map_vars(map)), Box::new(b.map_vars(map))),
            Term::Le(a, b) => Term::Le(Box::new(a.map_vars(map)), Box::new(b.map_vars(map))),
            Term::Gt(a, b) => Term::Gt(Box::new(a.map_vars(map)), Box::new(b.map_vars(map))),
            Term::Ge(a, b) => Term::Ge(Box::new(a.map_vars(map)), Box::new(b.map_vars(map))),
            Term::Eq(a, b) => Term::Eq(Box::new(a.map_vars(map)), Box::new(b.map_vars(map))),
            Term::Not(a) => Term::Not(Box::new(a.map_vars(map))),
            Term::And(ts) => Term::And(ts.iter().map(|t| t.map_vars(map)).collect()),
            Term::Or(ts) => Term::Or(ts.iter().map(|t| t.map_vars(map)).collect()),
            Term::Implies(a, b) => {
                Term::Implies(Box::new(a.map_vars(map)), Box::new(b.map_vars(map)))
            }
            Term::Forall(vs, body) => Term::Forall(vs.clone(), Box::new(body.map_vars(map))),
            Term::Exists(vs, body) => Term::Exists(vs.clone(), Box::new(body.map_vars(map))),
        }
    }

    /// Maximum lookback depth over the free variables; 0 for constants.
    pub fn fetch_depth(&self) -> usize {
        self.vars()
            .iter()
            .map(|(name, _)| name_fetch_depth(name))
            .max()
            .unwrap_or(0)
    }

    /// Shift the whole expression one step into the past by adding one
    /// lookback prefix to every free variable.
    pub fn fetched(&self) -> Term {
        self.rename_vars(&|name| format!("{}{}", FETCH_PREFIX, name))
    }

    /// Remove one lookback prefix from every free variable. Variables
    /// without a prefix are left unchanged.
    pub fn unfetched(&self) -> Term {
        self.rename_vars(&|name| {
            name.strip_prefix(FETCH_PREFIX)
                .map_or_else(|| name.to_string(), str::to_string)
        })
    }

    /// Substitute typed values for variables; unbound variables stay free.
    ///
    /// # Errors
    ///
    /// Fails if a value's type does not match the variable declaration.
    pub fn substitute(&self, bindings: &crate::theory::solver::Assignment) -> Result<Term> {
        let mut mismatch = None;
        let result = self.map_vars(&|name, ty| match bindings.get(name) {
            Some(value) => match (value, ty) {
                (Value::Int(v), VarType::Int) => Term::Int(*v),
                (Value::Real(n, d), VarType::Real) => Term::Real(*n, *d),
                (Value::Int(v), VarType::Real) => Term::Real(*v, 1),
                (Value::Real(_, _), VarType::Int) => {
                    // reported after the walk; the placeholder is unused
                    Term::Var(name.to_string(), ty)
                }
            },
            None => Term::Var(name.to_string(), ty),
        });
        for (name, value) in bindings.iter() {
            if matches!(value, Value::Real(_, _)) {
                if let Some((_, VarType::Int)) = self.vars().iter().find(|(n, _)| n == name) {
                    mismatch = Some(name.clone());
                }
            }
        }
        match mismatch {
            Some(name) => Err(Error::TypeMismatch {
                name,
                expected: VarType::Int.to_string(),
            }),
            None => Ok(result),
        }
    }
}

/// Number of lookback prefixes on a variable name.
pub fn name_fetch_depth(name: &str) -> usize {
    let mut rest = name;
    let mut depth = 0;
    while let Some(stripped) = rest.strip_prefix(FETCH_PREFIX) {
        depth += 1;
        rest = stripped;
    }
    depth
}

/// Variable name with all lookback prefixes removed.
pub fn base_name(name: &str) -> &str {
    let mut rest = name;
    while let Some(stripped) = rest.strip_prefix(FETCH_PREFIX) {
        rest = stripped;
    }
    rest
}

/// Whether the name carries at least one lookback prefix.
pub fn is_fetched(name: &str) -> bool {
    name.starts_with(FETCH_PREFIX)
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Var(name, _) => write!(f, "{}", name),
            Term::Int(v) => write!(f, "{}", v),
            Term::Real(n, d) => {
                if *d == 1 {
                    write!(f, "{}", n)
                } else {
                    write!(f, "{}/{}", n, d)
                }
            }
            Term::Add(a, b) => write!(f, "({} + {})", a, b),
            Term::Sub(a, b) => write!(f, "({} - {})", a, b),
            Term::Mul(a, b) => write!(f, "({} * {})", a, b),
            Term::Neg(a) => write!(f, "(-{})", a),
            Term::Lt(a, b) => write!(f, "{} < {}", a, b),
            Term::Le(a, b) => write!(f, "{} <= {}", a, b),
            Term::Gt(a, b) => write!(f, "{} > {}", a, b),
            Term::Ge(a, b) => write!(f, "{} >= {}", a, b),
            Term::Eq(a, b) => write!(f, "{} = {}", a, b),
            Term::Not(a) => write!(f, "!({})", a),
            Term::And(ts) => {
                let parts: Vec<_> = ts.iter().map(|t| format!("({})", t)).collect();
                write!(f, "{}", parts.join(" & "))
            }
            Term::Or(ts) => {
                let parts: Vec<_> = ts.iter().map(|t| format!("({})", t)).collect();
                write!(f, "{}", parts.join(" | "))
            }
            Term::Implies(a, b) => write!(f, "(({}) -> ({}))", a, b),
            Term::Forall(vs, body) => {
                let names: Vec<_> = vs.iter().map(|(n, _)| n.as_str()).collect();
                write!(f, "forall {}. ({})", names.join(", "), body)
            }
            Term::Exists(vs, body) => {
                let names: Vec<_> = vs.iter().map(|(n, _)| n.as_str()).collect();
                write!(f, "exists {}. ({})", names.join(", "), body)
            }
            Term::True => write!(f, "true"),
            Term::False => write!(f, "false"),
        }
    }
}
