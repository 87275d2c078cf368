//! Predicate abstraction state: the literal table and the accumulated
//! assumptions, guarantees and history-bridging facts.

use std::collections::HashMap;
use std::fmt;

use log::debug;

use crate::error::{Error, Result};
use crate::formula::Formula;
use crate::spec::{VarDecl, VarOwner};
use crate::theory::solver::TheorySolver;
use crate::theory::Term;

/// Which player owns a literal. A literal is system-owned iff its atom
/// mentions at least one system variable; lookback-prefixed copies of
/// system variables count as environment knowledge.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LitOwner {
    Env,
    Sys,
}

impl fmt::Display for LitOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LitOwner::Env => write!(f, "env"),
            LitOwner::Sys => write!(f, "sys"),
        }
    }
}

/// One entry of the literal table.
#[derive(Debug, Clone)]
pub struct LiteralEntry {
    pub id: String,
    pub atom: Term,
    pub owner: LitOwner,
}

/// Insertion-ordered table mapping literal ids (`l0`, `l1`, ...) to theory
/// atoms. No two entries hold structurally equal atoms.
#[derive(Debug, Clone, Default)]
pub struct LiteralTable {
    entries: Vec<LiteralEntry>,
}

impl LiteralTable {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LiteralEntry> {
        self.entries.iter()
    }

    /// The literal id of a structurally equal atom, if present.
    pub fn lookup(&self, atom: &Term) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| &entry.atom == atom)
            .map(|entry| entry.id.as_str())
    }

    pub fn get(&self, id: &str) -> Option<&LiteralEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    fn insert(&mut self, atom: Term, owner: LitOwner) -> String {
        let id = format!("l{}", self.entries.len());
        self.entries.push(LiteralEntry {
            id: id.clone(),
            atom,
            owner,
        });
        id
    }
}

/// Owner of the abstraction for one synthesis run.
///
/// Mutated only through literal creation and the `add_*` operations during
/// refinement; never shared across runs.
pub struct Booleanizer {
    sys_vars: Vec<String>,
    littable: LiteralTable,
    guarantees: Vec<Formula>,
    assumptions: Vec<Formula>,
    fetch_tautos: Vec<Formula>,
    bool_tautos: Vec<Formula>,
    formula: Option<Formula>,
}

impl Booleanizer {
    pub fn new(variables: &[VarDecl]) -> Self {
        Self {
            sys_vars: variables
                .iter()
                .filter(|v| v.owner == VarOwner::System)
                .map(|v| v.name.clone())
                .collect(),
            littable: LiteralTable::default(),
            guarantees: Vec::new(),
            assumptions: Vec::new(),
            fetch_tautos: Vec::new(),
            bool_tautos: Vec::new(),
            formula: None,
        }
    }

    pub fn is_sys_var(&self, name: &str) -> bool {
        self.sys_vars.iter().any(|v| v == name)
    }

    pub fn contains_sys_vars(&self, term: &Term) -> bool {
        term.vars().iter().any(|(name, _)| self.is_sys_var(name))
    }

    pub fn literal_table(&self) -> &LiteralTable {
        &self.littable
    }

    /// Literal id for the atom, minting a fresh one on first sight.
    ///
    /// # Errors
    ///
    /// A theory constant must never reach the literal table.
    pub fn get_or_create_literal(&mut self, atom: &Term) -> Result<Formula> {
        if matches!(atom, Term::True | Term::False) {
            return Err(Error::InvalidFormula(
                "theory constant reaching the literal table".into(),
            ));
        }
        if let Some(id) = self.littable.lookup(atom) {
            return Ok(Formula::sym(id));
        }
        let owner = if self.contains_sys_vars(atom) {
            LitOwner::Sys
        } else {
            LitOwner::Env
        };
        let id = self.littable.insert(atom.clone(), owner);
        debug!("new literal {} ({}): {}", id, owner, atom);
        Ok(Formula::sym(id))
    }

    /// Replace every theory atom by its literal.
    ///
    /// # Errors
    ///
    /// A non-constant symbol in the input means the formula was already
    /// abstracted, which is a broken invariant.
    pub fn boolize(&mut self, formula: &Formula) -> Result<Formula> {
        match formula {
            Formula::Sym(_) if formula.is_constant() => Ok(formula.clone()),
            Formula::Sym(name) => Err(Error::InvalidFormula(format!(
                "bool symbol '{}' in full expression",
                name
            ))),
            Formula::Atom(term) => self.get_or_create_literal(term),
            Formula::Not(a) => Ok(self.boolize(a)?.neg()),
            Formula::And(a, b) => Ok(self.boolize(a)?.and(self.boolize(b)?)),
            Formula::Or(a, b) => Ok(self.boolize(a)?.or(self.boolize(b)?)),
            Formula::Next(a) => Ok(self.boolize(a)?.next()),
            Formula::Globally(a) => Ok(self.boolize(a)?.globally()),
            Formula::Until(a, b) => Ok(self.boolize(a)?.until(self.boolize(b)?)),
            Formula::Implies(a, b) => Ok(self.boolize(a)?.implies(self.boolize(b)?)),
            Formula::Iff(a, b) => Ok(self.boolize(a)?.iff(self.boolize(b)?)),
        }
    }

    /// Set the abstracted target specification.
    pub fn set_formula(&mut self, formula: &Formula) -> Result<()> {
        let abstracted = self.boolize(formula)?;
        self.formula = Some(abstracted);
        Ok(())
    }

    /// Maximum lookback depth over all literal atoms, including literals
    /// minted after the target formula was set.
    pub fn max_fetch_depth(&self) -> usize {
        self.littable
            .iter()
            .map(|entry| entry.atom.fetch_depth())
            .max()
            .unwrap_or(0)
    }

    fn push_deduplicated(list: &mut Vec<Formula>, formula: Formula) -> bool {
        if list.contains(&formula) {
            false
        } else {
            list.push(formula);
            true
        }
    }

    pub fn add_guarantee(&mut self, formula: &Formula) -> Result<()> {
        let abstracted = self.boolize(formula)?;
        Self::push_deduplicated(&mut self.guarantees, abstracted);
        Ok(())
    }

    pub fn add_assumption(&mut self, formula: &Formula) -> Result<()> {
        let abstracted = self.boolize(formula)?;
        Self::push_deduplicated(&mut self.assumptions, abstracted);
        Ok(())
    }

    /// Add a proven fact to the abstraction.
    ///
    /// The fact is recorded in the refinement knowledge base, checked to be
    /// universally valid (fatal otherwise), and routed to the guarantees
    /// iff it mentions a system variable, else to the assumptions.
    pub fn add_tauto<S: TheorySolver>(&mut self, solver: &S, formula: &Formula) -> Result<()> {
        if formula.is_true() {
            return Ok(());
        }
        let boolized = self.boolize(formula)?;
        self.bool_tautos.push(boolized);
        let term = formula.to_term()?;
        if term.is_true() {
            return Ok(());
        }
        if !solver.is_sat(&Term::forall(term.vars(), term.clone()))? {
            return Err(Error::NotATautology(formula.to_string()));
        }
        if self.contains_sys_vars(&term) {
            self.add_guarantee(&formula.clone().globally())
        } else {
            self.add_assumption(&formula.clone().globally())
        }
    }

    /// Whether the history-bridging fact for this atom already exists.
    pub fn tauto_exists(&self, atom: &Term) -> bool {
        let fetched = atom.fetched();
        let lit = match self.littable.lookup(atom) {
            Some(id) => Formula::sym(id),
            None => return false,
        };
        let fetch_lit = match self.littable.lookup(&fetched) {
            Some(id) => Formula::sym(id),
            None => return false,
        };
        let tauto = lit.iff(fetch_lit.next()).globally();
        self.fetch_tautos.contains(&tauto)
    }

    /// Register the bridging fact `G(lit <-> X(fetch_lit))` for the atom,
    /// minting literals as needed. Returns whether the fact was new.
    pub fn create_tmp_assumption_for(&mut self, atom: &Term) -> Result<bool> {
        let fetched = atom.fetched();
        let lit = self.get_or_create_literal(atom)?;
        let fetch_lit = self.get_or_create_literal(&fetched)?;
        let tauto = lit.iff(fetch_lit.next()).globally();
        Ok(Self::push_deduplicated(&mut self.fetch_tautos, tauto))
    }

    /// Atoms of the expression that still lack a history-bridging fact.
    pub fn missing_tautos(&self, term: &Term) -> Result<Vec<Term>> {
        if term.is_true() {
            return Ok(Vec::new());
        }
        let formula = Formula::from_term(term)?;
        Ok(formula
            .literals()?
            .into_iter()
            .filter(|atom| !self.tauto_exists(atom))
            .cloned()
            .collect())
    }

    /// The full Boolean formula handed to the synthesis backend:
    /// `assumptions -> (guarantees & (fetch_tautos -> formula))`, with
    /// empty conjunctions omitted.
    pub fn bool_formula(&self) -> Formula {
        let assumption = Formula::conjoin(&self.assumptions);
        let guarantee = Formula::conjoin(&self.guarantees);
        let fetch_tauto = Formula::conjoin(&self.fetch_tautos);
        let mut formula = self
            .formula
            .clone()
            .expect("target specification must be set before synthesis");
        if let Some(fetch_tauto) = fetch_tauto {
            formula = fetch_tauto.implies(formula);
        }
        if let Some(guarantee) = guarantee {
            formula = guarantee.and(formula);
        }
        if let Some(assumption) = assumption {
            formula = assumption.implies(formula);
        }
        formula
    }

    /// Environment-owned literal ids in creation order.
    pub fn env_literals(&self) -> Vec<String> {
        self.littable
            .iter()
            .filter(|e| e.owner == LitOwner::Env)
            .map(|e| e.id.clone())
            .collect()
    }

    /// System-owned literal ids in creation order.
    pub fn sys_literals(&self) -> Vec<String> {
        self.littable
            .iter()
            .filter(|e| e.owner == LitOwner::Sys)
            .map(|e| e.id.clone())
            .collect()
    }

    /// Literal id to wrapped-atom substitution table.
    pub fn transtab(&self) -> HashMap<String, Formula> {
        self.littable
            .iter()
            .map(|e| (e.id.clone(), Formula::Atom(e.atom.clone())))
            .collect()
    }

    pub fn bool_tautos(&self) -> &[Formula] {
        &self.bool_tautos
    }

    pub fn assumptions(&self) -> &[Formula] {
        &self.assumptions
    }

    pub fn guarantees(&self) -> &[Formula] {
        &self.guarantees
    }

    pub fn fetch_tautos(&self) -> &[Formula] {
        &self.fetch_tautos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theory::z3::Z3Solver;
    use crate::theory::VarType;

    fn decls() -> Vec<VarDecl> {
        vec![
            VarDecl::new("d", VarType::Int, VarOwner::Environment),
            VarDecl::new("a", VarType::Int, VarOwner::Environment),
            VarDecl::new("r", VarType::Int, VarOwner::System),
        ]
    }

    fn d_lt_r() -> Term {
        Term::var("d", VarType::Int).lt(Term::var("r", VarType::Int))
    }

    fn d_lt_a() -> Term {
        Term::var("d", VarType::Int).lt(Term::var("a", VarType::Int))
    }

    #[test]
    fn literals_deduplicate_by_structure() {
        let mut boolizer = Booleanizer::new(&decls());
        let first = boolizer.get_or_create_literal(&d_lt_r()).unwrap();
        let second = boolizer.get_or_create_literal(&d_lt_r()).unwrap();
        assert_eq!(first, second);
        assert_eq!(boolizer.literal_table().len(), 1);
        boolizer.get_or_create_literal(&d_lt_a()).unwrap();
        assert_eq!(boolizer.literal_table().len(), 2);
    }

    #[test]
    fn owner_follows_system_variable_membership() {
        let mut boolizer = Booleanizer::new(&decls());
        boolizer.get_or_create_literal(&d_lt_r()).unwrap();
        boolizer.get_or_create_literal(&d_lt_a()).unwrap();
        // a fetched copy of a system atom is environment knowledge
        boolizer.get_or_create_literal(&d_lt_r().fetched()).unwrap();
        let owners: Vec<_> = boolizer.literal_table().iter().map(|e| e.owner).collect();
        assert_eq!(owners, vec![LitOwner::Sys, LitOwner::Env, LitOwner::Env]);
        assert_eq!(boolizer.sys_literals(), vec!["l0"]);
        assert_eq!(boolizer.env_literals(), vec!["l1", "l2"]);
    }

    #[test]
    fn constants_are_rejected_from_the_literal_table() {
        let mut boolizer = Booleanizer::new(&decls());
        assert!(boolizer.get_or_create_literal(&Term::True).is_err());
    }

    #[test]
    fn boolize_rejects_raw_symbols() {
        let mut boolizer = Booleanizer::new(&decls());
        assert!(boolizer.boolize(&Formula::sym("l7")).is_err());
        assert!(boolizer.boolize(&Formula::tt()).is_ok());
    }

    #[test]
    fn add_tauto_requires_validity() {
        let solver = Z3Solver::new();
        let mut boolizer = Booleanizer::new(&decls());
        // d < d + 1 is valid
        let valid = Formula::atom(
            Term::var("d", VarType::Int).lt(Term::var("d", VarType::Int).add(Term::Int(1))),
        );
        boolizer.add_tauto(&solver, &valid).unwrap();
        // d < a is not
        let invalid = Formula::atom(d_lt_a());
        assert!(matches!(
            boolizer.add_tauto(&solver, &invalid),
            Err(Error::NotATautology(_))
        ));
    }

    #[test]
    fn add_tauto_routes_by_ownership() {
        let solver = Z3Solver::new();
        let mut boolizer = Booleanizer::new(&decls());
        let env_fact = Formula::atom(
            Term::var("d", VarType::Int).lt(Term::var("d", VarType::Int).add(Term::Int(1))),
        );
        let sys_fact = Formula::atom(
            Term::var("r", VarType::Int).lt(Term::var("r", VarType::Int).add(Term::Int(1))),
        );
        boolizer.add_tauto(&solver, &env_fact).unwrap();
        boolizer.add_tauto(&solver, &sys_fact).unwrap();
        assert_eq!(boolizer.assumptions.len(), 1);
        assert_eq!(boolizer.guarantees.len(), 1);
    }

    #[test]
    fn repeated_additions_leave_sets_unchanged() {
        let solver = Z3Solver::new();
        let mut boolizer = Booleanizer::new(&decls());
        let fact = Formula::atom(
            Term::var("d", VarType::Int).lt(Term::var("d", VarType::Int).add(Term::Int(1))),
        );
        boolizer.add_tauto(&solver, &fact).unwrap();
        boolizer.add_tauto(&solver, &fact).unwrap();
        assert_eq!(boolizer.assumptions.len(), 1);

        assert!(boolizer.create_tmp_assumption_for(&d_lt_a()).unwrap());
        assert!(!boolizer.create_tmp_assumption_for(&d_lt_a()).unwrap());
        assert_eq!(boolizer.fetch_tautos.len(), 1);
    }

    #[test]
    fn max_fetch_depth_tracks_every_literal() {
        let mut boolizer = Booleanizer::new(&decls());
        boolizer
            .set_formula(&Formula::atom(d_lt_a()).globally())
            .unwrap();
        assert_eq!(boolizer.max_fetch_depth(), 0);
        boolizer.create_tmp_assumption_for(&d_lt_a()).unwrap();
        assert_eq!(boolizer.max_fetch_depth(), 1);
    }

    #[test]
    fn bool_formula_assembles_the_implication_chain() {
        let solver = Z3Solver::new();
        let mut boolizer = Booleanizer::new(&decls());
        boolizer
            .set_formula(&Formula::atom(d_lt_r()).neg().globally())
            .unwrap();
        assert_eq!(boolizer.bool_formula().to_string(), "G(!(l0))");

        let fact = Formula::atom(
            Term::var("d", VarType::Int).lt(Term::var("d", VarType::Int).add(Term::Int(1))),
        );
        boolizer.add_tauto(&solver, &fact).unwrap();
        let rendered = boolizer.bool_formula().to_string();
        assert!(rendered.starts_with("(G("));
        assert!(rendered.contains("->"));
    }
}
