//! Fact minimization for abstraction refinement.
//!
//! A fact learned from an inconsistent edge is first reduced to a single
//! clause that is genuinely new relative to the accumulated knowledge base
//! (propositional reasoning over literal names, done with a SAT solver),
//! then shrunk to the disjunction of the negated atoms of a theory-level
//! unsatisfiable core.

use std::collections::HashMap;

use log::debug;
use varisat::{ExtendFormula, Lit, Solver as SatSolver};

use crate::abstraction::Booleanizer;
use crate::error::{Error, Result};
use crate::formula::{Formula, FALSE_SYM, TRUE_SYM};
use crate::theory::solver::TheorySolver;
use crate::theory::Term;

/// Minimize a theory-level fact against the knowledge base.
///
/// Returns `None` when the knowledge base already implies every clause of
/// the fact; the caller decides whether that is tolerable for the current
/// round.
pub fn refine<S: TheorySolver>(
    boolizer: &mut Booleanizer,
    solver: &S,
    fact: &Formula,
) -> Result<Option<Formula>> {
    let boolized = boolizer.boolize(fact)?;
    let flat = eliminate_implications(&boolized)?;
    let knowledge = boolizer.bool_tautos().to_vec();
    let clause = find_new_clause(&flat, &mut |candidate| {
        is_new_knowledge(&knowledge, candidate)
    })?;
    let clause = match clause {
        Some(clause) => clause,
        None => return Ok(None),
    };
    debug!("new clause: {}", clause);
    let theory_clause = clause.replace_literals(&boolizer.transtab())?;
    Ok(Some(sat_core(solver, &theory_clause)?))
}

/// Rewrite `->` and `<->` into `! & |`; the input is a flat propositional
/// formula over literal symbols.
pub fn eliminate_implications(formula: &Formula) -> Result<Formula> {
    match formula {
        Formula::Sym(_) => Ok(formula.clone()),
        Formula::Not(a) => Ok(eliminate_implications(a)?.neg()),
        Formula::And(a, b) => {
            Ok(eliminate_implications(a)?.and(eliminate_implications(b)?))
        }
        Formula::Or(a, b) => Ok(eliminate_implications(a)?.or(eliminate_implications(b)?)),
        Formula::Implies(a, b) => {
            Ok(eliminate_implications(a)?.neg().or(eliminate_implications(b)?))
        }
        Formula::Iff(a, b) => {
            let a = eliminate_implications(a)?;
            let b = eliminate_implications(b)?;
            Ok((a.clone().neg().or(b.clone())).and(b.neg().or(a)))
        }
        other => Err(Error::InvalidFormula(format!(
            "non-propositional operator in refinement: {}",
            other
        ))),
    }
}

fn flatten_or(formula: &Formula) -> Vec<&Formula> {
    match formula {
        Formula::Or(a, b) => {
            let mut out = flatten_or(a);
            out.extend(flatten_or(b));
            out
        }
        other => vec![other],
    }
}

fn flatten_and(formula: &Formula) -> Vec<&Formula> {
    match formula {
        Formula::And(a, b) => {
            let mut out = flatten_and(a);
            out.extend(flatten_and(b));
            out
        }
        other => vec![other],
    }
}

fn disjoin(formulas: Vec<Formula>) -> Formula {
    let mut iter = formulas.into_iter();
    let first = iter.next().expect("disjunction of at least one formula");
    iter.fold(first, Formula::or)
}

/// Stream the clauses obtained by distributing disjunctions over
/// conjunctions and return the first one accepted by `pred`.
fn find_new_clause<P>(formula: &Formula, pred: &mut P) -> Result<Option<Formula>>
where
    P: FnMut(&Formula) -> Result<bool>,
{
    match formula {
        Formula::Or(_, _) => {
            let args = flatten_or(formula);
            let conj_pos = args.iter().position(|a| matches!(a, Formula::And(_, _)));
            match conj_pos {
                None => {
                    if pred(formula)? {
                        Ok(Some(formula.clone()))
                    } else {
                        Ok(None)
                    }
                }
                Some(pos) => {
                    let rest: Vec<Formula> = args
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| *i != pos)
                        .map(|(_, a)| (*a).clone())
                        .collect();
                    for conjunct in flatten_and(args[pos]) {
                        let mut parts = vec![conjunct.clone()];
                        parts.extend(rest.iter().cloned());
                        let shifted = disjoin(parts);
                        if let Some(found) = find_new_clause(&shifted, pred)? {
                            return Ok(Some(found));
                        }
                    }
                    Ok(None)
                }
            }
        }
        Formula::And(_, _) => {
            for conjunct in flatten_and(formula) {
                if let Some(found) = find_new_clause(conjunct, pred)? {
                    return Ok(Some(found));
                }
            }
            Ok(None)
        }
        other => {
            if pred(other)? {
                Ok(Some(other.clone()))
            } else {
                Ok(None)
            }
        }
    }
}

/// Whether `!candidate & knowledge` is satisfiable, i.e. the knowledge base
/// does not already imply the candidate.
pub fn is_new_knowledge(knowledge: &[Formula], candidate: &Formula) -> Result<bool> {
    let mut solver = SatSolver::new();
    let mut encoder = Tseitin::new();
    for fact in knowledge {
        let lit = encoder.encode(&mut solver, fact)?;
        solver.add_clause(&[lit]);
    }
    let lit = encoder.encode(&mut solver, candidate)?;
    solver.add_clause(&[!lit]);
    solver
        .solve()
        .map_err(|e| Error::SolverUnknown(format!("sat solver: {}", e)))
}

/// Tseitin encoding of literal-level formulas into CNF.
struct Tseitin {
    symbols: HashMap<String, Lit>,
    constant_true: Option<Lit>,
}

impl Tseitin {
    fn new() -> Self {
        Self {
            symbols: HashMap::new(),
            constant_true: None,
        }
    }

    fn symbol(&mut self, solver: &mut SatSolver, name: &str) -> Lit {
        *self
            .symbols
            .entry(name.to_string())
            .or_insert_with(|| solver.new_lit())
    }

    fn constant(&mut self, solver: &mut SatSolver) -> Lit {
        match self.constant_true {
            Some(lit) => lit,
            None => {
                let lit = solver.new_lit();
                solver.add_clause(&[lit]);
                self.constant_true = Some(lit);
                lit
            }
        }
    }

    fn encode(&mut self, solver: &mut SatSolver, formula: &Formula) -> Result<Lit> {
        match formula {
            Formula::Sym(name) if name == TRUE_SYM => Ok(self.constant(solver)),
            Formula::Sym(name) if name == FALSE_SYM => Ok(!self.constant(solver)),
            Formula::Sym(name) => Ok(self.symbol(solver, name)),
            Formula::Not(a) => Ok(!self.encode(solver, a)?),
            Formula::And(a, b) => {
                let la = self.encode(solver, a)?;
                let lb = self.encode(solver, b)?;
                let gate = solver.new_lit();
                solver.add_clause(&[!gate, la]);
                solver.add_clause(&[!gate, lb]);
                solver.add_clause(&[gate, !la, !lb]);
                Ok(gate)
            }
            Formula::Or(a, b) => {
                let la = self.encode(solver, a)?;
                let lb = self.encode(solver, b)?;
                let gate = solver.new_lit();
                solver.add_clause(&[!gate, la, lb]);
                solver.add_clause(&[gate, !la]);
                solver.add_clause(&[gate, !lb]);
                Ok(gate)
            }
            Formula::Implies(a, b) => {
                let rewritten = a.clone().neg().or(b.as_ref().clone());
                self.encode(solver, &rewritten)
            }
            Formula::Iff(a, b) => {
                let la = self.encode(solver, a)?;
                let lb = self.encode(solver, b)?;
                let gate = solver.new_lit();
                solver.add_clause(&[!gate, !la, lb]);
                solver.add_clause(&[!gate, la, !lb]);
                solver.add_clause(&[gate, la, lb]);
                solver.add_clause(&[gate, !la, !lb]);
                Ok(gate)
            }
            other => Err(Error::InvalidFormula(format!(
                "non-propositional operator in sat encoding: {}",
                other
            ))),
        }
    }
}

/// Shrink a valid clause over theory atoms to the disjunction of the
/// negated atoms of a minimal unsatisfiable core.
fn sat_core<S: TheorySolver>(solver: &S, clause: &Formula) -> Result<Formula> {
    let disjuncts: Vec<&Formula> = flatten_or(clause);
    let assertions = disjuncts
        .iter()
        .map(|disjunct| match disjunct {
            Formula::Not(inner) => inner.to_term(),
            other => (*other).clone().neg().to_term(),
        })
        .collect::<Result<Vec<Term>>>()?;
    let core = solver.unsat_core(&assertions)?;
    if core.is_empty() {
        return Err(Error::UnhandledShape("empty unsatisfiable core".into()));
    }
    let kept: Vec<Formula> = disjuncts
        .iter()
        .enumerate()
        .filter(|(i, _)| core.contains(i))
        .map(|(_, d)| (*d).clone())
        .collect();
    Ok(disjoin(kept))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{VarDecl, VarOwner};
    use crate::theory::z3::Z3Solver;
    use crate::theory::VarType;

    fn sym(name: &str) -> Formula {
        Formula::sym(name)
    }

    #[test]
    fn distribution_yields_clauses_in_order() {
        // a | (b & c) distributes into two clauses, the shifted conjunct
        // leading each rebuilt disjunction
        let formula = sym("a").or(sym("b").and(sym("c")));
        let mut seen = Vec::new();
        let found = find_new_clause(&formula, &mut |clause| {
            seen.push(clause.to_string());
            Ok(false)
        })
        .unwrap();
        assert!(found.is_none());
        assert_eq!(seen, vec!["(b | a)", "(c | a)"]);
    }

    #[test]
    fn plain_clause_is_streamed_as_is() {
        let clause = sym("a").neg().or(sym("b"));
        let found = find_new_clause(&clause, &mut |_| Ok(true)).unwrap();
        assert_eq!(found, Some(clause));
    }

    #[test]
    fn new_knowledge_is_relative_to_the_base() {
        let knowledge = vec![sym("a")];
        // the base implies a, so a is not new
        assert!(!is_new_knowledge(&knowledge, &sym("a")).unwrap());
        // b is unconstrained
        assert!(is_new_knowledge(&knowledge, &sym("b")).unwrap());
        // a | b is implied by a
        assert!(!is_new_knowledge(&knowledge, &sym("a").or(sym("b"))).unwrap());
    }

    #[test]
    fn constants_encode_correctly() {
        assert!(!is_new_knowledge(&[], &Formula::tt()).unwrap());
        assert!(is_new_knowledge(&[], &Formula::ff()).unwrap());
    }

    fn booleanizer() -> Booleanizer {
        Booleanizer::new(&[
            VarDecl::new("d", VarType::Int, VarOwner::Environment),
            VarDecl::new("r", VarType::Int, VarOwner::System),
        ])
    }

    fn d() -> Term {
        Term::var("d", VarType::Int)
    }

    fn r() -> Term {
        Term::var("r", VarType::Int)
    }

    #[test]
    fn refine_returns_a_minimal_fact() {
        let solver = Z3Solver::new();
        let mut boolizer = booleanizer();
        // d < r and r < d cannot hold together; the fact arrives as the
        // valid clause !(d < r) | !(r < d) | !(d < 0) where the third
        // disjunct is irrelevant to the conflict
        let fact = Formula::atom(d().lt(r()))
            .neg()
            .or(Formula::atom(r().lt(d())).neg())
            .or(Formula::atom(d().lt(Term::Int(0))).neg());
        let refined = refine(&mut boolizer, &solver, &fact).unwrap().unwrap();
        let disjuncts = flatten_or(&refined).len();
        assert_eq!(disjuncts, 2);
        assert_eq!(
            refined,
            Formula::atom(d().lt(r()))
                .neg()
                .or(Formula::atom(r().lt(d())).neg())
        );
    }

    #[test]
    fn refine_reports_exhausted_knowledge() {
        let solver = Z3Solver::new();
        let mut boolizer = booleanizer();
        let fact = Formula::atom(d().lt(r()))
            .neg()
            .or(Formula::atom(r().lt(d())).neg());
        let refined = refine(&mut boolizer, &solver, &fact).unwrap().unwrap();
        boolizer.add_tauto(&solver, &refined).unwrap();
        // the same fact again carries no new information
        assert!(refine(&mut boolizer, &solver, &fact).unwrap().is_none());
    }
}
