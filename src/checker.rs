//! Edge consistency checks against the real theory.
//!
//! The Boolean synthesizer only sees literals, so the automaton it returns
//! can take transitions that no concrete theory valuation admits. Two
//! checks catch this: a per-edge theory check and, for specifications with
//! temporal lookback, a per-edge-pair history check. Both share one
//! inconsistency budget within a refinement round.

use log::{debug, info};

use crate::abstraction::Booleanizer;
use crate::automaton::{AutomatonGraph, Edge};
use crate::error::{Error, Result};
use crate::formula::Formula;
use crate::refinement::refine;
use crate::theory::solver::TheorySolver;
use crate::theory::{is_fetched, Term};

/// Classification of a checked edge.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EdgeKind {
    Legal,
    Illegal,
    Unreachable,
}

/// One round of consistency checking over a candidate automaton.
pub struct ConsistencyChecker<'a, S> {
    solver: &'a S,
    realizable: bool,
    tolerance: u32,
    inconsistencies: u32,
}

impl<'a, S: TheorySolver> ConsistencyChecker<'a, S> {
    pub fn new(solver: &'a S, realizable: bool, tolerance: u32) -> Self {
        Self {
            solver,
            realizable,
            tolerance,
            inconsistencies: 0,
        }
    }

    pub fn inconsistencies(&self) -> u32 {
        self.inconsistencies
    }

    /// After the first inconsistency of a round has learned a fact, later
    /// failures may legitimately produce nothing new.
    fn no_new_facts_allowed(&self) -> bool {
        self.inconsistencies > 0
    }

    fn record_failure(&mut self) -> Result<()> {
        self.inconsistencies += 1;
        if self.inconsistencies > self.tolerance {
            return Err(Error::ToleranceExceeded(self.inconsistencies));
        }
        Ok(())
    }

    /// Theory-consistency pass over every edge. Returns whether all edges
    /// were consistent; every failed edge has learned a fact by then.
    pub fn check_theory(
        &mut self,
        graph: &AutomatonGraph,
        boolizer: &mut Booleanizer,
    ) -> Result<bool> {
        let mut all_consistent = true;
        let total = graph.edges().count();
        for (index, edge) in graph.edges().enumerate() {
            debug!("checking edge {}/{}", index + 1, total);
            if !self.edge_consistent(edge, boolizer)? {
                all_consistent = false;
                self.record_failure()?;
            }
        }
        Ok(all_consistent)
    }

    /// History-consistency pass over every consecutive edge pair.
    pub fn check_temporal(
        &mut self,
        graph: &AutomatonGraph,
        boolizer: &mut Booleanizer,
    ) -> Result<bool> {
        let mut all_consistent = true;
        let pairs = graph.consecutive_pairs();
        for (index, &(first, second)) in pairs.iter().enumerate() {
            debug!("checking edge pair {}/{}", index + 1, pairs.len());
            if !self.pair_consistent(first, second, boolizer)? {
                all_consistent = false;
                self.record_failure()?;
            }
        }
        Ok(all_consistent)
    }

    fn edge_consistent(&self, edge: &Edge, boolizer: &mut Booleanizer) -> Result<bool> {
        let (kind, fact) = self.theory_fact(edge, boolizer)?;
        let fact = match fact {
            None => return Ok(true),
            Some(fact) => fact,
        };
        info!("theory inconsistency, edge is {:?}", kind);
        match refine(boolizer, self.solver, &fact)? {
            Some(refined) => {
                debug!("adding fact: {}", refined);
                boolizer.add_tauto(self.solver, &refined)?;
            }
            None => {
                debug!("no new knowledge in fact");
                if !self.no_new_facts_allowed() {
                    return Err(Error::NoNewKnowledge);
                }
            }
        }
        Ok(false)
    }

    /// Classify an edge and compute the fact witnessing its inconsistency.
    fn theory_fact(
        &self,
        edge: &Edge,
        boolizer: &Booleanizer,
    ) -> Result<(EdgeKind, Option<Formula>)> {
        let env = edge.env_term()?;
        if let Some(fact) = self.env_play_fact(env)? {
            let kind = if self.realizable {
                EdgeKind::Unreachable
            } else {
                EdgeKind::Illegal
            };
            return Ok((kind, Some(fact)));
        }
        let sys = edge.sys_term()?;
        if let Some(fact) = self.sys_play_fact(env, sys, boolizer)? {
            let kind = if self.realizable {
                EdgeKind::Illegal
            } else {
                EdgeKind::Unreachable
            };
            return Ok((kind, Some(fact)));
        }
        Ok((EdgeKind::Legal, None))
    }

    /// An environment play that no valuation satisfies yields its negation
    /// as a fact.
    fn env_play_fact(&self, env: &Term) -> Result<Option<Formula>> {
        let feasible = Term::exists(env.vars(), env.clone());
        if self.solver.is_sat(&feasible)? {
            Ok(None)
        } else {
            Ok(Some(Formula::from_term(env)?.neg()))
        }
    }

    /// Checks that every environment input satisfying the environment play
    /// admits some system response satisfying the system play. On failure
    /// the witness partition from quantifier elimination joins the negated
    /// system play as a fact.
    fn sys_play_fact(
        &self,
        env: &Term,
        sys: &Term,
        boolizer: &Booleanizer,
    ) -> Result<Option<Formula>> {
        let mut outer = env.vars();
        let mut sys_owned = Vec::new();
        for (name, ty) in sys.vars() {
            if boolizer.is_sys_var(&name) {
                sys_owned.push((name, ty));
            } else if !outer.iter().any(|(n, _)| *n == name) {
                outer.push((name, ty));
            }
        }
        let response_exists = Term::exists(sys_owned, sys.clone());
        let closed = Term::forall(
            outer,
            env.clone().implies(response_exists.clone()),
        );
        if self.solver.is_sat(&closed)? {
            return Ok(None);
        }
        let partition = self.solver.eliminate_quantifiers(&response_exists)?;
        let fact = Formula::from_term(sys)?
            .neg()
            .or(Formula::from_term(&partition)?);
        Ok(Some(fact))
    }

    /// The history encoded by the first edge must not preclude every
    /// not-yet-determined environment input of the second edge's guard.
    fn pair_consistent(
        &self,
        first: &Edge,
        second: &Edge,
        boolizer: &mut Booleanizer,
    ) -> Result<bool> {
        let pre = Term::and(vec![first.sys_term()?.clone(), first.env_term()?.clone()]).fetched();
        let env = second.env_term()?.clone();
        let sys = second.sys_term()?.clone();

        let mut history_vars = pre.vars();
        for (name, ty) in sys.vars().into_iter().chain(env.vars()) {
            if is_fetched(&name) && !history_vars.iter().any(|(n, _)| *n == name) {
                history_vars.push((name, ty));
            }
        }
        let open_vars: Vec<_> = env
            .vars()
            .into_iter()
            .filter(|(name, _)| !is_fetched(name))
            .collect();
        let some_input = Term::exists(open_vars.clone(), env.clone());
        let closed = Term::forall(history_vars, pre.implies(some_input));
        if self.solver.is_sat(&closed)? {
            return Ok(true);
        }
        info!("temporal inconsistency between consecutive edges");
        let eliminated = self
            .solver
            .eliminate_quantifiers(&Term::exists(open_vars, env))?;
        let present = eliminated.unfetched();
        let missing = boolizer.missing_tautos(&present)?;
        if missing.is_empty() {
            debug!("no new history-bridging facts");
            if !self.no_new_facts_allowed() {
                return Err(Error::NoNewKnowledge);
            }
        } else {
            for atom in missing {
                debug!("bridging history for atom: {}", atom);
                boolizer.create_tmp_assumption_for(&atom)?;
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use crate::automaton::{Node, NodeIndex, TransTable};
    use crate::spec::{VarDecl, VarOwner};
    use crate::theory::z3::Z3Solver;
    use crate::theory::VarType;

    fn decls() -> Vec<VarDecl> {
        vec![
            VarDecl::new("d", VarType::Int, VarOwner::Environment),
            VarDecl::new("a", VarType::Int, VarOwner::Environment),
            VarDecl::new("r", VarType::Int, VarOwner::System),
        ]
    }

    fn var(name: &str) -> Term {
        Term::var(name, VarType::Int)
    }

    fn single_edge_graph(boolizer: &Booleanizer, env: Formula, sys: Formula) -> AutomatonGraph {
        let transtab: TransTable = boolizer.transtab();
        let transtab = Rc::new(transtab);
        let mut node = Node::new("0");
        node.add_edge(crate::automaton::Edge::new(
            env,
            sys,
            NodeIndex(0),
            Rc::clone(&transtab),
        ));
        AutomatonGraph::new(vec![node], transtab)
    }

    #[test]
    fn legal_edge_passes() {
        let solver = Z3Solver::new();
        let mut boolizer = Booleanizer::new(&decls());
        let sys_lit = boolizer.get_or_create_literal(&var("d").lt(var("r"))).unwrap();
        // require !(d < r): a response r <= d always exists
        let graph = single_edge_graph(&boolizer, Formula::tt(), sys_lit.neg());
        let mut checker = ConsistencyChecker::new(&solver, true, 64);
        assert!(checker.check_theory(&graph, &mut boolizer).unwrap());
        assert_eq!(checker.inconsistencies(), 0);
    }

    #[test]
    fn infeasible_environment_play_learns_an_assumption() {
        let solver = Z3Solver::new();
        let mut boolizer = Booleanizer::new(&decls());
        // the atom d < d is environment-owned and unsatisfiable
        let env_lit = boolizer.get_or_create_literal(&var("d").lt(var("d"))).unwrap();
        let graph = single_edge_graph(&boolizer, env_lit, Formula::tt());
        let mut checker = ConsistencyChecker::new(&solver, true, 64);
        assert!(!checker.check_theory(&graph, &mut boolizer).unwrap());
        assert_eq!(checker.inconsistencies(), 1);
        assert_eq!(boolizer.assumptions().len(), 1);
        assert!(boolizer.guarantees().is_empty());
    }

    #[test]
    fn impossible_system_play_learns_a_guarantee() {
        let solver = Z3Solver::new();
        let mut boolizer = Booleanizer::new(&decls());
        let low = boolizer.get_or_create_literal(&var("d").lt(var("r"))).unwrap();
        let high = boolizer.get_or_create_literal(&var("r").lt(var("d"))).unwrap();
        // no response satisfies d < r and r < d together
        let graph = single_edge_graph(&boolizer, Formula::tt(), low.and(high));
        let mut checker = ConsistencyChecker::new(&solver, true, 64);
        assert!(!checker.check_theory(&graph, &mut boolizer).unwrap());
        assert_eq!(boolizer.guarantees().len(), 1);
        assert!(boolizer.assumptions().is_empty());
    }

    #[test]
    fn tolerance_bounds_the_failures_per_round() {
        let solver = Z3Solver::new();
        let mut boolizer = Booleanizer::new(&decls());
        let env_lit = boolizer.get_or_create_literal(&var("d").lt(var("d"))).unwrap();
        let transtab = Rc::new(boolizer.transtab());
        let mut node = Node::new("0");
        for _ in 0..2 {
            node.add_edge(crate::automaton::Edge::new(
                env_lit.clone(),
                Formula::tt(),
                NodeIndex(0),
                Rc::clone(&transtab),
            ));
        }
        let graph = AutomatonGraph::new(vec![node], transtab);
        let mut checker = ConsistencyChecker::new(&solver, true, 0);
        assert!(matches!(
            checker.check_theory(&graph, &mut boolizer),
            Err(Error::ToleranceExceeded(_))
        ));
    }

    #[test]
    fn temporal_check_registers_bridging_facts() {
        let solver = Z3Solver::new();
        let mut boolizer = Booleanizer::new(&decls());
        let positive = boolizer
            .get_or_create_literal(&Term::Int(0).lt(var("d")))
            .unwrap();
        let negative_before = boolizer
            .get_or_create_literal(&var("FETCH_d").lt(Term::Int(0)))
            .unwrap();
        let transtab = Rc::new(boolizer.transtab());
        // the first edge forces 0 < d, its successor demands the previous
        // value of d below 0
        let mut first = Node::new("0");
        first.add_edge(crate::automaton::Edge::new(
            positive,
            Formula::tt(),
            NodeIndex(1),
            Rc::clone(&transtab),
        ));
        let mut second = Node::new("1");
        second.add_edge(crate::automaton::Edge::new(
            negative_before,
            Formula::tt(),
            NodeIndex(1),
            Rc::clone(&transtab),
        ));
        let graph = AutomatonGraph::new(vec![first, second], transtab);

        let literals_before = boolizer.literal_table().len();
        let mut checker = ConsistencyChecker::new(&solver, false, 64);
        assert!(!checker.check_temporal(&graph, &mut boolizer).unwrap());
        assert_eq!(boolizer.fetch_tautos().len(), 1);
        assert_eq!(boolizer.literal_table().len(), literals_before + 1);
    }
}
