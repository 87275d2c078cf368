//! Runtime enforcement: walk a converged automaton along a stream of
//! proposed responses, correcting them when they would leave the
//! specification.

use std::collections::VecDeque;

use log::{debug, info};

use crate::automaton::persist::MealyRecord;
use crate::automaton::{AutomatonGraph, NodeIndex};
use crate::error::{Error, Result};
use crate::spec::{VarDecl, VarOwner};
use crate::theory::solver::{Assignment, Model, TheorySolver, Value};
use crate::theory::{Term, VarType, FETCH_PREFIX};

fn default_value(ty: VarType) -> Value {
    match ty {
        VarType::Int => Value::Int(0),
        VarType::Real => Value::Real(0, 1),
    }
}

/// Online enforcer for one input stream.
///
/// Keeps the current automaton node and a bounded history of past merged
/// assignments; the history depth is the maximum lookback of the
/// automaton's atoms. The history is only extended after a step completes.
pub struct Shield {
    graph: AutomatonGraph,
    variables: Vec<VarDecl>,
    current: NodeIndex,
    history: VecDeque<Assignment>,
    depth: usize,
}

impl Shield {
    pub fn new(graph: AutomatonGraph, variables: Vec<VarDecl>) -> Self {
        let depth = graph.max_fetch_depth();
        let current = graph.start();
        Self {
            graph,
            variables,
            current,
            history: VecDeque::with_capacity(depth),
            depth,
        }
    }

    pub fn from_record(record: MealyRecord) -> Result<Self> {
        let (graph, variables) = record.into_graph()?;
        Ok(Self::new(graph, variables))
    }

    pub fn current_node(&self) -> NodeIndex {
        self.current
    }

    pub fn lookback_depth(&self) -> usize {
        self.depth
    }

    /// Expand the history into lookback-prefixed bindings and merge them
    /// with the environment input. Layers beyond the recorded history (the
    /// first steps of a stream) bind to per-type defaults.
    fn with_history(&self, env: &Assignment) -> Assignment {
        let mut full = env.clone();
        for layer in 1..=self.depth {
            let prefix = FETCH_PREFIX.repeat(layer);
            let past = self.history.len().checked_sub(layer).map(|i| &self.history[i]);
            for decl in &self.variables {
                let value = past
                    .and_then(|assignment| assignment.get(&decl.name).copied())
                    .unwrap_or_else(|| default_value(decl.ty));
                full.insert(format!("{}{}", prefix, decl.name), value);
            }
        }
        full
    }

    /// The accepted response: proposed values that survived, filled in
    /// with model values and per-type defaults for the rest.
    fn response_from(&self, model: &Model, proposed: &Assignment) -> Assignment {
        self.variables
            .iter()
            .filter(|decl| decl.owner == VarOwner::System)
            .map(|decl| {
                let value = proposed
                    .get(&decl.name)
                    .copied()
                    .or_else(|| model.get(&decl.name))
                    .unwrap_or_else(|| default_value(decl.ty));
                (decl.name.clone(), value)
            })
            .collect()
    }

    fn advance(&mut self, dest: NodeIndex, env: &Assignment, response: &Assignment) {
        self.current = dest;
        if self.depth == 0 {
            return;
        }
        let mut merged = env.clone();
        merged.extend(response.iter().map(|(k, v)| (k.clone(), *v)));
        self.history.push_back(merged);
        while self.history.len() > self.depth {
            self.history.pop_front();
        }
    }

    /// Accept or repair one proposed response.
    ///
    /// First tries to find an outgoing edge consistent with the proposal;
    /// failing that, lets the solver invent any legal response along an
    /// edge whose guard admits the environment input.
    ///
    /// # Errors
    ///
    /// `NonTotal` when no edge admits any response, which cannot happen
    /// for a correctly converged automaton.
    pub fn step<S: TheorySolver>(
        &mut self,
        solver: &S,
        env: &Assignment,
        proposed: &Assignment,
    ) -> Result<Assignment> {
        let full = self.with_history(env);

        let mut accepted = None;
        let mut with_proposal = full.clone();
        with_proposal.extend(proposed.iter().map(|(k, v)| (k.clone(), *v)));
        for (index, edge) in self.graph.node(self.current).edges().iter().enumerate() {
            let guard = Term::and(vec![edge.env_term()?.clone(), edge.sys_term()?.clone()]);
            let bound = guard.substitute(&with_proposal)?;
            if let Some(model) = solver.model(&bound)? {
                debug!("edge {} accepts the proposed response", index);
                accepted = Some((edge.dest(), self.response_from(&model, proposed)));
                break;
            }
        }

        if accepted.is_none() {
            info!("proposed response rejected, deriving a legal one");
            for (index, edge) in self.graph.node(self.current).edges().iter().enumerate() {
                let guard = edge.env_term()?.substitute(&full)?;
                if !solver.is_sat(&guard)? {
                    continue;
                }
                let play = Term::and(vec![edge.env_term()?.clone(), edge.sys_term()?.clone()]);
                let bound = play.substitute(&full)?;
                if let Some(model) = solver.model(&bound)? {
                    debug!("edge {} admits a derived response", index);
                    accepted = Some((edge.dest(), self.response_from(&model, &Assignment::new())));
                    break;
                }
            }
        }

        match accepted {
            Some((dest, response)) => {
                self.advance(dest, env, &response);
                Ok(response)
            }
            None => Err(Error::NonTotal {
                node: self.current.0,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::rc::Rc;

    use crate::automaton::{Edge, Node, TransTable};
    use crate::formula::Formula;
    use crate::theory::z3::Z3Solver;

    fn int_assignment(pairs: &[(&str, i64)]) -> Assignment {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), Value::Int(*value)))
            .collect()
    }

    fn bound_by_d_shield() -> Shield {
        // one node, one edge: any input, response must satisfy r <= d
        let variables = vec![
            VarDecl::new("d", VarType::Int, VarOwner::Environment),
            VarDecl::new("a", VarType::Int, VarOwner::Environment),
            VarDecl::new("r", VarType::Int, VarOwner::System),
        ];
        let mut transtab = TransTable::new();
        transtab.insert(
            "l0".to_string(),
            Formula::Atom(Term::var("d", VarType::Int).lt(Term::var("r", VarType::Int))),
        );
        let transtab = Rc::new(transtab);
        let mut node = Node::new("0");
        node.add_edge(Edge::new(
            Formula::tt(),
            Formula::sym("l0").neg(),
            NodeIndex(0),
            Rc::clone(&transtab),
        ));
        Shield::new(AutomatonGraph::new(vec![node], transtab), variables)
    }

    #[test]
    fn empty_proposal_yields_a_model_derived_response() {
        let solver = Z3Solver::new();
        let mut shield = bound_by_d_shield();
        let env = int_assignment(&[("d", 105), ("a", 10)]);
        let response = shield.step(&solver, &env, &Assignment::new()).unwrap();
        match response.get("r") {
            Some(Value::Int(r)) => assert!(*r <= 105),
            other => panic!("expected integer response, got {:?}", other),
        }
    }

    #[test]
    fn acceptable_proposal_is_kept() {
        let solver = Z3Solver::new();
        let mut shield = bound_by_d_shield();
        let env = int_assignment(&[("d", 105), ("a", 10)]);
        let proposed = int_assignment(&[("r", 100)]);
        let response = shield.step(&solver, &env, &proposed).unwrap();
        assert_eq!(response.get("r"), Some(&Value::Int(100)));
    }

    #[test]
    fn violating_proposal_is_replaced_and_the_walk_advances() {
        let solver = Z3Solver::new();
        let mut shield = bound_by_d_shield();
        let env = int_assignment(&[("d", 105), ("a", 10)]);
        let proposed = int_assignment(&[("r", 200)]);
        let response = shield.step(&solver, &env, &proposed).unwrap();
        match response.get("r") {
            Some(Value::Int(r)) => assert!(*r <= 105 && *r != 200),
            other => panic!("expected integer response, got {:?}", other),
        }
        assert_eq!(shield.current_node(), NodeIndex(0));
    }

    #[test]
    fn history_starts_with_defaults_and_then_tracks_real_values() {
        let solver = Z3Solver::new();
        // the response must exceed the previous value of d
        let variables = vec![
            VarDecl::new("d", VarType::Int, VarOwner::Environment),
            VarDecl::new("r", VarType::Int, VarOwner::System),
        ];
        let mut transtab = TransTable::new();
        transtab.insert(
            "l0".to_string(),
            Formula::Atom(Term::var("FETCH_d", VarType::Int).lt(Term::var("r", VarType::Int))),
        );
        let transtab = Rc::new(transtab);
        let mut node = Node::new("0");
        node.add_edge(Edge::new(
            Formula::tt(),
            Formula::sym("l0"),
            NodeIndex(0),
            Rc::clone(&transtab),
        ));
        let mut shield = Shield::new(AutomatonGraph::new(vec![node], transtab), variables);
        assert_eq!(shield.lookback_depth(), 1);

        // first step: empty history, the lookback binds to the default 0
        let response = shield
            .step(&solver, &int_assignment(&[("d", 5)]), &Assignment::new())
            .unwrap();
        match response.get("r") {
            Some(Value::Int(r)) => assert!(*r > 0),
            other => panic!("expected integer response, got {:?}", other),
        }

        // second step: the lookback now holds the recorded d = 5
        let response = shield
            .step(&solver, &int_assignment(&[("d", 9)]), &Assignment::new())
            .unwrap();
        match response.get("r") {
            Some(Value::Int(r)) => assert!(*r > 5),
            other => panic!("expected integer response, got {:?}", other),
        }
    }

    #[test]
    fn non_total_node_is_a_fatal_step() {
        let solver = Z3Solver::new();
        let variables = vec![
            VarDecl::new("d", VarType::Int, VarOwner::Environment),
            VarDecl::new("r", VarType::Int, VarOwner::System),
        ];
        let mut transtab: TransTable = HashMap::new();
        transtab.insert(
            "l0".to_string(),
            Formula::Atom(Term::var("d", VarType::Int).lt(Term::Int(0))),
        );
        let transtab = Rc::new(transtab);
        let mut node = Node::new("0");
        node.add_edge(Edge::new(
            Formula::sym("l0"),
            Formula::tt(),
            NodeIndex(0),
            Rc::clone(&transtab),
        ));
        let mut shield = Shield::new(AutomatonGraph::new(vec![node], transtab), variables);
        let result = shield.step(&solver, &int_assignment(&[("d", 5)]), &Assignment::new());
        assert!(matches!(result, Err(Error::NonTotal { node: 0 })));
    }
}
