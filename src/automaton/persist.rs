//! Persisted form of a converged automaton.
//!
//! The record keeps the variable declarations, the literal-to-atom
//! substitution table (atoms in the crate's textual term form) and the
//! per-node transition lists with literal-level guard text. Loading
//! reparses both, so a round trip preserves transition counts, guard text
//! and destination indices.

use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

use fs_err as fs;
use serde::{Deserialize, Serialize};

use crate::automaton::{AutomatonGraph, Edge, Node, NodeIndex, TransTable};
use crate::error::{Error, Result};
use crate::formula::parser::parse_guard;
use crate::formula::Formula;
use crate::spec::VarDecl;
use crate::theory::parser::parse_term;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub envplay: String,
    pub sysplay: String,
    pub dest: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealyRecord {
    #[serde(default)]
    pub name: Option<String>,
    pub variables: Vec<VarDecl>,
    pub transtab: BTreeMap<String, String>,
    pub nodes: Vec<Vec<TransitionRecord>>,
}

impl MealyRecord {
    pub fn from_graph(
        graph: &AutomatonGraph,
        name: Option<String>,
        variables: Vec<VarDecl>,
    ) -> Self {
        let transtab = graph
            .transtab()
            .iter()
            .map(|(id, formula)| (id.clone(), atom_text(formula)))
            .collect();
        let nodes = graph
            .nodes()
            .iter()
            .map(|node| {
                node.edges()
                    .iter()
                    .map(|edge| TransitionRecord {
                        envplay: edge.env_play().to_string(),
                        sysplay: edge.sys_play().to_string(),
                        dest: edge.dest().0,
                    })
                    .collect()
            })
            .collect();
        Self {
            name,
            variables,
            transtab,
            nodes,
        }
    }

    pub fn into_graph(self) -> Result<(AutomatonGraph, Vec<VarDecl>)> {
        let var_types = self
            .variables
            .iter()
            .map(|v| (v.name.clone(), v.ty))
            .collect();
        let mut transtab = TransTable::new();
        for (id, text) in &self.transtab {
            let term = parse_term(text, &var_types)?;
            transtab.insert(id.clone(), Formula::Atom(term));
        }
        let transtab = Rc::new(transtab);

        let num_nodes = self.nodes.len();
        let mut nodes: Vec<Node> = (0..num_nodes).map(|i| Node::new(i.to_string())).collect();
        for (index, transitions) in self.nodes.iter().enumerate() {
            for transition in transitions {
                if transition.dest >= num_nodes {
                    return Err(Error::MalformedAutomaton(format!(
                        "destination {} out of range",
                        transition.dest
                    )));
                }
                nodes[index].add_edge(Edge::new(
                    parse_guard(&transition.envplay)?,
                    parse_guard(&transition.sysplay)?,
                    NodeIndex(transition.dest),
                    Rc::clone(&transtab),
                ));
            }
        }
        Ok((AutomatonGraph::new(nodes, transtab), self.variables))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let rendered = serde_yaml::to_string(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let src = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&src)?)
    }
}

fn atom_text(formula: &Formula) -> String {
    match formula {
        Formula::Atom(term) => term.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::VarOwner;
    use crate::theory::{Term, VarType};

    fn sample_graph() -> (AutomatonGraph, Vec<VarDecl>) {
        let variables = vec![
            VarDecl::new("d", VarType::Int, VarOwner::Environment),
            VarDecl::new("r", VarType::Int, VarOwner::System),
        ];
        let mut transtab = TransTable::new();
        transtab.insert(
            "l0".to_string(),
            Formula::Atom(Term::var("d", VarType::Int).lt(Term::var("r", VarType::Int))),
        );
        transtab.insert(
            "l1".to_string(),
            Formula::Atom(Term::var("d", VarType::Int).lt(Term::Int(0))),
        );
        let transtab = Rc::new(transtab);
        let mut n0 = Node::new("0");
        n0.add_edge(Edge::new(
            Formula::sym("l1"),
            Formula::sym("l0").neg(),
            NodeIndex(1),
            Rc::clone(&transtab),
        ));
        n0.add_edge(Edge::new(
            Formula::sym("l1").neg(),
            Formula::tt(),
            NodeIndex(0),
            Rc::clone(&transtab),
        ));
        let mut n1 = Node::new("1");
        n1.add_edge(Edge::new(
            Formula::tt(),
            Formula::sym("l0").neg(),
            NodeIndex(1),
            Rc::clone(&transtab),
        ));
        (AutomatonGraph::new(vec![n0, n1], transtab), variables)
    }

    #[test]
    fn round_trip_preserves_structure_and_guard_text() {
        let (graph, variables) = sample_graph();
        let record = MealyRecord::from_graph(&graph, Some("sample".into()), variables);
        let rendered = serde_yaml::to_string(&record).unwrap();
        let reloaded: MealyRecord = serde_yaml::from_str(&rendered).unwrap();
        let (again, _) = reloaded.into_graph().unwrap();

        assert_eq!(again.num_nodes(), graph.num_nodes());
        for (a, b) in graph.nodes().iter().zip(again.nodes()) {
            assert_eq!(a.edges().len(), b.edges().len());
            for (ea, eb) in a.edges().iter().zip(b.edges()) {
                assert_eq!(ea.env_play().to_string(), eb.env_play().to_string());
                assert_eq!(ea.sys_play().to_string(), eb.sys_play().to_string());
                assert_eq!(ea.dest(), eb.dest());
            }
        }
        assert_eq!(again.max_fetch_depth(), 0);
    }

    #[test]
    fn file_round_trip() {
        let (graph, variables) = sample_graph();
        let record = MealyRecord::from_graph(&graph, None, variables);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("machine.yaml");
        record.save(&path).unwrap();
        let reloaded = MealyRecord::load(&path).unwrap();
        assert_eq!(reloaded.nodes.len(), 2);
        let (again, vars) = reloaded.into_graph().unwrap();
        assert_eq!(again.node(NodeIndex(0)).edges().len(), 2);
        assert_eq!(vars.len(), 2);
    }
}
