//! Mealy-machine graph produced by the synthesis backend or loaded from
//! its persisted form.

pub mod hoa;
pub mod persist;

use std::cell::OnceCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::formula::Formula;
use crate::theory::Term;

/// Literal id to wrapped-theory-atom substitution table, shared by all
/// edges of one automaton.
pub type TransTable = HashMap<String, Formula>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct NodeIndex(pub usize);

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A guarded transition: literal-level environment and system plays plus
/// the destination node. The theory expressions of both plays are derived
/// lazily from the substitution table and cached.
#[derive(Debug, Clone)]
pub struct Edge {
    env_play: Formula,
    sys_play: Formula,
    dest: NodeIndex,
    transtab: Rc<TransTable>,
    env_term: OnceCell<Term>,
    sys_term: OnceCell<Term>,
}

impl Edge {
    pub fn new(
        env_play: Formula,
        sys_play: Formula,
        dest: NodeIndex,
        transtab: Rc<TransTable>,
    ) -> Self {
        Self {
            env_play,
            sys_play,
            dest,
            transtab,
            env_term: OnceCell::new(),
            sys_term: OnceCell::new(),
        }
    }

    pub fn env_play(&self) -> &Formula {
        &self.env_play
    }

    pub fn sys_play(&self) -> &Formula {
        &self.sys_play
    }

    pub fn dest(&self) -> NodeIndex {
        self.dest
    }

    fn play_term<'a>(&self, cell: &'a OnceCell<Term>, play: &Formula) -> Result<&'a Term> {
        if cell.get().is_none() {
            let term = play.replace_literals(&self.transtab)?.to_term()?;
            let _ = cell.set(term);
        }
        Ok(cell.get().expect("cell was just filled"))
    }

    /// Theory expression of the environment play.
    pub fn env_term(&self) -> Result<&Term> {
        self.play_term(&self.env_term, &self.env_play)
    }

    /// Theory expression of the system response.
    pub fn sys_term(&self) -> Result<&Term> {
        self.play_term(&self.sys_term, &self.sys_play)
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    edges: Vec<Edge>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            edges: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }
}

/// The synthesized Mealy machine. The start node is index 0.
#[derive(Debug, Clone)]
pub struct AutomatonGraph {
    nodes: Vec<Node>,
    transtab: Rc<TransTable>,
}

impl AutomatonGraph {
    pub fn new(nodes: Vec<Node>, transtab: Rc<TransTable>) -> Self {
        Self { nodes, transtab }
    }

    pub fn start(&self) -> NodeIndex {
        NodeIndex(0)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.nodes[index.0]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn transtab(&self) -> &Rc<TransTable> {
        &self.transtab
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.nodes.iter().flat_map(|node| node.edges.iter())
    }

    /// Every pair of an edge and one of its destination's outgoing edges.
    pub fn consecutive_pairs(&self) -> Vec<(&Edge, &Edge)> {
        self.edges()
            .flat_map(|edge| {
                self.node(edge.dest())
                    .edges()
                    .iter()
                    .map(move |next| (edge, next))
            })
            .collect()
    }

    /// Maximum lookback depth over the substitution table's atoms.
    pub fn max_fetch_depth(&self) -> usize {
        self.transtab
            .values()
            .filter_map(|formula| match formula {
                Formula::Atom(term) => Some(term.fetch_depth()),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Graphviz rendering with prettified comparisons, for `--show-mealy`.
    pub fn to_dot(&self) -> Result<String> {
        let mut out = String::from("digraph {\n");
        for (index, node) in self.nodes.iter().enumerate() {
            for edge in node.edges() {
                let env = push_negation(edge.env_term()?);
                let sys = push_negation(edge.sys_term()?);
                out.push_str(&format!(
                    "    {} -> {} [label=\"When\\n{}\\nthen:\\n{}\"];\n",
                    index,
                    edge.dest(),
                    env,
                    sys
                ));
            }
        }
        out.push('}');
        Ok(out)
    }
}

/// Push negations into comparisons for display: `!(a < b)` reads better as
/// `a >= b`.
pub fn push_negation(term: &Term) -> Term {
    match term {
        Term::Not(inner) => match inner.as_ref() {
            Term::Lt(a, b) => Term::Ge(a.clone(), b.clone()),
            Term::Le(a, b) => Term::Gt(a.clone(), b.clone()),
            Term::Gt(a, b) => Term::Le(a.clone(), b.clone()),
            Term::Ge(a, b) => Term::Lt(a.clone(), b.clone()),
            Term::And(ts) => Term::Or(ts.iter().map(|t| push_negation(&t.clone().negated())).collect()),
            Term::Or(ts) => Term::And(ts.iter().map(|t| push_negation(&t.clone().negated())).collect()),
            other => push_negation(other).negated(),
        },
        Term::And(ts) => Term::And(ts.iter().map(push_negation).collect()),
        Term::Or(ts) => Term::Or(ts.iter().map(push_negation).collect()),
        other => other.clone(),
    }
}
