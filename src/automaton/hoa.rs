//! Parser for the HOA-format automaton printed by the synthesis backend.
//!
//! Only the fragment the backend actually emits is understood: a header
//! with `States:`, `Start:` (fixed at 0), an `AP:` line mapping proposition
//! indices to literal names, a realizability verdict line, and a body of
//! `State:` blocks whose transitions carry an `[env & sys] dest` guard
//! pair.

use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::abstraction::LiteralTable;
use crate::automaton::{AutomatonGraph, Edge, Node, NodeIndex, TransTable};
use crate::error::{Error, Result};
use crate::formula::parser::parse_guard;
use crate::formula::Formula;

/// Parse the backend output into a graph plus its realizability verdict.
pub fn parse(text: &str, littable: &LiteralTable) -> Result<(AutomatonGraph, bool)> {
    let mut lines = text.lines();

    let mut num_states = None;
    let mut realizable = None;
    let mut ap_names: Option<Vec<String>> = None;

    for line in lines.by_ref() {
        let line = line.trim_end();
        if line.contains("REALIZABLE") {
            realizable = Some(!line.contains("UNREALIZABLE"));
            debug!("backend verdict: {}", line);
        }
        if let Some(rest) = line.strip_prefix("States: ") {
            num_states = Some(rest.trim().parse::<usize>().map_err(|e| {
                Error::MalformedAutomaton(format!("state count '{}': {}", rest, e))
            })?);
        }
        if let Some(rest) = line.strip_prefix("Start: ") {
            let start = rest.trim().parse::<usize>().unwrap_or(usize::MAX);
            if start != 0 {
                return Err(Error::MalformedAutomaton(format!(
                    "start state must be 0, found {}",
                    rest
                )));
            }
        }
        if let Some(rest) = line.strip_prefix("AP: ") {
            ap_names = Some(parse_ap_line(rest)?);
        }
        if line == "--BODY--" {
            break;
        }
    }

    let num_states =
        num_states.ok_or_else(|| Error::MalformedAutomaton("missing 'States:' header".into()))?;
    let realizable = realizable
        .ok_or_else(|| Error::MalformedAutomaton("missing realizability verdict".into()))?;
    let ap_names =
        ap_names.ok_or_else(|| Error::MalformedAutomaton("missing 'AP:' header".into()))?;

    let mut transtab = TransTable::new();
    for name in &ap_names {
        let entry = littable.get(name).ok_or_else(|| {
            Error::MalformedAutomaton(format!("backend uses unknown literal '{}'", name))
        })?;
        transtab.insert(name.clone(), Formula::Atom(entry.atom.clone()));
    }
    let transtab = Rc::new(transtab);

    let mut nodes: Vec<Node> = (0..num_states)
        .map(|i| Node::new(i.to_string()))
        .collect();
    let mut current = 0usize;

    for line in lines {
        let line = line.trim_end();
        if let Some(rest) = line.strip_prefix("State: ") {
            let number = rest.split_whitespace().next().unwrap_or(rest);
            current = number.parse::<usize>().map_err(|e| {
                Error::MalformedAutomaton(format!("state number '{}': {}", number, e))
            })?;
            if current >= num_states {
                return Err(Error::MalformedAutomaton(format!(
                    "state {} out of range",
                    current
                )));
            }
        } else if let Some(rest) = line.strip_prefix('[') {
            let (guard, dest) = parse_transition(rest, &ap_names)?;
            if dest >= num_states {
                return Err(Error::MalformedAutomaton(format!(
                    "destination {} out of range",
                    dest
                )));
            }
            let (env_play, sys_play) = split_guard(guard)?;
            nodes[current].add_edge(Edge::new(
                env_play,
                sys_play,
                NodeIndex(dest),
                Rc::clone(&transtab),
            ));
        }
    }

    Ok((AutomatonGraph::new(nodes, transtab), realizable))
}

/// `AP: 2 "l0" "l1"` — the count followed by quoted literal names.
fn parse_ap_line(rest: &str) -> Result<Vec<String>> {
    let rest = rest.trim();
    let (count, names_part) = match rest.split_once(' ') {
        Some((count, names)) => (count, names),
        None => (rest, ""),
    };
    let count = count
        .parse::<usize>()
        .map_err(|e| Error::MalformedAutomaton(format!("AP count '{}': {}", count, e)))?;
    let names: Vec<String> = names_part
        .split('"')
        .enumerate()
        .filter(|(i, _)| i % 2 == 1)
        .map(|(_, name)| name.to_string())
        .collect();
    if names.len() != count {
        return Err(Error::MalformedAutomaton(format!(
            "AP count {} does not match {} names",
            count,
            names.len()
        )));
    }
    Ok(names)
}

/// Parse `cond] dest` into the index-renamed guard and the destination.
fn parse_transition(rest: &str, ap_names: &[String]) -> Result<(Formula, usize)> {
    let (cond, dest) = rest
        .split_once(']')
        .ok_or_else(|| Error::MalformedAutomaton(format!("unterminated guard '{}'", rest)))?;
    let dest = dest.trim().parse::<usize>().map_err(|e| {
        Error::MalformedAutomaton(format!("destination '{}': {}", dest.trim(), e))
    })?;
    let indexed = parse_guard(cond)?;
    let mut table = HashMap::new();
    for (index, name) in ap_names.iter().enumerate() {
        table.insert(index.to_string(), Formula::sym(name.clone()));
    }
    let guard = rename_propositions(&indexed, &table)?;
    Ok((guard, dest))
}

/// Guard symbols are proposition indices; rename them to literal ids.
fn rename_propositions(formula: &Formula, table: &HashMap<String, Formula>) -> Result<Formula> {
    match formula {
        Formula::Sym(_) if formula.is_constant() => Ok(formula.clone()),
        Formula::Sym(name) => table
            .get(name)
            .cloned()
            .ok_or_else(|| Error::MalformedAutomaton(format!("proposition '{}' unknown", name))),
        Formula::Not(a) => Ok(rename_propositions(a, table)?.neg()),
        Formula::And(a, b) => {
            Ok(rename_propositions(a, table)?.and(rename_propositions(b, table)?))
        }
        Formula::Or(a, b) => {
            Ok(rename_propositions(a, table)?.or(rename_propositions(b, table)?))
        }
        other => Err(Error::MalformedAutomaton(format!(
            "unexpected operator in guard: {}",
            other
        ))),
    }
}

/// A transition guard is the conjunction of the environment play and the
/// system play.
fn split_guard(guard: Formula) -> Result<(Formula, Formula)> {
    match guard {
        Formula::And(env, sys) => Ok((*env, *sys)),
        other => Err(Error::MalformedAutomaton(format!(
            "guard '{}' is not an (env & sys) pair",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abstraction::Booleanizer;
    use crate::spec::{VarDecl, VarOwner};
    use crate::theory::{Term, VarType};

    const OUTPUT: &str = "\
REALIZABLE
HOA: v1
States: 2
Start: 0
AP: 2 \"l0\" \"l1\"
acc-name: all
Acceptance: 0 t
--BODY--
State: 0
[(0) & (!1)] 1
[(!0) & (t)] 0
State: 1
[(t) & (1)] 1
--END--
";

    fn booleanizer_with_two_literals() -> Booleanizer {
        let decls = vec![
            VarDecl::new("d", VarType::Int, VarOwner::Environment),
            VarDecl::new("r", VarType::Int, VarOwner::System),
        ];
        let mut boolizer = Booleanizer::new(&decls);
        boolizer
            .get_or_create_literal(&Term::var("d", VarType::Int).lt(Term::Int(0)))
            .unwrap();
        boolizer
            .get_or_create_literal(&Term::var("d", VarType::Int).lt(Term::var("r", VarType::Int)))
            .unwrap();
        boolizer
    }

    #[test]
    fn parses_states_edges_and_verdict() {
        let boolizer = booleanizer_with_two_literals();
        let (graph, realizable) = parse(OUTPUT, boolizer.literal_table()).unwrap();
        assert!(realizable);
        assert_eq!(graph.num_nodes(), 2);
        assert_eq!(graph.node(NodeIndex(0)).edges().len(), 2);
        assert_eq!(graph.node(NodeIndex(1)).edges().len(), 1);

        let edge = &graph.node(NodeIndex(0)).edges()[0];
        assert_eq!(edge.env_play(), &Formula::sym("l0"));
        assert_eq!(edge.sys_play(), &Formula::sym("l1").neg());
        assert_eq!(edge.dest(), NodeIndex(1));
    }

    #[test]
    fn rejects_nonzero_start_state() {
        let boolizer = booleanizer_with_two_literals();
        let output = OUTPUT.replace("Start: 0", "Start: 1");
        assert!(parse(&output, boolizer.literal_table()).is_err());
    }

    #[test]
    fn rejects_unknown_literals() {
        let boolizer = booleanizer_with_two_literals();
        let output = OUTPUT.replace("\"l1\"", "\"l9\"");
        assert!(parse(&output, boolizer.literal_table()).is_err());
    }

    #[test]
    fn unrealizable_verdict_is_reported() {
        let boolizer = booleanizer_with_two_literals();
        let output = OUTPUT.replace("REALIZABLE", "UNREALIZABLE");
        let (_, realizable) = parse(&output, boolizer.literal_table()).unwrap();
        assert!(!realizable);
    }
}
