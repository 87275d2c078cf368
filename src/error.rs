//! Error taxonomy for the synthesis and shield runtime.

use std::time::Duration;

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that terminate the current run.
///
/// None of these are retried; the counterexample-guided refinement loop has
/// its own bounded iteration and everything else surfaces immediately with a
/// diagnostic.
#[derive(Debug, Error)]
pub enum Error {
    /// A formula-tree invariant was broken upstream: a non-constant Boolean
    /// symbol where a full theory expression was expected, a theory constant
    /// reaching the literal table, or similar.
    #[error("invalid formula: {0}")]
    InvalidFormula(String),

    /// A theory-operator shape that the abstraction cannot handle, e.g. a
    /// quantifier surviving elimination or an unsupported arithmetic
    /// operation in a solver result.
    #[error("unhandled theory expression shape: {0}")]
    UnhandledShape(String),

    /// A fact claimed to be universally valid was not.
    #[error("not a tautology: {0}")]
    NotATautology(String),

    /// Refinement could not extract any fact beyond the accumulated
    /// knowledge; the abstraction cannot make progress.
    #[error("refinement produced no new knowledge")]
    NoNewKnowledge,

    /// The number of inconsistent edges in one refinement round went over
    /// the configured tolerance.
    #[error("inconsistency tolerance exceeded: {0} inconsistent edges")]
    ToleranceExceeded(u32),

    /// The external synthesizer failed or was killed.
    #[error("synthesis backend failed after {elapsed:.2?}: {message}")]
    Backend { message: String, elapsed: Duration },

    /// The external synthesizer went over its wall-clock budget.
    #[error("synthesis backend timed out after {0:.2?}")]
    BackendTimeout(Duration),

    /// The backend's automaton output could not be parsed.
    #[error("malformed automaton: {0}")]
    MalformedAutomaton(String),

    /// Parse error in a specification, formula or term.
    #[error("parse error: {0}")]
    Parse(String),

    /// A variable was used without a declaration.
    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    /// A value or expression did not match the declared variable type.
    #[error("type mismatch for '{name}': expected {expected}")]
    TypeMismatch { name: String, expected: String },

    /// The theory solver gave up on a query.
    #[error("theory solver returned unknown for: {0}")]
    SolverUnknown(String),

    /// No outgoing edge of the current automaton node admits any response
    /// for the given environment input. Cannot happen for a correctly
    /// converged automaton.
    #[error("no legal response from automaton node {node} for the given input")]
    NonTotal { node: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
