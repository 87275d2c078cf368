//! Shield synthesis for LTL specifications over linear arithmetic.
//!
//! A specification talks about integer and real variables, so the
//! finite-state synthesis backend cannot see it directly. The abstraction
//! replaces every theory atom by a fresh Boolean literal, the backend
//! synthesizes a Mealy automaton over those literals, and a refinement
//! loop validates every transition against the real theory, learning new
//! facts until the automaton is consistent. The converged automaton can be
//! persisted and walked online by the [`shield::Shield`] runtime, which
//! corrects proposed responses that would violate the specification.

pub mod abstraction;
pub mod automaton;
pub mod backend;
mod cegar;
pub mod checker;
pub mod error;
pub mod formula;
pub mod options;
pub mod refinement;
pub mod report;
pub mod shield;
pub mod spec;
pub mod theory;

use std::fmt::{self, Display};

use log::info;

pub use crate::automaton::AutomatonGraph;
pub use crate::error::{Error, Result};
pub use crate::shield::Shield;
pub use crate::spec::Specification;

use crate::abstraction::Booleanizer;
use crate::backend::SynthesisBackend;
use crate::options::SynthesisOptions;
use crate::report::Reporter;
use crate::theory::solver::TheorySolver;

/// Realizability verdict of the last backend call.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Status {
    Realizable,
    Unrealizable,
}

impl Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Status::Realizable => "REALIZABLE",
                Status::Unrealizable => "UNREALIZABLE",
            }
        )
    }
}

/// A converged automaton plus its realizability verdict.
pub struct SynthesisResult {
    pub status: Status,
    pub automaton: AutomatonGraph,
}

/// Synthesize a consistent shield automaton with default options.
pub fn synthesize<B, S>(spec: &Specification, backend: &B, solver: &S) -> Result<SynthesisResult>
where
    B: SynthesisBackend,
    S: TheorySolver,
{
    synthesize_with(spec, backend, solver, &SynthesisOptions::default())
}

/// Synthesize a consistent shield automaton.
///
/// Parses the property, builds the abstraction, registers the pre-seeded
/// history atoms and runs the refinement loop to a fixpoint.
pub fn synthesize_with<B, S>(
    spec: &Specification,
    backend: &B,
    solver: &S,
    options: &SynthesisOptions,
) -> Result<SynthesisResult>
where
    B: SynthesisBackend,
    S: TheorySolver,
{
    let property = spec.parse_property()?;
    info!("parsed property: {}", property);

    let mut boolizer = Booleanizer::new(&spec.variables);
    boolizer.set_formula(&property)?;
    for atom in spec.parse_fetch_atoms()? {
        boolizer.create_tmp_assumption_for(&atom)?;
    }

    let mut reporter = Reporter::new(spec.display_name(), options.report_dir.clone());
    let (automaton, status) = cegar::run(&mut boolizer, backend, solver, options, &mut reporter)?;
    reporter.dump()?;
    Ok(SynthesisResult { status, automaton })
}
