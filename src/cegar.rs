//! Abstraction-refinement driver.
//!
//! Repeatedly hands the current abstraction to the synthesis backend,
//! checks every edge (and, with temporal lookback, every consecutive edge
//! pair) of the returned automaton against the real theory, and feeds the
//! learned facts back into the abstraction until a fully consistent
//! automaton appears or the inconsistency budget runs out.

use std::time::Instant;

use log::{debug, info};

use crate::abstraction::Booleanizer;
use crate::automaton::{hoa, AutomatonGraph};
use crate::backend::SynthesisBackend;
use crate::checker::ConsistencyChecker;
use crate::error::{Error, Result};
use crate::options::SynthesisOptions;
use crate::report::Reporter;
use crate::theory::solver::TheorySolver;
use crate::Status;

/// Driver state: one terminal for success, one for an exhausted budget.
enum CegarState {
    Running,
    Converged(AutomatonGraph, Status),
    Failed(u32),
}

/// Run the refinement loop to a fixpoint.
pub fn run<B, S>(
    boolizer: &mut Booleanizer,
    backend: &B,
    solver: &S,
    options: &SynthesisOptions,
    reporter: &mut Reporter,
) -> Result<(AutomatonGraph, Status)>
where
    B: SynthesisBackend,
    S: TheorySolver,
{
    let mut state = CegarState::Running;
    loop {
        match state {
            CegarState::Running => {
                state = iteration(boolizer, backend, solver, options, reporter)?;
            }
            CegarState::Converged(automaton, status) => {
                info!("abstraction converged, property is {}", status);
                return Ok((automaton, status));
            }
            CegarState::Failed(count) => {
                reporter.dump()?;
                return Err(Error::ToleranceExceeded(count));
            }
        }
    }
}

fn iteration<B, S>(
    boolizer: &mut Booleanizer,
    backend: &B,
    solver: &S,
    options: &SynthesisOptions,
    reporter: &mut Reporter,
) -> Result<CegarState>
where
    B: SynthesisBackend,
    S: TheorySolver,
{
    let property = boolizer.bool_formula().to_string();
    let env_literals = boolizer.env_literals();
    let sys_literals = boolizer.sys_literals();
    debug!("literal table:");
    for entry in boolizer.literal_table().iter() {
        debug!("  {} : {} ({})", entry.id, entry.atom, entry.owner);
    }
    info!("backend property: {}", property);

    let started = Instant::now();
    let output = match backend.synthesize(&property, &env_literals, &sys_literals) {
        Ok(output) => output,
        Err(error) => {
            reporter.record(
                property,
                env_literals,
                sys_literals,
                started.elapsed(),
                "UNKNOWN",
            );
            reporter.dump()?;
            return Err(error);
        }
    };
    let (automaton, realizable) = hoa::parse(&output, boolizer.literal_table())?;
    let status = if realizable {
        Status::Realizable
    } else {
        Status::Unrealizable
    };
    reporter.record(
        property,
        env_literals,
        sys_literals,
        started.elapsed(),
        status.to_string(),
    );
    info!(
        "backend automaton has {} nodes, verdict {}",
        automaton.num_nodes(),
        status
    );

    let mut checker = ConsistencyChecker::new(solver, realizable, options.tolerance);
    let theory_consistent = match checker.check_theory(&automaton, boolizer) {
        Ok(consistent) => consistent,
        Err(Error::ToleranceExceeded(count)) => return Ok(CegarState::Failed(count)),
        Err(error) => return Err(error),
    };
    let skip_temporal = boolizer.max_fetch_depth() == 0 || realizable;
    let temporally_consistent = if skip_temporal {
        true
    } else {
        match checker.check_temporal(&automaton, boolizer) {
            Ok(consistent) => consistent,
            Err(Error::ToleranceExceeded(count)) => return Ok(CegarState::Failed(count)),
            Err(error) => return Err(error),
        }
    };

    if theory_consistent && temporally_consistent {
        Ok(CegarState::Converged(automaton, status))
    } else {
        info!(
            "{} inconsistencies this round, resynthesizing",
            checker.inconsistencies()
        );
        Ok(CegarState::Running)
    }
}
