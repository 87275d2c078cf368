//! Aegis binary crate.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use aegis::automaton::persist::MealyRecord;
use aegis::backend::StrixBackend;
use aegis::options::{Cli, CliCommand, ShieldArgs, SynthArgs, SynthesisOptions, TraceLevel};
use aegis::shield::Shield;
use aegis::theory::solver::Assignment;
use aegis::theory::z3::Z3Solver;
use aegis::{synthesize_with, Specification};

fn main() {
    if let Err(error) = aegis_main() {
        // discard result as we cannot further propagate a write error
        let _ = writeln!(io::stderr(), "Error: {}", error);
        std::process::exit(1);
    }
}

/// Initialize the logging framework with the given trace level.
fn initialize_logging(level: TraceLevel) -> io::Result<()> {
    env_logger::builder()
        .filter(None, level.into())
        .format_timestamp_millis()
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e))
}

fn aegis_main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    initialize_logging(cli.trace_level)?;
    match cli.command {
        CliCommand::Synth(args) => synth_main(&args),
        CliCommand::Shield(args) => shield_main(&args),
    }
}

fn synth_main(args: &SynthArgs) -> Result<(), Box<dyn std::error::Error>> {
    let spec = Specification::from_yaml_file(&args.spec)?;
    let options = SynthesisOptions::from(args);
    let backend = StrixBackend::new(
        options.backend.clone(),
        options.backend_timeout.map(Duration::from_secs),
    );
    let solver = Z3Solver::new();
    let result = synthesize_with(&spec, &backend, &solver, &options)?;

    writeln!(io::stdout(), "{}", result.status)?;
    if args.show_mealy {
        writeln!(io::stdout(), "{}", result.automaton.to_dot()?)?;
    }
    if let Some(path) = &args.save_mealy {
        let record =
            MealyRecord::from_graph(&result.automaton, spec.name.clone(), spec.variables.clone());
        record.save(path)?;
    }
    Ok(())
}

/// One line of the runtime stream: the environment assignment and the
/// proposed system response.
#[derive(Debug, Deserialize)]
struct StepRecord {
    env: Assignment,
    #[serde(default)]
    proposed: Assignment,
}

fn shield_main(args: &ShieldArgs) -> Result<(), Box<dyn std::error::Error>> {
    let record = MealyRecord::load(&args.mealy)?;
    let mut shield = Shield::from_record(record)?;
    let solver = Z3Solver::new();

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let step: StepRecord = serde_json::from_str(&line)?;
        let response = shield.step(&solver, &step.env, &step.proposed)?;
        writeln!(out, "{}", serde_json::to_string(&response)?)?;
    }
    Ok(())
}
