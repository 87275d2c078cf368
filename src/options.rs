//! Options for the synthesis procedure and the command-line interface.

use std::fmt;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// The trace level / verbosity for the logging framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TraceLevel {
    /// Turn logging off.
    Off,
    /// Only print errors.
    #[default]
    Error,
    /// Print errors and warnings.
    Warn,
    /// Print errors, warnings and useful information.
    Info,
    /// Print errors, warnings, useful and debug information.
    Debug,
    /// Print all information, including very verbose output.
    Trace,
}

impl fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TraceLevel::Off => "off",
            TraceLevel::Error => "error",
            TraceLevel::Warn => "warn",
            TraceLevel::Info => "info",
            TraceLevel::Debug => "debug",
            TraceLevel::Trace => "trace",
        };
        write!(f, "{}", name)
    }
}

impl From<TraceLevel> for log::LevelFilter {
    fn from(level: TraceLevel) -> Self {
        match level {
            TraceLevel::Off => Self::Off,
            TraceLevel::Error => Self::Error,
            TraceLevel::Warn => Self::Warn,
            TraceLevel::Info => Self::Info,
            TraceLevel::Debug => Self::Debug,
            TraceLevel::Trace => Self::Trace,
        }
    }
}

/// Options controlling one synthesis run.
#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    /// Path of the external synthesizer binary.
    pub backend: PathBuf,
    /// Wall-clock budget in seconds for each backend call.
    pub backend_timeout: Option<u64>,
    /// Maximum number of inconsistent edges tolerated within one
    /// refinement round before the run is declared failed.
    pub tolerance: u32,
    /// Where to write per-call reports; `None` disables reporting.
    pub report_dir: Option<PathBuf>,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            backend: PathBuf::from("strix"),
            backend_timeout: None,
            tolerance: 64,
            report_dir: None,
        }
    }
}

/// Command-line interface of the `aegis` binary.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    /// Trace level.
    #[arg(
        short = 't',
        long = "trace",
        value_enum,
        default_value_t,
        global = true
    )]
    pub trace_level: TraceLevel,
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Synthesize a shield automaton from a specification.
    Synth(SynthArgs),
    /// Run a synthesized shield on a stream of proposed responses.
    Shield(ShieldArgs),
}

#[derive(Debug, Args)]
pub struct SynthArgs {
    /// YAML file with the specification.
    #[arg(long = "spec")]
    pub spec: PathBuf,
    /// External synthesizer binary.
    #[arg(long = "backend", default_value = "strix")]
    pub backend: PathBuf,
    /// Maximum seconds per backend call.
    #[arg(long = "backend-timeout")]
    pub backend_timeout: Option<u64>,
    /// Maximum inconsistent edges per refinement round.
    #[arg(long = "tolerance", default_value_t = 64)]
    pub tolerance: u32,
    /// Reports root directory.
    #[arg(long = "report-dir")]
    pub report_dir: Option<PathBuf>,
    /// Save the converged automaton to this file.
    #[arg(long = "save-mealy")]
    pub save_mealy: Option<PathBuf>,
    /// Print the converged automaton in dot format.
    #[arg(long = "show-mealy")]
    pub show_mealy: bool,
}

impl From<&SynthArgs> for SynthesisOptions {
    fn from(args: &SynthArgs) -> Self {
        Self {
            backend: args.backend.clone(),
            backend_timeout: args.backend_timeout,
            tolerance: args.tolerance,
            report_dir: args.report_dir.clone(),
        }
    }
}

#[derive(Debug, Args)]
pub struct ShieldArgs {
    /// File with the persisted automaton.
    #[arg(long = "mealy")]
    pub mealy: PathBuf,
}
