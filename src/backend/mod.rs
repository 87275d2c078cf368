//! Contract of the external Boolean synthesis backend.

pub mod strix;

use crate::error::Result;

pub use strix::StrixBackend;

/// A finite-state LTL synthesizer over a literal alphabet.
///
/// Given the abstracted formula and the ordered environment/system literal
/// partitions, an implementation returns the raw HOA text of a Mealy
/// automaton tagged with a realizability verdict. Any failure is fatal for
/// the whole run; there is nothing to retry.
pub trait SynthesisBackend {
    fn synthesize(&self, formula: &str, inputs: &[String], outputs: &[String]) -> Result<String>;
}
