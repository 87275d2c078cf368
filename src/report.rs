//! Per-run report of backend calls, for later benchmarking.

use std::path::PathBuf;
use std::time::Duration;

use fs_err as fs;
use log::debug;
use serde::Serialize;

use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
pub struct CallRecord {
    pub property: String,
    pub env_literals: Vec<String>,
    pub sys_literals: Vec<String>,
    pub elapsed_secs: f64,
    pub verdict: String,
}

/// Collects one record per synthesis call and dumps them as JSON when the
/// run finishes or aborts. With no report directory configured the
/// reporter is inert.
#[derive(Debug)]
pub struct Reporter {
    name: String,
    dir: Option<PathBuf>,
    calls: Vec<CallRecord>,
}

impl Reporter {
    pub fn new(name: impl Into<String>, dir: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            dir,
            calls: Vec::new(),
        }
    }

    pub fn record(
        &mut self,
        property: String,
        env_literals: Vec<String>,
        sys_literals: Vec<String>,
        elapsed: Duration,
        verdict: impl Into<String>,
    ) {
        if self.dir.is_none() {
            return;
        }
        self.calls.push(CallRecord {
            property,
            env_literals,
            sys_literals,
            elapsed_secs: (elapsed.as_secs_f64() * 100.0).round() / 100.0,
            verdict: verdict.into(),
        });
    }

    pub fn dump(&self) -> Result<()> {
        let dir = match &self.dir {
            Some(dir) => dir,
            None => return Ok(()),
        };
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", self.name));
        debug!("writing report to {}", path.display());
        let rendered = serde_json::to_string_pretty(&self.calls)?;
        fs::write(path, rendered)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inert_without_a_directory() {
        let mut reporter = Reporter::new("spec", None);
        reporter.record(
            "G(l0)".into(),
            vec![],
            vec!["l0".into()],
            Duration::from_millis(1500),
            "REALIZABLE",
        );
        assert!(reporter.calls.is_empty());
        reporter.dump().unwrap();
    }

    #[test]
    fn dumps_recorded_calls() {
        let dir = tempfile::tempdir().unwrap();
        let mut reporter = Reporter::new("spec", Some(dir.path().to_path_buf()));
        reporter.record(
            "G(l0)".into(),
            vec![],
            vec!["l0".into()],
            Duration::from_millis(1500),
            "REALIZABLE",
        );
        reporter.dump().unwrap();
        let written = fs::read_to_string(dir.path().join("spec.json")).unwrap();
        assert!(written.contains("REALIZABLE"));
        assert!(written.contains("1.5"));
    }
}
