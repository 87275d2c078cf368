//! Invocation of the external `strix` synthesizer as a child process.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::backend::SynthesisBackend;
use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Calls the `strix` binary with the abstracted formula and captures its
/// HOA output, enforcing an optional wall-clock budget.
pub struct StrixBackend {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl StrixBackend {
    pub fn new(program: PathBuf, timeout: Option<Duration>) -> Self {
        Self { program, timeout }
    }
}

impl SynthesisBackend for StrixBackend {
    fn synthesize(&self, formula: &str, inputs: &[String], outputs: &[String]) -> Result<String> {
        let ins = inputs.join(",");
        let outs = outputs.join(",");
        info!(
            "{} -f '{}' --ins={} --outs={} -o hoa",
            self.program.display(),
            formula,
            ins,
            outs
        );

        let start = Instant::now();
        let mut child = Command::new(&self.program)
            .arg("-f")
            .arg(formula)
            .arg(format!("--ins={}", ins))
            .arg(format!("--outs={}", outs))
            .arg("-o")
            .arg("hoa")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Backend {
                message: format!("failed to spawn {}: {}", self.program.display(), e),
                elapsed: start.elapsed(),
            })?;

        let mut stdout = child.stdout.take().expect("stdout is piped");
        let mut stderr = child.stderr.take().expect("stderr is piped");
        let stdout_reader = thread::spawn(move || {
            let mut buffer = String::new();
            stdout.read_to_string(&mut buffer).map(|_| buffer)
        });
        let stderr_reader = thread::spawn(move || {
            let mut buffer = String::new();
            stderr.read_to_string(&mut buffer).map(|_| buffer)
        });

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if let Some(timeout) = self.timeout {
                        if start.elapsed() >= timeout {
                            let _ = child.kill();
                            let _ = child.wait();
                            return Err(Error::BackendTimeout(start.elapsed()));
                        }
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    return Err(Error::Backend {
                        message: format!("waiting for backend: {}", e),
                        elapsed: start.elapsed(),
                    })
                }
            }
        };
        let elapsed = start.elapsed();
        debug!("backend returned after {:.2?}", elapsed);

        let output = stdout_reader
            .join()
            .unwrap_or_else(|_| Ok(String::new()))
            .unwrap_or_default();
        let errors = stderr_reader
            .join()
            .unwrap_or_else(|_| Ok(String::new()))
            .unwrap_or_default();

        if !status.success() {
            return Err(Error::Backend {
                message: format!("exit status {}: {}", status, errors.trim()),
                elapsed,
            });
        }
        Ok(output)
    }
}
