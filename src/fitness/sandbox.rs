//! Sandboxed execution of candidate code.
//!
//! Candidate code runs as a child process inside a fresh scratch directory
//! with a scrubbed environment and a hard wall-clock timeout. Exceeding the
//! timeout kills the child; a non-zero exit is reported, not raised.

use crate::EvolutionError;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

/// Sandbox settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Interpreter invoked on the candidate file (e.g. `"python3"`, `"sh"`).
    pub interpreter: String,
    /// Hard wall-clock limit for a single execution.
    pub timeout: Duration,
    /// Maximum bytes of stdout/stderr retained in the report.
    pub max_output_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            timeout: Duration::from_secs(5),
            max_output_bytes: 64 * 1024,
        }
    }
}

/// Outcome of one sandboxed execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Whether the process exited with status 0.
    pub exit_ok: bool,
    /// Whether the wall-clock limit was hit (the child was killed).
    pub timed_out: bool,
    /// Captured stdout, truncated to the configured limit.
    pub stdout: String,
    /// Captured stderr, truncated to the configured limit.
    pub stderr: String,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
}

impl ExecutionReport {
    /// Binary execution score: 1.0 for a clean exit, 0.0 otherwise.
    pub fn score(&self) -> f64 {
        if self.exit_ok && !self.timed_out {
            1.0
        } else {
            0.0
        }
    }
}

/// Executes candidate code in an isolated scratch directory.
///
/// Cheap to clone; holds only configuration.
#[derive(Debug, Clone)]
pub struct CodeSandbox {
    config: SandboxConfig,
}

impl CodeSandbox {
    /// Create a sandbox with the given configuration.
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// The configured wall-clock limit.
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Run `code` under the configured interpreter.
    ///
    /// The code is written to a file inside a fresh temporary directory,
    /// which is also the working directory of the child. The environment is
    /// cleared except `PATH`. On timeout the child is killed and the report
    /// records `timed_out = true` with a zero score.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::Sandbox`] only for infrastructure failures
    /// (scratch dir creation, spawn). Candidate failures are fitness
    /// signals carried in the report.
    pub async fn execute(&self, code: &str) -> Result<ExecutionReport, EvolutionError> {
        let scratch = tempfile::tempdir()
            .map_err(|e| EvolutionError::Sandbox(format!("scratch dir: {e}")))?;
        let file_path = scratch.path().join("candidate");
        tokio::fs::write(&file_path, code)
            .await
            .map_err(|e| EvolutionError::Sandbox(format!("write candidate: {e}")))?;

        let path_var = std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".to_string());

        let start = Instant::now();
        let child = Command::new(&self.config.interpreter)
            .arg(&file_path)
            .current_dir(scratch.path())
            .env_clear()
            .env("PATH", path_var)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EvolutionError::Sandbox(format!(
                    "spawn {}: {e}",
                    self.config.interpreter
                ))
            })?;

        let output = tokio::time::timeout(self.config.timeout, child.wait_with_output()).await;

        let duration_ms = start.elapsed().as_millis() as u64;

        match output {
            Ok(Ok(output)) => {
                let report = ExecutionReport {
                    exit_ok: output.status.success(),
                    timed_out: false,
                    stdout: truncate_output(&output.stdout, self.config.max_output_bytes),
                    stderr: truncate_output(&output.stderr, self.config.max_output_bytes),
                    duration_ms,
                };
                debug!(
                    exit_ok = report.exit_ok,
                    duration_ms = report.duration_ms,
                    "sandbox run finished"
                );
                Ok(report)
            }
            Ok(Err(e)) => Err(EvolutionError::Sandbox(format!("collect output: {e}"))),
            Err(_) => {
                // kill_on_drop reaps the child when the future is dropped.
                warn!(
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "sandbox run timed out"
                );
                Ok(ExecutionReport {
                    exit_ok: false,
                    timed_out: true,
                    stdout: String::new(),
                    stderr: format!(
                        "execution timed out after {}ms",
                        self.config.timeout.as_millis()
                    ),
                    duration_ms,
                })
            }
        }
    }
}

/// Lossily decode and truncate captured output.
fn truncate_output(bytes: &[u8], max: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= max {
        text.into_owned()
    } else {
        let mut cut = max;
        while cut > 0 && !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}… [truncated]", &text[..cut])
    }
}
