//! # competitive-evolution
//!
//! A backend engine for competitive evolution of LLM-generated code.
//!
//! ## Architecture
//!
//! Two (or three) pools of genomes — each genome a set of sampling
//! parameters for one model endpoint — compete on the same task:
//! ```text
//! TaskSpec → ModelWorker → parse → Sandbox fitness → LineageTracker
//!              ▲                                          │
//!              └── Pool evolution (select/cross/mutate) ──┘
//! ```
//! A REST control plane ([`api`]) exposes the run to the frontend panes,
//! and every generation is scored by the sandboxed [`fitness`] evaluator.

// ── Lint policy ────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(missing_docs)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub mod api;
pub mod artifact;
pub mod config;
pub mod evolution;
pub mod fitness;
pub mod lifecycle;
pub mod lineage;
pub mod metrics;
pub mod tagging;
pub mod worker;

// Re-exports for convenience
pub use evolution::{CompetitiveEvolution, EvolutionDriver, GenerationSummary};
pub use fitness::{FitnessBreakdown, FitnessEvaluator};
pub use lifecycle::LifecycleManager;
pub use lineage::LineageTracker;
pub use worker::{ModelWorker, OpenAiCompatWorker, ScriptedWorker};

/// Default domain assigned to tasks and solutions that do not specify one.
pub const DEFAULT_DOMAIN: &str = "code";

/// Initialise the global tracing subscriber.
///
/// Reads the `LOG_FORMAT` environment variable to choose output format:
/// - `"json"` — structured JSON output for production log aggregators
/// - anything else (including unset) — human-readable pretty output
///
/// Filter level is controlled by `RUST_LOG` (e.g. `RUST_LOG=info`).
///
/// # Errors
///
/// Returns [`EvolutionError::Other`] if the global subscriber has already
/// been set (e.g. by a previous call or a test harness).
pub fn init_tracing() -> Result<(), EvolutionError> {
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let result = match format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_current_span(true)
            .with_span_list(true)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init(),
    };

    result.map_err(|e| EvolutionError::Other(format!("tracing init failed: {e}")))
}

/// Top-level errors for the evolution engine.
///
/// Every error surface — inference, sandboxing, lineage, lifecycle,
/// configuration — is mapped to a variant here.
#[derive(Error, Debug)]
pub enum EvolutionError {
    /// An internal channel closed unexpectedly, indicating task shutdown.
    #[error("channel closed unexpectedly")]
    ChannelClosed,

    /// An LLM inference call failed (network, API, or parsing error).
    #[error("inference failed: {0}")]
    Inference(String),

    /// Sandboxed code execution failed to launch or be collected.
    ///
    /// Candidate code that merely exits non-zero or times out is *not* an
    /// error — that is a fitness signal. This variant covers infrastructure
    /// failures (spawn errors, I/O on the scratch directory).
    #[error("sandbox failure: {0}")]
    Sandbox(String),

    /// A configuration value is missing or invalid.
    ///
    /// Returned at construction time so misconfiguration surfaces
    /// immediately rather than at the first generation.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Pool population operation failed.
    #[error(transparent)]
    Pool(#[from] evolution::PoolError),

    /// Lineage graph operation failed.
    #[error(transparent)]
    Lineage(#[from] lineage::LineageError),

    /// Agent lifecycle operation failed.
    #[error(transparent)]
    Lifecycle(#[from] lifecycle::LifecycleError),

    /// Catch-all for errors that do not fit a specific variant.
    #[error("{0}")]
    Other(String),
}

/// Identifier of a competing pool (e.g. `"r1"`, `"qwen"`).
///
/// Two pools compete head-to-head each generation; a third pool is
/// supported for three-way runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolId(
    /// The raw pool name, as configured.
    pub String,
);

impl PoolId {
    /// Create a new [`PoolId`] from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the pool ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PoolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The problem a generation competes on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Unique task identifier.
    pub id: String,
    /// Short human-readable name (e.g. `"ransomware_detection"`).
    pub name: String,
    /// Domain/category of the task; normalised to lowercase, defaults to
    /// [`DEFAULT_DOMAIN`].
    pub domain: String,
    /// Full problem description fed to the models.
    pub description: String,
    /// Constraints appended to the prompt.
    pub constraints: String,
}

impl TaskSpec {
    /// Build a task, normalising the domain to a lowercase token.
    ///
    /// An empty domain falls back to [`DEFAULT_DOMAIN`].
    pub fn new(
        name: impl Into<String>,
        domain: impl Into<String>,
        description: impl Into<String>,
        constraints: impl Into<String>,
    ) -> Self {
        let domain = domain.into();
        let domain = if domain.trim().is_empty() {
            DEFAULT_DOMAIN.to_string()
        } else {
            domain.trim().to_lowercase()
        };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            domain,
            description: description.into(),
            constraints: constraints.into(),
        }
    }

    /// Render the prompt sent to every model worker for this task.
    pub fn prompt(&self) -> String {
        format!(
            "Task: {}\nConstraints: {}\nProvide a solution with code and reasoning.",
            self.description, self.constraints
        )
    }
}

/// A candidate solution produced by one model in one generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    /// Unique solution identifier.
    pub id: String,
    /// Pool this solution belongs to.
    pub pool: PoolId,
    /// Model name that produced it (e.g. `"deepseek-r1"`).
    pub model: String,
    /// Extracted code block.
    pub code: String,
    /// Reasoning text outside the code fences.
    pub reasoning: String,
    /// Composite fitness score in `[0.0, 1.0]`.
    pub fitness: f64,
    /// Generation this solution was produced in.
    pub generation: usize,
    /// Number of reasoning steps (line count of the reasoning trace).
    pub reasoning_steps: usize,
    /// Token cost reported by the endpoint, or estimated.
    pub token_cost: usize,
    /// Parent solution IDs (lineage).
    pub parent_ids: Vec<String>,
    /// Task this solution answers.
    pub task_id: String,
    /// Domain inherited from the task.
    pub domain: String,
    /// Wall-clock inference latency in milliseconds.
    pub execution_time_ms: u64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Solution {
    /// Clamp fitness into `[0.0, 1.0]`.
    ///
    /// Scores from the evaluator are already in range; this is the
    /// invariant guard for values arriving over the API.
    pub fn set_fitness(&mut self, fitness: f64) {
        self.fitness = fitness.clamp(0.0, 1.0);
    }
}

/// Code and reasoning extracted from a raw model response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    /// Contents of the first fenced code block, language line stripped.
    pub code: String,
    /// Concatenated text outside code fences.
    pub reasoning: String,
}

/// Split a raw model response into code and reasoning.
///
/// The first fenced block (` ``` `) becomes `code`; a leading language
/// identifier line (`python`, `py`, `rust`, `bash`, `sh`) is stripped.
/// Everything outside the fences is joined as `reasoning`. A response with
/// no fences yields empty code and the whole text as reasoning.
pub fn parse_model_response(text: &str) -> ParsedResponse {
    let mut parsed = ParsedResponse::default();
    let parts: Vec<&str> = text.split("```").collect();

    // Odd indices are fenced blocks; take the first.
    for (i, part) in parts.iter().enumerate() {
        if i % 2 == 1 {
            let trimmed = part.trim();
            let mut lines = trimmed.lines();
            match lines.next() {
                Some(first)
                    if matches!(first.trim(), "python" | "py" | "rust" | "bash" | "sh") =>
                {
                    parsed.code = lines.collect::<Vec<_>>().join("\n");
                }
                _ => parsed.code = trimmed.to_string(),
            }
            break;
        }
    }

    let reasoning_parts: Vec<&str> = parts
        .iter()
        .enumerate()
        .filter(|(i, _)| i % 2 == 0)
        .map(|(_, p)| p.trim())
        .filter(|p| !p.is_empty())
        .collect();
    parsed.reasoning = reasoning_parts.join(" ");

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_extracts_fenced_code() {
        let text = "Here is my approach.\n```python\nprint('hi')\n```\nDone.";
        let parsed = parse_model_response(text);
        assert_eq!(parsed.code, "print('hi')");
        assert_eq!(parsed.reasoning, "Here is my approach. Done.");
    }

    #[test]
    fn test_parse_response_without_language_line() {
        let text = "```\nlet x = 1;\n```";
        let parsed = parse_model_response(text);
        assert_eq!(parsed.code, "let x = 1;");
    }

    #[test]
    fn test_parse_response_no_fences_is_all_reasoning() {
        let parsed = parse_model_response("just prose, no code");
        assert!(parsed.code.is_empty());
        assert_eq!(parsed.reasoning, "just prose, no code");
    }

    #[test]
    fn test_parse_response_takes_first_block_only() {
        let text = "```py\nfirst\n```\nmiddle\n```py\nsecond\n```";
        let parsed = parse_model_response(text);
        assert_eq!(parsed.code, "first");
        assert!(parsed.reasoning.contains("middle"));
    }

    #[test]
    fn test_parse_response_rust_language_line_stripped() {
        let text = "```rust\nfn main() {}\n```";
        let parsed = parse_model_response(text);
        assert_eq!(parsed.code, "fn main() {}");
    }

    #[test]
    fn test_parse_response_multiline_code_preserved() {
        let text = "```python\nimport re\n\ndef scan(log):\n    return re.findall(r'enc', log)\n```";
        let parsed = parse_model_response(text);
        assert!(parsed.code.starts_with("import re"));
        assert!(parsed.code.contains("def scan(log):"));
    }

    #[test]
    fn test_task_spec_normalises_domain() {
        let task = TaskSpec::new("t", "  Cyber_DFIR ", "desc", "none");
        assert_eq!(task.domain, "cyber_dfir");
    }

    #[test]
    fn test_task_spec_empty_domain_defaults() {
        let task = TaskSpec::new("t", "   ", "desc", "none");
        assert_eq!(task.domain, DEFAULT_DOMAIN);
    }

    #[test]
    fn test_task_prompt_contains_description_and_constraints() {
        let task = TaskSpec::new("t", "code", "detect ransomware", "handle large logs");
        let prompt = task.prompt();
        assert!(prompt.contains("detect ransomware"));
        assert!(prompt.contains("handle large logs"));
    }

    #[test]
    fn test_solution_set_fitness_clamps() {
        let mut sol = Solution {
            id: "s1".into(),
            pool: PoolId::new("r1"),
            model: "m".into(),
            code: String::new(),
            reasoning: String::new(),
            fitness: 0.0,
            generation: 0,
            reasoning_steps: 0,
            token_cost: 0,
            parent_ids: vec![],
            task_id: "t1".into(),
            domain: DEFAULT_DOMAIN.into(),
            execution_time_ms: 0,
            created_at: Utc::now(),
        };
        sol.set_fitness(1.7);
        assert!((sol.fitness - 1.0).abs() < f64::EPSILON);
        sol.set_fitness(-0.2);
        assert!(sol.fitness.abs() < f64::EPSILON);
    }

    #[test]
    fn test_pool_id_display_and_as_str() {
        let pool = PoolId::new("qwen");
        assert_eq!(pool.as_str(), "qwen");
        assert_eq!(pool.to_string(), "qwen");
    }

    #[test]
    fn test_config_error_display_includes_message() {
        let err = EvolutionError::ConfigError("pool endpoint not set".to_string());
        assert!(err.to_string().contains("pool endpoint not set"));
    }

    #[test]
    fn test_init_tracing_second_call_returns_err() {
        // First call may succeed or fail depending on test execution order.
        let _ = init_tracing();
        let result = init_tracing();
        assert!(result.is_err(), "double init must return Err, not panic");
    }
}
