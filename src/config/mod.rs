//! # Declarative Service Configuration
//!
//! ## Responsibility
//! Parse and validate TOML service configuration files. Users define the
//! whole competition declaratively and run it with:
//! ```text
//! cargo run -- --config evolution.toml
//! ```
//!
//! ## Guarantees
//! - Deterministic: same TOML input always produces the same `ServiceConfig`
//! - Validated: all semantic constraints are checked before a config is accepted
//! - Type-safe: invalid field combinations are caught at parse time via serde
//! - Schema-exportable: JSON Schema output enables IDE autocomplete
//!
//! ## NOT Responsible For
//! - Building the engine from config (that belongs to `main`)
//! - Talking to model endpoints (that belongs to `worker`)

pub mod loader;
pub mod validation;

use crate::evolution::{default_gene_bounds, EvolutionConfig};
use crate::fitness::{FitnessWeights, SandboxConfig};
use crate::TaskSpec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ── Default value functions ──────────────────────────────────────────────

/// Default HTTP listen address.
fn default_listen_addr() -> String {
    "0.0.0.0:8000".to_string()
}

/// Default population size per pool.
fn default_population_size() -> usize {
    8
}

/// Default elite count.
fn default_elite_count() -> usize {
    2
}

/// Default per-gene mutation probability.
fn default_mutation_rate() -> f64 {
    0.2
}

/// Default mutation noise strength relative to gene range.
fn default_mutation_strength() -> f64 {
    0.1
}

/// Default crossover probability.
fn default_crossover_rate() -> f64 {
    0.7
}

/// Default generation budget.
fn default_max_generations() -> usize {
    50
}

/// Default pause between generations: none.
fn default_generation_delay_ms() -> u64 {
    0
}

/// Default PRNG seed.
fn default_seed() -> u64 {
    42
}

/// Default sandbox interpreter.
fn default_interpreter() -> String {
    "python3".to_string()
}

/// Default sandbox timeout: 5000ms.
fn default_sandbox_timeout_ms() -> u64 {
    5000
}

/// Default captured-output cap: 64 KiB.
fn default_max_output_bytes() -> usize {
    64 * 1024
}

/// Default fitness weights mirror [`FitnessWeights::default`].
fn default_syntax_weight() -> f64 {
    0.2
}
fn default_execution_weight() -> f64 {
    0.3
}
fn default_security_weight() -> f64 {
    0.2
}
fn default_reasoning_weight() -> f64 {
    0.2
}
fn default_efficiency_weight() -> f64 {
    0.1
}

/// Default auto-retire threshold for agent pruning sweeps.
fn default_retire_threshold() -> f64 {
    0.3
}

// ── Top-level config ─────────────────────────────────────────────────────

/// Root configuration for one service instance.
///
/// Deserialized from a TOML file and validated before use.
/// Every field has either a required value or a documented default.
///
/// # Example
///
/// ```toml
/// [service]
/// name = "r1-vs-qwen"
///
/// [task]
/// name = "ransomware_detection"
/// description = "Detect ransomware-like file activity"
/// constraints = "Python 3, stdlib only"
///
/// [[pool]]
/// id = "r1"
/// model = "deepseek-r1"
/// endpoint = "http://localhost:11434/v1"
///
/// [[pool]]
/// id = "qwen"
/// model = "qwen2.5-coder"
/// endpoint = "http://localhost:11435/v1"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ServiceConfig {
    /// Service identity and HTTP settings.
    pub service: ServiceSection,
    /// The task the pools compete on.
    pub task: TaskSection,
    /// Competing pools (two or three).
    #[serde(rename = "pool")]
    pub pools: Vec<PoolSection>,
    /// Genetic-algorithm parameters.
    #[serde(default)]
    pub evolution: EvolutionSection,
    /// Sandbox execution limits.
    #[serde(default)]
    pub sandbox: SandboxSection,
    /// Fitness weighting.
    #[serde(default)]
    pub fitness: FitnessSection,
    /// Agent lifecycle settings.
    #[serde(default)]
    pub lifecycle: LifecycleSection,
    /// Observability: logging format.
    #[serde(default)]
    pub observability: ObservabilitySection,
}

// ── Sections ─────────────────────────────────────────────────────────────

/// Service identity and HTTP settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ServiceSection {
    /// Human-readable run name (e.g., "r1-vs-qwen").
    pub name: String,
    /// Address the control-plane API listens on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

/// The task definition fed to every model.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TaskSection {
    /// Short task name.
    pub name: String,
    /// Task domain; empty falls back to the default domain.
    #[serde(default)]
    pub domain: String,
    /// Full problem description.
    pub description: String,
    /// Constraints appended to the prompt.
    #[serde(default)]
    pub constraints: String,
}

impl TaskSection {
    /// Build the runtime task from this section.
    pub fn to_task(&self) -> TaskSpec {
        TaskSpec::new(
            self.name.clone(),
            self.domain.clone(),
            self.description.clone(),
            self.constraints.clone(),
        )
    }
}

/// One competing pool bound to a model endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PoolSection {
    /// Pool identifier (e.g., "r1", "qwen").
    pub id: String,
    /// Model name requested from the endpoint.
    pub model: String,
    /// OpenAI-compatible base URL.
    pub endpoint: String,
    /// Environment variable holding the endpoint's API key, if any.
    pub api_key_env: Option<String>,
}

/// Genetic-algorithm parameters.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct EvolutionSection {
    /// Genomes per pool.
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    /// Top genomes preserved each generation.
    #[serde(default = "default_elite_count")]
    pub elite_count: usize,
    /// Per-gene mutation probability (0.0 to 1.0).
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f64,
    /// Mutation noise strength relative to gene range.
    #[serde(default = "default_mutation_strength")]
    pub mutation_strength: f64,
    /// Crossover probability (0.0 to 1.0).
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f64,
    /// Generation budget.
    #[serde(default = "default_max_generations")]
    pub max_generations: usize,
    /// Pause between generations in milliseconds.
    #[serde(default = "default_generation_delay_ms")]
    pub generation_delay_ms: u64,
    /// PRNG seed for reproducible runs.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for EvolutionSection {
    fn default() -> Self {
        Self {
            population_size: default_population_size(),
            elite_count: default_elite_count(),
            mutation_rate: default_mutation_rate(),
            mutation_strength: default_mutation_strength(),
            crossover_rate: default_crossover_rate(),
            max_generations: default_max_generations(),
            generation_delay_ms: default_generation_delay_ms(),
            seed: default_seed(),
        }
    }
}

impl EvolutionSection {
    /// Build the runtime GA configuration from this section.
    pub fn to_evolution_config(&self) -> EvolutionConfig {
        EvolutionConfig {
            population_size: self.population_size,
            elite_count: self.elite_count,
            mutation_rate: self.mutation_rate,
            mutation_strength: self.mutation_strength,
            crossover_rate: self.crossover_rate,
            max_generations: self.max_generations,
            gene_bounds: default_gene_bounds(),
        }
    }

    /// The configured pause between generations.
    pub fn generation_delay(&self) -> Duration {
        Duration::from_millis(self.generation_delay_ms)
    }
}

/// Sandbox execution limits.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SandboxSection {
    /// Interpreter invoked on candidate code.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    /// Hard wall-clock limit per execution, in milliseconds.
    #[serde(default = "default_sandbox_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum bytes of captured stdout/stderr.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            timeout_ms: default_sandbox_timeout_ms(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

impl SandboxSection {
    /// Build the runtime sandbox configuration from this section.
    pub fn to_sandbox_config(&self) -> SandboxConfig {
        SandboxConfig {
            interpreter: self.interpreter.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
            max_output_bytes: self.max_output_bytes,
        }
    }
}

/// Fitness component weights. Must sum to 1.0.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct FitnessSection {
    /// Weight of the structural syntax check.
    #[serde(default = "default_syntax_weight")]
    pub syntax: f64,
    /// Weight of sandboxed execution success.
    #[serde(default = "default_execution_weight")]
    pub execution: f64,
    /// Weight of the banned-operation scan.
    #[serde(default = "default_security_weight")]
    pub security: f64,
    /// Weight of reasoning depth.
    #[serde(default = "default_reasoning_weight")]
    pub reasoning: f64,
    /// Weight of token efficiency.
    #[serde(default = "default_efficiency_weight")]
    pub efficiency: f64,
    /// Additional banned-operation regex patterns, on top of the defaults.
    #[serde(default)]
    pub extra_banned_patterns: Vec<String>,
}

impl Default for FitnessSection {
    fn default() -> Self {
        Self {
            syntax: default_syntax_weight(),
            execution: default_execution_weight(),
            security: default_security_weight(),
            reasoning: default_reasoning_weight(),
            efficiency: default_efficiency_weight(),
            extra_banned_patterns: Vec::new(),
        }
    }
}

impl FitnessSection {
    /// Build the runtime weights from this section.
    pub fn to_weights(&self) -> FitnessWeights {
        FitnessWeights {
            syntax: self.syntax,
            execution: self.execution,
            security: self.security,
            reasoning: self.reasoning,
            efficiency: self.efficiency,
        }
    }

    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        self.syntax + self.execution + self.security + self.reasoning + self.efficiency
    }
}

/// Agent lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct LifecycleSection {
    /// Fitness threshold below which non-root agents are pruned.
    #[serde(default = "default_retire_threshold")]
    pub retire_threshold: f64,
}

impl Default for LifecycleSection {
    fn default() -> Self {
        Self {
            retire_threshold: default_retire_threshold(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ObservabilitySection {
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Supported log output formats.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable output for development.
    #[default]
    Pretty,
    /// Structured JSON for log aggregation.
    Json,
}

// ── Schema export ────────────────────────────────────────────────────────

/// Export the configuration schema as pretty-printed JSON Schema.
///
/// # Errors
///
/// Returns an error if JSON serialisation fails (it does not for this type).
pub fn export_schema() -> Result<String, serde_json::Error> {
    let schema = schemars::schema_for!(ServiceConfig);
    serde_json::to_string_pretty(&schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evolution_section_defaults() {
        let section = EvolutionSection::default();
        assert_eq!(section.population_size, 8);
        assert_eq!(section.elite_count, 2);
        assert!((section.mutation_rate - 0.2).abs() < f64::EPSILON);
        assert_eq!(section.max_generations, 50);
    }

    #[test]
    fn test_fitness_section_defaults_sum_to_one() {
        let section = FitnessSection::default();
        assert!((section.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sandbox_section_to_config() {
        let section = SandboxSection {
            interpreter: "sh".into(),
            timeout_ms: 1500,
            max_output_bytes: 2048,
        };
        let config = section.to_sandbox_config();
        assert_eq!(config.interpreter, "sh");
        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert_eq!(config.max_output_bytes, 2048);
    }

    #[test]
    fn test_task_section_to_task_normalises_domain() {
        let section = TaskSection {
            name: "t".into(),
            domain: "  Security  ".into(),
            description: "d".into(),
            constraints: String::new(),
        };
        assert_eq!(section.to_task().domain, "security");
    }

    #[test]
    fn test_log_format_default_is_pretty() {
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }

    #[test]
    fn test_export_schema_mentions_sections() {
        let schema = export_schema().unwrap();
        assert!(schema.contains("ServiceConfig"));
        assert!(schema.contains("population_size"));
        assert!(schema.contains("retire_threshold"));
    }
}
