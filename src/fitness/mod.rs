//! # Fitness evaluation
//!
//! ## Responsibility
//! Score candidate solutions with a weighted composite of five signals:
//! syntax validity, sandboxed execution, security scan, reasoning depth,
//! and token efficiency.
//!
//! ## Guarantees
//! - Every component score and the composite are in `[0.0, 1.0]`
//! - Empty code short-circuits to an all-zero breakdown (no sandbox run)
//! - Candidate misbehavior (crash, timeout) is a score, never an error
//!
//! ## NOT Responsible For
//! - Deciding which solutions survive (that belongs to `evolution`)
//! - Persisting scores (that belongs to `lineage`)

pub mod sandbox;

pub use sandbox::{CodeSandbox, ExecutionReport, SandboxConfig};

use crate::{EvolutionError, Solution};
use regex::RegexSet;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Reasoning depth saturates at this many steps.
const REASONING_SATURATION_STEPS: f64 = 15.0;

/// Token budget beyond which efficiency reaches zero.
const EFFICIENCY_TOKEN_BUDGET: f64 = 3000.0;

/// Default patterns flagged by the security scan.
///
/// Deployments can extend this list via `with_banned_patterns`.
pub const DEFAULT_BANNED_PATTERNS: &[&str] = &[
    r"\beval\s*\(",
    r"\bexec\s*\(",
    r"\bos\.system\s*\(",
    r"\bsubprocess\.",
];

/// Component weights for the composite score.
///
/// Defaults match the production evaluator: syntax 0.2, execution 0.3,
/// security 0.2, reasoning 0.2, efficiency 0.1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitnessWeights {
    /// Weight of the syntax check.
    pub syntax: f64,
    /// Weight of sandboxed execution.
    pub execution: f64,
    /// Weight of the security scan.
    pub security: f64,
    /// Weight of reasoning depth.
    pub reasoning: f64,
    /// Weight of token efficiency.
    pub efficiency: f64,
}

impl Default for FitnessWeights {
    fn default() -> Self {
        Self {
            syntax: 0.2,
            execution: 0.3,
            security: 0.2,
            reasoning: 0.2,
            efficiency: 0.1,
        }
    }
}

impl FitnessWeights {
    /// Sum of all component weights. Validation requires 1.0 ± 1e-6.
    pub fn total(&self) -> f64 {
        self.syntax + self.execution + self.security + self.reasoning + self.efficiency
    }
}

/// Per-component scores plus the weighted composite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitnessBreakdown {
    /// 1.0 if the code passed the structural syntax check.
    pub syntax: f64,
    /// 1.0 if sandboxed execution exited cleanly.
    pub execution: f64,
    /// 1.0 if no banned operation was found.
    pub security: f64,
    /// Reasoning depth, saturating at 15 steps.
    pub reasoning: f64,
    /// Token efficiency relative to a 3000-token budget.
    pub efficiency: f64,
    /// Weighted composite in `[0.0, 1.0]`.
    pub composite: f64,
    /// Execution report from the sandbox, when a run happened.
    pub report: Option<ExecutionReport>,
}

impl FitnessBreakdown {
    fn zero() -> Self {
        Self {
            syntax: 0.0,
            execution: 0.0,
            security: 0.0,
            reasoning: 0.0,
            efficiency: 0.0,
            composite: 0.0,
            report: None,
        }
    }
}

/// Composite fitness evaluator backed by a [`CodeSandbox`].
#[derive(Debug, Clone)]
pub struct FitnessEvaluator {
    sandbox: CodeSandbox,
    weights: FitnessWeights,
    banned: RegexSet,
}

impl FitnessEvaluator {
    /// Build an evaluator with the default banned-operation patterns.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::ConfigError`] if a banned pattern fails to
    /// compile or the weights do not sum to 1.0.
    pub fn new(sandbox: CodeSandbox, weights: FitnessWeights) -> Result<Self, EvolutionError> {
        Self::with_banned_patterns(
            sandbox,
            weights,
            DEFAULT_BANNED_PATTERNS.iter().map(|s| s.to_string()),
        )
    }

    /// Build an evaluator with custom banned-operation patterns.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::ConfigError`] on invalid regexes or
    /// weights that do not sum to 1.0.
    pub fn with_banned_patterns(
        sandbox: CodeSandbox,
        weights: FitnessWeights,
        patterns: impl IntoIterator<Item = String>,
    ) -> Result<Self, EvolutionError> {
        if (weights.total() - 1.0).abs() > 1e-6 {
            return Err(EvolutionError::ConfigError(format!(
                "fitness weights must sum to 1.0, got {}",
                weights.total()
            )));
        }
        let banned = RegexSet::new(patterns)
            .map_err(|e| EvolutionError::ConfigError(format!("banned pattern: {e}")))?;
        Ok(Self {
            sandbox,
            weights,
            banned,
        })
    }

    /// Structural syntax check: 1.0 for plausibly well-formed code.
    ///
    /// Language-agnostic: rejects empty code, unbalanced brackets, and an
    /// odd number of double quotes. Execution remains the authoritative
    /// correctness signal.
    pub fn check_syntax(&self, code: &str) -> f64 {
        if code.trim().is_empty() {
            return 0.0;
        }

        let mut depth_paren: i64 = 0;
        let mut depth_brace: i64 = 0;
        let mut depth_bracket: i64 = 0;
        let mut quotes = 0_usize;

        for ch in code.chars() {
            match ch {
                '(' => depth_paren += 1,
                ')' => depth_paren -= 1,
                '{' => depth_brace += 1,
                '}' => depth_brace -= 1,
                '[' => depth_bracket += 1,
                ']' => depth_bracket -= 1,
                '"' => quotes += 1,
                _ => {}
            }
            if depth_paren < 0 || depth_brace < 0 || depth_bracket < 0 {
                return 0.0;
            }
        }

        if depth_paren == 0 && depth_brace == 0 && depth_bracket == 0 && quotes % 2 == 0 {
            1.0
        } else {
            0.0
        }
    }

    /// Security scan: 1.0 if no banned operation matches.
    pub fn security_scan(&self, code: &str) -> f64 {
        if self.banned.is_match(code) {
            0.0
        } else {
            1.0
        }
    }

    /// Reasoning depth score: `min(steps / 15, 1.0)`.
    pub fn reasoning_score(&self, reasoning_steps: usize) -> f64 {
        (reasoning_steps as f64 / REASONING_SATURATION_STEPS).min(1.0)
    }

    /// Token efficiency score: `max(1 - cost / 3000, 0.0)`.
    pub fn efficiency_score(&self, token_cost: usize) -> f64 {
        (1.0 - token_cost as f64 / EFFICIENCY_TOKEN_BUDGET).max(0.0)
    }

    /// Evaluate a solution and return the full breakdown.
    ///
    /// Empty code short-circuits to an all-zero breakdown without touching
    /// the sandbox.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::Sandbox`] only on sandbox infrastructure
    /// failures; candidate misbehavior is scored, not raised.
    pub async fn evaluate(&self, solution: &Solution) -> Result<FitnessBreakdown, EvolutionError> {
        if solution.code.trim().is_empty() {
            return Ok(FitnessBreakdown::zero());
        }

        let syntax = self.check_syntax(&solution.code);
        let security = self.security_scan(&solution.code);
        let reasoning = self.reasoning_score(solution.reasoning_steps);
        let efficiency = self.efficiency_score(solution.token_cost);

        // A solution that fails the security scan never reaches execution.
        let (execution, report) = if security > 0.0 {
            let report = self.sandbox.execute(&solution.code).await?;
            let outcome = if report.timed_out {
                "timeout"
            } else if report.exit_ok {
                "ok"
            } else {
                "error"
            };
            crate::metrics::inc_sandbox_execution(outcome);
            (report.score(), Some(report))
        } else {
            (0.0, None)
        };

        let composite = syntax * self.weights.syntax
            + execution * self.weights.execution
            + security * self.weights.security
            + reasoning * self.weights.reasoning
            + efficiency * self.weights.efficiency;

        debug!(
            solution = %solution.id,
            syntax,
            execution,
            security,
            reasoning,
            efficiency,
            composite,
            "fitness evaluated"
        );

        Ok(FitnessBreakdown {
            syntax,
            execution,
            security,
            reasoning,
            efficiency,
            composite: composite.clamp(0.0, 1.0),
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PoolId, DEFAULT_DOMAIN};
    use std::time::Duration;

    fn evaluator() -> FitnessEvaluator {
        let sandbox = CodeSandbox::new(SandboxConfig {
            interpreter: "sh".to_string(),
            timeout: Duration::from_secs(5),
            max_output_bytes: 4096,
        });
        FitnessEvaluator::new(sandbox, FitnessWeights::default()).unwrap()
    }

    fn solution(code: &str, reasoning_steps: usize, token_cost: usize) -> Solution {
        Solution {
            id: "s1".into(),
            pool: PoolId::new("r1"),
            model: "m".into(),
            code: code.to_string(),
            reasoning: String::new(),
            fitness: 0.0,
            generation: 1,
            reasoning_steps,
            token_cost,
            parent_ids: vec![],
            task_id: "t1".into(),
            domain: DEFAULT_DOMAIN.into(),
            execution_time_ms: 0,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_check_syntax_balanced_code_passes() {
        let e = evaluator();
        assert!((e.check_syntax("f(x) { y[0] }") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_check_syntax_unbalanced_fails() {
        let e = evaluator();
        assert!(e.check_syntax("f(x { ").abs() < f64::EPSILON);
    }

    #[test]
    fn test_check_syntax_negative_depth_fails() {
        let e = evaluator();
        assert!(e.check_syntax(")(").abs() < f64::EPSILON);
    }

    #[test]
    fn test_check_syntax_odd_quotes_fails() {
        let e = evaluator();
        assert!(e.check_syntax("echo \"oops").abs() < f64::EPSILON);
    }

    #[test]
    fn test_check_syntax_empty_fails() {
        let e = evaluator();
        assert!(e.check_syntax("   ").abs() < f64::EPSILON);
    }

    #[test]
    fn test_security_scan_flags_eval() {
        let e = evaluator();
        assert!(e.security_scan("eval(payload)").abs() < f64::EPSILON);
    }

    #[test]
    fn test_security_scan_flags_os_system() {
        let e = evaluator();
        assert!(e.security_scan("os.system('rm -rf /')").abs() < f64::EPSILON);
    }

    #[test]
    fn test_security_scan_flags_subprocess() {
        let e = evaluator();
        assert!(e.security_scan("subprocess.run(['ls'])").abs() < f64::EPSILON);
    }

    #[test]
    fn test_security_scan_clean_code_passes() {
        let e = evaluator();
        assert!((e.security_scan("print('evaluation done')") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reasoning_score_saturates_at_fifteen() {
        let e = evaluator();
        assert!((e.reasoning_score(30) - 1.0).abs() < f64::EPSILON);
        assert!((e.reasoning_score(15) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reasoning_score_linear_below_saturation() {
        let e = evaluator();
        assert!((e.reasoning_score(3) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_efficiency_score_zero_beyond_budget() {
        let e = evaluator();
        assert!(e.efficiency_score(3000).abs() < f64::EPSILON);
        assert!(e.efficiency_score(9000).abs() < f64::EPSILON);
    }

    #[test]
    fn test_efficiency_score_full_at_zero_cost() {
        let e = evaluator();
        assert!((e.efficiency_score(0) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let sandbox = CodeSandbox::new(SandboxConfig::default());
        let weights = FitnessWeights {
            syntax: 0.5,
            execution: 0.5,
            security: 0.5,
            reasoning: 0.0,
            efficiency: 0.0,
        };
        let result = FitnessEvaluator::new(sandbox, weights);
        assert!(matches!(result, Err(EvolutionError::ConfigError(_))));
    }

    #[test]
    fn test_invalid_banned_pattern_is_config_error() {
        let sandbox = CodeSandbox::new(SandboxConfig::default());
        let result = FitnessEvaluator::with_banned_patterns(
            sandbox,
            FitnessWeights::default(),
            vec!["(unclosed".to_string()],
        );
        assert!(matches!(result, Err(EvolutionError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_evaluate_empty_code_is_all_zero_without_sandbox() {
        let e = evaluator();
        let breakdown = e.evaluate(&solution("", 10, 100)).await.unwrap();
        assert!(breakdown.composite.abs() < f64::EPSILON);
        assert!(breakdown.report.is_none());
    }

    #[tokio::test]
    async fn test_evaluate_clean_solution_scores_high() {
        let e = evaluator();
        // sh: clean exit, balanced, no banned ops, deep reasoning, cheap.
        let breakdown = e
            .evaluate(&solution("echo detect", 15, 0))
            .await
            .unwrap();
        assert!((breakdown.syntax - 1.0).abs() < f64::EPSILON);
        assert!((breakdown.execution - 1.0).abs() < f64::EPSILON);
        assert!((breakdown.security - 1.0).abs() < f64::EPSILON);
        assert!((breakdown.composite - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_evaluate_banned_code_skips_sandbox() {
        let e = evaluator();
        let breakdown = e
            .evaluate(&solution("subprocess.call('x')", 0, 3000))
            .await
            .unwrap();
        assert!(breakdown.security.abs() < f64::EPSILON);
        assert!(breakdown.execution.abs() < f64::EPSILON);
        assert!(breakdown.report.is_none());
    }

    #[tokio::test]
    async fn test_evaluate_failing_code_loses_execution_weight() {
        let e = evaluator();
        let ok = e.evaluate(&solution("exit 0", 15, 0)).await.unwrap();
        let bad = e.evaluate(&solution("exit 1", 15, 0)).await.unwrap();
        assert!((ok.composite - bad.composite - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_breakdown_serializes() {
        let breakdown = FitnessBreakdown::zero();
        let json = serde_json::to_string(&breakdown).unwrap();
        assert!(json.contains("\"composite\":0.0"));
    }
}
