//! Configuration validation engine.
//!
//! ## Responsibility
//! Validate semantic constraints on a parsed [`ServiceConfig`] that cannot
//! be expressed through the type system alone (range checks, cross-field
//! invariants, pool count and uniqueness).
//!
//! ## Guarantees
//! - Every validation rule has at least one test that triggers it
//! - Validation collects *all* errors before returning (no short-circuit)
//! - Error messages include the field path and the invalid value
//!
//! ## NOT Responsible For
//! - Parsing TOML (that belongs to `loader`)
//! - File I/O (that belongs to `loader`)

use super::ServiceConfig;
use std::collections::HashSet;

/// Errors arising from configuration parsing, validation, or I/O.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parsing failed.
    #[error("Parse error in {file}: {source}")]
    Parse {
        /// Path of the file that failed to parse.
        file: String,
        /// Underlying TOML deserialization error.
        #[source]
        source: toml::de::Error,
    },

    /// One or more semantic validation rules failed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A specific field has an out-of-range or contradictory value.
    #[error("Field '{field}' has invalid value {value}: {reason}")]
    InvalidField {
        /// Dot-separated field path (e.g., "evolution.mutation_rate").
        field: String,
        /// String representation of the invalid value.
        value: String,
        /// Human-readable explanation of the constraint.
        reason: String,
    },

    /// File I/O error.
    #[error("IO error reading {file}: {source}")]
    Io {
        /// Path of the file that could not be read.
        file: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Validate all semantic constraints on a [`ServiceConfig`].
///
/// Collects every violation before returning so the caller sees the full
/// scope of issues at once.
///
/// # Errors
///
/// Returns `Err(Vec<ConfigError>)` with every violation found.
pub fn validate(config: &ServiceConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    // ── Service identity ─────────────────────────────────────────────
    if config.service.name.trim().is_empty() {
        errors.push(ConfigError::InvalidField {
            field: "service.name".into(),
            value: String::new(),
            reason: "service name must not be empty".into(),
        });
    }

    if config.service.listen_addr.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ConfigError::InvalidField {
            field: "service.listen_addr".into(),
            value: config.service.listen_addr.clone(),
            reason: "must be a valid socket address (host:port)".into(),
        });
    }

    // ── Task ─────────────────────────────────────────────────────────
    if config.task.description.trim().is_empty() {
        errors.push(ConfigError::InvalidField {
            field: "task.description".into(),
            value: String::new(),
            reason: "task description must not be empty".into(),
        });
    }

    // ── Pools ────────────────────────────────────────────────────────
    if !(2..=3).contains(&config.pools.len()) {
        errors.push(ConfigError::InvalidField {
            field: "pool".into(),
            value: config.pools.len().to_string(),
            reason: "competition requires 2 or 3 pools".into(),
        });
    }

    let mut seen_ids = HashSet::new();
    for (i, pool) in config.pools.iter().enumerate() {
        if pool.id.trim().is_empty() {
            errors.push(ConfigError::InvalidField {
                field: format!("pool[{i}].id"),
                value: String::new(),
                reason: "pool id must not be empty".into(),
            });
        } else if !seen_ids.insert(pool.id.clone()) {
            errors.push(ConfigError::InvalidField {
                field: format!("pool[{i}].id"),
                value: pool.id.clone(),
                reason: "pool ids must be unique".into(),
            });
        }

        if pool.model.trim().is_empty() {
            errors.push(ConfigError::InvalidField {
                field: format!("pool[{i}].model"),
                value: String::new(),
                reason: "model name must not be empty".into(),
            });
        }

        if !pool.endpoint.starts_with("http://") && !pool.endpoint.starts_with("https://") {
            errors.push(ConfigError::InvalidField {
                field: format!("pool[{i}].endpoint"),
                value: pool.endpoint.clone(),
                reason: "endpoint must be an http(s) URL".into(),
            });
        }
    }

    // ── Evolution ────────────────────────────────────────────────────
    if config.evolution.population_size == 0 {
        errors.push(ConfigError::InvalidField {
            field: "evolution.population_size".into(),
            value: "0".into(),
            reason: "must be at least 1".into(),
        });
    }

    if config.evolution.elite_count >= config.evolution.population_size
        && config.evolution.population_size > 0
    {
        errors.push(ConfigError::InvalidField {
            field: "evolution.elite_count".into(),
            value: config.evolution.elite_count.to_string(),
            reason: "must be less than population_size".into(),
        });
    }

    for (field, value) in [
        ("evolution.mutation_rate", config.evolution.mutation_rate),
        ("evolution.crossover_rate", config.evolution.crossover_rate),
    ] {
        if !(0.0..=1.0).contains(&value) {
            errors.push(ConfigError::InvalidField {
                field: field.into(),
                value: value.to_string(),
                reason: "must be between 0.0 and 1.0".into(),
            });
        }
    }

    if config.evolution.max_generations == 0 {
        errors.push(ConfigError::InvalidField {
            field: "evolution.max_generations".into(),
            value: "0".into(),
            reason: "must be at least 1".into(),
        });
    }

    // ── Sandbox ──────────────────────────────────────────────────────
    if config.sandbox.timeout_ms == 0 {
        errors.push(ConfigError::InvalidField {
            field: "sandbox.timeout_ms".into(),
            value: "0".into(),
            reason: "must be at least 1 millisecond".into(),
        });
    }

    if config.sandbox.interpreter.trim().is_empty() {
        errors.push(ConfigError::InvalidField {
            field: "sandbox.interpreter".into(),
            value: String::new(),
            reason: "interpreter must not be empty".into(),
        });
    }

    // ── Fitness weights ──────────────────────────────────────────────
    if (config.fitness.total() - 1.0).abs() > 1e-6 {
        errors.push(ConfigError::InvalidField {
            field: "fitness".into(),
            value: config.fitness.total().to_string(),
            reason: "weights must sum to 1.0".into(),
        });
    }

    // ── Lifecycle ────────────────────────────────────────────────────
    if !(0.0..=1.0).contains(&config.lifecycle.retire_threshold) {
        errors.push(ConfigError::InvalidField {
            field: "lifecycle.retire_threshold".into(),
            value: config.lifecycle.retire_threshold.to_string(),
            reason: "must be between 0.0 and 1.0".into(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::super::loader::load_from_str;
    use super::*;

    fn valid_config() -> ServiceConfig {
        load_from_str(super::super::loader::tests_valid_toml(), "test").unwrap()
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_empty_service_name_rejected() {
        let mut config = valid_config();
        config.service.name = "  ".into();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.to_string().contains("service.name")));
    }

    #[test]
    fn test_bad_listen_addr_rejected() {
        let mut config = valid_config();
        config.service.listen_addr = "not-an-addr".into();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.to_string().contains("listen_addr")));
    }

    #[test]
    fn test_single_pool_rejected() {
        let mut config = valid_config();
        config.pools.truncate(1);
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.to_string().contains("2 or 3 pools")));
    }

    #[test]
    fn test_four_pools_rejected() {
        let mut config = valid_config();
        let extra1 = config.pools[0].clone();
        let mut extra2 = config.pools[0].clone();
        extra2.id = "third".into();
        let mut extra3 = config.pools[0].clone();
        extra3.id = "fourth".into();
        config.pools.push(extra2);
        config.pools.push(extra3);
        config.pools.push(extra1); // also a duplicate id
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.to_string().contains("2 or 3 pools")));
        assert!(errors.iter().any(|e| e.to_string().contains("unique")));
    }

    #[test]
    fn test_non_http_endpoint_rejected() {
        let mut config = valid_config();
        config.pools[0].endpoint = "ftp://example.com".into();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.to_string().contains("http(s)")));
    }

    #[test]
    fn test_elite_count_must_be_below_population() {
        let mut config = valid_config();
        config.evolution.elite_count = config.evolution.population_size;
        let errors = validate(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.to_string().contains("elite_count")));
    }

    #[test]
    fn test_mutation_rate_out_of_range_rejected() {
        let mut config = valid_config();
        config.evolution.mutation_rate = 1.5;
        let errors = validate(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.to_string().contains("mutation_rate")));
    }

    #[test]
    fn test_fitness_weights_must_sum_to_one() {
        let mut config = valid_config();
        config.fitness.execution = 0.9;
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.to_string().contains("sum to 1.0")));
    }

    #[test]
    fn test_zero_sandbox_timeout_rejected() {
        let mut config = valid_config();
        config.sandbox.timeout_ms = 0;
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.to_string().contains("timeout_ms")));
    }

    #[test]
    fn test_validation_collects_multiple_errors() {
        let mut config = valid_config();
        config.service.name = String::new();
        config.sandbox.timeout_ms = 0;
        config.evolution.mutation_rate = -0.5;
        let errors = validate(&config).unwrap_err();
        assert!(errors.len() >= 3);
    }
}
