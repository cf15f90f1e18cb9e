//! Configuration file loading.
//!
//! ## Responsibility
//! Read a TOML file from disk, parse it into a [`ServiceConfig`], apply
//! environment overrides, and run validation before returning. This is the
//! primary entry point for loading configuration at startup.
//!
//! ## Guarantees
//! - A successfully loaded config is always validated
//! - I/O errors and parse errors are distinguished in the error type
//! - File path is included in every error message
//!
//! ## NOT Responsible For
//! - Defining the config schema (that belongs to `mod.rs`)
//! - Semantic rules (that belongs to `validation`)

use std::path::Path;

use super::validation::{self, ConfigError};
use super::ServiceConfig;
use tracing::info;

/// Load a [`ServiceConfig`] from a TOML file.
///
/// Reads the file, parses it as TOML, applies environment overrides, and
/// validates all semantic constraints.
///
/// # Errors
///
/// - [`ConfigError::Io`] if the file cannot be read.
/// - [`ConfigError::Parse`] if the TOML is malformed.
/// - [`ConfigError::Validation`] if semantic constraints are violated.
pub fn load_from_file(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        file: path.display().to_string(),
        source: e,
    })?;

    load_from_str(&content, &path.display().to_string())
}

/// Load a [`ServiceConfig`] from a TOML string.
///
/// Useful for testing or embedding configs without file I/O.
///
/// # Errors
///
/// - [`ConfigError::Parse`] if the TOML is malformed.
/// - [`ConfigError::Validation`] if semantic constraints are violated.
pub fn load_from_str(content: &str, source_name: &str) -> Result<ServiceConfig, ConfigError> {
    let mut config: ServiceConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
        file: source_name.to_string(),
        source: e,
    })?;

    apply_env_overrides(&mut config);

    validation::validate(&config).map_err(|errors| {
        ConfigError::Validation(
            errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("\n"),
        )
    })?;

    Ok(config)
}

/// Override pool endpoints from the environment.
///
/// For a pool with id `r1`, the variable `EVOLUTION_POOL_R1_ENDPOINT`
/// replaces the configured endpoint. This lets deployments repoint pools
/// without editing the TOML.
fn apply_env_overrides(config: &mut ServiceConfig) {
    for pool in &mut config.pools {
        let var = format!(
            "EVOLUTION_POOL_{}_ENDPOINT",
            pool.id.to_uppercase().replace('-', "_")
        );
        if let Ok(endpoint) = std::env::var(&var) {
            info!(pool = %pool.id, var = %var, "endpoint overridden from environment");
            pool.endpoint = endpoint;
        }
    }
}

/// A complete valid config used by loader and validation tests.
#[cfg(test)]
pub(crate) fn tests_valid_toml() -> &'static str {
    r#"
[service]
name = "r1-vs-qwen"
listen_addr = "127.0.0.1:8000"

[task]
name = "ransomware_detection"
domain = "security"
description = "Detect ransomware-like file activity from an event log"
constraints = "Python 3, stdlib only"

[[pool]]
id = "r1"
model = "deepseek-r1"
endpoint = "http://localhost:11434/v1"

[[pool]]
id = "qwen"
model = "qwen2.5-coder"
endpoint = "http://localhost:11435/v1"

[evolution]
population_size = 8
elite_count = 2
mutation_rate = 0.2
mutation_strength = 0.1
crossover_rate = 0.7
max_generations = 50

[sandbox]
interpreter = "python3"
timeout_ms = 5000

[fitness]
syntax = 0.2
execution = 0.3
security = 0.2
reasoning = 0.2
efficiency = 0.1

[lifecycle]
retire_threshold = 0.3

[observability]
log_format = "pretty"
"#
}
