//! Service binary for competitive-evolution
//!
//! Loads the TOML config, wires the pools to their endpoints, and serves
//! the REST control plane until ctrl-c.
//!
//! ## Usage
//!
//! ```text
//! competitive-evolution --config evolution.toml
//! ```
//!
//! ## Environment Variables
//!
//! - `LOG_FORMAT=json` — structured JSON output (overrides the config)
//! - `RUST_LOG=info` — log level filter (default: info)
//! - `EVOLUTION_POOL_<ID>_ENDPOINT` — repoint a pool without editing TOML

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use competitive_evolution::api::{self, AppState};
use competitive_evolution::artifact::ArtifactExporter;
use competitive_evolution::config::{self, LogFormat};
use competitive_evolution::fitness::{
    CodeSandbox, FitnessEvaluator, DEFAULT_BANNED_PATTERNS,
};
use competitive_evolution::worker::{ModelWorker, OpenAiCompatWorker};
use competitive_evolution::{
    init_tracing, metrics, CompetitiveEvolution, LifecycleManager, LineageTracker, PoolId,
};
use tracing::{info, warn};

/// Default config path when `--config` is not given.
const DEFAULT_CONFIG_PATH: &str = "evolution.toml";

/// Directory winning solutions are exported into.
const ARTIFACT_DIR: &str = "artifacts";

fn config_path_from_args() -> PathBuf {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return PathBuf::from(path);
            }
        }
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path_from_args();
    let config = config::loader::load_from_file(&config_path)?;

    // The config chooses the log format unless LOG_FORMAT is already set.
    if config.observability.log_format == LogFormat::Json
        && std::env::var("LOG_FORMAT").is_err()
    {
        std::env::set_var("LOG_FORMAT", "json");
    }
    let _ = init_tracing();
    metrics::init_metrics()?;

    info!(
        config = %config_path.display(),
        service = %config.service.name,
        pools = config.pools.len(),
        "starting competitive-evolution"
    );

    // One worker per configured pool endpoint.
    let mut workers: Vec<(PoolId, Arc<dyn ModelWorker>)> = Vec::with_capacity(config.pools.len());
    for pool in &config.pools {
        let mut worker = OpenAiCompatWorker::new(&pool.model, &pool.endpoint)?;
        if let Some(var) = &pool.api_key_env {
            match std::env::var(var) {
                Ok(key) => worker = worker.with_api_key(key),
                Err(_) => warn!(pool = %pool.id, var = %var, "api key env var not set"),
            }
        }
        info!(pool = %pool.id, model = %pool.model, endpoint = %pool.endpoint, "pool configured");
        workers.push((PoolId::new(pool.id.clone()), Arc::new(worker)));
    }

    let sandbox_config = config.sandbox.to_sandbox_config();
    let banned = DEFAULT_BANNED_PATTERNS
        .iter()
        .map(|s| s.to_string())
        .chain(config.fitness.extra_banned_patterns.iter().cloned());
    let evaluator = FitnessEvaluator::with_banned_patterns(
        CodeSandbox::new(sandbox_config.clone()),
        config.fitness.to_weights(),
        banned,
    )?;

    let lineage = LineageTracker::new();
    let engine = CompetitiveEvolution::new(
        config.task.to_task(),
        workers,
        config.evolution.to_evolution_config(),
        evaluator,
        lineage.clone(),
        config.evolution.seed,
    )?;

    let state = Arc::new(AppState {
        engine,
        driver: Mutex::new(None),
        max_generations: config.evolution.max_generations,
        generation_delay: config.evolution.generation_delay(),
        lifecycle: LifecycleManager::new(),
        lineage,
        sandbox: CodeSandbox::new(sandbox_config),
        exporter: ArtifactExporter::new(ARTIFACT_DIR),
        retire_threshold: config.lifecycle.retire_threshold,
    });

    let listen_addr = config.service.listen_addr.clone();
    tokio::select! {
        result = api::start_server(&listen_addr, Arc::clone(&state)) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received, shutting down");
            if let Ok(guard) = state.driver.lock() {
                if let Some(driver) = guard.as_ref() {
                    driver.stop();
                }
            }
        }
    }

    Ok(())
}
