//! # Engine: head-to-head generation loop
//!
//! ## Responsibility
//! Drive the competition: each generation, every genome in every pool asks
//! its model endpoint for a solution, every solution is scored by the
//! fitness evaluator, pools evolve, and the margin between the leading
//! pools is credited to the leader as performance gain.
//!
//! ## Guarantees
//! - A failed inference never aborts a generation: the genome scores zero
//!   and the pool's endpoint health gauge drops to 0
//! - Every produced solution is recorded in the lineage graph with its
//!   parent links before the generation summary is emitted
//! - The driver stops promptly on request, at `max_generations`, or when
//!   all pools converge
//!
//! ## NOT Responsible For
//! - Fitness semantics (see `fitness`)
//! - Population mechanics (see `pool`)

use super::pool::{EvolutionConfig, Pool, PoolReport};
use crate::fitness::FitnessEvaluator;
use crate::lineage::LineageTracker;
use crate::worker::ModelWorker;
use crate::{parse_model_response, EvolutionError, PoolId, Solution, TaskSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Summary types
// ---------------------------------------------------------------------------

/// Outcome of one full head-to-head generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSummary {
    /// Generation number (1-based).
    pub generation: usize,
    /// Per-pool population reports.
    pub pool_reports: Vec<PoolReport>,
    /// Pool with the highest best fitness this generation.
    pub leader: PoolId,
    /// Fitness margin between the two leading pools, credited to the leader.
    pub performance_gain: f64,
    /// Whether every pool has converged.
    pub converged: bool,
}

struct PoolRunner {
    pool: Pool,
    worker: Arc<dyn ModelWorker>,
}

// ---------------------------------------------------------------------------
// CompetitiveEvolution
// ---------------------------------------------------------------------------

/// The competition engine: two or three pools evolving against one task.
///
/// Cheap to clone -- all clones share pools, lineage, and the
/// genome-to-solution map.
#[derive(Clone)]
pub struct CompetitiveEvolution {
    task: TaskSpec,
    runners: Arc<Vec<PoolRunner>>,
    evaluator: Arc<FitnessEvaluator>,
    lineage: LineageTracker,
    // genome id -> solution id, so offspring can link to parent *solutions*.
    solution_of_genome: Arc<Mutex<HashMap<String, String>>>,
}

impl std::fmt::Debug for CompetitiveEvolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompetitiveEvolution")
            .field("task", &self.task)
            .field("evaluator", &self.evaluator)
            .field("lineage", &self.lineage)
            .finish_non_exhaustive()
    }
}

impl CompetitiveEvolution {
    /// Assemble an engine from pools and their workers.
    ///
    /// Pools are seeded immediately and the task is recorded in the lineage
    /// graph, so the first [`Self::run_generation`] call can run unprepared.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::ConfigError`] if fewer than two workers are
    /// supplied, and propagates pool or lineage failures.
    pub fn new(
        task: TaskSpec,
        workers: Vec<(PoolId, Arc<dyn ModelWorker>)>,
        evolution: EvolutionConfig,
        evaluator: FitnessEvaluator,
        lineage: LineageTracker,
        seed: u64,
    ) -> Result<Self, EvolutionError> {
        if workers.len() < 2 {
            return Err(EvolutionError::ConfigError(format!(
                "competition needs at least 2 pools, got {}",
                workers.len()
            )));
        }

        lineage.record_task(task.clone())?;

        let mut runners = Vec::with_capacity(workers.len());
        for (i, (pool_id, worker)) in workers.into_iter().enumerate() {
            let pool = Pool::new(pool_id, evolution.clone(), seed.wrapping_add(i as u64 + 1));
            pool.seed_population()?;
            runners.push(PoolRunner { pool, worker });
        }

        Ok(Self {
            task,
            runners: Arc::new(runners),
            evaluator: Arc::new(evaluator),
            lineage,
            solution_of_genome: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// The task the pools compete on.
    pub fn task(&self) -> &TaskSpec {
        &self.task
    }

    /// The shared lineage graph.
    pub fn lineage(&self) -> &LineageTracker {
        &self.lineage
    }

    /// Snapshot statistics for every pool.
    pub fn pool_statistics(&self) -> Vec<PoolReport> {
        self.runners.iter().map(|r| r.pool.statistics()).collect()
    }

    /// Run one full generation: inference, scoring, lineage, evolution.
    ///
    /// # Errors
    ///
    /// Propagates sandbox infrastructure failures, pool errors, and lineage
    /// failures. Inference failures are absorbed as zero-fitness genomes.
    pub async fn run_generation(&self) -> Result<GenerationSummary, EvolutionError> {
        for runner in self.runners.iter() {
            self.evaluate_pool(runner).await?;
        }

        let mut pool_reports = Vec::with_capacity(self.runners.len());
        for runner in self.runners.iter() {
            let report = runner.pool.next_generation()?;
            crate::metrics::set_fitness(report.pool.as_str(), "best", report.best_fitness);
            crate::metrics::set_fitness(report.pool.as_str(), "avg", report.avg_fitness);
            pool_reports.push(report);
        }

        let generation = pool_reports.first().map_or(0, |r| r.generation);
        crate::metrics::set_generation(generation as u64);

        // Rank pools by best fitness; the gap between first and second is
        // the leader's performance gain.
        let mut ranked: Vec<&PoolReport> = pool_reports.iter().collect();
        ranked.sort_by(|a, b| {
            b.best_fitness
                .partial_cmp(&a.best_fitness)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let leader = ranked[0].pool.clone();
        let performance_gain = (ranked[0].best_fitness - ranked[1].best_fitness).abs();
        crate::metrics::set_performance_gain(leader.as_str(), performance_gain);

        let converged = pool_reports.iter().all(|r| r.converged);

        let summary = GenerationSummary {
            generation,
            pool_reports,
            leader: leader.clone(),
            performance_gain,
            converged,
        };

        info!(
            generation,
            leader = %leader,
            performance_gain,
            converged,
            "generation complete"
        );

        Ok(summary)
    }

    /// Produce and score one solution per genome in a pool.
    async fn evaluate_pool(&self, runner: &PoolRunner) -> Result<(), EvolutionError> {
        let pool_name = runner.pool.id().as_str().to_string();
        let genomes = runner.pool.genomes();

        let proposals = genomes.iter().map(|genome| {
            let worker = Arc::clone(&runner.worker);
            let task = self.task.clone();
            let params = genome.sampling_params();
            async move { worker.propose(&task, params).await }
        });
        let responses = futures::future::join_all(proposals).await;

        let mut endpoint_healthy = true;
        for (genome, response) in genomes.iter().zip(responses) {
            let mut solution = match response {
                Ok(response) => {
                    crate::metrics::observe_inference_latency(
                        &pool_name,
                        Duration::from_millis(response.latency_ms),
                    );
                    let parsed = parse_model_response(&response.text);
                    let reasoning_steps =
                        parsed.reasoning.lines().filter(|l| !l.trim().is_empty()).count();
                    Solution {
                        id: uuid::Uuid::new_v4().to_string(),
                        pool: runner.pool.id().clone(),
                        model: runner.worker.model_name().to_string(),
                        code: parsed.code,
                        reasoning: parsed.reasoning,
                        fitness: 0.0,
                        generation: genome.generation,
                        reasoning_steps,
                        token_cost: response.token_cost,
                        parent_ids: self.parent_solutions(&genome.parent_genomes),
                        task_id: self.task.id.clone(),
                        domain: self.task.domain.clone(),
                        execution_time_ms: response.latency_ms,
                        created_at: chrono::Utc::now(),
                    }
                }
                Err(e) => {
                    warn!(pool = %pool_name, genome = %genome.id, error = %e, "inference failed");
                    endpoint_healthy = false;
                    Solution {
                        id: uuid::Uuid::new_v4().to_string(),
                        pool: runner.pool.id().clone(),
                        model: runner.worker.model_name().to_string(),
                        code: String::new(),
                        reasoning: String::new(),
                        fitness: 0.0,
                        generation: genome.generation,
                        reasoning_steps: 0,
                        token_cost: 0,
                        parent_ids: self.parent_solutions(&genome.parent_genomes),
                        task_id: self.task.id.clone(),
                        domain: self.task.domain.clone(),
                        execution_time_ms: 0,
                        created_at: chrono::Utc::now(),
                    }
                }
            };

            let breakdown = self.evaluator.evaluate(&solution).await?;
            solution.set_fitness(breakdown.composite);
            if let Some(report) = &breakdown.report {
                solution.execution_time_ms = report.duration_ms;
            }

            runner.pool.record_fitness(&genome.id, solution.fitness)?;
            self.lineage.record_solution(solution.clone())?;

            if let Ok(mut map) = self.solution_of_genome.lock() {
                map.insert(genome.id.clone(), solution.id.clone());
            }
        }

        crate::metrics::set_endpoint_health(&pool_name, endpoint_healthy);
        Ok(())
    }

    fn parent_solutions(&self, parent_genomes: &[String]) -> Vec<String> {
        let Ok(map) = self.solution_of_genome.lock() else {
            return Vec::new();
        };
        parent_genomes
            .iter()
            .filter_map(|gid| map.get(gid).cloned())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// EvolutionDriver
// ---------------------------------------------------------------------------

/// Background task that runs generations until stopped, converged, or the
/// generation budget is exhausted.
pub struct EvolutionDriver {
    stop_tx: watch::Sender<bool>,
    summary_tx: broadcast::Sender<GenerationSummary>,
    last_summary: Arc<Mutex<Option<GenerationSummary>>>,
    handle: JoinHandle<Result<(), EvolutionError>>,
}

impl EvolutionDriver {
    /// Spawn the generation loop on the current Tokio runtime.
    ///
    /// `generation_delay` is the pause between generations (used to pace
    /// requests against live endpoints; zero for tests).
    pub fn start(
        engine: CompetitiveEvolution,
        max_generations: usize,
        generation_delay: Duration,
    ) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let (summary_tx, _) = broadcast::channel(64);
        let last_summary = Arc::new(Mutex::new(None));

        let tx = summary_tx.clone();
        let last = Arc::clone(&last_summary);
        let handle = tokio::spawn(async move {
            for _ in 0..max_generations {
                if *stop_rx.borrow() {
                    info!("evolution stopped on request");
                    break;
                }

                let summary = engine.run_generation().await?;
                if let Ok(mut slot) = last.lock() {
                    *slot = Some(summary.clone());
                }
                let converged = summary.converged;
                // Receivers may come and go; a send error just means nobody
                // is listening right now.
                let _ = tx.send(summary);

                if converged {
                    info!("all pools converged, stopping");
                    break;
                }

                if !generation_delay.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(generation_delay) => {}
                        _ = stop_rx.changed() => {}
                    }
                }
            }
            Ok(())
        });

        Self {
            stop_tx,
            summary_tx,
            last_summary,
            handle,
        }
    }

    /// Subscribe to per-generation summaries.
    pub fn subscribe(&self) -> broadcast::Receiver<GenerationSummary> {
        self.summary_tx.subscribe()
    }

    /// Request the loop to stop after the current generation.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Whether the loop is still running.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// The most recent generation summary, if any generation has completed.
    pub fn last_summary(&self) -> Option<GenerationSummary> {
        self.last_summary.lock().ok().and_then(|s| s.clone())
    }

    /// Wait for the loop to finish and surface its result.
    ///
    /// # Errors
    ///
    /// Returns the loop's error, or [`EvolutionError::ChannelClosed`] if the
    /// task panicked or was cancelled.
    pub async fn join(self) -> Result<(), EvolutionError> {
        self.handle.await.map_err(|_| EvolutionError::ChannelClosed)?
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
