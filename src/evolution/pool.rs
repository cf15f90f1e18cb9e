//! # Pool: one model's population
//!
//! ## Responsibility
//! Maintain one competing population of genomes, evaluate-record fitness,
//! and evolve the population via elitist tournament selection, blend
//! crossover, and bounded mutation.
//!
//! ## Guarantees
//! - Thread-safe: all operations use `Arc<Mutex<Inner>>`
//! - Bounded: population size and gene ranges are configurable limits
//! - Deterministic: given the same seed and sequence of operations, results
//!   are reproducible
//! - Non-panicking: every public method returns `Result` or a snapshot
//!
//! ## NOT Responsible For
//! - Producing solutions (the engine pairs genomes with a worker)
//! - Scoring solutions (fitness is reported externally)

use super::genome::{next_f64, next_mod, Genome};
use crate::PoolId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors specific to pool population management.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Internal lock was poisoned by a panicking thread.
    #[error("pool lock poisoned")]
    LockPoisoned,

    /// Attempted to evolve an empty population.
    #[error("cannot evolve an empty population")]
    EmptyPopulation,

    /// A referenced genome was not found.
    #[error("genome not found: {0}")]
    GenomeNotFound(String),
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Genetic-algorithm parameters shared by all pools in a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Number of genomes per pool.
    pub population_size: usize,
    /// Number of top genomes preserved across generations (elitism).
    pub elite_count: usize,
    /// Probability of mutation per gene (0.0 to 1.0).
    pub mutation_rate: f64,
    /// Strength of mutation noise relative to gene range.
    pub mutation_strength: f64,
    /// Probability of crossover between two parents (0.0 to 1.0).
    pub crossover_rate: f64,
    /// Maximum number of generations before the driver stops.
    pub max_generations: usize,
    /// Bounds for each gene: name -> (min, max).
    pub gene_bounds: HashMap<String, (f64, f64)>,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 8,
            elite_count: 2,
            mutation_rate: 0.2,
            mutation_strength: 0.1,
            crossover_rate: 0.7,
            max_generations: 50,
            gene_bounds: super::genome::default_gene_bounds(),
        }
    }
}

/// Snapshot of one pool after a generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolReport {
    /// Which pool this report describes.
    pub pool: PoolId,
    /// Generation number.
    pub generation: usize,
    /// Best fitness in the population.
    pub best_fitness: f64,
    /// Average fitness of the population.
    pub avg_fitness: f64,
    /// Population size after the generation.
    pub population_size: usize,
    /// Whether the population has converged.
    pub converged: bool,
}

// ---------------------------------------------------------------------------
// Inner state
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Inner {
    config: EvolutionConfig,
    population: Vec<Genome>,
    generation: usize,
    best_ever: Option<Genome>,
    rng_state: u64,
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// One competing population of genomes.
///
/// Cheap to clone -- all clones share the same inner state via `Arc<Mutex<_>>`.
#[derive(Debug, Clone)]
pub struct Pool {
    id: PoolId,
    inner: Arc<Mutex<Inner>>,
}

impl Pool {
    /// Create a new pool with the given configuration and RNG seed.
    ///
    /// A zero seed is remapped to 1 (xorshift64 has a fixed point at 0).
    pub fn new(id: PoolId, config: EvolutionConfig, seed: u64) -> Self {
        let seed = if seed == 0 { 1 } else { seed };
        Self {
            id,
            inner: Arc::new(Mutex::new(Inner {
                config,
                population: Vec::new(),
                generation: 0,
                best_ever: None,
                rng_state: seed,
            })),
        }
    }

    /// This pool's identifier.
    pub fn id(&self) -> &PoolId {
        &self.id
    }

    /// Randomly initialise the population within configured gene bounds.
    ///
    /// # Errors
    /// Returns [`PoolError::LockPoisoned`] if the internal lock is poisoned.
    pub fn seed_population(&self) -> Result<(), PoolError> {
        let mut inner = self.inner.lock().map_err(|_| PoolError::LockPoisoned)?;
        let size = inner.config.population_size;
        let bounds = inner.config.gene_bounds.clone();

        inner.population.clear();
        for i in 0..size {
            let genome = Genome::random(&bounds, &mut inner.rng_state, 0, i);
            inner.population.push(genome);
        }
        Ok(())
    }

    /// Set the fitness score for a genome by ID.
    ///
    /// # Errors
    /// - [`PoolError::GenomeNotFound`] if the ID is unknown.
    /// - [`PoolError::LockPoisoned`] if the internal lock is poisoned.
    pub fn record_fitness(&self, id: &str, fitness: f64) -> Result<(), PoolError> {
        let mut inner = self.inner.lock().map_err(|_| PoolError::LockPoisoned)?;
        let beats_best = match &inner.best_ever {
            Some(best) => fitness > best.fitness,
            None => true,
        };

        let genome = inner
            .population
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or_else(|| PoolError::GenomeNotFound(id.to_string()))?;
        genome.fitness = fitness;

        if beats_best {
            inner.best_ever = Some(genome.clone());
        }
        Ok(())
    }

    /// Run one generation of evolution: selection, crossover, mutation.
    ///
    /// Elites carry their fitness into the new population; offspring start
    /// at zero and are scored by the next evaluation round.
    ///
    /// # Errors
    /// - [`PoolError::EmptyPopulation`] if the population is empty.
    /// - [`PoolError::LockPoisoned`] if the internal lock is poisoned.
    pub fn next_generation(&self) -> Result<PoolReport, PoolError> {
        let mut inner = self.inner.lock().map_err(|_| PoolError::LockPoisoned)?;

        if inner.population.is_empty() {
            return Err(PoolError::EmptyPopulation);
        }

        inner.generation += 1;
        let gen = inner.generation;

        // Sort by fitness descending.
        inner.population.sort_by(|a, b| {
            b.fitness
                .partial_cmp(&a.fitness)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let best_fitness = inner.population[0].fitness;
        let avg_fitness: f64 =
            inner.population.iter().map(|g| g.fitness).sum::<f64>() / inner.population.len() as f64;

        // Preserve elites (fitness carried over, parents cleared).
        let elite_count = inner.config.elite_count.min(inner.population.len());
        let mut new_pop: Vec<Genome> = inner.population[..elite_count]
            .iter()
            .enumerate()
            .map(|(i, elite)| Genome {
                id: format!("ind-gen{gen}-{i}"),
                genes: elite.genes.clone(),
                fitness: elite.fitness,
                generation: gen,
                parent_genomes: vec![elite.id.clone()],
            })
            .collect();

        let target_size = inner.config.population_size;
        let crossover_rate = inner.config.crossover_rate;
        let mutation_rate = inner.config.mutation_rate;
        let mutation_strength = inner.config.mutation_strength;
        let bounds = inner.config.gene_bounds.clone();
        let pop_len = inner.population.len();

        // Clone a snapshot so rng_state can be mutated freely in the loop.
        let pop_snapshot: Vec<Genome> = inner.population.clone();
        let rng = &mut inner.rng_state;

        let mut child_idx = elite_count;
        while new_pop.len() < target_size {
            // Tournament selection: pick 3, take best.
            let parent1 = tournament_select(&pop_snapshot, pop_len, rng);
            let parent2 = tournament_select(&pop_snapshot, pop_len, rng);

            let mut child = if next_f64(rng) < crossover_rate {
                Genome::crossover(parent1, parent2, rng, gen, child_idx)
            } else {
                Genome {
                    id: format!("ind-gen{gen}-{child_idx}"),
                    genes: parent1.genes.clone(),
                    fitness: 0.0,
                    generation: gen,
                    parent_genomes: vec![parent1.id.clone()],
                }
            };

            child.mutate(&bounds, mutation_rate, mutation_strength, rng);
            new_pop.push(child);
            child_idx += 1;
        }

        inner.population = new_pop;

        let converged = check_convergence(&inner.population);

        if let Some(current_best) = inner.population.first() {
            let beats_best = match &inner.best_ever {
                Some(best) => current_best.fitness > best.fitness,
                None => true,
            };
            if beats_best {
                inner.best_ever = Some(current_best.clone());
            }
        }

        Ok(PoolReport {
            pool: self.id.clone(),
            generation: gen,
            best_fitness,
            avg_fitness,
            population_size: inner.population.len(),
            converged,
        })
    }

    /// The best genome seen across all generations.
    pub fn best(&self) -> Option<Genome> {
        match self.inner.lock() {
            Ok(g) => g.best_ever.clone(),
            Err(_) => None,
        }
    }

    /// Snapshot of the current population.
    pub fn genomes(&self) -> Vec<Genome> {
        match self.inner.lock() {
            Ok(g) => g.population.clone(),
            Err(_) => Vec::new(),
        }
    }

    /// The current generation number.
    pub fn current_generation(&self) -> usize {
        match self.inner.lock() {
            Ok(g) => g.generation,
            Err(_) => 0,
        }
    }

    /// Current population statistics without advancing a generation.
    pub fn statistics(&self) -> PoolReport {
        let Ok(inner) = self.inner.lock() else {
            return PoolReport {
                pool: self.id.clone(),
                generation: 0,
                best_fitness: 0.0,
                avg_fitness: 0.0,
                population_size: 0,
                converged: false,
            };
        };
        let best_fitness = inner
            .population
            .iter()
            .map(|g| g.fitness)
            .fold(f64::MIN, f64::max);
        let avg_fitness = if inner.population.is_empty() {
            0.0
        } else {
            inner.population.iter().map(|g| g.fitness).sum::<f64>()
                / inner.population.len() as f64
        };
        PoolReport {
            pool: self.id.clone(),
            generation: inner.generation,
            best_fitness: if inner.population.is_empty() {
                0.0
            } else {
                best_fitness
            },
            avg_fitness,
            population_size: inner.population.len(),
            converged: check_convergence(&inner.population),
        }
    }

    /// Whether the population has converged (top 5 within 1% of each other).
    pub fn is_converged(&self) -> bool {
        match self.inner.lock() {
            Ok(g) => check_convergence(&g.population),
            Err(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn tournament_select<'a>(population: &'a [Genome], pop_len: usize, rng_state: &mut u64) -> &'a Genome {
    let mut best_idx = next_mod(rng_state, pop_len);
    for _ in 0..2 {
        let candidate = next_mod(rng_state, pop_len);
        if population[candidate].fitness > population[best_idx].fitness {
            best_idx = candidate;
        }
    }
    &population[best_idx]
}

fn check_convergence(population: &[Genome]) -> bool {
    if population.len() < 5 {
        return false;
    }
    let mut sorted: Vec<f64> = population.iter().map(|g| g.fitness).collect();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let top5 = &sorted[..5];
    let best = top5[0];
    if best.abs() < f64::EPSILON {
        return top5.iter().all(|&f| f.abs() < f64::EPSILON);
    }
    top5.iter().all(|&f| ((f - best) / best).abs() < 0.01)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> EvolutionConfig {
        EvolutionConfig {
            population_size: 10,
            elite_count: 2,
            mutation_rate: 0.2,
            mutation_strength: 0.1,
            crossover_rate: 0.7,
            max_generations: 50,
            gene_bounds: super::super::genome::default_gene_bounds(),
        }
    }

    fn test_pool() -> Pool {
        Pool::new(PoolId::new("r1"), test_config(), 42)
    }

    #[test]
    fn test_seed_population_creates_correct_size() {
        let pool = test_pool();
        pool.seed_population().unwrap();
        assert_eq!(pool.genomes().len(), 10);
    }

    #[test]
    fn test_seed_population_within_bounds() {
        let config = test_config();
        let bounds = config.gene_bounds.clone();
        let pool = Pool::new(PoolId::new("r1"), config, 42);
        pool.seed_population().unwrap();
        for genome in pool.genomes() {
            for (name, &value) in &genome.genes {
                let (min, max) = bounds[name];
                assert!(
                    value >= min && value <= max,
                    "{name}={value} outside [{min}, {max}]"
                );
            }
        }
    }

    #[test]
    fn test_record_fitness_updates_genome() {
        let pool = test_pool();
        pool.seed_population().unwrap();
        let id = pool.genomes()[0].id.clone();
        pool.record_fitness(&id, 0.42).unwrap();
        let genome = pool.genomes().into_iter().find(|g| g.id == id).unwrap();
        assert!((genome.fitness - 0.42).abs() < f64::EPSILON);
    }

    #[test]
    fn test_record_fitness_unknown_genome_errors() {
        let pool = test_pool();
        pool.seed_population().unwrap();
        let err = pool.record_fitness("nonexistent", 1.0).unwrap_err();
        assert!(matches!(err, PoolError::GenomeNotFound(_)));
    }

    #[test]
    fn test_next_generation_advances_generation() {
        let pool = test_pool();
        pool.seed_population().unwrap();
        for genome in pool.genomes() {
            pool.record_fitness(&genome.id, 0.5).unwrap();
        }
        let report = pool.next_generation().unwrap();
        assert_eq!(report.generation, 1);
        assert_eq!(pool.current_generation(), 1);
    }

    #[test]
    fn test_next_generation_empty_population_errors() {
        let pool = test_pool();
        let err = pool.next_generation().unwrap_err();
        assert!(matches!(err, PoolError::EmptyPopulation));
    }

    #[test]
    fn test_elites_preserved_with_fitness() {
        let pool = test_pool();
        pool.seed_population().unwrap();
        let genomes = pool.genomes();
        pool.record_fitness(&genomes[0].id, 0.9).unwrap();
        pool.record_fitness(&genomes[1].id, 0.8).unwrap();
        for genome in genomes.iter().skip(2) {
            pool.record_fitness(&genome.id, 0.1).unwrap();
        }
        pool.next_generation().unwrap();
        let new_pop = pool.genomes();
        assert!((new_pop[0].fitness - 0.9).abs() < f64::EPSILON);
        assert!((new_pop[1].fitness - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_population_size_maintained_after_generation() {
        let pool = test_pool();
        pool.seed_population().unwrap();
        for genome in pool.genomes() {
            pool.record_fitness(&genome.id, 0.5).unwrap();
        }
        pool.next_generation().unwrap();
        assert_eq!(pool.genomes().len(), 10);
    }

    #[test]
    fn test_offspring_record_parent_genomes() {
        let pool = test_pool();
        pool.seed_population().unwrap();
        for genome in pool.genomes() {
            pool.record_fitness(&genome.id, 0.5).unwrap();
        }
        pool.next_generation().unwrap();
        for genome in pool.genomes() {
            assert!(
                !genome.parent_genomes.is_empty(),
                "every gen-1 genome must record its parents"
            );
        }
    }

    #[test]
    fn test_best_tracks_across_generations() {
        let pool = test_pool();
        pool.seed_population().unwrap();
        let genomes = pool.genomes();
        pool.record_fitness(&genomes[0].id, 0.75).unwrap();
        for genome in genomes.iter().skip(1) {
            pool.record_fitness(&genome.id, 0.1).unwrap();
        }
        pool.next_generation().unwrap();
        let best = pool.best().unwrap();
        assert!(best.fitness >= 0.75);
    }

    #[test]
    fn test_convergence_detected_when_fitness_uniform() {
        let pool = test_pool();
        pool.seed_population().unwrap();
        for genome in pool.genomes() {
            pool.record_fitness(&genome.id, 0.6).unwrap();
        }
        assert!(pool.is_converged());
    }

    #[test]
    fn test_convergence_not_detected_when_fitness_spread() {
        let pool = test_pool();
        pool.seed_population().unwrap();
        for (i, genome) in pool.genomes().iter().enumerate() {
            pool.record_fitness(&genome.id, i as f64 * 0.1).unwrap();
        }
        assert!(!pool.is_converged());
    }

    #[test]
    fn test_seed_reproducibility() {
        let p1 = Pool::new(PoolId::new("r1"), test_config(), 123);
        let p2 = Pool::new(PoolId::new("r1"), test_config(), 123);
        p1.seed_population().unwrap();
        p2.seed_population().unwrap();
        for (a, b) in p1.genomes().iter().zip(p2.genomes().iter()) {
            for (key, &val) in &a.genes {
                assert!((val - b.genes[key]).abs() < f64::EPSILON, "seed mismatch on {key}");
            }
        }
    }

    #[test]
    fn test_statistics_without_advancing() {
        let pool = test_pool();
        pool.seed_population().unwrap();
        for genome in pool.genomes() {
            pool.record_fitness(&genome.id, 0.5).unwrap();
        }
        let stats = pool.statistics();
        assert_eq!(stats.generation, 0);
        assert_eq!(stats.population_size, 10);
        assert!((stats.avg_fitness - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_clone_shares_state() {
        let pool = test_pool();
        let clone = pool.clone();
        pool.seed_population().unwrap();
        assert_eq!(clone.genomes().len(), 10);
    }

    #[test]
    fn test_error_display() {
        assert!(PoolError::EmptyPopulation
            .to_string()
            .contains("empty population"));
        assert!(PoolError::GenomeNotFound("x".into()).to_string().contains('x'));
    }
}
