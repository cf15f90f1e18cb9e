//! # Evolution Subsystem
//!
//! Dual-pool competitive evolution: each pool holds a population of genomes
//! (sampling-parameter sets) bound to one model endpoint, and every
//! generation the pools compete head-to-head on the same task. The fitness
//! margin between the leading pools is credited to the leader.
//!
//! ## Module map
//! - [`genome`] -- evolvable sampling-parameter sets and the shared PRNG
//! - [`pool`]   -- one model's population (selection, crossover, mutation)
//! - [`engine`] -- the generation loop, summaries, and the background driver

pub mod engine;
pub mod genome;
pub mod pool;

pub use engine::{CompetitiveEvolution, EvolutionDriver, GenerationSummary};
pub use genome::{default_gene_bounds, Genome};
pub use pool::{EvolutionConfig, Pool, PoolError, PoolReport};
