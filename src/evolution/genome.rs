//! Genomes: evolvable sampling-parameter sets.
//!
//! Each genome encodes the sampling parameters one pool member uses when
//! asking its model endpoint for a solution. Genes are bounded `f64` values;
//! crossover blends parents and mutation adds bounded noise, so every genome
//! always decodes to valid [`SamplingParams`].

use crate::worker::SamplingParams;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Gene name for the sampling temperature.
pub const GENE_TEMPERATURE: &str = "temperature";
/// Gene name for the completion token budget.
pub const GENE_MAX_TOKENS: &str = "max_tokens";
/// Gene name for nucleus sampling probability mass.
pub const GENE_TOP_P: &str = "top_p";

/// Default bounds for each gene: name -> (min, max).
pub fn default_gene_bounds() -> HashMap<String, (f64, f64)> {
    let mut bounds = HashMap::new();
    bounds.insert(GENE_TEMPERATURE.to_string(), (0.1, 1.5));
    bounds.insert(GENE_MAX_TOKENS.to_string(), (256.0, 4096.0));
    bounds.insert(GENE_TOP_P.to_string(), (0.5, 1.0));
    bounds
}

/// A single member of a pool's population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genome {
    /// Unique identifier (`ind-gen{g}-{i}`).
    pub id: String,
    /// Gene values (gene name -> value).
    pub genes: HashMap<String, f64>,
    /// Fitness score (higher is better).
    pub fitness: f64,
    /// Generation this genome was created in.
    pub generation: usize,
    /// IDs of the genomes this one was bred from (empty for gen 0 and elites).
    pub parent_genomes: Vec<String>,
}

impl Genome {
    /// Randomly sample a genome within `bounds`.
    pub fn random(
        bounds: &HashMap<String, (f64, f64)>,
        rng_state: &mut u64,
        generation: usize,
        index: usize,
    ) -> Self {
        let mut genes = HashMap::new();
        for (name, &(min, max)) in bounds {
            let t = next_f64(rng_state);
            genes.insert(name.clone(), min + t * (max - min));
        }
        Self {
            id: format!("ind-gen{generation}-{index}"),
            genes,
            fitness: 0.0,
            generation,
            parent_genomes: Vec::new(),
        }
    }

    /// Blend two parents: each gene is `alpha * a + (1 - alpha) * b` for a
    /// fresh random `alpha` per gene. Genes missing from one parent are
    /// copied from the other.
    pub fn crossover(
        a: &Genome,
        b: &Genome,
        rng_state: &mut u64,
        generation: usize,
        index: usize,
    ) -> Self {
        let mut genes = HashMap::new();
        for (name, &va) in &a.genes {
            let value = match b.genes.get(name) {
                Some(&vb) => {
                    let alpha = next_f64(rng_state);
                    alpha * va + (1.0 - alpha) * vb
                }
                None => va,
            };
            genes.insert(name.clone(), value);
        }
        for (name, &vb) in &b.genes {
            genes.entry(name.clone()).or_insert(vb);
        }
        Self {
            id: format!("ind-gen{generation}-{index}"),
            genes,
            fitness: 0.0,
            generation,
            parent_genomes: vec![a.id.clone(), b.id.clone()],
        }
    }

    /// Mutate genes in place: each gene independently gets bounded noise with
    /// probability `mutation_rate`. Values are clamped to their bounds.
    pub fn mutate(
        &mut self,
        bounds: &HashMap<String, (f64, f64)>,
        mutation_rate: f64,
        mutation_strength: f64,
        rng_state: &mut u64,
    ) {
        for (name, value) in &mut self.genes {
            if next_f64(rng_state) >= mutation_rate {
                continue;
            }
            if let Some(&(min, max)) = bounds.get(name) {
                let range = max - min;
                let noise = (next_f64(rng_state) - 0.5) * 2.0 * mutation_strength * range;
                *value = (*value + noise).clamp(min, max);
            }
        }
    }

    /// Decode this genome into the sampling parameters its worker should use.
    ///
    /// Missing genes fall back to [`SamplingParams::default`] values.
    pub fn sampling_params(&self) -> SamplingParams {
        let defaults = SamplingParams::default();
        SamplingParams {
            temperature: self
                .genes
                .get(GENE_TEMPERATURE)
                .map_or(defaults.temperature, |&v| v as f32),
            max_tokens: self
                .genes
                .get(GENE_MAX_TOKENS)
                .map_or(defaults.max_tokens, |&v| v.max(1.0) as u32),
            top_p: self
                .genes
                .get(GENE_TOP_P)
                .map_or(defaults.top_p, |&v| v as f32),
        }
    }
}

// ---------------------------------------------------------------------------
// PRNG helpers
// ---------------------------------------------------------------------------

// xorshift64 — lightweight, deterministic PRNG
pub(crate) fn next_rng(state: &mut u64) -> u64 {
    let mut x = *state;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    *state = x;
    x
}

pub(crate) fn next_f64(state: &mut u64) -> f64 {
    (next_rng(state) % 1_000_000) as f64 / 1_000_000.0
}

pub(crate) fn next_mod(state: &mut u64, modulus: usize) -> usize {
    (next_rng(state) as usize) % modulus
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(seed: u64) -> u64 {
        if seed == 0 {
            1
        } else {
            seed
        }
    }

    #[test]
    fn test_random_genome_within_bounds() {
        let bounds = default_gene_bounds();
        let mut rng = seeded(42);
        for i in 0..20 {
            let genome = Genome::random(&bounds, &mut rng, 0, i);
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
    fn test_random_genome_id_format() {
        let bounds = default_gene_bounds();
        let mut rng = seeded(42);
        let genome = Genome::random(&bounds, &mut rng, 3, 7);
        assert_eq!(genome.id, "ind-gen3-7");
        assert_eq!(genome.generation, 3);
        assert!(genome.parent_genomes.is_empty());
    }

    #[test]
    fn test_crossover_blends_within_parent_range() {
        let bounds = default_gene_bounds();
        let mut rng = seeded(99);
        let a = Genome::random(&bounds, &mut rng, 0, 0);
        let b = Genome::random(&bounds, &mut rng, 0, 1);
        let child = Genome::crossover(&a, &b, &mut rng, 1, 0);
        for (name, &value) in &child.genes {
            let va = a.genes[name];
            let vb = b.genes[name];
            let (lo, hi) = if va <= vb { (va, vb) } else { (vb, va) };
            assert!(
                value >= lo - 1e-9 && value <= hi + 1e-9,
                "{name}={value} outside blend range [{lo}, {hi}]"
            );
        }
        assert_eq!(child.parent_genomes, vec![a.id, b.id]);
    }

    #[test]
    fn test_crossover_copies_missing_genes() {
        let mut rng = seeded(7);
        let mut a_genes = HashMap::new();
        a_genes.insert(GENE_TEMPERATURE.to_string(), 0.5);
        let mut b_genes = HashMap::new();
        b_genes.insert(GENE_TEMPERATURE.to_string(), 0.9);
        b_genes.insert(GENE_TOP_P.to_string(), 0.8);
        let a = Genome {
            id: "a".into(),
            genes: a_genes,
            fitness: 0.0,
            generation: 0,
            parent_genomes: vec![],
        };
        let b = Genome {
            id: "b".into(),
            genes: b_genes,
            fitness: 0.0,
            generation: 0,
            parent_genomes: vec![],
        };
        let child = Genome::crossover(&a, &b, &mut rng, 1, 0);
        assert!((child.genes[GENE_TOP_P] - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_mutation_stays_within_bounds() {
        let bounds = default_gene_bounds();
        let mut rng = seeded(5);
        let mut genome = Genome::random(&bounds, &mut rng, 0, 0);
        for _ in 0..50 {
            genome.mutate(&bounds, 1.0, 0.5, &mut rng);
            for (name, &value) in &genome.genes {
                let (min, max) = bounds[name];
                assert!(value >= min && value <= max);
            }
        }
    }

    #[test]
    fn test_zero_mutation_rate_is_identity() {
        let bounds = default_gene_bounds();
        let mut rng = seeded(5);
        let mut genome = Genome::random(&bounds, &mut rng, 0, 0);
        let before = genome.genes.clone();
        genome.mutate(&bounds, 0.0, 0.5, &mut rng);
        assert_eq!(genome.genes, before);
    }

    #[test]
    fn test_sampling_params_decode() {
        let mut genes = HashMap::new();
        genes.insert(GENE_TEMPERATURE.to_string(), 0.9);
        genes.insert(GENE_MAX_TOKENS.to_string(), 1024.7);
        genes.insert(GENE_TOP_P.to_string(), 0.85);
        let genome = Genome {
            id: "g".into(),
            genes,
            fitness: 0.0,
            generation: 0,
            parent_genomes: vec![],
        };
        let params = genome.sampling_params();
        assert!((params.temperature - 0.9).abs() < 1e-6);
        assert_eq!(params.max_tokens, 1024);
        assert!((params.top_p - 0.85).abs() < 1e-6);
    }

    #[test]
    fn test_sampling_params_missing_genes_use_defaults() {
        let genome = Genome {
            id: "g".into(),
            genes: HashMap::new(),
            fitness: 0.0,
            generation: 0,
            parent_genomes: vec![],
        };
        let params = genome.sampling_params();
        let defaults = SamplingParams::default();
        assert!((params.temperature - defaults.temperature).abs() < f64::EPSILON as f32);
        assert_eq!(params.max_tokens, defaults.max_tokens);
    }

    #[test]
    fn test_prng_deterministic() {
        let mut s1 = 123u64;
        let mut s2 = 123u64;
        for _ in 0..10 {
            assert_eq!(next_rng(&mut s1), next_rng(&mut s2));
        }
    }

    #[test]
    fn test_next_f64_in_unit_interval() {
        let mut state = 42u64;
        for _ in 0..100 {
            let v = next_f64(&mut state);
            assert!((0.0..1.0).contains(&v));
        }
    }
}
