//! Export winning solutions to disk with integrity checksums.
//!
//! An exported artifact is a directory named after the solution ID holding
//! `solution.code` (the raw code), `metadata.json` (fitness, lineage, and
//! provenance), and `CHECKSUMS.txt` with the SHA-256 of every exported file
//! so a consumer can verify nothing was altered after export.

use crate::{EvolutionError, Solution};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::info;

/// File name of the exported code.
const CODE_FILE: &str = "solution.code";
/// File name of the exported metadata.
const METADATA_FILE: &str = "metadata.json";
/// File name of the checksum manifest.
const CHECKSUMS_FILE: &str = "CHECKSUMS.txt";

/// Provenance written alongside the exported code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Solution ID.
    pub solution_id: String,
    /// Pool that produced it.
    pub pool: String,
    /// Model name.
    pub model: String,
    /// Composite fitness.
    pub fitness: f64,
    /// Generation the solution was produced in.
    pub generation: usize,
    /// Parent solution IDs.
    pub parent_ids: Vec<String>,
    /// Task the solution answers.
    pub task_id: String,
    /// Task domain.
    pub domain: String,
    /// Token cost reported by the endpoint.
    pub token_cost: usize,
    /// Reasoning trace captured with the solution.
    pub reasoning: String,
    /// Export timestamp.
    pub exported_at: chrono::DateTime<chrono::Utc>,
}

/// A completed export.
#[derive(Debug, Clone)]
pub struct ExportedArtifact {
    /// Directory the artifact was written to.
    pub dir: PathBuf,
    /// `(file name, sha256 hex)` for every exported file.
    pub checksums: Vec<(String, String)>,
}

/// Writes solution artifacts under a root directory.
#[derive(Debug, Clone)]
pub struct ArtifactExporter {
    root: PathBuf,
}

impl ArtifactExporter {
    /// Create an exporter writing under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Export a solution to `<root>/<solution-id>/`.
    ///
    /// Writes the code, the metadata, and a `CHECKSUMS.txt` covering both.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::Other`] for I/O or serialisation failures.
    pub fn export(&self, solution: &Solution) -> Result<ExportedArtifact, EvolutionError> {
        let dir = self.root.join(&solution.id);
        std::fs::create_dir_all(&dir)
            .map_err(|e| EvolutionError::Other(format!("create artifact dir: {e}")))?;

        let metadata = ArtifactMetadata {
            solution_id: solution.id.clone(),
            pool: solution.pool.as_str().to_string(),
            model: solution.model.clone(),
            fitness: solution.fitness,
            generation: solution.generation,
            parent_ids: solution.parent_ids.clone(),
            task_id: solution.task_id.clone(),
            domain: solution.domain.clone(),
            token_cost: solution.token_cost,
            reasoning: solution.reasoning.clone(),
            exported_at: chrono::Utc::now(),
        };
        let metadata_json = serde_json::to_string_pretty(&metadata)
            .map_err(|e| EvolutionError::Other(format!("serialise metadata: {e}")))?;

        write_file(&dir, CODE_FILE, solution.code.as_bytes())?;
        write_file(&dir, METADATA_FILE, metadata_json.as_bytes())?;

        let checksums = vec![
            (CODE_FILE.to_string(), sha256_hex(solution.code.as_bytes())),
            (METADATA_FILE.to_string(), sha256_hex(metadata_json.as_bytes())),
        ];
        let manifest: String = checksums
            .iter()
            .map(|(name, digest)| format!("{digest}  {name}\n"))
            .collect();
        write_file(&dir, CHECKSUMS_FILE, manifest.as_bytes())?;

        info!(solution = %solution.id, dir = %dir.display(), "artifact exported");
        Ok(ExportedArtifact { dir, checksums })
    }
}

fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), EvolutionError> {
    std::fs::write(dir.join(name), bytes)
        .map_err(|e| EvolutionError::Other(format!("write {name}: {e}")))
}

/// SHA-256 of a byte slice as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
