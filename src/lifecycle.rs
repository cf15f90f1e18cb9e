//! # Agent lifecycle
//!
//! ## Responsibility
//! Track long-lived agents: creation, parent/child spawning, fitness
//! evaluation, topic specialisation, and retirement. Retirement is a
//! one-way `Active -> Retired` transition performed atomically under the
//! agent's map shard, so concurrent retire calls cannot both succeed.
//!
//! ## Guarantees
//! - A retired agent never spawns children and never transitions back
//! - `auto_retire_below` spares root agents regardless of fitness
//! - All operations are lock-free reads / shard-locked writes via `DashMap`
//!
//! ## NOT Responsible For
//! - Producing or scoring solutions (see `evolution` and `fitness`)
//! - Topic keyword extraction (see `tagging`)

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Sightings of a topic before it becomes the agent's specialisation.
const SPECIALISATION_THRESHOLD: usize = 5;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors specific to the agent lifecycle.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A referenced agent does not exist.
    #[error("agent not found: {0}")]
    AgentNotFound(String),

    /// Attempted to spawn a child from a retired parent.
    #[error("parent agent is retired: {0}")]
    ParentRetired(String),

    /// Attempted to retire an agent that is already retired.
    #[error("agent already retired: {0}")]
    AlreadyRetired(String),
}

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// Lifecycle state of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentState {
    /// Agent is live and may spawn children.
    Active,
    /// Agent has been retired; terminal state.
    Retired,
}

/// One agent in the lifecycle registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique agent identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Current lifecycle state.
    pub state: AgentState,
    /// 0 for roots, parent generation + 1 for children.
    pub generation: usize,
    /// Parent agent ID (`None` for roots).
    pub parent_id: Option<String>,
    /// Domain this agent has specialised in, once a topic crosses the
    /// sighting threshold.
    pub domain_specialization: Option<String>,
    /// Latest evaluated fitness in `[0.0, 1.0]`.
    pub fitness: f64,
    /// Number of fitness evaluations performed.
    pub interaction_count: usize,
    /// Topic sighting counts.
    pub topic_counts: HashMap<String, usize>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Retirement timestamp, if retired.
    pub retired_at: Option<DateTime<Utc>>,
}

/// Aggregate registry counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LifecycleMetrics {
    /// Total agents ever created.
    pub total: usize,
    /// Currently active agents.
    pub active: usize,
    /// Retired agents.
    pub retired: usize,
    /// Mean fitness over active agents.
    pub avg_fitness: f64,
    /// Deepest generation seen.
    pub max_generation: usize,
    /// Agent count per generation.
    pub generation_distribution: HashMap<usize, usize>,
    /// Agents with no parent.
    pub root_agents: usize,
    /// Agent count per domain specialisation.
    pub topic_categories: HashMap<String, usize>,
}

/// One node in an agent family tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTreeNode {
    /// The agent itself.
    pub agent: Agent,
    /// IDs of the agent's direct children.
    pub children: Vec<String>,
}

// ---------------------------------------------------------------------------
// LifecycleManager
// ---------------------------------------------------------------------------

/// Concurrent agent registry.
///
/// Cheap to clone -- all clones share the same map via `Arc<DashMap<_>>`.
#[derive(Debug, Clone, Default)]
pub struct LifecycleManager {
    agents: Arc<DashMap<String, Agent>>,
}

impl LifecycleManager {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a root agent (generation 0, no parent).
    pub fn create_root_agent(
        &self,
        name: impl Into<String>,
        domain: Option<String>,
    ) -> Agent {
        let agent = Agent {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            state: AgentState::Active,
            generation: 0,
            parent_id: None,
            domain_specialization: domain,
            fitness: 0.0,
            interaction_count: 0,
            topic_counts: HashMap::new(),
            created_at: Utc::now(),
            retired_at: None,
        };
        info!(agent = %agent.id, name = %agent.name, "root agent created");
        self.agents.insert(agent.id.clone(), agent.clone());
        agent
    }

    /// Spawn a child of an active parent. The child starts one generation
    /// deeper and inherits the parent's specialisation.
    ///
    /// # Errors
    /// - [`LifecycleError::AgentNotFound`] if the parent is unknown.
    /// - [`LifecycleError::ParentRetired`] if the parent is retired.
    pub fn spawn_child(
        &self,
        parent_id: &str,
        name: impl Into<String>,
    ) -> Result<Agent, LifecycleError> {
        // Hold the parent's shard while building the child so a concurrent
        // retire cannot slip between the check and the insert.
        let parent = self
            .agents
            .get(parent_id)
            .ok_or_else(|| LifecycleError::AgentNotFound(parent_id.to_string()))?;
        if parent.state == AgentState::Retired {
            return Err(LifecycleError::ParentRetired(parent_id.to_string()));
        }

        let child = Agent {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            state: AgentState::Active,
            generation: parent.generation + 1,
            parent_id: Some(parent_id.to_string()),
            domain_specialization: parent.domain_specialization.clone(),
            fitness: 0.0,
            interaction_count: 0,
            topic_counts: HashMap::new(),
            created_at: Utc::now(),
            retired_at: None,
        };
        drop(parent);

        info!(agent = %child.id, parent = %parent_id, "child agent spawned");
        self.agents.insert(child.id.clone(), child.clone());
        Ok(child)
    }

    /// Retire an agent. The `Active -> Retired` transition happens under
    /// the shard lock, so exactly one of two racing calls succeeds.
    ///
    /// # Errors
    /// - [`LifecycleError::AgentNotFound`] if the agent is unknown.
    /// - [`LifecycleError::AlreadyRetired`] if it was already retired.
    pub fn retire(&self, id: &str) -> Result<Agent, LifecycleError> {
        let mut agent = self
            .agents
            .get_mut(id)
            .ok_or_else(|| LifecycleError::AgentNotFound(id.to_string()))?;
        if agent.state == AgentState::Retired {
            return Err(LifecycleError::AlreadyRetired(id.to_string()));
        }
        agent.state = AgentState::Retired;
        agent.retired_at = Some(Utc::now());
        info!(agent = %id, "agent retired");
        Ok(agent.clone())
    }

    /// Evaluate an agent's fitness from three signals, each in `[0.0, 1.0]`:
    /// interaction quality (0.3), task accuracy (0.4), domain relevance (0.3).
    ///
    /// # Errors
    /// Returns [`LifecycleError::AgentNotFound`] if the agent is unknown.
    pub fn evaluate_fitness(
        &self,
        id: &str,
        interaction_quality: f64,
        task_accuracy: f64,
        domain_relevance: f64,
    ) -> Result<f64, LifecycleError> {
        let mut agent = self
            .agents
            .get_mut(id)
            .ok_or_else(|| LifecycleError::AgentNotFound(id.to_string()))?;
        let fitness = (0.3 * interaction_quality.clamp(0.0, 1.0)
            + 0.4 * task_accuracy.clamp(0.0, 1.0)
            + 0.3 * domain_relevance.clamp(0.0, 1.0))
        .clamp(0.0, 1.0);
        agent.fitness = fitness;
        agent.interaction_count += 1;
        Ok(fitness)
    }

    /// Retire every non-root active agent whose fitness is below `threshold`.
    ///
    /// Roots are spared so a pruning sweep can never empty a family tree.
    /// Returns the IDs of the agents retired.
    pub fn auto_retire_below(&self, threshold: f64) -> Vec<String> {
        let candidates: Vec<String> = self
            .agents
            .iter()
            .filter(|entry| {
                entry.state == AgentState::Active
                    && entry.parent_id.is_some()
                    && entry.fitness < threshold
            })
            .map(|entry| entry.id.clone())
            .collect();

        let mut retired = Vec::new();
        for id in candidates {
            // A concurrent retire may win the race; that is fine.
            if self.retire(&id).is_ok() {
                retired.push(id);
            }
        }
        info!(count = retired.len(), threshold, "auto-retire sweep complete");
        retired
    }

    /// Record a topic sighting. Once a topic has been seen
    /// `SPECIALISATION_THRESHOLD` times and the agent has no specialisation
    /// yet, the topic becomes its specialisation.
    ///
    /// Returns the agent's specialisation after the update.
    ///
    /// # Errors
    /// Returns [`LifecycleError::AgentNotFound`] if the agent is unknown.
    pub fn record_topic(&self, id: &str, topic: &str) -> Result<Option<String>, LifecycleError> {
        let mut agent = self
            .agents
            .get_mut(id)
            .ok_or_else(|| LifecycleError::AgentNotFound(id.to_string()))?;
        let topic = topic.trim().to_lowercase();
        let count = agent.topic_counts.entry(topic.clone()).or_insert(0);
        *count += 1;
        let count = *count;

        if agent.domain_specialization.is_none() && count >= SPECIALISATION_THRESHOLD {
            info!(agent = %id, topic = %topic, "agent specialised");
            agent.domain_specialization = Some(topic);
        }
        Ok(agent.domain_specialization.clone())
    }

    /// Fetch an agent by ID.
    pub fn agent(&self, id: &str) -> Option<Agent> {
        self.agents.get(id).map(|a| a.clone())
    }

    /// All agents, in no particular order.
    pub fn all_agents(&self) -> Vec<Agent> {
        self.agents.iter().map(|a| a.clone()).collect()
    }

    /// Active agents only.
    pub fn live_agents(&self) -> Vec<Agent> {
        self.agents
            .iter()
            .filter(|a| a.state == AgentState::Active)
            .map(|a| a.clone())
            .collect()
    }

    /// Family tree rooted at the agent's ultimate ancestor, returned as a
    /// flat list of nodes with child ID lists.
    ///
    /// # Errors
    /// Returns [`LifecycleError::AgentNotFound`] if the agent is unknown.
    pub fn family_tree(&self, id: &str) -> Result<Vec<AgentTreeNode>, LifecycleError> {
        let mut root = self
            .agent(id)
            .ok_or_else(|| LifecycleError::AgentNotFound(id.to_string()))?;
        // Walk up to the root of this family.
        while let Some(parent_id) = root.parent_id.clone() {
            match self.agent(&parent_id) {
                Some(parent) => root = parent,
                None => break,
            }
        }

        // Children index over the whole registry.
        let mut children_of: HashMap<String, Vec<String>> = HashMap::new();
        for agent in self.all_agents() {
            if let Some(parent_id) = &agent.parent_id {
                children_of
                    .entry(parent_id.clone())
                    .or_default()
                    .push(agent.id.clone());
            }
        }

        let mut nodes = Vec::new();
        let mut stack = vec![root.id.clone()];
        while let Some(current) = stack.pop() {
            if let Some(agent) = self.agent(&current) {
                let mut children = children_of.remove(&current).unwrap_or_default();
                children.sort();
                stack.extend(children.iter().cloned());
                nodes.push(AgentTreeNode { agent, children });
            }
        }
        Ok(nodes)
    }

    /// Aggregate registry counters.
    pub fn metrics(&self) -> LifecycleMetrics {
        let mut metrics = LifecycleMetrics::default();
        let mut fitness_sum = 0.0;
        for agent in self.agents.iter() {
            metrics.total += 1;
            match agent.state {
                AgentState::Active => {
                    metrics.active += 1;
                    fitness_sum += agent.fitness;
                }
                AgentState::Retired => metrics.retired += 1,
            }
            metrics.max_generation = metrics.max_generation.max(agent.generation);
            *metrics
                .generation_distribution
                .entry(agent.generation)
                .or_insert(0) += 1;
            if agent.parent_id.is_none() {
                metrics.root_agents += 1;
            }
            if let Some(domain) = &agent.domain_specialization {
                *metrics.topic_categories.entry(domain.clone()).or_insert(0) += 1;
            }
        }
        if metrics.active > 0 {
            metrics.avg_fitness = fitness_sum / metrics.active as f64;
        }
        metrics
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
