//! # Lineage graph store
//!
//! ## Responsibility
//! Track every task and solution as nodes in a directed graph with typed
//! edges (`PARENT_OF`, `SOLVES`, and caller-defined cross-domain
//! relationships), and answer the queries the frontend panes poll:
//! ancestors, descendants, family trees, best solutions, pool statistics.
//!
//! ## Guarantees
//! - Lineage is a DAG: self-loops and cycle-creating parent edges are rejected
//! - Upsert semantics: recording an existing ID updates the payload in place
//! - Thread-safe: one `RwLock` guards the graph; all clones share state
//!
//! ## NOT Responsible For
//! - Scoring solutions (that belongs to `fitness`)
//! - Evolving populations (that belongs to `evolution`)

use crate::{Solution, TaskSpec};
use petgraph::algo::has_path_connecting;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors specific to the lineage graph.
#[derive(Debug, Error)]
pub enum LineageError {
    /// A referenced solution does not exist.
    #[error("solution not found: {0}")]
    SolutionNotFound(String),

    /// A referenced task does not exist.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// An edge from a node to itself was requested.
    #[error("self-loops are not allowed in lineage")]
    SelfLoop,

    /// Adding the edge would create an ancestry cycle.
    #[error("edge would create a lineage cycle")]
    CycleDetected,

    /// Internal lock was poisoned by a panicking thread.
    #[error("lineage graph lock poisoned")]
    LockPoisoned,
}

// ---------------------------------------------------------------------------
// Graph types
// ---------------------------------------------------------------------------

/// Typed relationship between two lineage nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Relation {
    /// Parent solution → child solution.
    ParentOf,
    /// Solution → the task it answers.
    Solves,
    /// Caller-defined cross-domain relationship with an optional weight
    /// (e.g. `INFLUENCES` at 0.7).
    Custom {
        /// Relationship name.
        rel: String,
        /// Optional strength attribute.
        weight: Option<f64>,
    },
}

/// One edge in a serialised graph view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Source node ID.
    pub source: String,
    /// Target node ID.
    pub target: String,
}

/// Family tree view of one solution: its ancestors, itself, and all
/// descendants, in the node/edge shape the graph pane renders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyTree {
    /// All solutions in the tree.
    pub nodes: Vec<Solution>,
    /// Parent → child edges.
    pub edges: Vec<GraphEdge>,
}

/// Aggregate statistics over one pool's recorded solutions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolStatistics {
    /// Number of recorded solutions.
    pub solution_count: usize,
    /// Mean fitness.
    pub avg_fitness: f64,
    /// Highest fitness.
    pub max_fitness: f64,
    /// Lowest fitness.
    pub min_fitness: f64,
    /// Mean token cost.
    pub avg_token_cost: f64,
    /// Highest generation seen.
    pub max_generation: usize,
}

#[derive(Debug)]
struct Inner {
    graph: StableDiGraph<String, Relation>,
    index: HashMap<String, NodeIndex>,
    tasks: HashMap<String, TaskSpec>,
    solutions: HashMap<String, Solution>,
}

impl Inner {
    fn node(&mut self, id: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        let idx = self.graph.add_node(id.to_string());
        self.index.insert(id.to_string(), idx);
        idx
    }
}

// ---------------------------------------------------------------------------
// LineageTracker
// ---------------------------------------------------------------------------

/// In-process lineage graph.
///
/// Cheap to clone — all clones share the same graph via `Arc<RwLock<_>>`.
#[derive(Debug, Clone)]
pub struct LineageTracker {
    inner: Arc<RwLock<Inner>>,
}

impl Default for LineageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LineageTracker {
    /// Create an empty lineage graph.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                graph: StableDiGraph::new(),
                index: HashMap::new(),
                tasks: HashMap::new(),
                solutions: HashMap::new(),
            })),
        }
    }

    /// Record (or update) a task node.
    ///
    /// # Errors
    /// Returns [`LineageError::LockPoisoned`] if the graph lock is poisoned.
    pub fn record_task(&self, task: TaskSpec) -> Result<(), LineageError> {
        let mut inner = self.inner.write().map_err(|_| LineageError::LockPoisoned)?;
        inner.node(&task.id);
        inner.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    /// Record (or update) a solution node and its declared parent edges.
    ///
    /// Parent IDs that are not yet recorded are skipped silently — a later
    /// [`Self::link_parent`] can add them once both ends exist.
    ///
    /// # Errors
    /// Returns [`LineageError::LockPoisoned`] if the graph lock is poisoned.
    pub fn record_solution(&self, solution: Solution) -> Result<(), LineageError> {
        let mut inner = self.inner.write().map_err(|_| LineageError::LockPoisoned)?;
        let child_idx = inner.node(&solution.id);

        for parent_id in solution.parent_ids.clone() {
            if parent_id == solution.id {
                continue;
            }
            if let Some(&parent_idx) = inner.index.get(&parent_id) {
                if !has_path_connecting(&inner.graph, child_idx, parent_idx, None) {
                    inner.graph.add_edge(parent_idx, child_idx, Relation::ParentOf);
                }
            }
        }

        if let Some(&task_idx) = inner.index.get(&solution.task_id) {
            if inner.tasks.contains_key(&solution.task_id) {
                inner.graph.add_edge(child_idx, task_idx, Relation::Solves);
            }
        }

        inner.solutions.insert(solution.id.clone(), solution);
        Ok(())
    }

    /// Add a `PARENT_OF` edge from `parent_id` to `child_id`.
    ///
    /// # Errors
    /// - [`LineageError::SolutionNotFound`] if either end is unknown.
    /// - [`LineageError::SelfLoop`] if both IDs are equal.
    /// - [`LineageError::CycleDetected`] if the edge would create a cycle.
    /// - [`LineageError::LockPoisoned`] if the graph lock is poisoned.
    pub fn link_parent(&self, child_id: &str, parent_id: &str) -> Result<(), LineageError> {
        if child_id == parent_id {
            return Err(LineageError::SelfLoop);
        }
        let mut inner = self.inner.write().map_err(|_| LineageError::LockPoisoned)?;

        let child_idx = *inner
            .index
            .get(child_id)
            .filter(|_| inner.solutions.contains_key(child_id))
            .ok_or_else(|| LineageError::SolutionNotFound(child_id.to_string()))?;
        let parent_idx = *inner
            .index
            .get(parent_id)
            .filter(|_| inner.solutions.contains_key(parent_id))
            .ok_or_else(|| LineageError::SolutionNotFound(parent_id.to_string()))?;

        // parent → child would close a cycle iff child already reaches parent.
        if has_path_connecting(&inner.graph, child_idx, parent_idx, None) {
            return Err(LineageError::CycleDetected);
        }

        inner.graph.add_edge(parent_idx, child_idx, Relation::ParentOf);
        Ok(())
    }

    /// Link a solution to the task it answers.
    ///
    /// # Errors
    /// - [`LineageError::SolutionNotFound`] / [`LineageError::TaskNotFound`]
    ///   if either end is unknown.
    /// - [`LineageError::LockPoisoned`] if the graph lock is poisoned.
    pub fn link_solution_to_task(
        &self,
        solution_id: &str,
        task_id: &str,
    ) -> Result<(), LineageError> {
        let mut inner = self.inner.write().map_err(|_| LineageError::LockPoisoned)?;
        let sol_idx = *inner
            .index
            .get(solution_id)
            .filter(|_| inner.solutions.contains_key(solution_id))
            .ok_or_else(|| LineageError::SolutionNotFound(solution_id.to_string()))?;
        let task_idx = *inner
            .index
            .get(task_id)
            .filter(|_| inner.tasks.contains_key(task_id))
            .ok_or_else(|| LineageError::TaskNotFound(task_id.to_string()))?;
        inner.graph.add_edge(sol_idx, task_idx, Relation::Solves);
        Ok(())
    }

    /// Create a typed relationship between any two recorded entities.
    ///
    /// Example: `link_cross_domain("s1", "INFLUENCES", "s2", Some(0.7))`.
    ///
    /// # Errors
    /// - [`LineageError::SolutionNotFound`] if either ID is unknown.
    /// - [`LineageError::SelfLoop`] if both IDs are equal.
    /// - [`LineageError::LockPoisoned`] if the graph lock is poisoned.
    pub fn link_cross_domain(
        &self,
        left_id: &str,
        rel: &str,
        right_id: &str,
        weight: Option<f64>,
    ) -> Result<(), LineageError> {
        if left_id == right_id {
            return Err(LineageError::SelfLoop);
        }
        let mut inner = self.inner.write().map_err(|_| LineageError::LockPoisoned)?;
        let left_idx = *inner
            .index
            .get(left_id)
            .ok_or_else(|| LineageError::SolutionNotFound(left_id.to_string()))?;
        let right_idx = *inner
            .index
            .get(right_id)
            .ok_or_else(|| LineageError::SolutionNotFound(right_id.to_string()))?;
        inner.graph.add_edge(
            left_idx,
            right_idx,
            Relation::Custom {
                rel: rel.to_string(),
                weight,
            },
        );
        Ok(())
    }

    /// Fetch a recorded solution by ID.
    pub fn solution(&self, id: &str) -> Option<Solution> {
        self.inner
            .read()
            .ok()
            .and_then(|inner| inner.solutions.get(id).cloned())
    }

    /// Ancestors of a solution, following `PARENT_OF` edges upward, up to
    /// `max_depth` hops.
    ///
    /// # Errors
    /// - [`LineageError::SolutionNotFound`] if the ID is unknown.
    /// - [`LineageError::LockPoisoned`] if the graph lock is poisoned.
    pub fn ancestors(&self, id: &str, max_depth: usize) -> Result<Vec<Solution>, LineageError> {
        self.walk(id, max_depth, Direction::Incoming)
    }

    /// Descendants of a solution, following `PARENT_OF` edges downward, up
    /// to `max_depth` hops.
    ///
    /// # Errors
    /// Same as [`Self::ancestors`].
    pub fn descendants(&self, id: &str, max_depth: usize) -> Result<Vec<Solution>, LineageError> {
        self.walk(id, max_depth, Direction::Outgoing)
    }

    fn walk(
        &self,
        id: &str,
        max_depth: usize,
        direction: Direction,
    ) -> Result<Vec<Solution>, LineageError> {
        let inner = self.inner.read().map_err(|_| LineageError::LockPoisoned)?;
        let start = *inner
            .index
            .get(id)
            .filter(|_| inner.solutions.contains_key(id))
            .ok_or_else(|| LineageError::SolutionNotFound(id.to_string()))?;

        let mut seen: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<(NodeIndex, usize)> = VecDeque::new();
        let mut out = Vec::new();
        queue.push_back((start, 0));
        seen.insert(start);

        while let Some((node, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            // Only PARENT_OF edges participate in ancestry.
            for edge in inner.graph.edges_directed(node, direction) {
                if !matches!(edge.weight(), Relation::ParentOf) {
                    continue;
                }
                let next = match direction {
                    Direction::Incoming => edge.source(),
                    Direction::Outgoing => edge.target(),
                };
                if seen.insert(next) {
                    if let Some(sol) = inner
                        .graph
                        .node_weight(next)
                        .and_then(|nid| inner.solutions.get(nid))
                    {
                        out.push(sol.clone());
                    }
                    queue.push_back((next, depth + 1));
                }
            }
        }

        Ok(out)
    }

    /// Best solutions by fitness, optionally filtered by task ID and domain.
    pub fn best_solutions(
        &self,
        task_id: Option<&str>,
        domain: Option<&str>,
        limit: usize,
    ) -> Vec<Solution> {
        let Ok(inner) = self.inner.read() else {
            return Vec::new();
        };
        let mut matches: Vec<Solution> = inner
            .solutions
            .values()
            .filter(|s| task_id.is_none_or(|t| s.task_id == t))
            .filter(|s| domain.is_none_or(|d| s.domain == d))
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            b.fitness
                .partial_cmp(&a.fitness)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(limit);
        matches
    }

    /// Aggregate statistics for one pool, optionally filtered by domain.
    pub fn pool_statistics(&self, pool: &str, domain: Option<&str>) -> PoolStatistics {
        let Ok(inner) = self.inner.read() else {
            return PoolStatistics::default();
        };
        let selected: Vec<&Solution> = inner
            .solutions
            .values()
            .filter(|s| s.pool.as_str() == pool)
            .filter(|s| domain.is_none_or(|d| s.domain == d))
            .collect();

        if selected.is_empty() {
            return PoolStatistics::default();
        }

        let count = selected.len();
        let sum_fitness: f64 = selected.iter().map(|s| s.fitness).sum();
        let sum_cost: usize = selected.iter().map(|s| s.token_cost).sum();
        PoolStatistics {
            solution_count: count,
            avg_fitness: sum_fitness / count as f64,
            max_fitness: selected.iter().map(|s| s.fitness).fold(f64::MIN, f64::max),
            min_fitness: selected.iter().map(|s| s.fitness).fold(f64::MAX, f64::min),
            avg_token_cost: sum_cost as f64 / count as f64,
            max_generation: selected.iter().map(|s| s.generation).max().unwrap_or(0),
        }
    }

    /// Family tree for one solution: ancestors, self, descendants, with
    /// parent → child edges for the graph pane.
    ///
    /// # Errors
    /// Same as [`Self::ancestors`].
    pub fn family_tree(&self, id: &str) -> Result<FamilyTree, LineageError> {
        let root = self
            .solution(id)
            .ok_or_else(|| LineageError::SolutionNotFound(id.to_string()))?;
        let ancestors = self.ancestors(id, usize::MAX)?;
        let descendants = self.descendants(id, usize::MAX)?;

        let mut nodes = ancestors;
        nodes.push(root);
        nodes.extend(descendants);

        let ids: HashSet<&str> = nodes.iter().map(|s| s.id.as_str()).collect();
        let inner = self.inner.read().map_err(|_| LineageError::LockPoisoned)?;
        let mut edges = Vec::new();
        for node in &nodes {
            if let Some(&idx) = inner.index.get(&node.id) {
                for edge in inner.graph.edges_directed(idx, Direction::Outgoing) {
                    if !matches!(edge.weight(), Relation::ParentOf) {
                        continue;
                    }
                    if let Some(target) = inner.graph.node_weight(edge.target()) {
                        if ids.contains(target.as_str()) {
                            edges.push(GraphEdge {
                                source: node.id.clone(),
                                target: target.clone(),
                            });
                        }
                    }
                }
            }
        }

        Ok(FamilyTree { nodes, edges })
    }

    /// Stamp the default domain on tasks and solutions missing one.
    ///
    /// Returns `(solutions_updated, tasks_updated)`.
    pub fn assign_default_domain(&self, domain: &str) -> (usize, usize) {
        let Ok(mut inner) = self.inner.write() else {
            return (0, 0);
        };
        let mut solutions_updated = 0;
        for sol in inner.solutions.values_mut() {
            if sol.domain.trim().is_empty() {
                sol.domain = domain.to_string();
                solutions_updated += 1;
            }
        }
        let mut tasks_updated = 0;
        for task in inner.tasks.values_mut() {
            if task.domain.trim().is_empty() {
                task.domain = domain.to_string();
                tasks_updated += 1;
            }
        }
        (solutions_updated, tasks_updated)
    }

    /// Number of recorded solutions.
    pub fn solution_count(&self) -> usize {
        self.inner.read().map(|i| i.solutions.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PoolId, DEFAULT_DOMAIN};

    fn solution(id: &str, pool: &str, fitness: f64, generation: usize) -> Solution {
        Solution {
            id: id.to_string(),
            pool: PoolId::new(pool),
            model: "m".into(),
            code: "echo ok".into(),
            reasoning: String::new(),
            fitness,
            generation,
            reasoning_steps: 5,
            token_cost: 100,
            parent_ids: vec![],
            task_id: "task-1".into(),
            domain: DEFAULT_DOMAIN.into(),
            execution_time_ms: 10,
            created_at: chrono::Utc::now(),
        }
    }

    fn tracker_with_chain() -> LineageTracker {
        // gen0 -> gen1 -> gen2
        let tracker = LineageTracker::new();
        tracker.record_solution(solution("gen0", "r1", 0.2, 0)).unwrap();
        tracker.record_solution(solution("gen1", "r1", 0.5, 1)).unwrap();
        tracker.record_solution(solution("gen2", "r1", 0.9, 2)).unwrap();
        tracker.link_parent("gen1", "gen0").unwrap();
        tracker.link_parent("gen2", "gen1").unwrap();
        tracker
    }

    #[test]
    fn test_record_solution_is_upsert() {
        let tracker = LineageTracker::new();
        tracker.record_solution(solution("s1", "r1", 0.1, 0)).unwrap();
        tracker.record_solution(solution("s1", "r1", 0.8, 0)).unwrap();
        assert_eq!(tracker.solution_count(), 1);
        let stored = tracker.solution("s1").unwrap();
        assert!((stored.fitness - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_link_parent_unknown_solution_errors() {
        let tracker = LineageTracker::new();
        tracker.record_solution(solution("s1", "r1", 0.1, 0)).unwrap();
        let err = tracker.link_parent("s1", "ghost").unwrap_err();
        assert!(matches!(err, LineageError::SolutionNotFound(_)));
    }

    #[test]
    fn test_link_parent_self_loop_rejected() {
        let tracker = LineageTracker::new();
        tracker.record_solution(solution("s1", "r1", 0.1, 0)).unwrap();
        let err = tracker.link_parent("s1", "s1").unwrap_err();
        assert!(matches!(err, LineageError::SelfLoop));
    }

    #[test]
    fn test_link_parent_cycle_rejected() {
        let tracker = tracker_with_chain();
        // gen0 is an ancestor of gen2; making gen2 a parent of gen0 cycles.
        let err = tracker.link_parent("gen0", "gen2").unwrap_err();
        assert!(matches!(err, LineageError::CycleDetected));
    }

    #[test]
    fn test_ancestors_walks_full_chain() {
        let tracker = tracker_with_chain();
        let ancestors = tracker.ancestors("gen2", 5).unwrap();
        let ids: Vec<&str> = ancestors.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"gen0"));
        assert!(ids.contains(&"gen1"));
    }

    #[test]
    fn test_ancestors_respects_max_depth() {
        let tracker = tracker_with_chain();
        let ancestors = tracker.ancestors("gen2", 1).unwrap();
        assert_eq!(ancestors.len(), 1);
        assert_eq!(ancestors[0].id, "gen1");
    }

    #[test]
    fn test_descendants_walk_downward() {
        let tracker = tracker_with_chain();
        let descendants = tracker.descendants("gen0", 5).unwrap();
        assert_eq!(descendants.len(), 2);
    }

    #[test]
    fn test_ancestors_unknown_id_errors() {
        let tracker = LineageTracker::new();
        let err = tracker.ancestors("ghost", 5).unwrap_err();
        assert!(matches!(err, LineageError::SolutionNotFound(_)));
    }

    #[test]
    fn test_best_solutions_ordered_by_fitness() {
        let tracker = tracker_with_chain();
        let best = tracker.best_solutions(None, None, 2);
        assert_eq!(best.len(), 2);
        assert_eq!(best[0].id, "gen2");
        assert_eq!(best[1].id, "gen1");
    }

    #[test]
    fn test_best_solutions_filters_by_domain() {
        let tracker = LineageTracker::new();
        let mut other = solution("other", "r1", 1.0, 0);
        other.domain = "physics".into();
        tracker.record_solution(other).unwrap();
        tracker.record_solution(solution("code", "r1", 0.5, 0)).unwrap();
        let best = tracker.best_solutions(None, Some("code"), 10);
        assert_eq!(best.len(), 1);
        assert_eq!(best[0].id, "code");
    }

    #[test]
    fn test_pool_statistics_aggregates() {
        let tracker = tracker_with_chain();
        let stats = tracker.pool_statistics("r1", None);
        assert_eq!(stats.solution_count, 3);
        assert!((stats.max_fitness - 0.9).abs() < f64::EPSILON);
        assert!((stats.min_fitness - 0.2).abs() < f64::EPSILON);
        assert!((stats.avg_fitness - (0.2 + 0.5 + 0.9) / 3.0).abs() < 1e-9);
        assert_eq!(stats.max_generation, 2);
    }

    #[test]
    fn test_pool_statistics_empty_pool_is_default() {
        let tracker = LineageTracker::new();
        let stats = tracker.pool_statistics("ghost", None);
        assert_eq!(stats.solution_count, 0);
    }

    #[test]
    fn test_family_tree_contains_all_relatives() {
        let tracker = tracker_with_chain();
        let tree = tracker.family_tree("gen1").unwrap();
        assert_eq!(tree.nodes.len(), 3);
        assert_eq!(tree.edges.len(), 2);
        assert!(tree
            .edges
            .iter()
            .any(|e| e.source == "gen0" && e.target == "gen1"));
        assert!(tree
            .edges
            .iter()
            .any(|e| e.source == "gen1" && e.target == "gen2"));
    }

    #[test]
    fn test_record_solution_with_declared_parents() {
        let tracker = LineageTracker::new();
        tracker.record_solution(solution("p", "r1", 0.3, 0)).unwrap();
        let mut child = solution("c", "r1", 0.6, 1);
        child.parent_ids = vec!["p".into()];
        tracker.record_solution(child).unwrap();
        let ancestors = tracker.ancestors("c", 5).unwrap();
        assert_eq!(ancestors.len(), 1);
        assert_eq!(ancestors[0].id, "p");
    }

    #[test]
    fn test_link_solution_to_task() {
        let tracker = LineageTracker::new();
        let mut task = TaskSpec::new("t", "code", "d", "c");
        task.id = "task-1".into();
        tracker.record_task(task).unwrap();
        tracker.record_solution(solution("s1", "r1", 0.5, 0)).unwrap();
        tracker.link_solution_to_task("s1", "task-1").unwrap();
        let err = tracker.link_solution_to_task("s1", "ghost").unwrap_err();
        assert!(matches!(err, LineageError::TaskNotFound(_)));
    }

    #[test]
    fn test_cross_domain_link_between_solutions() {
        let tracker = LineageTracker::new();
        tracker.record_solution(solution("a", "r1", 0.5, 0)).unwrap();
        tracker.record_solution(solution("b", "qwen", 0.5, 0)).unwrap();
        tracker
            .link_cross_domain("a", "INFLUENCES", "b", Some(0.7))
            .unwrap();
        // Cross-domain edges do not participate in ancestry.
        assert!(tracker.ancestors("b", 5).unwrap().is_empty());
    }

    #[test]
    fn test_assign_default_domain_counts() {
        let tracker = LineageTracker::new();
        let mut sol = solution("s1", "r1", 0.5, 0);
        sol.domain = String::new();
        tracker.record_solution(sol).unwrap();
        tracker.record_solution(solution("s2", "r1", 0.5, 0)).unwrap();
        let (s_count, t_count) = tracker.assign_default_domain("code");
        assert_eq!(s_count, 1);
        assert_eq!(t_count, 0);
        assert_eq!(tracker.solution("s1").unwrap().domain, "code");
    }

    #[test]
    fn test_clone_shares_state() {
        let tracker = LineageTracker::new();
        let clone = tracker.clone();
        tracker.record_solution(solution("s1", "r1", 0.5, 0)).unwrap();
        assert_eq!(clone.solution_count(), 1);
    }
}
