//! Web API Server
//!
//! REST control plane for the competition: start/stop/inspect the evolution
//! driver, manage agents, query solutions and lineage, run code through the
//! sandbox, and expose health plus Prometheus metrics.
//!
//! ## Endpoints
//!
//! ### Control pane
//! - `POST /api/v1/evolution/start` — Launch the generation loop (409 if running)
//! - `POST /api/v1/evolution/stop` — Request the loop to stop
//! - `GET  /api/v1/evolution/status` — Running flag and last generation summary
//!
//! ### Agents
//! - `POST /api/v1/agents/spawn` — Create a root agent or spawn a child
//! - `POST /api/v1/agents/retire` — Retire an agent
//! - `POST /api/v1/agents/auto_retire` — Prune unfit non-root agents
//! - `GET  /api/v1/agents` — List agents
//! - `GET  /api/v1/agents/{id}/family` — Family tree
//! - `POST /api/v1/agents/topic` — Record a topic sighting
//!
//! ### Entities
//! - `POST /api/v1/solutions` — Record an external solution
//! - `GET  /api/v1/solutions/best` — Best solutions, filterable
//! - `GET  /api/v1/solutions/{id}/lineage` — Ancestors and descendants
//! - `GET  /api/v1/pools/{pool}/stats` — Pool statistics
//! - `POST /api/v1/entities/link` — Cross-domain relationship
//! - `POST /api/v1/entities/migrate_domain` — Stamp default domain
//!
//! ### Panes & utilities
//! - `GET  /api/v1/graph` — Agent graph grouped by category and generation
//! - `POST /api/v1/execute` — Run code through the sandbox
//! - `POST /api/v1/tag` — Categorise and tag a message
//! - `GET  /health` — Health check
//! - `GET  /metrics` — Prometheus metrics

use crate::artifact::ArtifactExporter;
use crate::evolution::{CompetitiveEvolution, EvolutionDriver, GenerationSummary};
use crate::fitness::{CodeSandbox, ExecutionReport};
use crate::lifecycle::{Agent, AgentTreeNode, LifecycleError, LifecycleManager};
use crate::lineage::{LineageError, LineageTracker, PoolStatistics};
use crate::tagging::{categorize, tag_content, Category};
use crate::{EvolutionError, PoolId, Solution};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::info;
use uuid::Uuid;

// ============================================================================
// Types & Configuration
// ============================================================================

/// Maximum request body size (1 MB).
const MAX_REQUEST_SIZE: usize = 1024 * 1024;

/// Maximum code size accepted by `POST /api/v1/execute` (64 KiB).
const MAX_CODE_SIZE: usize = 64 * 1024;

/// Shared application state available to all handlers.
pub struct AppState {
    /// The competition engine; cloned into a driver on start.
    pub engine: CompetitiveEvolution,
    /// Currently running driver, if any.
    pub driver: Mutex<Option<EvolutionDriver>>,
    /// Generation budget for driver launches.
    pub max_generations: usize,
    /// Pause between generations.
    pub generation_delay: Duration,
    /// Agent registry.
    pub lifecycle: LifecycleManager,
    /// Lineage graph (shared with the engine).
    pub lineage: LineageTracker,
    /// Sandbox for ad-hoc `POST /api/v1/execute` runs.
    pub sandbox: CodeSandbox,
    /// Artifact exporter for `POST /api/v1/solutions/{id}/export`.
    pub exporter: ArtifactExporter,
    /// Default threshold for auto-retire sweeps.
    pub retire_threshold: f64,
}

// ============================================================================
// Server
// ============================================================================

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/evolution/start", post(start_evolution_handler))
        .route("/api/v1/evolution/stop", post(stop_evolution_handler))
        .route("/api/v1/evolution/status", get(evolution_status_handler))
        .route("/api/v1/agents/spawn", post(spawn_agent_handler))
        .route("/api/v1/agents/retire", post(retire_agent_handler))
        .route("/api/v1/agents/auto_retire", post(auto_retire_handler))
        .route("/api/v1/agents", get(list_agents_handler))
        .route("/api/v1/agents/:id/family", get(agent_family_handler))
        .route("/api/v1/agents/topic", post(record_topic_handler))
        .route("/api/v1/solutions", post(submit_solution_handler))
        .route("/api/v1/solutions/best", get(best_solutions_handler))
        .route("/api/v1/solutions/:id/lineage", get(solution_lineage_handler))
        .route("/api/v1/solutions/:id/export", post(export_solution_handler))
        .route("/api/v1/pools/:pool/stats", get(pool_stats_handler))
        .route("/api/v1/entities/link", post(link_entities_handler))
        .route("/api/v1/entities/migrate_domain", post(migrate_domain_handler))
        .route("/api/v1/graph", get(graph_handler))
        .route("/api/v1/execute", post(execute_handler))
        .route("/api/v1/tag", post(tag_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(middleware::from_fn_with_state(
            MAX_REQUEST_SIZE,
            body_size_middleware,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the web API server. Blocks until the server shuts down.
///
/// # Errors
///
/// Returns [`EvolutionError::Other`] if the address cannot be bound or the
/// server fails.
pub async fn start_server(addr: &str, state: Arc<AppState>) -> Result<(), EvolutionError> {
    info!("starting API server on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| EvolutionError::Other(format!("bind {addr}: {e}")))?;
    axum::serve(listener, router(state))
        .await
        .map_err(|e| EvolutionError::Other(format!("server error: {e}")))?;
    Ok(())
}

// ============================================================================
// Middleware
// ============================================================================

/// Adds a unique `X-Request-ID` header to every response and counts the
/// request against the per-endpoint metric.
///
/// If the client sends an `X-Request-ID` header, it is preserved; otherwise
/// a new UUID v4 is generated.
async fn request_id_middleware(req: Request<Body>, next: Next) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    crate::metrics::inc_api_request(req.uri().path());

    let mut response = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }

    response
}

/// Rejects requests whose `Content-Length` exceeds `max_size` with 413.
async fn body_size_middleware(
    State(max_size): State<usize>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(content_length) = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<usize>().ok())
    {
        if content_length > max_size {
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(serde_json::json!({"error": "Request body too large"})),
            )
                .into_response();
        }
    }

    next.run(req).await
}

// ============================================================================
// Control-pane handlers
// ============================================================================

/// Response for evolution control endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionStatus {
    /// Whether the driver is currently running.
    pub running: bool,
    /// Last completed generation summary, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_summary: Option<GenerationSummary>,
}

/// `POST /api/v1/evolution/start` — Launch the generation loop.
async fn start_evolution_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<EvolutionStatus>, ApiError> {
    let mut driver = state.driver.lock().map_err(|_| ApiError::internal("state lock poisoned"))?;
    if driver.as_ref().is_some_and(|d| d.is_running()) {
        return Err(ApiError::Conflict("evolution already running".into()));
    }

    *driver = Some(EvolutionDriver::start(
        state.engine.clone(),
        state.max_generations,
        state.generation_delay,
    ));
    info!("evolution driver launched");
    Ok(Json(EvolutionStatus {
        running: true,
        last_summary: None,
    }))
}

/// `POST /api/v1/evolution/stop` — Request the loop to stop.
async fn stop_evolution_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<EvolutionStatus>, ApiError> {
    let driver = state.driver.lock().map_err(|_| ApiError::internal("state lock poisoned"))?;
    let Some(driver) = driver.as_ref() else {
        return Err(ApiError::Conflict("evolution not running".into()));
    };
    driver.stop();
    Ok(Json(EvolutionStatus {
        running: driver.is_running(),
        last_summary: driver.last_summary(),
    }))
}

/// `GET /api/v1/evolution/status` — Running flag and latest summary.
async fn evolution_status_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<EvolutionStatus>, ApiError> {
    let driver = state.driver.lock().map_err(|_| ApiError::internal("state lock poisoned"))?;
    Ok(Json(match driver.as_ref() {
        Some(driver) => EvolutionStatus {
            running: driver.is_running(),
            last_summary: driver.last_summary(),
        },
        None => EvolutionStatus {
            running: false,
            last_summary: None,
        },
    }))
}

// ============================================================================
// Agent handlers
// ============================================================================

/// JSON body for `POST /api/v1/agents/spawn`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnAgentRequest {
    /// Agent name.
    pub name: String,
    /// Parent agent ID; omitted for a root agent.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Initial domain specialisation (roots only).
    #[serde(default)]
    pub domain: Option<String>,
}

/// `POST /api/v1/agents/spawn` — Create a root agent or spawn a child.
async fn spawn_agent_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SpawnAgentRequest>,
) -> Result<Json<Agent>, ApiError> {
    let agent = match req.parent_id {
        Some(parent_id) => state.lifecycle.spawn_child(&parent_id, req.name)?,
        None => state.lifecycle.create_root_agent(req.name, req.domain),
    };
    Ok(Json(agent))
}

/// JSON body for `POST /api/v1/agents/retire`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetireAgentRequest {
    /// Agent to retire.
    pub agent_id: String,
}

/// `POST /api/v1/agents/retire` — Retire an agent.
async fn retire_agent_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RetireAgentRequest>,
) -> Result<Json<Agent>, ApiError> {
    Ok(Json(state.lifecycle.retire(&req.agent_id)?))
}

/// JSON body for `POST /api/v1/agents/auto_retire`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoRetireRequest {
    /// Fitness threshold; the configured default is used when omitted.
    #[serde(default)]
    pub threshold: Option<f64>,
}

/// Response for `POST /api/v1/agents/auto_retire`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoRetireResponse {
    /// Threshold that was applied.
    pub threshold: f64,
    /// IDs of the agents retired by the sweep.
    pub retired: Vec<String>,
}

/// `POST /api/v1/agents/auto_retire` — Prune unfit non-root agents.
async fn auto_retire_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AutoRetireRequest>,
) -> Result<Json<AutoRetireResponse>, ApiError> {
    let threshold = req.threshold.unwrap_or(state.retire_threshold);
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ApiError::BadRequest(
            "threshold must be between 0.0 and 1.0".into(),
        ));
    }
    let retired = state.lifecycle.auto_retire_below(threshold);
    Ok(Json(AutoRetireResponse { threshold, retired }))
}

/// Query for `GET /api/v1/agents`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListAgentsQuery {
    /// When true, only active agents are returned.
    #[serde(default)]
    pub live: bool,
}

/// `GET /api/v1/agents` — List agents.
async fn list_agents_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListAgentsQuery>,
) -> Json<Vec<Agent>> {
    Json(if query.live {
        state.lifecycle.live_agents()
    } else {
        state.lifecycle.all_agents()
    })
}

/// `GET /api/v1/agents/{id}/family` — Family tree.
async fn agent_family_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<AgentTreeNode>>, ApiError> {
    Ok(Json(state.lifecycle.family_tree(&id)?))
}

/// JSON body for `POST /api/v1/agents/topic`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordTopicRequest {
    /// Agent observing the topic.
    pub agent_id: String,
    /// Topic text.
    pub topic: String,
}

/// Response for `POST /api/v1/agents/topic`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordTopicResponse {
    /// Agent's specialisation after the update.
    pub specialization: Option<String>,
}

/// `POST /api/v1/agents/topic` — Record a topic sighting.
async fn record_topic_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RecordTopicRequest>,
) -> Result<Json<RecordTopicResponse>, ApiError> {
    let specialization = state.lifecycle.record_topic(&req.agent_id, &req.topic)?;
    Ok(Json(RecordTopicResponse { specialization }))
}

// ============================================================================
// Entity handlers
// ============================================================================

/// JSON body for `POST /api/v1/solutions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitSolutionRequest {
    /// Solution ID; generated if omitted.
    #[serde(default)]
    pub id: Option<String>,
    /// Pool the solution belongs to.
    pub pool: String,
    /// Model that produced it.
    pub model: String,
    /// Solution code.
    pub code: String,
    /// Reasoning trace.
    #[serde(default)]
    pub reasoning: String,
    /// Fitness score; clamped into `[0.0, 1.0]`.
    #[serde(default)]
    pub fitness: f64,
    /// Generation number.
    #[serde(default)]
    pub generation: usize,
    /// Token cost.
    #[serde(default)]
    pub token_cost: usize,
    /// Parent solution IDs.
    #[serde(default)]
    pub parent_ids: Vec<String>,
    /// Task the solution answers.
    #[serde(default)]
    pub task_id: String,
    /// Domain; empty falls back to the default domain.
    #[serde(default)]
    pub domain: String,
}

/// `POST /api/v1/solutions` — Record an external solution with its links.
async fn submit_solution_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitSolutionRequest>,
) -> Result<Json<Solution>, ApiError> {
    let reasoning_steps = req.reasoning.lines().filter(|l| !l.trim().is_empty()).count();
    let domain = if req.domain.trim().is_empty() {
        crate::DEFAULT_DOMAIN.to_string()
    } else {
        req.domain.trim().to_lowercase()
    };
    let mut solution = Solution {
        id: req.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        pool: PoolId::new(req.pool),
        model: req.model,
        code: req.code,
        reasoning: req.reasoning,
        fitness: 0.0,
        generation: req.generation,
        reasoning_steps,
        token_cost: req.token_cost,
        parent_ids: req.parent_ids,
        task_id: req.task_id,
        domain,
        execution_time_ms: 0,
        created_at: chrono::Utc::now(),
    };
    solution.set_fitness(req.fitness);
    state.lineage.record_solution(solution.clone())?;
    Ok(Json(solution))
}

/// Query for `GET /api/v1/solutions/best`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BestSolutionsQuery {
    /// Restrict to one task.
    #[serde(default)]
    pub task_id: Option<String>,
    /// Restrict to one domain.
    #[serde(default)]
    pub domain: Option<String>,
    /// Maximum results (default 10).
    #[serde(default)]
    pub limit: Option<usize>,
}

/// `GET /api/v1/solutions/best` — Best solutions by fitness.
async fn best_solutions_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BestSolutionsQuery>,
) -> Json<Vec<Solution>> {
    Json(state.lineage.best_solutions(
        query.task_id.as_deref(),
        query.domain.as_deref(),
        query.limit.unwrap_or(10),
    ))
}

/// Query for `GET /api/v1/solutions/{id}/lineage`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LineageQuery {
    /// Maximum hops in each direction (default 10).
    #[serde(default)]
    pub depth: Option<usize>,
}

/// Response for `GET /api/v1/solutions/{id}/lineage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionLineage {
    /// Ancestors, nearest first order not guaranteed.
    pub ancestors: Vec<Solution>,
    /// Descendants.
    pub descendants: Vec<Solution>,
}

/// `GET /api/v1/solutions/{id}/lineage` — Ancestors and descendants.
async fn solution_lineage_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<LineageQuery>,
) -> Result<Json<SolutionLineage>, ApiError> {
    let depth = query.depth.unwrap_or(10);
    Ok(Json(SolutionLineage {
        ancestors: state.lineage.ancestors(&id, depth)?,
        descendants: state.lineage.descendants(&id, depth)?,
    }))
}

/// Response for `POST /api/v1/solutions/{id}/export`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSolutionResponse {
    /// Directory the artifact was written to.
    pub dir: String,
    /// `(file name, sha256 hex)` for every exported file.
    pub checksums: Vec<(String, String)>,
}

/// `POST /api/v1/solutions/{id}/export` — Export a solution with checksums.
async fn export_solution_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ExportSolutionResponse>, ApiError> {
    let solution = state
        .lineage
        .solution(&id)
        .ok_or_else(|| ApiError::NotFound(format!("solution not found: {id}")))?;
    let artifact = state.exporter.export(&solution)?;
    Ok(Json(ExportSolutionResponse {
        dir: artifact.dir.display().to_string(),
        checksums: artifact.checksums,
    }))
}

/// Query for `GET /api/v1/pools/{pool}/stats`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoolStatsQuery {
    /// Restrict to one domain.
    #[serde(default)]
    pub domain: Option<String>,
}

/// `GET /api/v1/pools/{pool}/stats` — Pool statistics.
async fn pool_stats_handler(
    State(state): State<Arc<AppState>>,
    Path(pool): Path<String>,
    Query(query): Query<PoolStatsQuery>,
) -> Json<PoolStatistics> {
    Json(state.lineage.pool_statistics(&pool, query.domain.as_deref()))
}

/// JSON body for `POST /api/v1/entities/link`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkEntitiesRequest {
    /// Source entity ID.
    pub from_id: String,
    /// Relationship name (e.g. `"INFLUENCES"`).
    pub rel: String,
    /// Target entity ID.
    pub to_id: String,
    /// Optional relationship weight.
    #[serde(default)]
    pub weight: Option<f64>,
}

/// `POST /api/v1/entities/link` — Cross-domain relationship.
async fn link_entities_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LinkEntitiesRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .lineage
        .link_cross_domain(&req.from_id, &req.rel, &req.to_id, req.weight)?;
    Ok(StatusCode::CREATED)
}

/// JSON body for `POST /api/v1/entities/migrate_domain`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrateDomainRequest {
    /// Domain stamped on entities that have none.
    pub domain: String,
}

/// Response for `POST /api/v1/entities/migrate_domain`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrateDomainResponse {
    /// Solutions updated.
    pub solutions_updated: usize,
    /// Tasks updated.
    pub tasks_updated: usize,
}

/// `POST /api/v1/entities/migrate_domain` — Stamp the default domain.
async fn migrate_domain_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MigrateDomainRequest>,
) -> Result<Json<MigrateDomainResponse>, ApiError> {
    if req.domain.trim().is_empty() {
        return Err(ApiError::BadRequest("domain must not be empty".into()));
    }
    let (solutions_updated, tasks_updated) = state.lineage.assign_default_domain(&req.domain);
    Ok(Json(MigrateDomainResponse {
        solutions_updated,
        tasks_updated,
    }))
}

// ============================================================================
// Graph pane
// ============================================================================

/// One node in the graph pane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    /// Agent ID.
    pub id: String,
    /// Agent name.
    pub name: String,
    /// Category label (specialisation, or "unassigned").
    pub category: String,
    /// Agent generation.
    pub generation: usize,
    /// Latest fitness.
    pub fitness: f64,
    /// Whether the agent is active.
    pub active: bool,
}

/// Graph pane payload: nodes, parent edges, and count roll-ups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphData {
    /// All agents as graph nodes.
    pub nodes: Vec<GraphNode>,
    /// Parent → child edges.
    pub edges: Vec<crate::lineage::GraphEdge>,
    /// Node counts per category.
    pub by_category: HashMap<String, usize>,
    /// Node counts per generation.
    pub by_generation: HashMap<usize, usize>,
}

/// `GET /api/v1/graph` — Agent graph grouped by category and generation.
async fn graph_handler(State(state): State<Arc<AppState>>) -> Json<GraphData> {
    Json(build_graph_data(&state.lifecycle))
}

fn build_graph_data(lifecycle: &LifecycleManager) -> GraphData {
    let agents = lifecycle.all_agents();
    let mut nodes = Vec::with_capacity(agents.len());
    let mut edges = Vec::new();
    let mut by_category: HashMap<String, usize> = HashMap::new();
    let mut by_generation: HashMap<usize, usize> = HashMap::new();

    for agent in &agents {
        let category = agent
            .domain_specialization
            .clone()
            .unwrap_or_else(|| "unassigned".to_string());
        *by_category.entry(category.clone()).or_insert(0) += 1;
        *by_generation.entry(agent.generation).or_insert(0) += 1;

        if let Some(parent_id) = &agent.parent_id {
            edges.push(crate::lineage::GraphEdge {
                source: parent_id.clone(),
                target: agent.id.clone(),
            });
        }

        nodes.push(GraphNode {
            id: agent.id.clone(),
            name: agent.name.clone(),
            category,
            generation: agent.generation,
            fitness: agent.fitness,
            active: agent.state == crate::lifecycle::AgentState::Active,
        });
    }

    GraphData {
        nodes,
        edges,
        by_category,
        by_generation,
    }
}

// ============================================================================
// Sandbox & tagging panes
// ============================================================================

/// JSON body for `POST /api/v1/execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// Code to run through the sandbox.
    pub code: String,
}

/// `POST /api/v1/execute` — Run submitted code through the sandbox.
async fn execute_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<ExecutionReport>, ApiError> {
    if req.code.len() > MAX_CODE_SIZE {
        return Err(ApiError::BadRequest(format!(
            "code exceeds {MAX_CODE_SIZE} byte limit"
        )));
    }
    if req.code.trim().is_empty() {
        return Err(ApiError::BadRequest("code must not be empty".into()));
    }
    let report = state.sandbox.execute(&req.code).await?;
    Ok(Json(report))
}

/// JSON body for `POST /api/v1/tag`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagRequest {
    /// Message to categorise.
    pub message: String,
    /// Content to tag; the message is tagged when omitted.
    #[serde(default)]
    pub content: Option<String>,
}

/// Response for `POST /api/v1/tag`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagResponse {
    /// Matched category.
    pub category: Category,
    /// Match confidence.
    pub confidence: f64,
    /// Topic tags, including the `category:` tag.
    pub tags: Vec<String>,
}

/// `POST /api/v1/tag` — Categorise and tag a message.
async fn tag_handler(Json(req): Json<TagRequest>) -> Json<TagResponse> {
    let (category, confidence) = categorize(&req.message);
    let content = req.content.as_deref().unwrap_or(&req.message);
    let tags = tag_content(content, Some(category));
    Json(TagResponse {
        category,
        confidence,
        tags,
    })
}

// ============================================================================
// Utility Handlers
// ============================================================================

/// `GET /health` — Health check endpoint.
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /metrics` — Prometheus metrics endpoint.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

// ============================================================================
// Error Type
// ============================================================================

/// Application-level errors returned by API handlers.
///
/// Each variant maps to an HTTP status code and a JSON error body.
#[derive(Debug)]
pub enum ApiError {
    /// The requested resource was not found.
    NotFound(String),
    /// The request conflicts with current state (e.g. already running).
    Conflict(String),
    /// The request body or parameters are invalid.
    BadRequest(String),
    /// An internal failure.
    Internal(String),
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };

        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::AgentNotFound(_) => ApiError::NotFound(err.to_string()),
            LifecycleError::ParentRetired(_) | LifecycleError::AlreadyRetired(_) => {
                ApiError::Conflict(err.to_string())
            }
        }
    }
}

impl From<LineageError> for ApiError {
    fn from(err: LineageError) -> Self {
        match err {
            LineageError::SolutionNotFound(_) | LineageError::TaskNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            LineageError::SelfLoop | LineageError::CycleDetected => {
                ApiError::BadRequest(err.to_string())
            }
            LineageError::LockPoisoned => ApiError::internal(err.to_string()),
        }
    }
}

impl From<EvolutionError> for ApiError {
    fn from(err: EvolutionError) -> Self {
        match err {
            EvolutionError::ConfigError(m) => ApiError::BadRequest(m),
            EvolutionError::Lineage(e) => e.into(),
            EvolutionError::Lifecycle(e) => e.into(),
            other => ApiError::internal(other.to_string()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::EvolutionConfig;
    use crate::fitness::{FitnessEvaluator, FitnessWeights, SandboxConfig};
    use crate::worker::{ModelWorker, ScriptedWorker};
    use crate::TaskSpec;

    fn sh_sandbox() -> CodeSandbox {
        CodeSandbox::new(SandboxConfig {
            interpreter: "sh".to_string(),
            timeout: Duration::from_secs(5),
            max_output_bytes: 1024,
        })
    }

    fn test_state() -> Arc<AppState> {
        let evaluator = FitnessEvaluator::new(sh_sandbox(), FitnessWeights::default())
            .expect("test: default weights are valid");
        let lineage = LineageTracker::new();
        let workers: Vec<(PoolId, Arc<dyn ModelWorker>)> = vec![
            (
                PoolId::new("r1"),
                Arc::new(ScriptedWorker::new("r1-model", vec!["```sh\nexit 0\n```".into()])),
            ),
            (
                PoolId::new("qwen"),
                Arc::new(ScriptedWorker::new("qwen-model", vec!["```sh\nexit 1\n```".into()])),
            ),
        ];
        let engine = CompetitiveEvolution::new(
            TaskSpec::new("t", "code", "d", "c"),
            workers,
            EvolutionConfig {
                population_size: 3,
                elite_count: 1,
                ..EvolutionConfig::default()
            },
            evaluator,
            lineage.clone(),
            42,
        )
        .expect("test: two pools are valid");

        Arc::new(AppState {
            engine,
            driver: Mutex::new(None),
            max_generations: 2,
            generation_delay: Duration::ZERO,
            lifecycle: LifecycleManager::new(),
            lineage,
            sandbox: sh_sandbox(),
            exporter: ArtifactExporter::new(std::env::temp_dir().join("api-test-artifacts")),
            retire_threshold: 0.3,
        })
    }

    #[tokio::test]
    async fn test_start_evolution_then_conflict_while_running() {
        let state = test_state();
        let first = start_evolution_handler(State(Arc::clone(&state))).await;
        assert!(first.is_ok());
        // Second start while the driver may still be running: either the
        // driver already finished (ok) or we get a 409.
        match start_evolution_handler(State(Arc::clone(&state))).await {
            Ok(_) => {}
            Err(ApiError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
        if let Ok(guard) = state.driver.lock() {
            if let Some(driver) = guard.as_ref() {
                driver.stop();
            }
        };
    }

    #[tokio::test]
    async fn test_stop_without_start_is_conflict() {
        let state = test_state();
        let err = stop_evolution_handler(State(state)).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_status_idle_by_default() {
        let state = test_state();
        let status = evolution_status_handler(State(state)).await.unwrap();
        assert!(!status.0.running);
        assert!(status.0.last_summary.is_none());
    }

    #[tokio::test]
    async fn test_spawn_root_and_child_agents() {
        let state = test_state();
        let root = spawn_agent_handler(
            State(Arc::clone(&state)),
            Json(SpawnAgentRequest {
                name: "root".into(),
                parent_id: None,
                domain: Some("code".into()),
            }),
        )
        .await
        .unwrap();
        let child = spawn_agent_handler(
            State(Arc::clone(&state)),
            Json(SpawnAgentRequest {
                name: "child".into(),
                parent_id: Some(root.0.id.clone()),
                domain: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(child.0.generation, 1);
    }

    #[tokio::test]
    async fn test_spawn_with_unknown_parent_is_not_found() {
        let state = test_state();
        let err = spawn_agent_handler(
            State(state),
            Json(SpawnAgentRequest {
                name: "child".into(),
                parent_id: Some("ghost".into()),
                domain: None,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_retire_twice_is_conflict() {
        let state = test_state();
        let root = state.lifecycle.create_root_agent("root", None);
        retire_agent_handler(
            State(Arc::clone(&state)),
            Json(RetireAgentRequest {
                agent_id: root.id.clone(),
            }),
        )
        .await
        .unwrap();
        let err = retire_agent_handler(
            State(state),
            Json(RetireAgentRequest { agent_id: root.id }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_auto_retire_rejects_bad_threshold() {
        let state = test_state();
        let err = auto_retire_handler(
            State(state),
            Json(AutoRetireRequest {
                threshold: Some(2.0),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_submit_solution_clamps_fitness_and_defaults_domain() {
        let state = test_state();
        let solution = submit_solution_handler(
            State(state),
            Json(SubmitSolutionRequest {
                id: None,
                pool: "r1".into(),
                model: "m".into(),
                code: "exit 0".into(),
                reasoning: "one step".into(),
                fitness: 7.5,
                generation: 0,
                token_cost: 10,
                parent_ids: vec![],
                task_id: "task-1".into(),
                domain: String::new(),
            }),
        )
        .await
        .unwrap();
        assert!((solution.0.fitness - 1.0).abs() < f64::EPSILON);
        assert_eq!(solution.0.domain, crate::DEFAULT_DOMAIN);
        assert_eq!(solution.0.reasoning_steps, 1);
    }

    #[tokio::test]
    async fn test_export_unknown_solution_is_not_found() {
        let state = test_state();
        let err = export_solution_handler(State(state), Path("ghost".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_export_recorded_solution_writes_checksums() {
        let state = test_state();
        let solution = submit_solution_handler(
            State(Arc::clone(&state)),
            Json(SubmitSolutionRequest {
                id: None,
                pool: "r1".into(),
                model: "m".into(),
                code: "exit 0".into(),
                reasoning: String::new(),
                fitness: 0.9,
                generation: 1,
                token_cost: 5,
                parent_ids: vec![],
                task_id: String::new(),
                domain: "code".into(),
            }),
        )
        .await
        .unwrap();
        let exported = export_solution_handler(State(state), Path(solution.0.id.clone()))
            .await
            .unwrap();
        assert_eq!(exported.0.checksums.len(), 2);
        assert!(exported.0.dir.contains(&solution.0.id));
    }

    #[tokio::test]
    async fn test_execute_runs_code_in_sandbox() {
        let state = test_state();
        let report = execute_handler(
            State(state),
            Json(ExecuteRequest {
                code: "echo api-sandbox".into(),
            }),
        )
        .await
        .unwrap();
        assert!(report.0.exit_ok);
        assert!(report.0.stdout.contains("api-sandbox"));
    }

    #[tokio::test]
    async fn test_execute_rejects_oversized_code() {
        let state = test_state();
        let err = execute_handler(
            State(state),
            Json(ExecuteRequest {
                code: "x".repeat(MAX_CODE_SIZE + 1),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_tag_handler_categorises_and_tags() {
        let response = tag_handler(Json(TagRequest {
            message: "optimize the hot path".into(),
            content: Some("a fast and stable refactor".into()),
        }))
        .await;
        assert_eq!(response.0.category, Category::Exploitation);
        assert!(response.0.tags.contains(&"performance".to_string()));
        assert!(response.0.tags.contains(&"category:exploitation".to_string()));
    }

    #[tokio::test]
    async fn test_migrate_domain_rejects_empty_domain() {
        let state = test_state();
        let err = migrate_domain_handler(
            State(state),
            Json(MigrateDomainRequest {
                domain: "  ".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_build_graph_data_groups_counts() {
        let lifecycle = LifecycleManager::new();
        let root = lifecycle.create_root_agent("root", Some("security".into()));
        lifecycle.spawn_child(&root.id, "child").unwrap();
        let graph = build_graph_data(&lifecycle);
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.by_category.get("security"), Some(&2));
        assert_eq!(graph.by_generation.get(&0), Some(&1));
        assert_eq!(graph.by_generation.get(&1), Some(&1));
    }

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(
            ApiError::NotFound("x".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict("x".into()).into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::BadRequest("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Internal("x".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_lifecycle_error_mapping() {
        let err: ApiError = LifecycleError::AgentNotFound("a".into()).into();
        assert!(matches!(err, ApiError::NotFound(_)));
        let err: ApiError = LifecycleError::AlreadyRetired("a".into()).into();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn test_lineage_error_mapping() {
        let err: ApiError = LineageError::CycleDetected.into();
        assert!(matches!(err, ApiError::BadRequest(_)));
        let err: ApiError = LineageError::SolutionNotFound("s".into()).into();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
