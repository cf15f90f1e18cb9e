//! Prometheus metrics for the evolution service.
//!
//! ## Usage
//!
//! Call [`init_metrics`] once at process startup **before** starting the
//! evolution driver or the HTTP server. The helper functions (`set_fitness`,
//! `inc_sandbox_execution`, …) are no-ops if `init_metrics` was never called,
//! so the engine is always safe to run — observability simply degrades
//! gracefully.
//!
//! ## Metrics Exposed
//!
//! | Name | Type | Labels |
//! |------|------|--------|
//! | `evolution_fitness` | Gauge | `pool`, `kind` (`best` / `avg`) |
//! | `evolution_generation` | Gauge | — |
//! | `evolution_performance_gain` | Gauge | `pool` |
//! | `endpoint_health` | Gauge | `pool` |
//! | `inference_latency_seconds` | Histogram | `pool` |
//! | `sandbox_executions_total` | Counter | `outcome` |
//! | `api_requests_total` | Counter | `endpoint` |

use crate::EvolutionError;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;
use std::time::Duration;

// ── Internal metrics bundle ────────────────────────────────────────────────

/// All Prometheus metrics for the service, bundled together so they can be
/// stored in a single [`OnceLock`] and initialised atomically.
pub struct Metrics {
    /// Prometheus registry that owns all metric descriptors.
    pub registry: Registry,
    /// Best/average fitness per pool.
    pub fitness: GaugeVec,
    /// Current generation counter.
    pub generation: IntGauge,
    /// Inter-pool performance gain credited to the leading pool.
    pub performance_gain: GaugeVec,
    /// 1 when the pool's endpoint answered its last request, 0 otherwise.
    pub endpoint_health: GaugeVec,
    /// Model inference latency per pool.
    pub inference_latency: HistogramVec,
    /// Sandbox runs by outcome (`ok` / `error` / `timeout`).
    pub sandbox_executions: CounterVec,
    /// API requests by endpoint.
    pub api_requests: CounterVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

// ── Initialisation ─────────────────────────────────────────────────────────

fn init_err(e: impl std::fmt::Display) -> EvolutionError {
    EvolutionError::Other(format!("metrics init failed: {e}"))
}

/// Initialise all Prometheus metrics and register them with a private registry.
///
/// Must be called once at process startup. Calling it a second time is a
/// no-op (returns `Ok(())`).
///
/// # Errors
///
/// Returns [`EvolutionError::Other`] if metric construction or registry
/// registration fails (e.g., duplicate descriptor names).
///
/// # Panics
///
/// This function never panics.
pub fn init_metrics() -> Result<(), EvolutionError> {
    if METRICS.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let fitness = GaugeVec::new(
        Opts::new("evolution_fitness", "Best/average fitness per pool"),
        &["pool", "kind"],
    )
    .map_err(init_err)?;
    registry.register(Box::new(fitness.clone())).map_err(init_err)?;

    let generation = IntGauge::new("evolution_generation", "Current generation").map_err(init_err)?;
    registry
        .register(Box::new(generation.clone()))
        .map_err(init_err)?;

    let performance_gain = GaugeVec::new(
        Opts::new(
            "evolution_performance_gain",
            "Fitness margin credited to the leading pool",
        ),
        &["pool"],
    )
    .map_err(init_err)?;
    registry
        .register(Box::new(performance_gain.clone()))
        .map_err(init_err)?;

    let endpoint_health = GaugeVec::new(
        Opts::new(
            "endpoint_health",
            "1 if the pool endpoint answered its last request, else 0",
        ),
        &["pool"],
    )
    .map_err(init_err)?;
    registry
        .register(Box::new(endpoint_health.clone()))
        .map_err(init_err)?;

    let inference_latency = HistogramVec::new(
        HistogramOpts::new("inference_latency_seconds", "Model inference latency"),
        &["pool"],
    )
    .map_err(init_err)?;
    registry
        .register(Box::new(inference_latency.clone()))
        .map_err(init_err)?;

    let sandbox_executions = CounterVec::new(
        Opts::new("sandbox_executions_total", "Sandbox runs by outcome"),
        &["outcome"],
    )
    .map_err(init_err)?;
    registry
        .register(Box::new(sandbox_executions.clone()))
        .map_err(init_err)?;

    let api_requests = CounterVec::new(
        Opts::new("api_requests_total", "API requests by endpoint"),
        &["endpoint"],
    )
    .map_err(init_err)?;
    registry
        .register(Box::new(api_requests.clone()))
        .map_err(init_err)?;

    // If another thread raced us, the first one wins — both initializations
    // produce identical metric descriptors, so neither outcome is incorrect.
    let _ = METRICS.set(Metrics {
        registry,
        fitness,
        generation,
        performance_gain,
        endpoint_health,
        inference_latency,
        sandbox_executions,
        api_requests,
    });

    Ok(())
}

/// Return a reference to the initialised [`Metrics`], or `None` if
/// [`init_metrics`] has not been called yet.
fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

// ── Public helper functions ────────────────────────────────────────────────

/// Set a fitness gauge for a pool. `kind` is `"best"` or `"avg"`.
///
/// No-op if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn set_fitness(pool: &str, kind: &str, value: f64) {
    if let Some(m) = metrics() {
        if let Ok(g) = m.fitness.get_metric_with_label_values(&[pool, kind]) {
            g.set(value);
        }
    }
}

/// Set the current generation gauge.
///
/// No-op if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn set_generation(generation: u64) {
    if let Some(m) = metrics() {
        m.generation.set(generation as i64);
    }
}

/// Set the performance gain credited to the leading pool.
///
/// No-op if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn set_performance_gain(pool: &str, gain: f64) {
    if let Some(m) = metrics() {
        if let Ok(g) = m.performance_gain.get_metric_with_label_values(&[pool]) {
            g.set(gain);
        }
    }
}

/// Record whether a pool's model endpoint answered its last request.
///
/// No-op if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn set_endpoint_health(pool: &str, healthy: bool) {
    if let Some(m) = metrics() {
        if let Ok(g) = m.endpoint_health.get_metric_with_label_values(&[pool]) {
            g.set(if healthy { 1.0 } else { 0.0 });
        }
    }
}

/// Record the latency of one model inference for a pool.
///
/// No-op if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn observe_inference_latency(pool: &str, d: Duration) {
    if let Some(m) = metrics() {
        if let Ok(h) = m.inference_latency.get_metric_with_label_values(&[pool]) {
            h.observe(d.as_secs_f64());
        }
    }
}

/// Increment the sandbox execution counter for an outcome
/// (`"ok"`, `"error"`, `"timeout"`).
///
/// No-op if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn inc_sandbox_execution(outcome: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.sandbox_executions.get_metric_with_label_values(&[outcome]) {
            c.inc();
        }
    }
}

/// Increment the API request counter for an endpoint.
///
/// No-op if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn inc_api_request(endpoint: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.api_requests.get_metric_with_label_values(&[endpoint]) {
            c.inc();
        }
    }
}

/// Gather all registered metrics as a raw list of metric families.
///
/// Returns an empty `Vec` if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn gather() -> Vec<prometheus::proto::MetricFamily> {
    metrics().map_or_else(Vec::new, |m| m.registry.gather())
}

/// Gather and encode all metrics in the Prometheus text exposition format.
///
/// Returns an empty string if metrics have not been initialised or if
/// encoding fails. Observability degrades gracefully rather than panicking.
///
/// # Panics
///
/// This function never panics.
pub fn gather_metrics() -> String {
    let families = gather();
    if families.is_empty() {
        return String::new();
    }
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
