//! Model worker abstraction and implementations
//!
//! Provides the ModelWorker trait and implementations:
//! - ScriptedWorker: deterministic in-process worker for tests/demo
//! - OpenAiCompatWorker: any OpenAI-compatible chat endpoint (vLLM serving
//!   DeepSeek-R1, Qwen2.5, etc.)
//!
//! Each call carries per-genome [`SamplingParams`] so the evolution engine
//! can vary temperature, token budget, and top-p across individuals.

use crate::{EvolutionError, TaskSpec};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Sampling parameters for a single inference call.
///
/// These are the evolvable knobs: the genome of an individual maps onto one
/// of these per call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Nucleus sampling cutoff.
    pub top_p: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
            top_p: 0.95,
        }
    }
}

/// Raw output of one inference call.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    /// Full response text (code fences included).
    pub text: String,
    /// Wall-clock latency of the call in milliseconds.
    pub latency_ms: u64,
    /// Total token cost reported by the endpoint, or an estimate when the
    /// endpoint omits usage data.
    pub token_cost: usize,
}

/// Trait for model inference workers.
///
/// Implementations must be thread-safe (Send + Sync) for use across tasks.
/// The trait is object-safe to allow dynamic dispatch via Arc<dyn ModelWorker>.
#[async_trait]
pub trait ModelWorker: Send + Sync {
    /// Ask the model for a solution to `task` using the given sampling
    /// parameters.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::Inference`] on network, API, or parse
    /// failures. The engine treats a failed call as a zero-fitness solution
    /// and keeps the run alive.
    async fn propose(
        &self,
        task: &TaskSpec,
        params: SamplingParams,
    ) -> Result<ModelResponse, EvolutionError>;

    /// Model name used for solution attribution (e.g. `"deepseek-r1"`).
    fn model_name(&self) -> &str;
}

// ============================================================================
// Scripted Worker (testing/demo)
// ============================================================================

/// Deterministic worker for tests and demo runs.
///
/// Cycles through a fixed list of canned responses with a simulated
/// inference delay. No network, no model — the pipeline behaves exactly as
/// with a real endpoint.
pub struct ScriptedWorker {
    name: String,
    responses: Vec<String>,
    delay_ms: u64,
    cursor: std::sync::atomic::AtomicUsize,
}

impl ScriptedWorker {
    /// Create a scripted worker cycling through `responses`.
    ///
    /// An empty response list degenerates to empty-text responses.
    pub fn new(name: impl Into<String>, responses: Vec<String>) -> Self {
        Self {
            name: name.into(),
            responses,
            delay_ms: 5,
            cursor: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Set the simulated inference delay.
    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

#[async_trait]
impl ModelWorker for ScriptedWorker {
    async fn propose(
        &self,
        _task: &TaskSpec,
        _params: SamplingParams,
    ) -> Result<ModelResponse, EvolutionError> {
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;

        let text = if self.responses.is_empty() {
            String::new()
        } else {
            let idx = self
                .cursor
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
                % self.responses.len();
            self.responses[idx].clone()
        };

        let token_cost = text.split_whitespace().count();
        Ok(ModelResponse {
            text,
            latency_ms: self.delay_ms,
            token_cost,
        })
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// OpenAI-compatible Worker
// ============================================================================

/// Chat completion request payload (OpenAI wire format).
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

/// Chat completion response payload.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

/// Worker for any OpenAI-compatible `/chat/completions` endpoint.
///
/// vLLM exposes this API, so the same worker serves DeepSeek-R1, Qwen, or
/// any third competitor — only the base URL and model name change.
///
/// ## Example
///
/// ```no_run
/// use competitive_evolution::worker::OpenAiCompatWorker;
///
/// let worker = OpenAiCompatWorker::new("deepseek-r1", "http://localhost:8001/v1")
///     .map(|w| w.with_timeout(std::time::Duration::from_secs(120)));
/// ```
pub struct OpenAiCompatWorker {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiCompatWorker {
    /// Create a worker for the given model and endpoint.
    ///
    /// The API key is optional for local vLLM deployments; a placeholder is
    /// sent when none is configured.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::ConfigError`] if `base_url` is empty or
    /// not an http(s) URL, so misconfiguration surfaces before the first
    /// generation.
    pub fn new(
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, EvolutionError> {
        let base_url = base_url.into();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(EvolutionError::ConfigError(format!(
                "endpoint must be an http(s) URL, got {base_url:?}"
            )));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: "dummy-key".to_string(),
            timeout: Duration::from_secs(120),
        })
    }

    /// Set the bearer token sent with each request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ModelWorker for OpenAiCompatWorker {
    async fn propose(
        &self,
        task: &TaskSpec,
        params: SamplingParams,
    ) -> Result<ModelResponse, EvolutionError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: task.prompt(),
            }],
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
        };

        let start = Instant::now();
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| EvolutionError::Inference(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(EvolutionError::Inference(format!(
                "endpoint error {status}: {error_text}"
            )));
        }

        let api_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| EvolutionError::Inference(format!("failed to parse response: {e}")))?;

        let latency_ms = start.elapsed().as_millis() as u64;

        let text = api_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| EvolutionError::Inference("no choices in response".to_string()))?;

        // Fall back to a whitespace-token estimate when usage is omitted.
        let token_cost = api_response
            .usage
            .map(|u| u.total_tokens as usize)
            .unwrap_or_else(|| text.split_whitespace().count());

        Ok(ModelResponse {
            text,
            latency_ms,
            token_cost,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
