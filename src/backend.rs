//! Backend call abstraction and implementations.
//!
//! The hub never talks to a model API directly — every invocation goes
//! through the [`BackendCall`] trait so that transport concerns (HTTP,
//! auth, retries at the edge) stay outside the routing core. Provided
//! implementations:
//! - [`EchoBackend`]: testing/demo backend that echoes the prompt
//! - [`ScriptedBackend`]: per-backend canned replies and failures for tests
//! - [`HttpBackend`]: JSON-over-HTTP adapter for completion-style APIs

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{BackendId, HubError};

/// One backend's answer to a single invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendReply {
    /// The generated text.
    pub content: String,
    /// Backend-reported (or adapter-assigned) confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Total tokens billed for the call (input + output).
    pub tokens_used: u64,
    /// Observed end-to-end latency in milliseconds.
    pub latency_ms: u64,
}

/// Trait for invoking a remote model-serving backend.
///
/// Implementations must be thread-safe (`Send + Sync`) for use across
/// tasks. The trait is object-safe to allow dynamic dispatch via
/// `Arc<dyn BackendCall>`.
#[async_trait]
pub trait BackendCall: Send + Sync {
    /// Send `prompt` to the backend identified by `backend` and await
    /// its reply.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Backend`] when the call cannot be completed
    /// (unknown backend, network failure, malformed response). The Router
    /// converts this into a zero-confidence [`Response`](crate::Response)
    /// rather than surfacing it to callers.
    async fn invoke(&self, backend: &BackendId, prompt: &str) -> Result<BackendReply, HubError>;
}

// ============================================================================
// Echo Backend (testing / demo)
// ============================================================================

/// Dummy backend that echoes the prompt back.
///
/// Useful for pipeline smoke tests without real model dependencies.
pub struct EchoBackend {
    /// Simulated inference delay in milliseconds.
    pub delay_ms: u64,
    /// Confidence reported on every reply.
    pub confidence: f64,
}

impl EchoBackend {
    /// Create an echo backend with a 10 ms simulated delay.
    pub fn new() -> Self {
        Self {
            delay_ms: 10,
            confidence: 0.8,
        }
    }

    /// Create an echo backend with a custom delay.
    pub fn with_delay(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            confidence: 0.8,
        }
    }
}

impl Default for EchoBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackendCall for EchoBackend {
    async fn invoke(&self, _backend: &BackendId, prompt: &str) -> Result<BackendReply, HubError> {
        let start = Instant::now();
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;

        let tokens_used = prompt.split_whitespace().count() as u64;
        Ok(BackendReply {
            content: prompt.to_string(),
            confidence: self.confidence,
            tokens_used,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}

// ============================================================================
// Scripted Backend (testing)
// ============================================================================

/// One canned behaviour for a [`ScriptedBackend`] entry.
#[derive(Debug, Clone)]
pub struct ScriptedReply {
    /// Content returned for every invocation of this backend.
    pub content: String,
    /// Confidence returned for every invocation of this backend.
    pub confidence: f64,
    /// Tokens billed per invocation.
    pub tokens_used: u64,
    /// Simulated latency in milliseconds (also actually slept).
    pub latency_ms: u64,
    /// When `true`, invocations of this backend return an error instead.
    pub fail: bool,
}

impl ScriptedReply {
    /// A successful reply with the given content and confidence.
    pub fn ok(content: impl Into<String>, confidence: f64) -> Self {
        Self {
            content: content.into(),
            confidence,
            tokens_used: 32,
            latency_ms: 1,
            fail: false,
        }
    }

    /// A reply that always fails.
    pub fn failing() -> Self {
        Self {
            content: String::new(),
            confidence: 0.0,
            tokens_used: 0,
            latency_ms: 1,
            fail: true,
        }
    }

    /// Override the simulated latency.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }
}

/// Test backend with a fixed reply per backend id.
///
/// Unknown ids fail with [`HubError::Backend`], which exercises the same
/// path as a network outage.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBackend {
    replies: HashMap<BackendId, ScriptedReply>,
}

impl ScriptedBackend {
    /// Create an empty scripted backend (every invocation fails).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a canned reply for `backend`.
    pub fn with_reply(mut self, backend: impl Into<String>, reply: ScriptedReply) -> Self {
        self.replies.insert(BackendId::new(backend), reply);
        self
    }
}

#[async_trait]
impl BackendCall for ScriptedBackend {
    async fn invoke(&self, backend: &BackendId, _prompt: &str) -> Result<BackendReply, HubError> {
        let reply = self
            .replies
            .get(backend)
            .ok_or_else(|| HubError::Backend(format!("no script for backend {backend}")))?
            .clone();

        tokio::time::sleep(Duration::from_millis(reply.latency_ms)).await;

        if reply.fail {
            return Err(HubError::Backend(format!(
                "scripted failure for backend {backend}"
            )));
        }

        Ok(BackendReply {
            content: reply.content,
            confidence: reply.confidence,
            tokens_used: reply.tokens_used,
            latency_ms: reply.latency_ms,
        })
    }
}

// ============================================================================
// HTTP Backend
// ============================================================================

/// Completion-style request payload sent by [`HttpBackend`].
#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    prompt: String,
    max_tokens: u32,
    temperature: f32,
}

/// Completion-style response payload parsed by [`HttpBackend`].
#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    total_tokens: u64,
}

/// Where and how to reach one backend over HTTP.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Full URL of the completion endpoint.
    pub url: String,
    /// Bearer token, if the endpoint requires one.
    pub api_key: Option<String>,
    /// Model name passed in the request body.
    pub model: String,
    /// Confidence assigned to successful replies (completion APIs do not
    /// report one).
    pub default_confidence: f64,
}

/// JSON-over-HTTP adapter for completion-style model APIs.
///
/// One adapter serves many backends; each registered [`BackendId`] maps to
/// its own [`EndpointConfig`].
pub struct HttpBackend {
    client: reqwest::Client,
    endpoints: HashMap<BackendId, EndpointConfig>,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl HttpBackend {
    /// Create an adapter with no registered endpoints.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints: HashMap::new(),
            max_tokens: 512,
            temperature: 0.7,
            timeout: Duration::from_secs(60),
        }
    }

    /// Register an endpoint for `backend`.
    pub fn with_endpoint(mut self, backend: impl Into<String>, endpoint: EndpointConfig) -> Self {
        self.endpoints.insert(BackendId::new(backend), endpoint);
        self
    }

    /// Override the per-call token limit.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Override the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Override the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for HttpBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackendCall for HttpBackend {
    async fn invoke(&self, backend: &BackendId, prompt: &str) -> Result<BackendReply, HubError> {
        let endpoint = self
            .endpoints
            .get(backend)
            .ok_or_else(|| HubError::Backend(format!("no endpoint for backend {backend}")))?;

        let body = CompletionRequest {
            model: endpoint.model.clone(),
            prompt: prompt.to_string(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let start = Instant::now();
        let mut request = self
            .client
            .post(&endpoint.url)
            .timeout(self.timeout)
            .json(&body);
        if let Some(key) = &endpoint.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| HubError::Backend(format!("{backend}: request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(HubError::Backend(format!(
                "{backend}: HTTP {status}: {text}"
            )));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| HubError::Backend(format!("{backend}: bad response body: {e}")))?;

        let content = parsed
            .choices
            .first()
            .map(|c| c.text.clone())
            .ok_or_else(|| HubError::Backend(format!("{backend}: empty choices")))?;

        let tokens_used = parsed
            .usage
            .map(|u| u.total_tokens)
            .unwrap_or_else(|| (content.len() / 4) as u64);

        Ok(BackendReply {
            content,
            confidence: endpoint.default_confidence,
            tokens_used,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
