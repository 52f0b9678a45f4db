//! Backend selection and invocation.
//!
//! The [`Router`] combines a [`CapabilityMatrix`](crate::CapabilityMatrix)
//! with a [`CostOptimizer`](crate::CostOptimizer) and a
//! [`BackendCall`](crate::BackendCall) collaborator to decide which backend
//! serves each task, invoke it, and learn from the outcome.
//!
//! Per-candidate blend:
//!
//! | Component   | Weight | Source                                         |
//! |-------------|--------|------------------------------------------------|
//! | capability  | 0.5    | `CapabilityMatrix::score`                      |
//! | performance | 0.2    | observed running averages, shaped by the       |
//! |             |        | request's performance requirement              |
//! | cost        | 0.2    | predicted cost vs `max_cost` (soft: zeroes the |
//! |             |        | component, never excludes)                     |
//! | context     | 0.1    | context-window fit bonus                       |
//!
//! Hard budget ceilings (`RouterConfig::constraints`) exclude a candidate
//! before blending; a fully excluded field falls back to the configured
//! fallback backend at confidence 0.3.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::config::{validate, RouterConfig};
use crate::backend::BackendCall;
use crate::capability::{BackendProfile, CapabilityMatrix};
use crate::cost::CostOptimizer;
use crate::history::History;
use crate::{BackendId, HubError};

/// Capability weight in the candidate blend.
const CAPABILITY_WEIGHT: f64 = 0.5;
/// Performance weight in the candidate blend.
const PERFORMANCE_WEIGHT: f64 = 0.2;
/// Cost weight in the candidate blend.
const COST_WEIGHT: f64 = 0.2;
/// Context-fit weight in the candidate blend.
const CONTEXT_WEIGHT: f64 = 0.1;
/// Confidence reported on the fallback path.
const FALLBACK_CONFIDENCE: f64 = 0.3;

/// How hard the caller wants the hub to try.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PerformanceRequirement {
    /// Latency dominates; answer quality is secondary.
    Fast,
    /// Even trade between latency and quality.
    #[default]
    Balanced,
    /// Quality dominates; latency is secondary.
    Thorough,
    /// Quality only; latency is ignored.
    Deep,
}

/// One task submitted to the hub.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    /// Unique id for trace correlation.
    pub request_id: String,
    /// Task type tag, drives the capability weight vector.
    pub task_type: String,
    /// The task content sent to the selected backend.
    pub content: String,
    /// Arbitrary key-value context.
    pub context: HashMap<String, String>,
    /// Latency/quality trade-off.
    pub performance: PerformanceRequirement,
    /// Soft per-request cost preference in USD. Exceeding it zeroes the
    /// cost component of the blend; it never excludes a candidate.
    pub max_cost: Option<f64>,
    /// Restrict candidates to these backends when given.
    pub preferred_backends: Option<Vec<BackendId>>,
    /// Caller wants a multi-backend consensus answer.
    pub consensus_required: bool,
    /// When the request was created.
    pub timestamp: SystemTime,
}

impl TaskRequest {
    /// Create a request with default settings.
    pub fn new(task_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            task_type: task_type.into(),
            content: content.into(),
            context: HashMap::new(),
            performance: PerformanceRequirement::default(),
            max_cost: None,
            preferred_backends: None,
            consensus_required: false,
            timestamp: SystemTime::now(),
        }
    }

    /// Set the performance requirement.
    pub fn with_performance(mut self, performance: PerformanceRequirement) -> Self {
        self.performance = performance;
        self
    }

    /// Set the soft per-request cost preference.
    pub fn with_max_cost(mut self, max_cost: f64) -> Self {
        self.max_cost = Some(max_cost);
        self
    }

    /// Restrict candidates to the given backends.
    pub fn with_preferred_backends(mut self, backends: Vec<BackendId>) -> Self {
        self.preferred_backends = Some(backends);
        self
    }

    /// Add one context entry.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Mark the request as needing consensus.
    pub fn require_consensus(mut self) -> Self {
        self.consensus_required = true;
        self
    }
}

/// The routing decision for a single request.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingDecision {
    /// Backend selected to serve the request. Always a registered id or
    /// the configured fallback id.
    pub selected: BackendId,
    /// Up to two runner-up backends, best first.
    pub alternates: Vec<BackendId>,
    /// Human-readable explanation of the choice.
    pub reasoning: String,
    /// Confidence in the choice, `[0.0, 1.0]`.
    pub confidence: f64,
    /// Predicted cost of the call, USD.
    pub expected_cost: f64,
    /// Expected latency in milliseconds.
    pub expected_latency_ms: u64,
}

/// One backend's answer as returned to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Generated content (empty on failure).
    pub content: String,
    /// Confidence in `[0.0, 1.0]`; exactly `0.0` when the call failed.
    pub confidence: f64,
    /// Observed processing time in milliseconds.
    pub processing_time_ms: u64,
    /// Tokens billed.
    pub tokens_used: u64,
    /// Recorded cost, USD.
    pub cost_estimate: f64,
    /// Serving backend, error notes, and other annotations.
    pub metadata: HashMap<String, String>,
}

/// Running per-backend averages over routed calls.
///
/// Updated with the incremental form `avg += (sample − avg) / n`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunningStats {
    /// Calls recorded.
    pub n: u64,
    /// Running average latency in milliseconds.
    pub avg_latency_ms: f64,
    /// Running average response confidence.
    pub avg_confidence: f64,
}

/// Scores, selects, invokes, and learns.
///
/// Thread-safe: per-backend running averages live in `DashMap` entries
/// (serialized per backend id), the decision history behind one mutex.
pub struct Router {
    matrix: Arc<CapabilityMatrix>,
    optimizer: Arc<CostOptimizer>,
    call: Arc<dyn BackendCall>,
    config: RouterConfig,
    stats: DashMap<BackendId, RunningStats>,
    decisions: Mutex<History<RoutingDecision>>,
}

impl Router {
    /// Create a router.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::ConfigError`] when the configuration fails
    /// validation.
    pub fn new(
        matrix: Arc<CapabilityMatrix>,
        optimizer: Arc<CostOptimizer>,
        call: Arc<dyn BackendCall>,
        config: RouterConfig,
    ) -> Result<Self, HubError> {
        let errors = validate(&config);
        if !errors.is_empty() {
            return Err(HubError::ConfigError(errors.join("; ")));
        }
        let history_capacity = config.history_capacity;
        Ok(Self {
            matrix,
            optimizer,
            call,
            config,
            stats: DashMap::new(),
            decisions: Mutex::new(History::new(history_capacity)),
        })
    }

    /// Route `request` to the best backend, invoke it, and record the
    /// outcome.
    ///
    /// Never fails: backend errors become a zero-confidence [`Response`]
    /// with the error in metadata, and an empty candidate field selects
    /// the fallback backend at reduced confidence.
    pub async fn route(&self, request: &TaskRequest) -> (RoutingDecision, Response) {
        let decision = self.decide(request);
        self.decisions.lock().push(decision.clone());

        let response = self.invoke(&decision.selected, request).await;
        (decision, response)
    }

    /// The selection half of [`route`](Self::route) — no invocation.
    pub fn decide(&self, request: &TaskRequest) -> RoutingDecision {
        let requirements = self.config.requirements_for(&request.task_type);
        let (tokens_in, tokens_out) = self.estimate_tokens(&request.content);

        let mut candidates: Vec<BackendId> = self.matrix.backends();
        if let Some(preferred) = &request.preferred_backends {
            candidates.retain(|id| preferred.contains(id));
        }

        // (id, blended score, predicted cost)
        let mut scored: Vec<(BackendId, f64, f64)> = Vec::new();
        for id in candidates {
            let capability = self.matrix.score(&id, &requirements);
            if capability <= 0.0 {
                continue;
            }
            let predicted = self.optimizer.estimate_cost(&id, tokens_in, tokens_out);
            if !self
                .optimizer
                .check_constraints(predicted, &self.config.constraints)
            {
                // Budget ceilings are hard: the candidate vanishes.
                debug!(backend = %id, predicted, "candidate excluded by budget ceiling");
                continue;
            }
            let profile = match self.matrix.profile(&id) {
                Some(p) => p,
                None => continue,
            };

            let performance = self.performance_component(&id, &profile, request.performance);
            let cost = self.cost_component(predicted, request.max_cost);
            let context = context_component(&profile, tokens_in + tokens_out);

            let blended = CAPABILITY_WEIGHT * capability
                + PERFORMANCE_WEIGHT * performance
                + COST_WEIGHT * cost
                + CONTEXT_WEIGHT * context;
            scored.push((id, blended, predicted));
        }

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        match scored.first() {
            Some((id, score, predicted)) if *score > 0.0 => {
                let alternates: Vec<BackendId> =
                    scored.iter().skip(1).take(2).map(|(id, _, _)| id.clone()).collect();
                let expected_latency_ms = self.expected_latency(id);
                RoutingDecision {
                    selected: id.clone(),
                    alternates,
                    reasoning: format!(
                        "selected {id} for task '{}' (blended score {score:.3})",
                        request.task_type
                    ),
                    confidence: score.clamp(0.0, 1.0),
                    expected_cost: *predicted,
                    expected_latency_ms,
                }
            }
            _ => {
                let fallback = self.config.fallback_backend.clone();
                warn!(task_type = %request.task_type, fallback = %fallback, "no viable backend");
                let expected_cost = self.optimizer.estimate_cost(&fallback, tokens_in, tokens_out);
                let expected_latency_ms = self.expected_latency(&fallback);
                RoutingDecision {
                    selected: fallback,
                    alternates: Vec::new(),
                    reasoning: "no viable backend, using fallback".to_string(),
                    confidence: FALLBACK_CONFIDENCE,
                    expected_cost,
                    expected_latency_ms,
                }
            }
        }
    }

    /// Requirements the capability matrix scores against for `task_type`.
    pub fn requirements_for(&self, task_type: &str) -> crate::capability::TaskRequirements {
        self.config.requirements_for(task_type)
    }

    /// Snapshot of per-backend running averages.
    pub fn performance_summary(&self) -> HashMap<BackendId, RunningStats> {
        self.stats
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Recent routing decisions, oldest first.
    pub fn recent_decisions(&self) -> Vec<RoutingDecision> {
        self.decisions.lock().snapshot()
    }

    // ── Internals ──────────────────────────────────────────────────────

    async fn invoke(&self, selected: &BackendId, request: &TaskRequest) -> Response {
        let (tokens_in, _) = self.estimate_tokens(&request.content);
        let start = Instant::now();

        match self.call.invoke(selected, &request.content).await {
            Ok(reply) => {
                let confidence = reply.confidence.clamp(0.0, 1.0);
                let tokens_out = reply.tokens_used.saturating_sub(tokens_in);
                let cost =
                    self.optimizer
                        .record_usage(selected, tokens_in, tokens_out, confidence);
                self.matrix.record_outcome(
                    selected,
                    &request.task_type,
                    true,
                    reply.latency_ms,
                    confidence,
                );
                self.record_stats(selected, reply.latency_ms as f64, confidence);

                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), selected.to_string());
                Response {
                    content: reply.content,
                    confidence,
                    processing_time_ms: reply.latency_ms,
                    tokens_used: reply.tokens_used,
                    cost_estimate: cost,
                    metadata,
                }
            }
            Err(e) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                warn!(backend = %selected, error = %e, "backend invocation failed");
                self.matrix
                    .record_outcome(selected, &request.task_type, false, elapsed_ms, 0.0);
                self.record_stats(selected, elapsed_ms as f64, 0.0);

                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), selected.to_string());
                metadata.insert("error".to_string(), e.to_string());
                Response {
                    content: String::new(),
                    confidence: 0.0,
                    processing_time_ms: elapsed_ms,
                    tokens_used: 0,
                    cost_estimate: 0.0,
                    metadata,
                }
            }
        }
    }

    fn record_stats(&self, backend: &BackendId, latency_ms: f64, confidence: f64) {
        let mut entry = self.stats.entry(backend.clone()).or_default();
        entry.n += 1;
        let n = entry.n as f64;
        entry.avg_latency_ms += (latency_ms - entry.avg_latency_ms) / n;
        entry.avg_confidence += (confidence - entry.avg_confidence) / n;
    }

    fn estimate_tokens(&self, content: &str) -> (u64, u64) {
        let tokens_in = (content.len() / self.config.chars_per_token).max(1) as u64;
        let tokens_out = (tokens_in as f64 * self.config.output_ratio).ceil() as u64;
        (tokens_in, tokens_out)
    }

    fn performance_component(
        &self,
        backend: &BackendId,
        profile: &BackendProfile,
        requirement: PerformanceRequirement,
    ) -> f64 {
        // Observed averages beat the static estimate once we have data.
        let (latency_ms, confidence) = match self.stats.get(backend) {
            Some(s) if s.n > 0 => (s.avg_latency_ms, s.avg_confidence),
            _ => (profile.latency_ms as f64, 0.5),
        };
        let latency_score = |budget_ms: f64| (1.0 - latency_ms / budget_ms).clamp(0.0, 1.0);
        match requirement {
            PerformanceRequirement::Fast => 0.3 * confidence + 0.7 * latency_score(2_000.0),
            PerformanceRequirement::Balanced => 0.5 * confidence + 0.5 * latency_score(5_000.0),
            PerformanceRequirement::Thorough => 0.7 * confidence + 0.3 * latency_score(10_000.0),
            PerformanceRequirement::Deep => confidence,
        }
    }

    fn cost_component(&self, predicted: f64, max_cost: Option<f64>) -> f64 {
        match max_cost {
            Some(max) if predicted > max => 0.0,
            Some(max) if max > 0.0 => (1.0 - predicted / max).clamp(0.0, 1.0),
            _ => (1.0 - predicted / self.config.cost_reference).clamp(0.0, 1.0),
        }
    }

    fn expected_latency(&self, backend: &BackendId) -> u64 {
        match self.stats.get(backend) {
            Some(s) if s.n > 0 => s.avg_latency_ms as u64,
            _ => self
                .matrix
                .profile(backend)
                .map(|p| p.latency_ms)
                .unwrap_or(0),
        }
    }
}

/// Context-window fit bonus: full credit with 2× headroom, half credit
/// for a plain fit, nothing when the request cannot fit.
fn context_component(profile: &BackendProfile, needed_tokens: u64) -> f64 {
    if profile.context_window >= needed_tokens.saturating_mul(2) {
        1.0
    } else if profile.context_window >= needed_tokens {
        0.5
    } else {
        0.0
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
