//! Concurrent multi-backend consensus.
//!
//! Selects a family-diverse backend set, fans the question out through
//! the router (one spawned task per backend, overall deadline), and
//! combines surviving votes with the configured [`ConsensusMethod`].
//! Failures degrade the result; they never surface as `Err`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::method::{self, AgreementLevel, ConsensusMethod, Vote};
use super::metrics::{ConsensusMetrics, MetricsSummary};
use crate::capability::{CapabilityMatrix, TaskRequirements};
use crate::routing::{Router, TaskRequest};
use crate::BackendId;

/// Extra picks beyond `min_backends` when selecting candidates.
const SELECTION_MARGIN: usize = 2;
/// Confidence factor applied when only one vote survives.
const LONE_VOTE_FACTOR: f64 = 0.7;
/// Default overall deadline for one consensus run.
const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// Options for one consensus run.
#[derive(Debug, Clone)]
pub struct ConsensusOptions {
    /// Key-value context forwarded to every routed request.
    pub context: HashMap<String, String>,
    /// Vote combination method.
    pub method: ConsensusMethod,
    /// Minimum backends worth asking; selection targets `min_backends + 2`.
    pub min_backends: usize,
    /// Task type for capability-weighted candidate ranking.
    pub task_type: String,
    /// Skip selection and ask exactly these backends.
    pub explicit_backends: Option<Vec<BackendId>>,
    /// Overall deadline; late calls are cancelled, never admitted.
    pub deadline: Duration,
}

impl Default for ConsensusOptions {
    fn default() -> Self {
        Self {
            context: HashMap::new(),
            method: ConsensusMethod::default(),
            min_backends: 3,
            task_type: "analysis".to_string(),
            explicit_backends: None,
            deadline: DEFAULT_DEADLINE,
        }
    }
}

impl ConsensusOptions {
    /// Set the vote combination method.
    pub fn with_method(mut self, method: ConsensusMethod) -> Self {
        self.method = method;
        self
    }

    /// Set the minimum backend count.
    pub fn with_min_backends(mut self, min_backends: usize) -> Self {
        self.min_backends = min_backends;
        self
    }

    /// Set the task type used for candidate ranking.
    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = task_type.into();
        self
    }

    /// Ask exactly these backends instead of selecting.
    pub fn with_backends(mut self, backends: Vec<BackendId>) -> Self {
        self.explicit_backends = Some(backends);
        self
    }

    /// Set the overall deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Add one context entry.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// The combined answer of a consensus run.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusResult {
    /// Combined content (empty when no vote survived).
    pub content: String,
    /// How closely the votes concurred.
    pub agreement: AgreementLevel,
    /// Confidence in the combined answer, `[0.0, 1.0]`.
    pub confidence: f64,
    /// Backends whose votes were admitted.
    pub participating: Vec<BackendId>,
    /// The admitted votes.
    pub votes: Vec<Vote>,
    /// Human-readable notes on uncertain or outlying votes.
    pub disagreement_points: Vec<String>,
    /// Method used to combine the votes.
    pub method: ConsensusMethod,
    /// Wall-clock duration of the run in milliseconds.
    pub processing_time_ms: u64,
    /// Total recorded cost across all calls, USD.
    pub total_cost: f64,
}

/// Fans questions out to several backends and combines the answers.
pub struct ConsensusEngine {
    router: Arc<Router>,
    matrix: Arc<CapabilityMatrix>,
    metrics: ConsensusMetrics,
}

impl ConsensusEngine {
    /// Create an engine over an existing router and capability matrix.
    pub fn new(router: Arc<Router>, matrix: Arc<CapabilityMatrix>) -> Self {
        Self {
            router,
            matrix,
            metrics: ConsensusMetrics::new(),
        }
    }

    /// Ask several backends `question` and combine their answers.
    ///
    /// Never fails: zero surviving votes yield a
    /// [`Contradiction`](AgreementLevel::Contradiction) result at
    /// confidence 0, a lone vote yields
    /// [`Split`](AgreementLevel::Split) at reduced confidence.
    pub async fn reach_consensus(
        &self,
        question: &str,
        options: &ConsensusOptions,
    ) -> ConsensusResult {
        let start = Instant::now();
        let requirements = self.router.requirements_for(&options.task_type);

        let selected = match &options.explicit_backends {
            Some(ids) => ids.clone(),
            None => self.select_diverse(&requirements, options.min_backends),
        };
        info!(
            candidates = selected.len(),
            method = ?options.method,
            task_type = %options.task_type,
            "starting consensus run"
        );

        let mut handles = Vec::with_capacity(selected.len());
        for backend in &selected {
            let router = Arc::clone(&self.router);
            let weight = self.matrix.score(backend, &requirements);
            let mut request = TaskRequest::new(&options.task_type, question)
                .with_preferred_backends(vec![backend.clone()]);
            request.context = options.context.clone();
            let deadline = options.deadline;
            handles.push(tokio::spawn(async move {
                timeout(deadline, router.route(&request))
                    .await
                    .ok()
                    .map(|(decision, response)| (decision, response, weight))
            }));
        }

        // Join barrier: votes are admitted only after every task settled.
        let mut votes: Vec<Vote> = Vec::new();
        let mut total_cost = 0.0;
        for joined in join_all(handles).await {
            match joined {
                Ok(Some((decision, response, weight))) => {
                    total_cost += response.cost_estimate;
                    if response.metadata.contains_key("error") {
                        debug!(backend = %decision.selected, "dropping failed vote");
                        continue;
                    }
                    votes.push(Vote {
                        backend: decision.selected.clone(),
                        response,
                        weight,
                        reasoning: decision.reasoning,
                    });
                }
                Ok(None) => warn!("consensus call missed the deadline"),
                Err(e) => warn!(error = %e, "consensus task failed to join"),
            }
        }

        let result = self.build_result(votes, options, total_cost, start.elapsed());
        self.metrics.record_run(&result.votes, result.agreement);
        result
    }

    /// Aggregate diagnostics over all completed runs.
    pub fn metrics_summary(&self) -> MetricsSummary {
        self.metrics.summary()
    }

    // ── Internals ──────────────────────────────────────────────────────

    /// Greedy family-diverse pick from the capability ranking.
    fn select_diverse(
        &self,
        requirements: &TaskRequirements,
        min_backends: usize,
    ) -> Vec<BackendId> {
        let target = min_backends + SELECTION_MARGIN;
        let mut chosen = Vec::new();
        let mut seen_families: HashSet<String> = HashSet::new();
        for ranked in self.matrix.rank(requirements) {
            let family = self
                .matrix
                .profile(&ranked.id)
                .map(|p| p.family)
                .unwrap_or_default();
            // One pick per family; untagged backends are all distinct.
            if !family.is_empty() && !seen_families.insert(family) {
                continue;
            }
            chosen.push(ranked.id);
            if chosen.len() >= target {
                break;
            }
        }
        chosen
    }

    fn build_result(
        &self,
        votes: Vec<Vote>,
        options: &ConsensusOptions,
        total_cost: f64,
        elapsed: Duration,
    ) -> ConsensusResult {
        let processing_time_ms = elapsed.as_millis() as u64;
        match votes.len() {
            0 => ConsensusResult {
                content: String::new(),
                agreement: AgreementLevel::Contradiction,
                confidence: 0.0,
                participating: Vec::new(),
                votes,
                disagreement_points: vec![
                    "no backend produced a successful response".to_string()
                ],
                method: options.method,
                processing_time_ms,
                total_cost,
            },
            1 => {
                let lone = &votes[0];
                ConsensusResult {
                    content: lone.response.content.clone(),
                    agreement: AgreementLevel::Split,
                    confidence: lone.response.confidence * LONE_VOTE_FACTOR,
                    participating: vec![lone.backend.clone()],
                    disagreement_points: vec![
                        "only one backend responded; no cross-check possible".to_string(),
                    ],
                    votes,
                    method: options.method,
                    processing_time_ms,
                    total_cost,
                }
            }
            _ => {
                let (content, confidence) = method::combine(options.method, &votes);
                let confidences: Vec<f64> =
                    votes.iter().map(|v| v.response.confidence).collect();
                let agreement = method::classify_agreement(&confidences);
                let disagreement_points = method::disagreement_points(&votes);
                let participating = votes.iter().map(|v| v.backend.clone()).collect();
                ConsensusResult {
                    content,
                    agreement,
                    confidence,
                    participating,
                    votes,
                    disagreement_points,
                    method: options.method,
                    processing_time_ms,
                    total_cost,
                }
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ScriptedBackend, ScriptedReply};
    use crate::capability::BackendProfile;
    use crate::clock::ManualClock;
    use crate::cost::CostOptimizer;
    use crate::routing::RouterConfig;

    fn profile(id: &str, family: &str, score: f64) -> BackendProfile {
        BackendProfile::new(id)
            .with_capability("reasoning", score)
            .with_capability("knowledge", score)
            .with_capability("creativity", score)
            .with_capability("code", score)
            .with_family(family)
            .with_latency_ms(50)
    }

    fn engine(profiles: Vec<BackendProfile>, call: ScriptedBackend) -> ConsensusEngine {
        let matrix = Arc::new(CapabilityMatrix::new());
        for p in profiles {
            matrix.register_backend(p);
        }
        let optimizer = Arc::new(CostOptimizer::new(Arc::new(ManualClock::default())));
        let router = Router::new(
            Arc::clone(&matrix),
            optimizer,
            Arc::new(call),
            RouterConfig::default(),
        )
        .unwrap_or_else(|e| std::panic::panic_any(format!("test: router: {e}")));
        ConsensusEngine::new(Arc::new(router), matrix)
    }

    fn ids(names: &[&str]) -> Vec<BackendId> {
        names.iter().map(|n| BackendId::new(*n)).collect()
    }

    // -- degraded paths ----------------------------------------------------

    #[tokio::test]
    async fn test_zero_votes_yield_contradiction_with_error_note() {
        // Empty script: every invocation fails.
        let e = engine(
            vec![profile("a", "f1", 0.9), profile("b", "f2", 0.9)],
            ScriptedBackend::new(),
        );
        let result = e
            .reach_consensus("question", &ConsensusOptions::default())
            .await;
        assert_eq!(result.agreement, AgreementLevel::Contradiction);
        assert!(result.confidence.abs() < f64::EPSILON);
        assert!(result.votes.is_empty());
        assert!(result
            .disagreement_points
            .iter()
            .any(|p| p.contains("no backend produced a successful response")));
    }

    #[tokio::test]
    async fn test_lone_vote_yields_split_at_reduced_confidence() {
        let e = engine(
            vec![profile("a", "f1", 0.9), profile("b", "f2", 0.9)],
            ScriptedBackend::new().with_reply("a", ScriptedReply::ok("answer", 0.8)),
        );
        let result = e
            .reach_consensus("question", &ConsensusOptions::default())
            .await;
        assert_eq!(result.agreement, AgreementLevel::Split);
        assert!((result.confidence - 0.8 * 0.7).abs() < 1e-9);
        assert_eq!(result.votes.len(), 1);
        assert_eq!(result.content, "answer");
    }

    #[tokio::test]
    async fn test_few_votes_never_classify_strong_consensus() {
        for replies in [
            ScriptedBackend::new(),
            ScriptedBackend::new().with_reply("a", ScriptedReply::ok("x", 0.99)),
        ] {
            let e = engine(
                vec![profile("a", "f1", 0.9), profile("b", "f2", 0.9)],
                replies,
            );
            let result = e
                .reach_consensus("question", &ConsensusOptions::default())
                .await;
            assert_ne!(result.agreement, AgreementLevel::StrongConsensus);
        }
    }

    // -- full runs ---------------------------------------------------------

    #[tokio::test]
    async fn test_three_concordant_votes_reach_strong_consensus() {
        let e = engine(
            vec![
                profile("a", "f1", 0.9),
                profile("b", "f2", 0.9),
                profile("c", "f3", 0.9),
            ],
            ScriptedBackend::new()
                .with_reply("a", ScriptedReply::ok("same answer", 0.95))
                .with_reply("b", ScriptedReply::ok("same answer", 0.95))
                .with_reply("c", ScriptedReply::ok("same answer", 0.95)),
        );
        let options =
            ConsensusOptions::default().with_backends(ids(&["a", "b", "c"]));
        let result = e.reach_consensus("question", &options).await;
        assert_eq!(result.agreement, AgreementLevel::StrongConsensus);
        assert_eq!(result.votes.len(), 3);
        assert_eq!(result.participating.len(), 3);
    }

    #[tokio::test]
    async fn test_uncertain_vote_appears_in_disagreement_points() {
        let e = engine(
            vec![
                profile("a", "f1", 0.9),
                profile("b", "f2", 0.9),
                profile("c", "f3", 0.9),
            ],
            ScriptedBackend::new()
                .with_reply("a", ScriptedReply::ok("answer", 0.9))
                .with_reply("b", ScriptedReply::ok("answer", 0.85))
                .with_reply("c", ScriptedReply::ok("other", 0.3)),
        );
        let options = ConsensusOptions::default()
            .with_method(ConsensusMethod::WeightedConfidence)
            .with_backends(ids(&["a", "b", "c"]));
        let result = e.reach_consensus("question", &options).await;
        assert!(
            result
                .disagreement_points
                .iter()
                .any(|p| p.contains("c") && p.contains("expressed uncertainty")),
            "points: {:?}",
            result.disagreement_points
        );
    }

    #[tokio::test]
    async fn test_failed_votes_are_dropped_not_counted() {
        let e = engine(
            vec![
                profile("a", "f1", 0.9),
                profile("b", "f2", 0.9),
                profile("c", "f3", 0.9),
            ],
            ScriptedBackend::new()
                .with_reply("a", ScriptedReply::ok("answer", 0.9))
                .with_reply("b", ScriptedReply::ok("answer", 0.85))
                .with_reply("c", ScriptedReply::failing()),
        );
        let options =
            ConsensusOptions::default().with_backends(ids(&["a", "b", "c"]));
        let result = e.reach_consensus("question", &options).await;
        assert_eq!(result.votes.len(), 2);
        assert!(!result.participating.contains(&BackendId::new("c")));
    }

    #[tokio::test]
    async fn test_deadline_drops_slow_backends() {
        let e = engine(
            vec![profile("slow", "f1", 0.9), profile("fast", "f2", 0.9)],
            ScriptedBackend::new()
                .with_reply("slow", ScriptedReply::ok("late", 0.9).with_latency_ms(5_000))
                .with_reply("fast", ScriptedReply::ok("quick", 0.9).with_latency_ms(0)),
        );
        let options = ConsensusOptions::default()
            .with_backends(ids(&["slow", "fast"]))
            .with_deadline(Duration::from_millis(200));
        let result = e.reach_consensus("question", &options).await;
        assert_eq!(result.votes.len(), 1, "late vote must never be admitted");
        assert_eq!(result.participating, ids(&["fast"]));
    }

    // -- diverse selection -------------------------------------------------

    #[tokio::test]
    async fn test_selection_enforces_family_diversity() {
        // Three backends in family "f1": only the best of them is asked.
        let e = engine(
            vec![
                profile("a1", "f1", 0.9),
                profile("a2", "f1", 0.8),
                profile("a3", "f1", 0.7),
                profile("b", "f2", 0.6),
            ],
            ScriptedBackend::new()
                .with_reply("a1", ScriptedReply::ok("answer", 0.9))
                .with_reply("b", ScriptedReply::ok("answer", 0.85)),
        );
        let options = ConsensusOptions::default().with_min_backends(2);
        let result = e.reach_consensus("question", &options).await;
        assert_eq!(result.votes.len(), 2);
        assert!(result.participating.contains(&BackendId::new("a1")));
        assert!(result.participating.contains(&BackendId::new("b")));
    }

    // -- diagnostics -------------------------------------------------------

    #[tokio::test]
    async fn test_metrics_record_each_run() {
        let e = engine(
            vec![profile("a", "f1", 0.9), profile("b", "f2", 0.9)],
            ScriptedBackend::new()
                .with_reply("a", ScriptedReply::ok("answer", 0.9))
                .with_reply("b", ScriptedReply::ok("answer", 0.2)),
        );
        let options = ConsensusOptions::default().with_backends(ids(&["a", "b"]));
        e.reach_consensus("question", &options).await;

        let summary = e.metrics_summary();
        assert_eq!(summary.runs, 1);
        assert_eq!(summary.total_votes, 2);
        let key = (BackendId::new("a"), BackendId::new("b"));
        let pair = summary
            .pairs
            .get(&key)
            .unwrap_or_else(|| std::panic::panic_any("test: missing pair entry"));
        assert_eq!(pair.strong_disagreements, 1);
    }
}
