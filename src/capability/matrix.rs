//! Capability scoring and ranking.
//!
//! Scores a backend against a task's requirements and produces a suitability
//! score in the range `0.0..=1.0`:
//!
//! | Component        | Weight | Meaning                                      |
//! |------------------|--------|----------------------------------------------|
//! | preferred        | 40%    | how close capabilities are to preferred targets |
//! | domain affinity  | 30%    | weighted match against the affinity map      |
//! | specialization   | 15%    | full weight if task type is a specialization, otherwise 70% of it |
//! | constraint headroom | 15% | slack against latency/cost/context limits    |
//!
//! Two classes of input disqualify a backend outright (score exactly `0.0`):
//! a *required* dimension below its minimum, and a stated latency/cost/
//! context limit the backend's static profile exceeds. Everything else is a
//! weighted blend, clamped to `[0.0, 1.0]`.

use std::collections::HashMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::performance::{OutcomeSample, PerformanceStats, PerformanceTracker};
use super::profile::BackendProfile;
use crate::BackendId;

/// Weight of the preferred-targets component.
const PREFERRED_WEIGHT: f64 = 0.40;
/// Weight of the domain-affinity component.
const AFFINITY_WEIGHT: f64 = 0.30;
/// Weight of the specialization component.
const SPECIALIZATION_WEIGHT: f64 = 0.15;
/// Weight of the constraint-headroom component.
const CONSTRAINT_WEIGHT: f64 = 0.15;
/// Fraction of the specialization weight granted to non-specialists.
const NON_SPECIALIST_FACTOR: f64 = 0.7;

/// Capability dimension nudged by adaptive feedback.
const RELIABILITY_DIMENSION: &str = "reliability";
/// Maximum adaptive change per step.
const ADAPT_STEP: f64 = 0.05;
/// Adaptive updates never push a dimension below this floor.
const ADAPT_FLOOR: f64 = 0.1;
/// Samples kept in each backend's rolling outcome window.
const OUTCOME_WINDOW: usize = 200;

/// What a task demands from a backend.
///
/// `required` minimums are hard gates; everything else shapes the blend.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskRequirements {
    /// Task type tag, matched against profile specializations.
    #[serde(default)]
    pub task_type: String,

    /// Dimension → hard minimum. Any miss scores the backend `0.0`.
    #[serde(default)]
    pub required: HashMap<String, f64>,

    /// Dimension → preferred target, scored proportionally.
    #[serde(default)]
    pub preferred: HashMap<String, f64>,

    /// Domain → weight, matched against the profile's affinity map.
    #[serde(default)]
    pub domains: HashMap<String, f64>,

    /// Upper latency limit in milliseconds; exceeding it disqualifies.
    #[serde(default)]
    pub max_latency_ms: Option<u64>,

    /// Upper input-token cost limit in USD; exceeding it disqualifies.
    #[serde(default)]
    pub max_cost_per_token: Option<f64>,

    /// Minimum context window in tokens; a smaller window disqualifies.
    #[serde(default)]
    pub min_context_window: Option<u64>,
}

impl TaskRequirements {
    /// Create empty requirements for a task type.
    pub fn for_task(task_type: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            ..Self::default()
        }
    }

    /// Add a hard minimum for one dimension.
    pub fn require(mut self, dimension: impl Into<String>, minimum: f64) -> Self {
        self.required.insert(dimension.into(), minimum);
        self
    }

    /// Add a preferred target for one dimension.
    pub fn prefer(mut self, dimension: impl Into<String>, target: f64) -> Self {
        self.preferred.insert(dimension.into(), target);
        self
    }

    /// Add a weighted domain to the affinity context.
    pub fn in_domain(mut self, domain: impl Into<String>, weight: f64) -> Self {
        self.domains.insert(domain.into(), weight);
        self
    }

    /// Set the hard latency limit.
    pub fn with_max_latency_ms(mut self, max: u64) -> Self {
        self.max_latency_ms = Some(max);
        self
    }

    /// Set the hard input-token cost limit.
    pub fn with_max_cost_per_token(mut self, max: f64) -> Self {
        self.max_cost_per_token = Some(max);
        self
    }

    /// Set the minimum context window.
    pub fn with_min_context_window(mut self, min: u64) -> Self {
        self.min_context_window = Some(min);
        self
    }
}

/// Weighted contributions of each scoring component.
///
/// Returned by [`CapabilityMatrix::breakdown`] for observability.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityBreakdown {
    /// Contribution of the preferred-targets component (≤ 0.40).
    pub preferred: f64,
    /// Contribution of the domain-affinity component (≤ 0.30).
    pub affinity: f64,
    /// Contribution of the specialization component (≤ 0.15).
    pub specialization: f64,
    /// Contribution of the constraint-headroom component (≤ 0.15).
    pub constraint: f64,
    /// Final clamped score in `[0.0, 1.0]`.
    pub total: f64,
}

/// One entry of a [`CapabilityMatrix::rank`] result.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedBackend {
    /// Backend id.
    pub id: BackendId,
    /// Suitability score in `(0.0, 1.0]` (zero scores are excluded).
    pub score: f64,
}

/// Registry of backend profiles plus the scoring logic over them.
///
/// Thread-safe: profiles and outcome windows live in `DashMap` entries.
pub struct CapabilityMatrix {
    profiles: DashMap<BackendId, BackendProfile>,
    performance: PerformanceTracker,
}

impl Default for CapabilityMatrix {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityMatrix {
    /// Create an empty matrix.
    pub fn new() -> Self {
        Self {
            profiles: DashMap::new(),
            performance: PerformanceTracker::new(OUTCOME_WINDOW),
        }
    }

    /// Add or replace a backend profile.
    pub fn register_backend(&self, profile: BackendProfile) {
        debug!(backend = %profile.id, "registering backend profile");
        self.profiles.insert(profile.id.clone(), profile);
    }

    /// `true` if `backend` has a registered profile.
    pub fn contains(&self, backend: &BackendId) -> bool {
        self.profiles.contains_key(backend)
    }

    /// Registered backend ids.
    pub fn backends(&self) -> Vec<BackendId> {
        self.profiles.iter().map(|e| e.key().clone()).collect()
    }

    /// Snapshot of all registered profiles.
    pub fn profiles(&self) -> HashMap<BackendId, BackendProfile> {
        self.profiles
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Profile snapshot for one backend.
    pub fn profile(&self, backend: &BackendId) -> Option<BackendProfile> {
        self.profiles.get(backend).map(|e| e.value().clone())
    }

    /// Score `backend` against `requirements`.
    ///
    /// Returns exactly `0.0` for unknown backends, unmet required minimums,
    /// and exceeded stated limits; otherwise the weighted blend described
    /// in the module docs, clamped to `[0.0, 1.0]`.
    pub fn score(&self, backend: &BackendId, requirements: &TaskRequirements) -> f64 {
        self.breakdown(backend, requirements)
            .map(|b| b.total)
            .unwrap_or(0.0)
    }

    /// Per-component breakdown of [`score`](Self::score).
    ///
    /// Returns `None` for unregistered backends. A disqualified backend
    /// yields a breakdown with `total == 0.0`.
    pub fn breakdown(
        &self,
        backend: &BackendId,
        requirements: &TaskRequirements,
    ) -> Option<CapabilityBreakdown> {
        let profile = self.profiles.get(backend)?;
        Some(score_profile(&profile, requirements))
    }

    /// Rank all registered backends for `requirements`, best first.
    ///
    /// Zero-score backends are excluded. Ties break on backend id so the
    /// ordering is deterministic.
    pub fn rank(&self, requirements: &TaskRequirements) -> Vec<RankedBackend> {
        let mut ranked: Vec<RankedBackend> = self
            .profiles
            .iter()
            .map(|e| RankedBackend {
                id: e.key().clone(),
                score: score_profile(e.value(), requirements).total,
            })
            .filter(|r| r.score > 0.0)
            .collect();

        ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        ranked
    }

    /// Best backend for `requirements`, or `None` when nothing scores
    /// above zero.
    pub fn select_optimal(&self, requirements: &TaskRequirements) -> Option<BackendId> {
        self.rank(requirements).into_iter().next().map(|r| r.id)
    }

    /// Record the outcome of a routed call for `backend`.
    ///
    /// Feeds the rolling performance window; every 20 outcomes a
    /// conservative adaptive step nudges the backend's `reliability`
    /// dimension toward the observed success rate (step ≤ 0.05, floored
    /// at 0.1, capped at 1.0).
    pub fn record_outcome(
        &self,
        backend: &BackendId,
        task_type: &str,
        success: bool,
        latency_ms: u64,
        quality: f64,
    ) {
        let sample = OutcomeSample {
            task_type: task_type.to_string(),
            success,
            latency_ms,
            quality,
        };

        if let Some(success_rate) = self.performance.record(backend, sample) {
            self.adapt_reliability(backend, success_rate);
        }
    }

    /// Aggregate performance stats for `backend`, optionally filtered by
    /// task type. `None` when no matching samples exist.
    pub fn performance_stats(
        &self,
        backend: &BackendId,
        task_type: Option<&str>,
    ) -> Option<PerformanceStats> {
        self.performance.stats(backend, task_type)
    }

    fn adapt_reliability(&self, backend: &BackendId, success_rate: f64) {
        if let Some(mut profile) = self.profiles.get_mut(backend) {
            let current = profile.capability(RELIABILITY_DIMENSION);
            let step = (success_rate - current).clamp(-ADAPT_STEP, ADAPT_STEP);
            let updated = (current + step).clamp(ADAPT_FLOOR, 1.0);
            debug!(
                backend = %backend,
                success_rate,
                from = current,
                to = updated,
                "adaptive reliability update"
            );
            profile
                .capabilities
                .insert(RELIABILITY_DIMENSION.to_string(), updated);
        }
    }
}

// ── Scoring internals ──────────────────────────────────────────────────

/// Score one profile against requirements. Pure — no shared state.
fn score_profile(profile: &BackendProfile, req: &TaskRequirements) -> CapabilityBreakdown {
    let zero = CapabilityBreakdown {
        preferred: 0.0,
        affinity: 0.0,
        specialization: 0.0,
        constraint: 0.0,
        total: 0.0,
    };

    // Hard gate: any required minimum missed disqualifies outright.
    for (dimension, minimum) in &req.required {
        if profile.capability(dimension) < *minimum {
            return zero;
        }
    }

    // Hard gate: a stated limit the static profile exceeds disqualifies.
    let constraint = match constraint_headroom(profile, req) {
        Some(headroom) => headroom,
        None => return zero,
    };

    let preferred = preferred_component(profile, req);
    let affinity = affinity_component(profile, req);
    let specialization = if profile.specializes_in(&req.task_type) {
        1.0
    } else {
        NON_SPECIALIST_FACTOR
    };

    let total = (PREFERRED_WEIGHT * preferred
        + AFFINITY_WEIGHT * affinity
        + SPECIALIZATION_WEIGHT * specialization
        + CONSTRAINT_WEIGHT * constraint)
        .clamp(0.0, 1.0);

    CapabilityBreakdown {
        preferred: PREFERRED_WEIGHT * preferred,
        affinity: AFFINITY_WEIGHT * affinity,
        specialization: SPECIALIZATION_WEIGHT * specialization,
        constraint: CONSTRAINT_WEIGHT * constraint,
        total,
    }
}

/// Mean attainment of the preferred targets, `1.0` when none are stated.
fn preferred_component(profile: &BackendProfile, req: &TaskRequirements) -> f64 {
    if req.preferred.is_empty() {
        return 1.0;
    }
    let sum: f64 = req
        .preferred
        .iter()
        .map(|(dimension, target)| {
            if *target <= 0.0 {
                1.0
            } else {
                (profile.capability(dimension) / target).clamp(0.0, 1.0)
            }
        })
        .sum();
    sum / req.preferred.len() as f64
}

/// Weighted average of the profile's affinity for the requested domains,
/// `1.0` when no domain context is given.
fn affinity_component(profile: &BackendProfile, req: &TaskRequirements) -> f64 {
    let weight_sum: f64 = req.domains.values().filter(|w| **w > 0.0).sum();
    if weight_sum <= 0.0 {
        return 1.0;
    }
    let weighted: f64 = req
        .domains
        .iter()
        .filter(|(_, w)| **w > 0.0)
        .map(|(domain, w)| profile.domain_affinity.get(domain).copied().unwrap_or(0.0) * w)
        .sum();
    weighted / weight_sum
}

/// Average slack against the stated limits, `1.0` when none are stated.
/// `None` when any limit is exceeded.
fn constraint_headroom(profile: &BackendProfile, req: &TaskRequirements) -> Option<f64> {
    let mut headrooms: Vec<f64> = Vec::with_capacity(3);

    if let Some(max) = req.max_latency_ms {
        if profile.latency_ms > max {
            return None;
        }
        headrooms.push(1.0 - profile.latency_ms as f64 / max.max(1) as f64);
    }
    if let Some(max) = req.max_cost_per_token {
        if profile.cost_per_input_token > max {
            return None;
        }
        if max > 0.0 {
            headrooms.push(1.0 - profile.cost_per_input_token / max);
        }
    }
    if let Some(min) = req.min_context_window {
        if profile.context_window < min {
            return None;
        }
        let extra = (profile.context_window - min) as f64 / min.max(1) as f64;
        headrooms.push(extra.min(1.0));
    }

    if headrooms.is_empty() {
        Some(1.0)
    } else {
        Some(headrooms.iter().sum::<f64>() / headrooms.len() as f64)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix_with(profiles: Vec<BackendProfile>) -> CapabilityMatrix {
        let matrix = CapabilityMatrix::new();
        for p in profiles {
            matrix.register_backend(p);
        }
        matrix
    }

    // -- hard gates -------------------------------------------------------

    #[test]
    fn test_unmet_required_minimum_scores_exactly_zero() {
        let matrix = matrix_with(vec![BackendProfile::new("m1")
            .with_capability("reasoning", 0.5)
            .with_capability("code", 1.0)
            .with_affinity("legal", 1.0)
            .with_specialization("analysis")]);

        // Every other input is maximally favourable; the gate still wins.
        let req = TaskRequirements::for_task("analysis")
            .require("reasoning", 0.6)
            .prefer("code", 0.1)
            .in_domain("legal", 1.0);

        let score = matrix.score(&BackendId::new("m1"), &req);
        assert!(
            score.abs() < f64::EPSILON,
            "unmet required minimum must score exactly 0, got {score}"
        );
    }

    #[test]
    fn test_met_required_minimum_scores_positive() {
        let matrix =
            matrix_with(vec![BackendProfile::new("m1").with_capability("reasoning", 0.9)]);
        let req = TaskRequirements::for_task("chat").require("reasoning", 0.6);
        assert!(matrix.score(&BackendId::new("m1"), &req) > 0.0);
    }

    #[test]
    fn test_unknown_backend_scores_zero() {
        let matrix = CapabilityMatrix::new();
        let req = TaskRequirements::for_task("chat");
        assert!(matrix.score(&BackendId::new("ghost"), &req).abs() < f64::EPSILON);
    }

    #[test]
    fn test_exceeded_cost_limit_disqualifies() {
        let matrix = matrix_with(vec![BackendProfile::new("pricey")
            .with_capability("reasoning", 0.95)
            .with_token_costs(0.05, 0.1)]);
        let req = TaskRequirements::for_task("chat").with_max_cost_per_token(0.02);
        assert!(matrix.score(&BackendId::new("pricey"), &req).abs() < f64::EPSILON);
    }

    #[test]
    fn test_exceeded_latency_limit_disqualifies() {
        let matrix = matrix_with(vec![BackendProfile::new("slow").with_latency_ms(5_000)]);
        let req = TaskRequirements::for_task("chat").with_max_latency_ms(1_000);
        assert!(matrix.score(&BackendId::new("slow"), &req).abs() < f64::EPSILON);
    }

    #[test]
    fn test_small_context_window_disqualifies() {
        let matrix = matrix_with(vec![BackendProfile::new("tiny").with_context_window(2_048)]);
        let req = TaskRequirements::for_task("chat").with_min_context_window(32_000);
        assert!(matrix.score(&BackendId::new("tiny"), &req).abs() < f64::EPSILON);
    }

    // -- blend components -------------------------------------------------

    #[test]
    fn test_specialist_outscores_non_specialist() {
        let matrix = matrix_with(vec![
            BackendProfile::new("specialist").with_specialization("code_review"),
            BackendProfile::new("generalist"),
        ]);
        let req = TaskRequirements::for_task("code_review");
        let s = matrix.score(&BackendId::new("specialist"), &req);
        let g = matrix.score(&BackendId::new("generalist"), &req);
        assert!(s > g, "specialist {s} should beat generalist {g}");
    }

    #[test]
    fn test_non_specialist_gets_seventy_percent_of_specialization_weight() {
        let matrix = matrix_with(vec![BackendProfile::new("generalist")]);
        let req = TaskRequirements::for_task("code_review");
        let bd = matrix
            .breakdown(&BackendId::new("generalist"), &req)
            .unwrap_or_else(|| std::panic::panic_any("test: expected breakdown"));
        assert!((bd.specialization - 0.15 * 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_affinity_component_weights_domains() {
        let matrix = matrix_with(vec![BackendProfile::new("m1")
            .with_affinity("medical", 1.0)
            .with_affinity("legal", 0.0)]);
        // Medical weighted 3:1 over legal → affinity 0.75 → contribution 0.225.
        let req = TaskRequirements::for_task("chat")
            .in_domain("medical", 3.0)
            .in_domain("legal", 1.0);
        let bd = matrix
            .breakdown(&BackendId::new("m1"), &req)
            .unwrap_or_else(|| std::panic::panic_any("test: expected breakdown"));
        assert!((bd.affinity - 0.30 * 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_preferred_component_is_proportional_to_attainment() {
        let matrix =
            matrix_with(vec![BackendProfile::new("m1").with_capability("reasoning", 0.4)]);
        let req = TaskRequirements::for_task("chat").prefer("reasoning", 0.8);
        let bd = matrix
            .breakdown(&BackendId::new("m1"), &req)
            .unwrap_or_else(|| std::panic::panic_any("test: expected breakdown"));
        // 0.4 / 0.8 = 0.5 attainment of a 0.40-weight component.
        assert!((bd.preferred - 0.40 * 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_score_is_clamped_to_unit_interval() {
        let matrix = matrix_with(vec![BackendProfile::new("m1")
            .with_capability("reasoning", 1.0)
            .with_affinity("all", 1.0)
            .with_specialization("chat")]);
        let req = TaskRequirements::for_task("chat")
            .prefer("reasoning", 0.5)
            .in_domain("all", 1.0);
        let score = matrix.score(&BackendId::new("m1"), &req);
        assert!((0.0..=1.0).contains(&score));
    }

    // -- rank / select ----------------------------------------------------

    #[test]
    fn test_rank_is_sorted_descending_and_excludes_zero() {
        let matrix = matrix_with(vec![
            BackendProfile::new("strong").with_capability("reasoning", 0.9),
            BackendProfile::new("weak").with_capability("reasoning", 0.3),
            BackendProfile::new("gated").with_capability("reasoning", 0.1),
        ]);
        let req = TaskRequirements::for_task("chat")
            .require("reasoning", 0.2)
            .prefer("reasoning", 1.0);

        let ranked = matrix.rank(&req);
        assert_eq!(ranked.len(), 2, "gated backend must be excluded");
        assert!(ranked[0].score >= ranked[1].score);
        assert_eq!(ranked[0].id.as_str(), "strong");
    }

    #[test]
    fn test_rank_scenario_requirement_and_cost_ceiling() {
        // A meets both; B fails the reasoning requirement; C fails the
        // cost ceiling. Rank must return exactly [A].
        let matrix = matrix_with(vec![
            BackendProfile::new("A")
                .with_capability("reasoning", 0.9)
                .with_token_costs(0.01, 0.01),
            BackendProfile::new("B")
                .with_capability("reasoning", 0.5)
                .with_token_costs(0.001, 0.001),
            BackendProfile::new("C")
                .with_capability("reasoning", 0.95)
                .with_token_costs(0.05, 0.05),
        ]);
        let req = TaskRequirements::for_task("analysis")
            .require("reasoning", 0.6)
            .with_max_cost_per_token(0.02);

        let ranked = matrix.rank(&req);
        assert_eq!(ranked.len(), 1, "expected exactly [A], got {ranked:?}");
        assert_eq!(ranked[0].id.as_str(), "A");
    }

    #[test]
    fn test_select_optimal_none_when_everything_gated() {
        let matrix =
            matrix_with(vec![BackendProfile::new("m1").with_capability("reasoning", 0.1)]);
        let req = TaskRequirements::for_task("chat").require("reasoning", 0.9);
        assert!(matrix.select_optimal(&req).is_none());
    }

    #[test]
    fn test_select_optimal_returns_top_of_rank() {
        let matrix = matrix_with(vec![
            BackendProfile::new("best").with_capability("reasoning", 1.0),
            BackendProfile::new("ok").with_capability("reasoning", 0.5),
        ]);
        let req = TaskRequirements::for_task("chat").prefer("reasoning", 1.0);
        let chosen = matrix
            .select_optimal(&req)
            .unwrap_or_else(|| std::panic::panic_any("test: expected a selection"));
        assert_eq!(chosen.as_str(), "best");
    }

    #[test]
    fn test_register_backend_replaces_existing_profile() {
        let matrix = matrix_with(vec![BackendProfile::new("m1").with_capability("code", 0.2)]);
        matrix.register_backend(BackendProfile::new("m1").with_capability("code", 0.9));
        let profile = matrix
            .profile(&BackendId::new("m1"))
            .unwrap_or_else(|| std::panic::panic_any("test: expected profile"));
        assert!((profile.capability("code") - 0.9).abs() < f64::EPSILON);
    }

    // -- adaptive feedback -------------------------------------------------

    #[test]
    fn test_adaptive_step_nudges_reliability_toward_success_rate() {
        let matrix =
            matrix_with(vec![BackendProfile::new("m1").with_capability("reliability", 0.5)]);
        let id = BackendId::new("m1");
        // 20 successful outcomes → success rate 1.0 → +0.05 step.
        for _ in 0..20 {
            matrix.record_outcome(&id, "chat", true, 100, 0.9);
        }
        let profile = matrix
            .profile(&id)
            .unwrap_or_else(|| std::panic::panic_any("test: expected profile"));
        assert!((profile.capability("reliability") - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_adaptive_step_is_bounded_per_interval() {
        let matrix =
            matrix_with(vec![BackendProfile::new("m1").with_capability("reliability", 0.9)]);
        let id = BackendId::new("m1");
        // All failures; a naive update would crash to 0, the bounded step
        // moves at most 0.05.
        for _ in 0..20 {
            matrix.record_outcome(&id, "chat", false, 100, 0.0);
        }
        let profile = matrix
            .profile(&id)
            .unwrap_or_else(|| std::panic::panic_any("test: expected profile"));
        assert!((profile.capability("reliability") - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_adaptive_reliability_never_drops_below_floor() {
        let matrix =
            matrix_with(vec![BackendProfile::new("m1").with_capability("reliability", 0.12)]);
        let id = BackendId::new("m1");
        for _ in 0..200 {
            matrix.record_outcome(&id, "chat", false, 100, 0.0);
        }
        let profile = matrix
            .profile(&id)
            .unwrap_or_else(|| std::panic::panic_any("test: expected profile"));
        assert!(
            profile.capability("reliability") >= 0.1,
            "reliability must be floored at 0.1"
        );
    }

    #[test]
    fn test_performance_stats_reflect_recorded_outcomes() {
        let matrix = matrix_with(vec![BackendProfile::new("m1")]);
        let id = BackendId::new("m1");
        matrix.record_outcome(&id, "code", true, 120, 0.8);
        matrix.record_outcome(&id, "code", false, 80, 0.2);
        let stats = matrix
            .performance_stats(&id, Some("code"))
            .unwrap_or_else(|| std::panic::panic_any("test: expected stats"));
        assert_eq!(stats.samples, 2);
        assert!((stats.success_rate - 0.5).abs() < f64::EPSILON);
        assert!((stats.avg_latency_ms - 100.0).abs() < f64::EPSILON);
    }

    // -- requirements serde ------------------------------------------------

    #[test]
    fn test_requirements_serde_round_trip() {
        let req = TaskRequirements::for_task("analysis")
            .require("reasoning", 0.6)
            .prefer("code", 0.8)
            .in_domain("finance", 1.0)
            .with_max_latency_ms(2_000)
            .with_max_cost_per_token(0.02)
            .with_min_context_window(16_000);
        let json = serde_json::to_string(&req)
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: serialize: {e}")));
        let back: TaskRequirements = serde_json::from_str(&json)
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: deserialize: {e}")));
        assert_eq!(req, back);
    }
}
