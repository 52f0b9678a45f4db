//! Budget-constrained candidate filtering and reordering.
//!
//! The optimizer owns per-backend billing profiles and the usage ledger.
//! `check_constraints` answers "can we afford this call right now?",
//! `optimize_selection` drops and reorders candidates per strategy, and
//! `record_usage` keeps the ledger honest after the fact.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ledger::{UsageLedger, UsageRecord};
use crate::clock::Clock;
use crate::BackendId;

/// Day-budget utilization above which the adaptive strategy behaves like
/// [`OptimizationStrategy::MinimizeCost`].
const ADAPTIVE_THRIFT_THRESHOLD: f64 = 0.7;
/// Average cost/request above which an economy tier is suggested.
const HIGH_COST_PER_REQUEST: f64 = 0.02;
/// Day-budget utilization above which a downgrade is suggested.
const HIGH_UTILIZATION: f64 = 0.8;
/// Day-budget utilization below which an upgrade is suggested.
const LOW_UTILIZATION: f64 = 0.3;

// ── Default value functions ────────────────────────────────────────────

/// Default weight of budget pressure in the `Balance` strategy.
fn default_budget_priority() -> f64 {
    1.0
}

// ── Types ──────────────────────────────────────────────────────────────

/// How [`CostOptimizer::optimize_selection`] orders surviving candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OptimizationStrategy {
    /// Cheapest quality-per-dollar first (descending efficiency).
    MinimizeCost,
    /// Highest quality first.
    MaximizeQuality,
    /// Descending `quality · efficiency · budget_priority`.
    #[default]
    Balance,
    /// MinimizeCost when the day budget is over 70% utilised, otherwise a
    /// quality/efficiency blend proportional to utilization.
    Adaptive,
}

/// Budget ceilings and selection policy for one optimizer pass.
///
/// All ceilings are *hard*: a candidate that would break one is removed
/// from the selection, never merely deprioritised. (The softer per-request
/// preference lives on `TaskRequest::max_cost` and only zeroes the
/// Router's cost score.)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostConstraints {
    /// Ceiling for a single request, USD.
    #[serde(default)]
    pub max_per_request: Option<f64>,

    /// Ceiling for the rolling hour window, USD.
    #[serde(default)]
    pub max_per_hour: Option<f64>,

    /// Ceiling for the rolling day window, USD.
    #[serde(default)]
    pub max_per_day: Option<f64>,

    /// Weight of budget pressure in the `Balance` strategy.
    #[serde(default = "default_budget_priority")]
    pub budget_priority: f64,

    /// Candidates below this quality are dropped outright.
    #[serde(default)]
    pub quality_threshold: f64,

    /// Ordering strategy for surviving candidates.
    #[serde(default)]
    pub strategy: OptimizationStrategy,
}

impl Default for CostConstraints {
    fn default() -> Self {
        Self {
            max_per_request: None,
            max_per_hour: None,
            max_per_day: None,
            budget_priority: default_budget_priority(),
            quality_threshold: 0.0,
            strategy: OptimizationStrategy::default(),
        }
    }
}

/// Billing profile of one backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostProfile {
    /// Backend this profile describes.
    pub backend: BackendId,
    /// Cost per input token, USD.
    pub cost_per_input_token: f64,
    /// Cost per output token, USD.
    pub cost_per_output_token: f64,
    /// Cost of a typical request, USD.
    pub typical_request_cost: f64,
    /// Expected answer quality in `[0.0, 1.0]`.
    pub quality: f64,
}

impl CostProfile {
    /// Create a profile.
    pub fn new(
        backend: impl Into<String>,
        cost_per_input_token: f64,
        cost_per_output_token: f64,
        typical_request_cost: f64,
        quality: f64,
    ) -> Self {
        Self {
            backend: BackendId::new(backend),
            cost_per_input_token,
            cost_per_output_token,
            typical_request_cost,
            quality,
        }
    }

    /// Quality per dollar of a typical request.
    pub fn efficiency(&self) -> f64 {
        self.quality / self.typical_request_cost.max(1e-9)
    }
}

/// Usage statistics over a query period.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageStats {
    /// Requests billed in the period.
    pub count: usize,
    /// Total cost in USD.
    pub total_cost: f64,
    /// Total tokens (input + output).
    pub total_tokens: u64,
    /// Mean quality score, `0.0` when the period is empty.
    pub avg_quality: f64,
}

// ── CostOptimizer ──────────────────────────────────────────────────────

/// Per-backend billing profiles plus the shared usage ledger.
///
/// The ledger (records + hour/day windows) sits behind a single mutex so
/// updates from the Router and ConsensusEngine paths are one atomic
/// read-modify-write each.
pub struct CostOptimizer {
    profiles: DashMap<BackendId, CostProfile>,
    ledger: Mutex<UsageLedger>,
    clock: Arc<dyn Clock>,
}

impl CostOptimizer {
    /// Create an optimizer with the given clock.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            profiles: DashMap::new(),
            ledger: Mutex::new(UsageLedger::new(now)),
            clock,
        }
    }

    /// Add or replace a billing profile.
    pub fn register_profile(&self, profile: CostProfile) {
        self.profiles.insert(profile.backend.clone(), profile);
    }

    /// Billing profile snapshot for one backend.
    pub fn profile(&self, backend: &BackendId) -> Option<CostProfile> {
        self.profiles.get(backend).map(|e| e.value().clone())
    }

    /// Estimated cost of a call to `backend`, USD. Zero for unknown
    /// backends (they bill nothing through this hub).
    pub fn estimate_cost(&self, backend: &BackendId, tokens_in: u64, tokens_out: u64) -> f64 {
        self.profiles
            .get(backend)
            .map(|p| {
                tokens_in as f64 * p.cost_per_input_token
                    + tokens_out as f64 * p.cost_per_output_token
            })
            .unwrap_or(0.0)
    }

    /// `true` when spending `estimated_cost` now would not break any
    /// ceiling in `constraints`.
    ///
    /// Window counters reset lazily here if their boundary has passed.
    pub fn check_constraints(&self, estimated_cost: f64, constraints: &CostConstraints) -> bool {
        if let Some(max) = constraints.max_per_request {
            if estimated_cost > max {
                return false;
            }
        }

        let mut ledger = self.ledger.lock();
        ledger.roll_windows(self.clock.now());

        if let Some(max) = constraints.max_per_hour {
            if ledger.hour_spend_usd() + estimated_cost > max {
                return false;
            }
        }
        if let Some(max) = constraints.max_per_day {
            if ledger.day_spend_usd() + estimated_cost > max {
                return false;
            }
        }
        true
    }

    /// Filter and reorder `candidates` under `constraints`.
    ///
    /// Drops candidates without a billing profile, below the quality
    /// threshold, or failing [`check_constraints`] on their typical
    /// request cost; orders the rest per the strategy.
    pub fn optimize_selection(
        &self,
        candidates: &[BackendId],
        constraints: &CostConstraints,
    ) -> Vec<BackendId> {
        let mut viable: Vec<CostProfile> = candidates
            .iter()
            .filter_map(|id| self.profiles.get(id).map(|e| e.value().clone()))
            .filter(|p| p.quality >= constraints.quality_threshold)
            .filter(|p| {
                let ok = self.check_constraints(p.typical_request_cost, constraints);
                if !ok {
                    debug!(backend = %p.backend, "candidate excluded by budget ceiling");
                }
                ok
            })
            .collect();

        let max_efficiency = viable
            .iter()
            .map(|p| p.efficiency())
            .fold(0.0_f64, f64::max)
            .max(1e-9);

        let key = |p: &CostProfile| -> f64 {
            match constraints.strategy {
                OptimizationStrategy::MinimizeCost => p.efficiency(),
                OptimizationStrategy::MaximizeQuality => p.quality,
                OptimizationStrategy::Balance => {
                    p.quality * p.efficiency() * constraints.budget_priority
                }
                OptimizationStrategy::Adaptive => {
                    let utilization = self.day_utilization(constraints);
                    if utilization > ADAPTIVE_THRIFT_THRESHOLD {
                        p.efficiency()
                    } else {
                        p.quality * (1.0 - utilization)
                            + (p.efficiency() / max_efficiency) * utilization
                    }
                }
            }
        };

        viable.sort_by(|a, b| {
            key(b)
                .total_cmp(&key(a))
                .then_with(|| a.backend.cmp(&b.backend))
        });
        viable.into_iter().map(|p| p.backend).collect()
    }

    /// Append a usage record and bump the hour/day windows.
    ///
    /// Cost is computed from the backend's billing profile (zero when
    /// unknown). Returns the recorded cost.
    pub fn record_usage(
        &self,
        backend: &BackendId,
        tokens_in: u64,
        tokens_out: u64,
        quality: f64,
    ) -> f64 {
        let cost = self.estimate_cost(backend, tokens_in, tokens_out);
        let now = self.clock.now();
        let record = UsageRecord {
            timestamp: now,
            backend: backend.clone(),
            tokens_in,
            tokens_out,
            cost,
            quality,
        };
        self.ledger.lock().record(record, now);
        cost
    }

    /// Usage statistics over the trailing `period`.
    pub fn usage_statistics(&self, period: Duration) -> UsageStats {
        let now = self.clock.now();
        let cutoff = now.checked_sub(period).unwrap_or(SystemTime::UNIX_EPOCH);
        let records = self.ledger.lock().records_since(cutoff);

        let count = records.len();
        let total_cost: f64 = records.iter().map(|r| r.cost).sum();
        let total_tokens: u64 = records.iter().map(|r| r.tokens_in + r.tokens_out).sum();
        let avg_quality = if count > 0 {
            records.iter().map(|r| r.quality).sum::<f64>() / count as f64
        } else {
            0.0
        };

        UsageStats {
            count,
            total_cost,
            total_tokens,
            avg_quality,
        }
    }

    /// Fixed-threshold heuristics over `stats` and `constraints`.
    pub fn recommend_optimizations(
        &self,
        stats: &UsageStats,
        constraints: &CostConstraints,
    ) -> Vec<String> {
        let mut suggestions = Vec::new();

        if stats.count > 0 {
            let avg_cost = stats.total_cost / stats.count as f64;
            if avg_cost > HIGH_COST_PER_REQUEST {
                suggestions.push(format!(
                    "average cost per request ${avg_cost:.4} exceeds ${HIGH_COST_PER_REQUEST}; \
                     route more traffic to an economy tier"
                ));
            }
        }

        if constraints.max_per_day.is_some() {
            let utilization = self.day_utilization(constraints);
            if utilization > HIGH_UTILIZATION {
                suggestions.push(format!(
                    "daily budget {:.0}% utilised; downgrade expensive backends",
                    utilization * 100.0
                ));
            } else if utilization < LOW_UTILIZATION {
                suggestions.push(format!(
                    "daily budget only {:.0}% utilised; headroom to upgrade quality",
                    utilization * 100.0
                ));
            }
        }

        suggestions
    }

    /// Fraction of the day budget already spent, `0.0` without a ceiling.
    fn day_utilization(&self, constraints: &CostConstraints) -> f64 {
        match constraints.max_per_day {
            Some(max) if max > 0.0 => {
                let mut ledger = self.ledger.lock();
                ledger.roll_windows(self.clock.now());
                (ledger.day_spend_usd() / max).clamp(0.0, 1.0)
            }
            _ => 0.0,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn optimizer() -> (Arc<ManualClock>, CostOptimizer) {
        let clock = Arc::new(ManualClock::default());
        let optimizer = CostOptimizer::new(clock.clone());
        (clock, optimizer)
    }

    // -- check_constraints ------------------------------------------------

    #[test]
    fn test_check_constraints_no_ceilings_always_true() {
        let (_, opt) = optimizer();
        assert!(opt.check_constraints(1_000.0, &CostConstraints::default()));
    }

    #[test]
    fn test_check_constraints_per_request_ceiling() {
        let (_, opt) = optimizer();
        let constraints = CostConstraints {
            max_per_request: Some(0.10),
            ..CostConstraints::default()
        };
        assert!(opt.check_constraints(0.10, &constraints));
        assert!(!opt.check_constraints(0.11, &constraints));
    }

    #[test]
    fn test_check_constraints_hour_ceiling_exact_boundary_allowed() {
        let (_, opt) = optimizer();
        opt.register_profile(CostProfile::new("m1", 0.001, 0.001, 0.05, 0.8));
        // hour spend becomes 0.05
        opt.record_usage(&BackendId::new("m1"), 25, 25, 0.8);

        let constraints = CostConstraints {
            max_per_hour: Some(0.10),
            ..CostConstraints::default()
        };
        // Exactly maxPerHour − hourSpend must still be allowed …
        assert!(opt.check_constraints(0.05, &constraints));
        // … and one tick more must not.
        assert!(!opt.check_constraints(0.051, &constraints));
    }

    #[test]
    fn test_check_constraints_day_ceiling() {
        let (_, opt) = optimizer();
        opt.register_profile(CostProfile::new("m1", 0.01, 0.01, 1.0, 0.8));
        opt.record_usage(&BackendId::new("m1"), 50, 50, 0.8); // $1.00

        let constraints = CostConstraints {
            max_per_day: Some(1.50),
            ..CostConstraints::default()
        };
        assert!(opt.check_constraints(0.50, &constraints));
        assert!(!opt.check_constraints(0.51, &constraints));
    }

    #[test]
    fn test_hour_window_resets_lazily_on_check() {
        let (clock, opt) = optimizer();
        opt.register_profile(CostProfile::new("m1", 0.001, 0.001, 0.05, 0.8));
        opt.record_usage(&BackendId::new("m1"), 50, 50, 0.8); // $0.10

        let constraints = CostConstraints {
            max_per_hour: Some(0.10),
            ..CostConstraints::default()
        };
        assert!(!opt.check_constraints(0.01, &constraints));

        clock.advance(Duration::from_secs(3_601));
        assert!(
            opt.check_constraints(0.01, &constraints),
            "hour window must have reset after the boundary"
        );
    }

    // -- record / statistics ----------------------------------------------

    #[test]
    fn test_record_usage_computes_cost_from_profile() {
        let (_, opt) = optimizer();
        opt.register_profile(CostProfile::new("m1", 0.01, 0.03, 0.5, 0.9));
        let cost = opt.record_usage(&BackendId::new("m1"), 100, 10, 0.9);
        // 100·0.01 + 10·0.03 = 1.30
        assert!((cost - 1.30).abs() < 1e-9);
    }

    #[test]
    fn test_record_usage_unknown_backend_costs_zero() {
        let (_, opt) = optimizer();
        let cost = opt.record_usage(&BackendId::new("ghost"), 100, 100, 0.5);
        assert!(cost.abs() < f64::EPSILON);
    }

    #[test]
    fn test_accumulation_law_count_and_cost() {
        let (_, opt) = optimizer();
        opt.register_profile(CostProfile::new("m1", 0.001, 0.001, 0.05, 0.8));
        let period = Duration::from_secs(3_600);

        let before = opt.usage_statistics(period);
        let recorded = opt.record_usage(&BackendId::new("m1"), 100, 100, 0.8);
        let after = opt.usage_statistics(period);

        assert_eq!(after.count, before.count + 1);
        assert!(
            (after.total_cost - before.total_cost - recorded).abs() < 1e-9,
            "total cost must grow by exactly the recorded cost"
        );
        assert_eq!(after.total_tokens, before.total_tokens + 200);
    }

    #[test]
    fn test_usage_statistics_respects_period() {
        let (clock, opt) = optimizer();
        opt.register_profile(CostProfile::new("m1", 0.001, 0.001, 0.05, 0.6));
        opt.record_usage(&BackendId::new("m1"), 10, 10, 0.6);
        clock.advance(Duration::from_secs(7_200));
        opt.record_usage(&BackendId::new("m1"), 10, 10, 0.6);

        let stats = opt.usage_statistics(Duration::from_secs(3_600));
        assert_eq!(stats.count, 1, "only the recent record falls in the hour");
    }

    #[test]
    fn test_usage_statistics_empty_period_has_zero_quality() {
        let (_, opt) = optimizer();
        let stats = opt.usage_statistics(Duration::from_secs(60));
        assert_eq!(stats.count, 0);
        assert!(stats.avg_quality.abs() < f64::EPSILON);
    }

    // -- optimize_selection -----------------------------------------------

    fn ids(names: &[&str]) -> Vec<BackendId> {
        names.iter().map(|n| BackendId::new(*n)).collect()
    }

    #[test]
    fn test_minimize_cost_prefers_cheaper_of_equal_quality() {
        let (_, opt) = optimizer();
        opt.register_profile(CostProfile::new("cheap", 0.001, 0.001, 0.01, 0.8));
        opt.register_profile(CostProfile::new("dear", 0.01, 0.01, 0.10, 0.8));

        let constraints = CostConstraints {
            strategy: OptimizationStrategy::MinimizeCost,
            ..CostConstraints::default()
        };
        let ordered = opt.optimize_selection(&ids(&["dear", "cheap"]), &constraints);
        assert_eq!(ordered[0].as_str(), "cheap");
    }

    #[test]
    fn test_maximize_quality_orders_by_quality() {
        let (_, opt) = optimizer();
        opt.register_profile(CostProfile::new("good", 0.01, 0.01, 0.10, 0.95));
        opt.register_profile(CostProfile::new("meh", 0.001, 0.001, 0.01, 0.6));

        let constraints = CostConstraints {
            strategy: OptimizationStrategy::MaximizeQuality,
            ..CostConstraints::default()
        };
        let ordered = opt.optimize_selection(&ids(&["meh", "good"]), &constraints);
        assert_eq!(ordered[0].as_str(), "good");
    }

    #[test]
    fn test_quality_threshold_drops_candidates() {
        let (_, opt) = optimizer();
        opt.register_profile(CostProfile::new("good", 0.01, 0.01, 0.10, 0.9));
        opt.register_profile(CostProfile::new("bad", 0.001, 0.001, 0.01, 0.3));

        let constraints = CostConstraints {
            quality_threshold: 0.5,
            ..CostConstraints::default()
        };
        let ordered = opt.optimize_selection(&ids(&["good", "bad"]), &constraints);
        assert_eq!(ordered, ids(&["good"]));
    }

    #[test]
    fn test_budget_ceiling_hard_excludes_candidate() {
        let (_, opt) = optimizer();
        opt.register_profile(CostProfile::new("pricey", 0.01, 0.01, 0.50, 0.99));
        opt.register_profile(CostProfile::new("fits", 0.001, 0.001, 0.01, 0.7));

        let constraints = CostConstraints {
            max_per_request: Some(0.10),
            ..CostConstraints::default()
        };
        let ordered = opt.optimize_selection(&ids(&["pricey", "fits"]), &constraints);
        assert_eq!(ordered, ids(&["fits"]), "over-budget candidate must be gone");
    }

    #[test]
    fn test_unknown_candidates_are_dropped() {
        let (_, opt) = optimizer();
        let ordered = opt.optimize_selection(&ids(&["ghost"]), &CostConstraints::default());
        assert!(ordered.is_empty());
    }

    #[test]
    fn test_adaptive_behaves_thrifty_under_budget_pressure() {
        let (_, opt) = optimizer();
        opt.register_profile(CostProfile::new("lux", 0.01, 0.01, 1.0, 0.99));
        opt.register_profile(CostProfile::new("eco", 0.0001, 0.0001, 0.01, 0.7));
        // Spend 80% of the day budget.
        opt.record_usage(&BackendId::new("lux"), 40, 40, 0.99); // $0.80

        let constraints = CostConstraints {
            max_per_day: Some(1.0),
            strategy: OptimizationStrategy::Adaptive,
            ..CostConstraints::default()
        };
        let ordered = opt.optimize_selection(&ids(&["lux", "eco"]), &constraints);
        assert!(
            !ordered.is_empty() && ordered[0].as_str() == "eco",
            "over 70% utilization must order by efficiency, got {ordered:?}"
        );
    }

    #[test]
    fn test_adaptive_favours_quality_with_empty_budget() {
        let (_, opt) = optimizer();
        opt.register_profile(CostProfile::new("lux", 0.01, 0.01, 0.10, 0.99));
        opt.register_profile(CostProfile::new("eco", 0.0001, 0.0001, 0.01, 0.7));

        let constraints = CostConstraints {
            max_per_day: Some(100.0),
            strategy: OptimizationStrategy::Adaptive,
            ..CostConstraints::default()
        };
        // Zero utilization → pure quality ordering.
        let ordered = opt.optimize_selection(&ids(&["eco", "lux"]), &constraints);
        assert_eq!(ordered[0].as_str(), "lux");
    }

    // -- recommendations --------------------------------------------------

    #[test]
    fn test_recommend_economy_tier_for_high_average_cost() {
        let (_, opt) = optimizer();
        let stats = UsageStats {
            count: 10,
            total_cost: 0.5, // $0.05/request
            total_tokens: 1_000,
            avg_quality: 0.9,
        };
        let suggestions = opt.recommend_optimizations(&stats, &CostConstraints::default());
        assert!(suggestions.iter().any(|s| s.contains("economy tier")));
    }

    #[test]
    fn test_recommend_downgrade_at_high_utilization() {
        let (_, opt) = optimizer();
        opt.register_profile(CostProfile::new("m1", 0.01, 0.01, 1.0, 0.9));
        opt.record_usage(&BackendId::new("m1"), 45, 45, 0.9); // $0.90

        let constraints = CostConstraints {
            max_per_day: Some(1.0),
            ..CostConstraints::default()
        };
        let stats = opt.usage_statistics(Duration::from_secs(86_400));
        let suggestions = opt.recommend_optimizations(&stats, &constraints);
        assert!(suggestions.iter().any(|s| s.contains("downgrade")));
    }

    #[test]
    fn test_recommend_upgrade_with_headroom() {
        let (_, opt) = optimizer();
        let constraints = CostConstraints {
            max_per_day: Some(100.0),
            ..CostConstraints::default()
        };
        let stats = opt.usage_statistics(Duration::from_secs(86_400));
        let suggestions = opt.recommend_optimizations(&stats, &constraints);
        assert!(suggestions.iter().any(|s| s.contains("upgrade")));
    }

    #[test]
    fn test_no_recommendations_when_all_is_well() {
        let (_, opt) = optimizer();
        let stats = UsageStats {
            count: 10,
            total_cost: 0.05, // $0.005/request
            total_tokens: 1_000,
            avg_quality: 0.9,
        };
        let suggestions = opt.recommend_optimizations(&stats, &CostConstraints::default());
        assert!(suggestions.is_empty(), "got: {suggestions:?}");
    }
}
