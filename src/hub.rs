//! Composition root.
//!
//! [`OrchestrationHub`] wires the capability matrix, cost optimizer,
//! router, and consensus engine into one explicitly constructed object —
//! no globals, no hidden singletons. Callers inject the [`BackendCall`]
//! collaborator and a [`Clock`], which keeps the whole hub testable
//! without real backends or wall time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backend::BackendCall;
use crate::capability::{BackendProfile, CapabilityMatrix, PerformanceStats};
use crate::clock::{Clock, SystemClock};
use crate::consensus::{ConsensusEngine, ConsensusOptions, ConsensusResult, MetricsSummary};
use crate::cost::{CostConstraints, CostOptimizer, CostProfile, UsageStats};
use crate::routing::{Response, Router, RouterConfig, RoutingDecision, RunningStats, TaskRequest};
use crate::{BackendId, HubError};

/// Declarative hub configuration, loadable from TOML/JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct HubConfig {
    /// Routing layer configuration.
    #[serde(default)]
    pub router: RouterConfig,

    /// Backend capability profiles registered at construction.
    #[serde(default)]
    pub backends: Vec<BackendProfile>,

    /// Backend billing profiles registered at construction.
    #[serde(default)]
    pub cost_profiles: Vec<CostProfile>,
}

/// The hub: one object owning every orchestration component.
pub struct OrchestrationHub {
    matrix: Arc<CapabilityMatrix>,
    optimizer: Arc<CostOptimizer>,
    router: Arc<Router>,
    engine: ConsensusEngine,
}

impl OrchestrationHub {
    /// Build a hub from `config` against the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::ConfigError`] when the routing configuration
    /// fails validation.
    pub fn new(config: HubConfig, call: Arc<dyn BackendCall>) -> Result<Self, HubError> {
        Self::with_clock(config, call, Arc::new(SystemClock))
    }

    /// Build a hub with an injected clock (tests use [`ManualClock`]).
    ///
    /// [`ManualClock`]: crate::clock::ManualClock
    ///
    /// # Errors
    ///
    /// Returns [`HubError::ConfigError`] when the routing configuration
    /// fails validation.
    pub fn with_clock(
        config: HubConfig,
        call: Arc<dyn BackendCall>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, HubError> {
        let matrix = Arc::new(CapabilityMatrix::new());
        for profile in config.backends {
            matrix.register_backend(profile);
        }

        let optimizer = Arc::new(CostOptimizer::new(clock));
        for profile in config.cost_profiles {
            optimizer.register_profile(profile);
        }

        let router = Arc::new(Router::new(
            Arc::clone(&matrix),
            Arc::clone(&optimizer),
            call,
            config.router,
        )?);
        let engine = ConsensusEngine::new(Arc::clone(&router), Arc::clone(&matrix));

        info!(backends = matrix.backends().len(), "orchestration hub ready");
        Ok(Self {
            matrix,
            optimizer,
            router,
            engine,
        })
    }

    /// Register (or replace) a backend's capability profile.
    pub fn register_backend(&self, profile: BackendProfile) {
        self.matrix.register_backend(profile);
    }

    /// Register (or replace) a backend's billing profile.
    pub fn register_cost_profile(&self, profile: CostProfile) {
        self.optimizer.register_profile(profile);
    }

    /// Route one task to the best backend and invoke it.
    pub async fn route(&self, request: &TaskRequest) -> (RoutingDecision, Response) {
        self.router.route(request).await
    }

    /// Ask several backends `question` and combine their answers.
    pub async fn reach_consensus(
        &self,
        question: &str,
        options: &ConsensusOptions,
    ) -> ConsensusResult {
        self.engine.reach_consensus(question, options).await
    }

    /// Capability profiles of every registered backend.
    pub fn backend_capabilities(&self) -> HashMap<BackendId, BackendProfile> {
        self.matrix.profiles()
    }

    /// Observed per-backend running averages from routed calls.
    pub fn performance_summary(&self) -> HashMap<BackendId, RunningStats> {
        self.router.performance_summary()
    }

    /// Rolling-window outcome stats for one backend, optionally narrowed
    /// to a task type.
    pub fn performance_stats(
        &self,
        backend: &BackendId,
        task_type: Option<&str>,
    ) -> Option<PerformanceStats> {
        self.matrix.performance_stats(backend, task_type)
    }

    /// Usage statistics over the trailing `period`.
    pub fn usage_statistics(&self, period: Duration) -> UsageStats {
        self.optimizer.usage_statistics(period)
    }

    /// Aggregate consensus diagnostics.
    pub fn consensus_metrics(&self) -> MetricsSummary {
        self.engine.metrics_summary()
    }

    /// Cost-saving suggestions for usage over the trailing `period`.
    pub fn cost_recommendations(
        &self,
        period: Duration,
        constraints: &CostConstraints,
    ) -> Vec<String> {
        let stats = self.optimizer.usage_statistics(period);
        self.optimizer.recommend_optimizations(&stats, constraints)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
