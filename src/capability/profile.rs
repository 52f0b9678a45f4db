//! Static per-backend capability profiles.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::BackendId;

/// Default latency estimate for a freshly built profile (milliseconds).
fn default_latency_ms() -> u64 {
    1_000
}

/// Default context window in tokens.
fn default_context_window() -> u64 {
    8_192
}

/// Capability, cost, and latency profile of one registered backend.
///
/// Created at registration time and immutable afterwards, except for the
/// slow adaptive updates applied by
/// [`CapabilityMatrix::record_outcome`](super::CapabilityMatrix::record_outcome).
///
/// Capability and affinity scores are floats in `[0.0, 1.0]`; dimensions
/// are free-form names (`"reasoning"`, `"code"`, `"creativity"`, …) agreed
/// between registrants and callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendProfile {
    /// Backend this profile describes.
    pub id: BackendId,

    /// Named capability dimension → score in `[0.0, 1.0]`.
    #[serde(default)]
    pub capabilities: HashMap<String, f64>,

    /// Domain name → affinity in `[0.0, 1.0]` (e.g. `"medical"` → `0.9`).
    #[serde(default)]
    pub domain_affinity: HashMap<String, f64>,

    /// Task-type tags this backend specialises in.
    #[serde(default)]
    pub specializations: Vec<String>,

    /// Family tag shared by sibling models of one vendor/lineage.
    ///
    /// Consensus selection admits at most one backend per family so that
    /// "independent" votes do not all come from the same model line.
    #[serde(default)]
    pub family: String,

    /// Typical end-to-end latency estimate in milliseconds.
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,

    /// Cost per input token in USD.
    #[serde(default)]
    pub cost_per_input_token: f64,

    /// Cost per output token in USD.
    #[serde(default)]
    pub cost_per_output_token: f64,

    /// Maximum context window in tokens.
    #[serde(default = "default_context_window")]
    pub context_window: u64,
}

impl BackendProfile {
    /// Create a minimal profile with the given id and defaults everywhere
    /// else. Chain the `with_*` builders to fill it in.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: BackendId::new(id),
            capabilities: HashMap::new(),
            domain_affinity: HashMap::new(),
            specializations: Vec::new(),
            family: String::new(),
            latency_ms: default_latency_ms(),
            cost_per_input_token: 0.0,
            cost_per_output_token: 0.0,
            context_window: default_context_window(),
        }
    }

    /// Set one capability dimension score (clamped to `[0.0, 1.0]`).
    pub fn with_capability(mut self, dimension: impl Into<String>, score: f64) -> Self {
        self.capabilities
            .insert(dimension.into(), score.clamp(0.0, 1.0));
        self
    }

    /// Set one domain-affinity score (clamped to `[0.0, 1.0]`).
    pub fn with_affinity(mut self, domain: impl Into<String>, score: f64) -> Self {
        self.domain_affinity
            .insert(domain.into(), score.clamp(0.0, 1.0));
        self
    }

    /// Add a specialization task-type tag.
    pub fn with_specialization(mut self, task_type: impl Into<String>) -> Self {
        self.specializations.push(task_type.into());
        self
    }

    /// Set the family tag.
    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.family = family.into();
        self
    }

    /// Set the latency estimate in milliseconds.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Set per-token costs in USD.
    pub fn with_token_costs(mut self, input: f64, output: f64) -> Self {
        self.cost_per_input_token = input;
        self.cost_per_output_token = output;
        self
    }

    /// Set the context window in tokens.
    pub fn with_context_window(mut self, tokens: u64) -> Self {
        self.context_window = tokens;
        self
    }

    /// Capability score for `dimension`, `0.0` when unscored.
    pub fn capability(&self, dimension: &str) -> f64 {
        self.capabilities.get(dimension).copied().unwrap_or(0.0)
    }

    /// `true` if this backend specialises in `task_type`.
    pub fn specializes_in(&self, task_type: &str) -> bool {
        self.specializations.iter().any(|t| t == task_type)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
