//! # tokio-backend-hub
//!
//! A single-process hub that brokers calls to multiple remote model-serving
//! backends over Tokio.
//!
//! ## Architecture
//!
//! Four cooperating components:
//! ```text
//! caller → Router ── CapabilityMatrix (score candidates)
//!                 ── CostOptimizer    (budget filter / reorder)
//!                 ── BackendCall      (invoke the winner)
//!
//! caller → ConsensusEngine → N × Router (concurrent fan-out)
//!                          → combine votes → ConsensusResult
//! ```
//!
//! Routing and consensus failures are encoded in the returned result
//! (confidence 0, error text in metadata, degraded agreement level) —
//! they never surface as `Err` to the caller.

// ── Lint policy (aerospace-grade) ─────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(missing_docs)]

use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub mod backend;
pub mod capability;
pub mod clock;
pub mod consensus;
pub mod cost;
pub mod history;
pub mod hub;
pub mod routing;

// Re-exports for convenience
pub use backend::{BackendCall, BackendReply, EchoBackend, ScriptedBackend};
pub use capability::{BackendProfile, CapabilityMatrix, TaskRequirements};
pub use clock::{Clock, ManualClock, SystemClock};
pub use consensus::{
    AgreementLevel, ConsensusEngine, ConsensusMethod, ConsensusOptions, ConsensusResult, Vote,
};
pub use cost::{CostConstraints, CostOptimizer, CostProfile, OptimizationStrategy, UsageStats};
pub use hub::{HubConfig, OrchestrationHub};
pub use routing::{
    PerformanceRequirement, Response, Router, RouterConfig, RoutingDecision, TaskRequest,
};

/// Initialise the global tracing subscriber.
///
/// Reads the `LOG_FORMAT` environment variable to choose output format:
/// - `"json"` — structured JSON output for production log aggregators
/// - anything else (including unset) — human-readable pretty output
///
/// Filter level is controlled by `RUST_LOG` (e.g. `RUST_LOG=info`).
///
/// # Errors
///
/// Returns [`HubError::Other`] if the global subscriber has already been
/// set (e.g. by a previous call or a test harness).
///
/// # Panics
///
/// This function never panics.
pub fn init_tracing() -> Result<(), HubError> {
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let result = match format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_current_span(true)
            .with_span_list(true)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init(),
    };

    result.map_err(|e| HubError::Other(format!("tracing init failed: {e}")))
}

/// Top-level hub errors.
///
/// Routing and consensus never return these to callers — degraded results
/// carry the failure instead. `HubError` is reserved for construction-time
/// misconfiguration and the internals of backend adapters.
#[derive(Error, Debug)]
pub enum HubError {
    /// A backend invocation failed (network, API, or parsing error).
    #[error("backend call failed: {0}")]
    Backend(String),

    /// A configuration value is missing or invalid.
    ///
    /// Returned at construction time so that misconfiguration surfaces
    /// immediately rather than at the first routed request.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Catch-all for errors that do not fit a specific variant.
    #[error("{0}")]
    Other(String),
}

/// Unique identifier for a registered backend.
///
/// Backends are external model-serving endpoints; the id is the key used
/// across the capability matrix, the cost optimizer, and routing results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendId(
    /// The raw string id, e.g. `"claude-opus"` or `"local-llama"`.
    pub String,
);

impl BackendId {
    /// Create a new [`BackendId`] from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the backend id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BackendId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl serde::Serialize for BackendId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for BackendId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self)
    }
}
