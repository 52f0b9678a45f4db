//! # Stage: Consensus
//!
//! ## Responsibility
//! Select a family-diverse set of backends, fan one question out through
//! the router concurrently, and combine the surviving votes into a single
//! answer with an explicit agreement classification.
//!
//! ## Guarantees
//! - Join barrier: votes are admitted only after every fan-out task has
//!   settled; late calls are cancelled at the deadline, never admitted.
//! - Degraded, never failed: zero votes → `Contradiction` at confidence
//!   0, a lone vote → `Split` at reduced confidence.
//! - Closed method set: each [`ConsensusMethod`] variant maps to one pure
//!   combine function, exhaustiveness-checked.
//! - Pair diagnostics never gate the current call.
//!
//! ## NOT Responsible For
//! - Picking the winner for a single-backend task (the Router)
//! - Invoking backends (the Router's `BackendCall` collaborator)

pub mod engine;
pub mod method;
pub mod metrics;

// Re-exports for convenience
pub use engine::{ConsensusEngine, ConsensusOptions, ConsensusResult};
pub use method::{AgreementLevel, ConsensusMethod, Vote};
pub use metrics::{ConsensusMetrics, DisagreementStats, MetricsSummary};
