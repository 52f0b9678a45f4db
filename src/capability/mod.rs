//! # Stage: Backend Capability Intelligence
//!
//! ## Responsibility
//! Hold static per-backend capability/cost/latency profiles and score each
//! backend against a task's requirements. The matrix answers one question:
//! "how well suited is backend X to this task?" — as a number in
//! `[0.0, 1.0]`.
//!
//! ## Guarantees
//! - Hard gate: any unmet *required* minimum scores exactly `0.0`,
//!   independent of every other input.
//! - Bounded: scores are clamped to `[0.0, 1.0]`; the adaptive feedback
//!   step is clamped and floored, so profiles can never run away.
//! - Thread-safe: profiles and performance windows live in `DashMap`
//!   entries — per-backend updates are serialized per key.
//!
//! ## NOT Responsible For
//! - Actually invoking backends (that belongs to `routing` / `backend`)
//! - Budget enforcement (that belongs to `cost`)
//! - Combining multiple answers (that belongs to `consensus`)

pub mod matrix;
pub mod performance;
pub mod profile;

// Re-exports for convenience
pub use matrix::{CapabilityBreakdown, CapabilityMatrix, RankedBackend, TaskRequirements};
pub use performance::{OutcomeSample, PerformanceStats};
pub use profile::BackendProfile;
