//! # Stage: Cost Optimization
//!
//! ## Responsibility
//! Hold per-backend billing profiles and a rolling usage ledger; filter and
//! reorder routing candidates under budget constraints; answer usage
//! statistics queries and emit cost-saving recommendations.
//!
//! ## Guarantees
//! - Hard ceilings: a candidate whose estimated cost would break a
//!   per-request / per-hour / per-day ceiling is silently removed — never
//!   an error. The requester falls through to the routing fallback path.
//! - Lazy windows: hour/day spend counters reset the first time they are
//!   touched after their boundary has passed; no background timer.
//! - Bounded ledger: the usage ledger keeps the last 10 000 records.
//! - Atomic accounting: ledger appends and window bumps happen under one
//!   lock per optimizer — Router and ConsensusEngine paths can share an
//!   instance safely.
//!
//! ## NOT Responsible For
//! - Choosing the winner (the Router blends cost with capability)
//! - Durable persistence of the ledger (external collaborator)

pub mod ledger;
pub mod optimizer;

// Re-exports for convenience
pub use ledger::{UsageRecord, LEDGER_CAPACITY};
pub use optimizer::{
    CostConstraints, CostOptimizer, CostProfile, OptimizationStrategy, UsageStats,
};
