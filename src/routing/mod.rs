//! # Stage: Request Routing
//!
//! ## Responsibility
//! For one task, combine capability scores, observed performance, and cost
//! pressure into a single blended score per candidate backend, pick the
//! winner, invoke it, and record the outcome.
//!
//! ## Guarantees
//! - Total: `route()` always returns a typed `(RoutingDecision, Response)`
//!   pair. Backend failures become a zero-confidence response with the
//!   error in metadata; an empty candidate set selects the configured
//!   fallback backend at confidence 0.3. Neither path raises.
//! - Closed selection: the selected backend id is always either a
//!   registered id or the configured fallback id.
//! - Thread-safe: per-backend running averages live in `DashMap` entries,
//!   the decision history behind a single mutex — no lost updates under
//!   concurrent routing.
//!
//! ## NOT Responsible For
//! - Combining several answers (that belongs to `consensus`)
//! - Budget accounting (delegated to `cost`)
//! - Transport (delegated to `backend`)

pub mod config;
pub mod router;

// Re-exports for convenience
pub use config::RouterConfig;
pub use router::{
    PerformanceRequirement, Response, Router, RoutingDecision, RunningStats, TaskRequest,
};
