//! Rolling per-backend outcome windows.
//!
//! Every routed call reports back (success, latency, quality); the tracker
//! keeps a bounded window per backend and computes aggregate stats over it.
//! Windows also drive the conservative adaptive profile updates in
//! [`CapabilityMatrix`](super::CapabilityMatrix): every
//! [`ADAPT_INTERVAL`] outcomes the observed success rate is reported so
//! the matrix can nudge the backend's `reliability` dimension.

use dashmap::DashMap;

use crate::history::History;
use crate::BackendId;

/// Outcomes between adaptive profile updates.
pub const ADAPT_INTERVAL: u32 = 20;

/// One recorded outcome of a routed call.
#[derive(Debug, Clone)]
pub struct OutcomeSample {
    /// Task type the call was routed for.
    pub task_type: String,
    /// Whether the backend produced a usable answer.
    pub success: bool,
    /// Observed end-to-end latency in milliseconds.
    pub latency_ms: u64,
    /// Quality score in `[0.0, 1.0]` (routing uses response confidence).
    pub quality: f64,
}

/// Aggregate statistics over a backend's outcome window.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceStats {
    /// Number of samples in the window (after task-type filtering).
    pub samples: usize,
    /// Fraction of successful outcomes in `[0.0, 1.0]`.
    pub success_rate: f64,
    /// Mean observed latency in milliseconds.
    pub avg_latency_ms: f64,
    /// Mean quality score in `[0.0, 1.0]`.
    pub avg_quality: f64,
}

struct Window {
    samples: History<OutcomeSample>,
    since_adapt: u32,
}

/// Bounded rolling outcome windows, one per backend.
///
/// Thread-safe: each backend's window lives in its own `DashMap` entry, so
/// concurrent updates for different backends never contend and updates for
/// the same backend are serialized.
pub struct PerformanceTracker {
    windows: DashMap<BackendId, Window>,
    capacity: usize,
}

impl PerformanceTracker {
    /// Create a tracker whose per-backend windows keep `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            windows: DashMap::new(),
            capacity,
        }
    }

    /// Record one outcome for `backend`.
    ///
    /// Returns `Some(success_rate)` when [`ADAPT_INTERVAL`] outcomes have
    /// accumulated since the last adaptive step — the caller applies the
    /// profile nudge; the counter resets here.
    pub fn record(&self, backend: &BackendId, sample: OutcomeSample) -> Option<f64> {
        let mut window = self.windows.entry(backend.clone()).or_insert_with(|| Window {
            samples: History::new(self.capacity),
            since_adapt: 0,
        });

        window.samples.push(sample);
        window.since_adapt += 1;

        if window.since_adapt >= ADAPT_INTERVAL {
            window.since_adapt = 0;
            let total = window.samples.len();
            let successes = window.samples.iter().filter(|s| s.success).count();
            if total > 0 {
                return Some(successes as f64 / total as f64);
            }
        }
        None
    }

    /// Aggregate stats for `backend`, optionally filtered to one task type.
    ///
    /// Returns `None` when the backend has no samples (or none matching
    /// the filter).
    pub fn stats(&self, backend: &BackendId, task_type: Option<&str>) -> Option<PerformanceStats> {
        let window = self.windows.get(backend)?;

        let mut samples = 0_usize;
        let mut successes = 0_usize;
        let mut latency_sum = 0.0_f64;
        let mut quality_sum = 0.0_f64;

        for s in window.samples.iter() {
            if let Some(wanted) = task_type {
                if s.task_type != wanted {
                    continue;
                }
            }
            samples += 1;
            if s.success {
                successes += 1;
            }
            latency_sum += s.latency_ms as f64;
            quality_sum += s.quality;
        }

        if samples == 0 {
            return None;
        }

        Some(PerformanceStats {
            samples,
            success_rate: successes as f64 / samples as f64,
            avg_latency_ms: latency_sum / samples as f64,
            avg_quality: quality_sum / samples as f64,
        })
    }

    /// Backends with at least one recorded sample.
    pub fn backends(&self) -> Vec<BackendId> {
        self.windows.iter().map(|e| e.key().clone()).collect()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
