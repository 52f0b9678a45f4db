//! Consensus diagnostics.
//!
//! Tracks how often backend pairs disagree and aggregates run-level
//! outcomes. Diagnostic only — never consulted when combining votes.

use std::collections::HashMap;

use dashmap::DashMap;
use parking_lot::Mutex;

use super::method::{AgreementLevel, Vote};
use crate::BackendId;

/// Confidence difference above which a pair counts as disagreeing.
const PAIR_DISAGREEMENT_THRESHOLD: f64 = 0.3;

/// Running disagreement statistics for one backend pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisagreementStats {
    /// Times the pair voted in the same run.
    pub comparisons: u64,
    /// Comparisons where the confidence difference exceeded 0.3.
    pub strong_disagreements: u64,
    /// Running average confidence difference.
    pub avg_difference: f64,
}

/// Aggregate view over all recorded consensus runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSummary {
    /// Consensus runs recorded.
    pub runs: u64,
    /// Votes across all runs.
    pub total_votes: u64,
    /// Mean votes per run.
    pub avg_votes_per_run: f64,
    /// Runs per agreement level.
    pub level_counts: HashMap<AgreementLevel, u64>,
    /// Per-pair disagreement stats, keyed by the ordered id pair.
    pub pairs: HashMap<(BackendId, BackendId), DisagreementStats>,
}

#[derive(Debug, Default)]
struct RunTotals {
    runs: u64,
    total_votes: u64,
    level_counts: HashMap<AgreementLevel, u64>,
}

/// Records pairwise and run-level consensus diagnostics.
///
/// Pair entries live in a `DashMap` (serialized per pair), run totals
/// behind one mutex.
#[derive(Debug, Default)]
pub struct ConsensusMetrics {
    pairs: DashMap<(BackendId, BackendId), DisagreementStats>,
    totals: Mutex<RunTotals>,
}

impl ConsensusMetrics {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed consensus run.
    pub fn record_run(&self, votes: &[Vote], level: AgreementLevel) {
        {
            let mut totals = self.totals.lock();
            totals.runs += 1;
            totals.total_votes += votes.len() as u64;
            *totals.level_counts.entry(level).or_insert(0) += 1;
        }

        for (i, a) in votes.iter().enumerate() {
            for b in &votes[i + 1..] {
                let difference = (a.response.confidence - b.response.confidence).abs();
                let key = ordered_pair(&a.backend, &b.backend);
                let mut entry = self.pairs.entry(key).or_default();
                entry.comparisons += 1;
                if difference > PAIR_DISAGREEMENT_THRESHOLD {
                    entry.strong_disagreements += 1;
                }
                let n = entry.comparisons as f64;
                entry.avg_difference += (difference - entry.avg_difference) / n;
            }
        }
    }

    /// Snapshot of all recorded diagnostics.
    pub fn summary(&self) -> MetricsSummary {
        let totals = self.totals.lock();
        let avg_votes_per_run = if totals.runs > 0 {
            totals.total_votes as f64 / totals.runs as f64
        } else {
            0.0
        };
        MetricsSummary {
            runs: totals.runs,
            total_votes: totals.total_votes,
            avg_votes_per_run,
            level_counts: totals.level_counts.clone(),
            pairs: self
                .pairs
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
        }
    }
}

/// Order a pair so `(a, b)` and `(b, a)` share one entry.
fn ordered_pair(a: &BackendId, b: &BackendId) -> (BackendId, BackendId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
