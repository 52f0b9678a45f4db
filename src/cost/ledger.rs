//! Usage ledger and budget windows.
//!
//! Append-only record of billed requests plus rolling hour/day spend
//! counters. Spend is stored as micro-dollars (1 USD = 1 000 000
//! micro-dollars) to avoid floating-point drift in long-running
//! aggregations.

use std::time::{Duration, SystemTime};

use crate::history::History;
use crate::BackendId;

/// Records kept in the ledger before the oldest is evicted.
pub const LEDGER_CAPACITY: usize = 10_000;

const HOUR: Duration = Duration::from_secs(3_600);
const DAY: Duration = Duration::from_secs(86_400);

/// One billed request.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageRecord {
    /// When the request was billed.
    pub timestamp: SystemTime,
    /// Backend that served it.
    pub backend: BackendId,
    /// Input tokens billed.
    pub tokens_in: u64,
    /// Output tokens billed.
    pub tokens_out: u64,
    /// Cost in USD.
    pub cost: f64,
    /// Quality score in `[0.0, 1.0]` reported for the request.
    pub quality: f64,
}

/// Bounded ledger plus lazily-reset hour/day spend windows.
///
/// Not internally synchronised — the optimizer wraps it in a single mutex
/// so appends and window bumps are one atomic read-modify-write.
#[derive(Debug)]
pub(crate) struct UsageLedger {
    records: History<UsageRecord>,
    hour_spend_micro: u64,
    hour_start: SystemTime,
    day_spend_micro: u64,
    day_start: SystemTime,
}

impl UsageLedger {
    /// Create an empty ledger whose windows start at `now`.
    pub(crate) fn new(now: SystemTime) -> Self {
        Self {
            records: History::new(LEDGER_CAPACITY),
            hour_spend_micro: 0,
            hour_start: now,
            day_spend_micro: 0,
            day_start: now,
        }
    }

    /// Reset any window whose boundary has passed.
    ///
    /// Called on every touch, so counters are correct without a timer.
    pub(crate) fn roll_windows(&mut self, now: SystemTime) {
        let since_hour = now.duration_since(self.hour_start).unwrap_or_default();
        if since_hour >= HOUR {
            self.hour_spend_micro = 0;
            self.hour_start = now;
        }
        let since_day = now.duration_since(self.day_start).unwrap_or_default();
        if since_day >= DAY {
            self.day_spend_micro = 0;
            self.day_start = now;
        }
    }

    /// Append a record and bump both spend windows.
    pub(crate) fn record(&mut self, record: UsageRecord, now: SystemTime) {
        self.roll_windows(now);
        let micro = usd_to_micro(record.cost);
        self.hour_spend_micro = self.hour_spend_micro.saturating_add(micro);
        self.day_spend_micro = self.day_spend_micro.saturating_add(micro);
        self.records.push(record);
    }

    /// Spend in the current hour window, USD.
    pub(crate) fn hour_spend_usd(&self) -> f64 {
        micro_to_usd(self.hour_spend_micro)
    }

    /// Spend in the current day window, USD.
    pub(crate) fn day_spend_usd(&self) -> f64 {
        micro_to_usd(self.day_spend_micro)
    }

    /// Records with `timestamp >= cutoff`, oldest first.
    pub(crate) fn records_since(&self, cutoff: SystemTime) -> Vec<UsageRecord> {
        self.records
            .iter()
            .filter(|r| r.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    /// Number of retained records.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}

// ── Helpers ────────────────────────────────────────────────────────────

/// Convert USD to micro-dollars.
fn usd_to_micro(usd: f64) -> u64 {
    (usd.max(0.0) * 1_000_000.0).round() as u64
}

/// Convert micro-dollars to USD.
fn micro_to_usd(micro: u64) -> f64 {
    micro as f64 / 1_000_000.0
}

// ── Tests ──────────────────────────────────────────────────────────────
