//! Vote combination methods and agreement classification.
//!
//! Everything in this module is pure: one combine function per
//! [`ConsensusMethod`] variant, classification from the vote confidence
//! distribution, and disagreement-point extraction. The engine owns all
//! I/O and concurrency.

use serde::{Deserialize, Serialize};

use crate::routing::Response;
use crate::BackendId;

/// Confidence below which a vote is flagged as uncertain.
const UNCERTAINTY_THRESHOLD: f64 = 0.6;
/// Deviation from the mean above which a vote is flagged as an outlier.
const DEVIATION_THRESHOLD: f64 = 0.3;
/// Agreement bonus cap for [`ConsensusMethod::IterativeRefinement`].
const REFINEMENT_BONUS_CAP: f64 = 0.1;
/// Mean confidence required before the refinement bonus applies.
const REFINEMENT_MEAN_GATE: f64 = 0.7;
/// Characters of supporting content quoted in synthesized answers.
const EXCERPT_CHARS: usize = 120;

/// How the engine combines votes into one result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ConsensusMethod {
    /// The highest-confidence vote speaks for the majority.
    MajorityVote,
    /// Votes weighted by `weight × confidence`, content synthesized
    /// around the strongest vote.
    #[default]
    WeightedConfidence,
    /// The single vote maximizing `weight × confidence` wins outright.
    ExpertOverride,
    /// Every vote contributes equally.
    Democratic,
    /// [`WeightedConfidence`](Self::WeightedConfidence) plus an agreement
    /// bonus when the votes concur.
    IterativeRefinement,
}

/// How closely the votes concur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgreementLevel {
    /// Tight, confident agreement (σ < 0.1, μ > 0.8).
    StrongConsensus,
    /// Solid agreement (σ < 0.2, μ > 0.6).
    Consensus,
    /// More agree than not (μ > 0.5).
    Majority,
    /// Wide spread of opinions (σ > 0.3).
    Split,
    /// No usable agreement.
    Contradiction,
}

impl std::fmt::Display for AgreementLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::StrongConsensus => "strong consensus",
            Self::Consensus => "consensus",
            Self::Majority => "majority",
            Self::Split => "split",
            Self::Contradiction => "contradiction",
        };
        f.write_str(s)
    }
}

/// One backend's contribution to a consensus run.
#[derive(Debug, Clone, PartialEq)]
pub struct Vote {
    /// Backend that produced the response.
    pub backend: BackendId,
    /// The full response.
    pub response: Response,
    /// Vote weight from the capability score for the task.
    pub weight: f64,
    /// Why this backend was asked.
    pub reasoning: String,
}

impl Vote {
    fn confidence(&self) -> f64 {
        self.response.confidence
    }
}

/// Combine `votes` into `(content, confidence)` per `method`.
///
/// Callers guarantee `votes.len() >= 2`; the degraded 0/1-vote paths are
/// handled by the engine before dispatch.
pub(crate) fn combine(method: ConsensusMethod, votes: &[Vote]) -> (String, f64) {
    match method {
        ConsensusMethod::MajorityVote => majority_vote(votes),
        ConsensusMethod::WeightedConfidence => weighted_confidence(votes),
        ConsensusMethod::ExpertOverride => expert_override(votes),
        ConsensusMethod::Democratic => democratic(votes),
        ConsensusMethod::IterativeRefinement => iterative_refinement(votes),
    }
}

// ── Combine functions ──────────────────────────────────────────────────

fn majority_vote(votes: &[Vote]) -> (String, f64) {
    let representative = strongest_by(votes, Vote::confidence);
    let content = format!(
        "{}\n\n[majority view across {} votes]",
        representative.response.content,
        votes.len()
    );
    (content, mean(&confidences(votes)))
}

fn weighted_confidence(votes: &[Vote]) -> (String, f64) {
    let raw: Vec<f64> = votes.iter().map(|v| v.weight * v.confidence()).collect();
    let total: f64 = raw.iter().sum();
    let normalized: Vec<f64> = if total > 0.0 {
        raw.iter().map(|w| w / total).collect()
    } else {
        vec![1.0 / votes.len() as f64; votes.len()]
    };

    let anchor = strongest_by(votes, Vote::confidence);
    let mut content = anchor.response.content.clone();
    let mut supporting: Vec<(&Vote, f64)> = votes
        .iter()
        .zip(normalized.iter().copied())
        .filter(|(v, _)| v.backend != anchor.backend)
        .collect();
    supporting.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.backend.cmp(&b.0.backend)));
    for (vote, w) in supporting {
        let excerpt: String = vote.response.content.chars().take(EXCERPT_CHARS).collect();
        content.push_str(&format!("\n\n[{} weight {w:.2}] {excerpt}", vote.backend));
    }

    let confidence: f64 = votes
        .iter()
        .zip(normalized.iter())
        .map(|(v, w)| v.confidence() * w)
        .sum();
    (content, confidence.clamp(0.0, 1.0))
}

fn expert_override(votes: &[Vote]) -> (String, f64) {
    let expert = strongest_by(votes, |v| v.weight * v.confidence());
    let consulted: Vec<String> = votes
        .iter()
        .filter(|v| v.backend != expert.backend)
        .map(|v| v.backend.to_string())
        .collect();
    let content = format!(
        "{}\n\n[consulted: {}]",
        expert.response.content,
        consulted.join(", ")
    );
    (content, expert.confidence())
}

fn democratic(votes: &[Vote]) -> (String, f64) {
    let content = votes
        .iter()
        .map(|v| v.response.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");
    (content, mean(&confidences(votes)))
}

fn iterative_refinement(votes: &[Vote]) -> (String, f64) {
    let (content, base) = weighted_confidence(votes);
    let cs = confidences(votes);
    let bonus = if mean(&cs) > REFINEMENT_MEAN_GATE {
        (REFINEMENT_BONUS_CAP - stdev(&cs)).max(0.0)
    } else {
        0.0
    };
    (content, (base + bonus).min(1.0))
}

// ── Classification ─────────────────────────────────────────────────────

/// Classify the agreement level from the vote confidence distribution.
pub(crate) fn classify_agreement(confidences: &[f64]) -> AgreementLevel {
    let mu = mean(confidences);
    let sigma = stdev(confidences);
    if sigma < 0.1 && mu > 0.8 {
        AgreementLevel::StrongConsensus
    } else if sigma < 0.2 && mu > 0.6 {
        AgreementLevel::Consensus
    } else if mu > 0.5 {
        AgreementLevel::Majority
    } else if sigma > 0.3 {
        AgreementLevel::Split
    } else {
        AgreementLevel::Contradiction
    }
}

/// Flag uncertain votes and outliers against the mean confidence.
pub(crate) fn disagreement_points(votes: &[Vote]) -> Vec<String> {
    let mu = mean(&confidences(votes));
    let mut points = Vec::new();
    for vote in votes {
        let c = vote.confidence();
        if c < UNCERTAINTY_THRESHOLD {
            points.push(format!("{} expressed uncertainty (confidence {c:.2})", vote.backend));
        }
        if (c - mu).abs() > DEVIATION_THRESHOLD {
            points.push(format!(
                "{} differs significantly from average (confidence {c:.2} vs mean {mu:.2})",
                vote.backend
            ));
        }
    }
    points
}

// ── Helpers ────────────────────────────────────────────────────────────

fn confidences(votes: &[Vote]) -> Vec<f64> {
    votes.iter().map(Vote::confidence).collect()
}

fn strongest_by(votes: &[Vote], key: impl Fn(&Vote) -> f64) -> &Vote {
    // Ties broken by id so results are deterministic.
    let mut best = &votes[0];
    for vote in &votes[1..] {
        let ordering = key(vote)
            .total_cmp(&key(best))
            .then_with(|| best.backend.cmp(&vote.backend));
        if ordering == std::cmp::Ordering::Greater {
            best = vote;
        }
    }
    best
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mu = mean(values);
    let variance = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

// ── Tests ──────────────────────────────────────────────────────────────
