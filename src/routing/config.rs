//! Routing configuration types.
//!
//! Provides [`RouterConfig`] for tuning the fallback backend, per-task-type
//! capability weight tables, token estimation, and budget constraints. All
//! fields have sensible defaults and are (de)serialisable via serde for
//! TOML/JSON config files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::capability::TaskRequirements;
use crate::cost::CostConstraints;
use crate::BackendId;

// ── Default value functions ────────────────────────────────────────────

/// Default backend selected when no candidate scores above zero.
fn default_fallback_backend() -> BackendId {
    BackendId::new("fallback")
}

/// Default characters-per-token heuristic for cost prediction.
fn default_chars_per_token() -> usize {
    4
}

/// Default estimated output tokens as a fraction of input tokens.
fn default_output_ratio() -> f64 {
    0.5
}

/// Default reference cost (USD) used to scale the cost score when a
/// request states no `max_cost`.
fn default_cost_reference() -> f64 {
    0.05
}

/// Default bound on the retained routing-decision history.
fn default_history_capacity() -> usize {
    1_000
}

/// Default per-task-type capability weight table.
///
/// Task types not in the table fall back to [`uniform_weights`].
fn default_task_weights() -> HashMap<String, HashMap<String, f64>> {
    let mut table = HashMap::new();
    table.insert(
        "code".to_string(),
        HashMap::from([
            ("code".to_string(), 0.9),
            ("reasoning".to_string(), 0.7),
        ]),
    );
    table.insert(
        "analysis".to_string(),
        HashMap::from([
            ("reasoning".to_string(), 0.9),
            ("knowledge".to_string(), 0.7),
        ]),
    );
    table.insert(
        "creative".to_string(),
        HashMap::from([
            ("creativity".to_string(), 0.9),
            ("reasoning".to_string(), 0.5),
        ]),
    );
    table.insert(
        "summarize".to_string(),
        HashMap::from([
            ("knowledge".to_string(), 0.6),
            ("reasoning".to_string(), 0.6),
        ]),
    );
    table
}

/// Uniform weight vector applied to unknown task types.
fn uniform_weights() -> HashMap<String, f64> {
    HashMap::from([
        ("reasoning".to_string(), 0.5),
        ("knowledge".to_string(), 0.5),
        ("creativity".to_string(), 0.5),
        ("code".to_string(), 0.5),
    ])
}

// ── RouterConfig ───────────────────────────────────────────────────────

/// Configuration for the routing layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouterConfig {
    /// Backend selected when no candidate scores above zero.
    ///
    /// Must itself be registered; [`validate`] only checks the id is
    /// non-empty, the Router checks registration at construction.
    #[serde(default = "default_fallback_backend")]
    pub fallback_backend: BackendId,

    /// Task type → capability dimension → preferred target.
    ///
    /// Feeds [`TaskRequirements::preferred`]; unknown task types get a
    /// uniform vector.
    #[serde(default = "default_task_weights")]
    pub task_weights: HashMap<String, HashMap<String, f64>>,

    /// Characters per token for predicted-cost estimation.
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,

    /// Estimated output tokens as a fraction of input tokens.
    #[serde(default = "default_output_ratio")]
    pub output_ratio: f64,

    /// Reference cost (USD) scaling the cost score when a request states
    /// no `max_cost`.
    #[serde(default = "default_cost_reference")]
    pub cost_reference: f64,

    /// Bound on the retained routing-decision history.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Budget ceilings enforced (hard) against every candidate.
    #[serde(default)]
    pub constraints: CostConstraints,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            fallback_backend: default_fallback_backend(),
            task_weights: default_task_weights(),
            chars_per_token: default_chars_per_token(),
            output_ratio: default_output_ratio(),
            cost_reference: default_cost_reference(),
            history_capacity: default_history_capacity(),
            constraints: CostConstraints::default(),
        }
    }
}

impl RouterConfig {
    /// Build the [`TaskRequirements`] the capability matrix scores against
    /// for `task_type` — the configured weight vector, or the uniform
    /// default for unknown types.
    pub fn requirements_for(&self, task_type: &str) -> TaskRequirements {
        let preferred = self
            .task_weights
            .get(task_type)
            .cloned()
            .unwrap_or_else(uniform_weights);
        TaskRequirements {
            task_type: task_type.to_string(),
            preferred,
            ..TaskRequirements::default()
        }
    }
}

/// Validate a [`RouterConfig`], returning a list of human-readable errors.
///
/// # Arguments
///
/// * `config` — The routing configuration to validate.
///
/// # Returns
///
/// An empty `Vec` on success, or one error string per violated constraint.
///
/// # Panics
///
/// This function never panics.
pub fn validate(config: &RouterConfig) -> Vec<String> {
    let mut errors = Vec::new();

    if config.fallback_backend.as_str().is_empty() {
        errors.push("fallback_backend must not be empty".to_string());
    }

    if config.chars_per_token == 0 {
        errors.push("chars_per_token must be >= 1".to_string());
    }

    if config.output_ratio < 0.0 {
        errors.push(format!(
            "output_ratio must be >= 0, got {}",
            config.output_ratio
        ));
    }

    if config.cost_reference <= 0.0 {
        errors.push(format!(
            "cost_reference must be > 0, got {}",
            config.cost_reference
        ));
    }

    for (task_type, weights) in &config.task_weights {
        for (dimension, target) in weights {
            if !(0.0..=1.0).contains(target) {
                errors.push(format!(
                    "task_weights[{task_type}][{dimension}] must be in [0.0, 1.0], got {target}"
                ));
            }
        }
    }

    errors
}

// ── Tests ──────────────────────────────────────────────────────────────
