//! Expectation-Maximization over one blocking rule's candidate pairs.
//!
//! u is fixed (estimated once from random pairs); only m and the pass-local
//! match proportion are re-estimated. Columns that make up the training rule
//! are held fixed for that pass since blocking forces them to agree.

use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;

use crate::blocking::pairs_for_rule;
use crate::compare::{comparison_vectors, ComparisonVector};
use crate::config::{BlockingRule, TrainingConfig};
use crate::diagnostics::{Diagnostics, Stage};
use crate::error::LinkError;
use crate::frame::ComparisonFrame;
use crate::model::LEVEL_COUNT;
use crate::params::{clamp_probability, normalize_levels, LevelVector, ModelParameters};

/// Pairs per partial sum in the M-step.
const CHUNK_SIZE: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmSettings {
    pub iteration_limit: usize,
    pub tolerance: f64,
    pub time_budget: Option<Duration>,
}

impl EmSettings {
    pub fn from_config(training: &TrainingConfig) -> Self {
        Self {
            iteration_limit: training.em_iteration_limit,
            tolerance: training.em_tolerance,
            time_budget: training.em_time_budget_ms.map(Duration::from_millis),
        }
    }
}

impl Default for EmSettings {
    fn default() -> Self {
        Self::from_config(&TrainingConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Converged,
    IterationLimit,
    TimeBudget,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Converged => write!(f, "converged"),
            Self::IterationLimit => write!(f, "iteration limit"),
            Self::TimeBudget => write!(f, "time budget"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub rule: String,
    pub candidate_pairs: usize,
    pub fixed_columns: Vec<String>,
    pub iterations: usize,
    /// Largest |delta m| in the last completed iteration.
    pub max_change: f64,
    /// Estimated share of matches among this pass's candidates.
    pub match_proportion: f64,
    pub stop_reason: StopReason,
}

/// Run one EM pass and fold the refined m-probabilities into `params`.
///
/// On error `params` is left exactly as it was.
pub fn train_em(
    frame: &ComparisonFrame,
    rule: &BlockingRule,
    params: &mut ModelParameters,
    settings: &EmSettings,
    diagnostics: &dyn Diagnostics,
) -> Result<TrainingReport, LinkError> {
    let pass = rule.name();
    let pairs = pairs_for_rule(frame, rule)?;
    if pairs.is_empty() {
        return Err(LinkError::training(&pass, "blocking rule yields no candidate pairs"));
    }
    if params.columns.len() != frame.column_count() {
        return Err(LinkError::training(
            &pass,
            format!(
                "parameters cover {} columns, schema has {}",
                params.columns.len(),
                frame.column_count()
            ),
        ));
    }

    let active: Vec<bool> = frame
        .schema
        .columns
        .iter()
        .map(|c| !rule.columns.contains(&c.name))
        .collect();
    if !active.iter().any(|&a| a) {
        return Err(LinkError::training(
            &pass,
            "every comparison column is part of the blocking rule; nothing to train",
        ));
    }
    let fixed_columns: Vec<String> = frame
        .schema
        .columns
        .iter()
        .zip(&active)
        .filter(|(_, &a)| !a)
        .map(|(c, _)| c.name.clone())
        .collect();

    let vectors = comparison_vectors(frame, &pairs);

    let mut m: Vec<LevelVector> = params.columns.iter().map(|c| c.m).collect();
    let u: Vec<LevelVector> = params.columns.iter().map(|c| c.u).collect();

    let total_pairs = (frame.left_len() as f64) * (frame.right_len() as f64);
    let mut lambda = clamp_probability(params.prior * total_pairs / pairs.len() as f64);

    let started = Instant::now();
    let mut iterations = 0;
    let mut max_change = f64::INFINITY;
    let mut stop_reason = StopReason::IterationLimit;

    while iterations < settings.iteration_limit {
        if settings.time_budget.is_some_and(|budget| started.elapsed() >= budget) {
            stop_reason = StopReason::TimeBudget;
            break;
        }

        // E-step
        let posteriors: Vec<f64> = vectors
            .par_iter()
            .map(|v| posterior(v, &m, &u, &active, lambda))
            .collect();
        if posteriors.iter().any(|p| !p.is_finite()) {
            return Err(LinkError::training(
                &pass,
                format!("non-finite posterior at iteration {}", iterations + 1),
            ));
        }

        // M-step
        let mass = weighted_level_mass(&vectors, &posteriors, m.len());
        let mut change: f64 = 0.0;
        for (c, column_mass) in mass.iter().enumerate() {
            if !active[c] {
                continue;
            }
            let Some(updated) = normalize_levels(column_mass) else {
                // no non-null comparisons for this column in the pass
                continue;
            };
            for (old, new) in m[c].iter().zip(&updated) {
                change = change.max((old - new).abs());
            }
            m[c] = updated;
        }
        let posterior_sum: f64 = posteriors.iter().sum();
        lambda = clamp_probability(posterior_sum / posteriors.len() as f64);

        iterations += 1;
        max_change = change;
        diagnostics.debug(
            Stage::Training,
            &format!(
                "'{pass}' iteration {iterations}: max change {change:.3e}, lambda {lambda:.4}"
            ),
        );

        if change < settings.tolerance {
            stop_reason = StopReason::Converged;
            break;
        }
    }

    for ((column, trained), &is_active) in params.columns.iter_mut().zip(&m).zip(&active) {
        if is_active {
            column.m = *trained;
        }
    }

    let report = TrainingReport {
        rule: pass.clone(),
        candidate_pairs: pairs.len(),
        fixed_columns,
        iterations,
        max_change,
        match_proportion: lambda,
        stop_reason,
    };
    diagnostics.info(
        Stage::Training,
        &format!(
            "'{pass}': {} pairs, {iterations} iterations, stopped on {stop_reason}",
            pairs.len()
        ),
    );
    params.history.push(report.clone());
    Ok(report)
}

/// P(match | levels) under the current parameters, computed in log space.
fn posterior(
    vector: &ComparisonVector,
    m: &[LevelVector],
    u: &[LevelVector],
    active: &[bool],
    lambda: f64,
) -> f64 {
    let mut log_match = lambda.ln();
    let mut log_non_match = (1.0 - lambda).ln();
    for (c, level) in vector.iter().enumerate() {
        if !active[c] {
            continue;
        }
        if let Some(i) = level.index() {
            log_match += m[c][i].ln();
            log_non_match += u[c][i].ln();
        }
    }
    1.0 / (1.0 + (log_non_match - log_match).exp())
}

/// Posterior-weighted level mass per column. Partial sums per fixed-size
/// chunk run in parallel; the merge walks chunks in order so the floating
/// point result is identical across runs.
fn weighted_level_mass(
    vectors: &[ComparisonVector],
    posteriors: &[f64],
    columns: usize,
) -> Vec<LevelVector> {
    let partials: Vec<Vec<LevelVector>> = vectors
        .par_chunks(CHUNK_SIZE)
        .zip(posteriors.par_chunks(CHUNK_SIZE))
        .map(|(chunk, weights)| {
            let mut mass = vec![[0.0; LEVEL_COUNT]; columns];
            for (vector, &w) in chunk.iter().zip(weights) {
                for (c, level) in vector.iter().enumerate() {
                    if let Some(i) = level.index() {
                        mass[c][i] += w;
                    }
                }
            }
            mass
        })
        .collect();

    let mut total = vec![[0.0; LEVEL_COUNT]; columns];
    for partial in &partials {
        for (acc, part) in total.iter_mut().zip(partial) {
            for (a, p) in acc.iter_mut().zip(part) {
                *a += p;
            }
        }
    }
    total
}
