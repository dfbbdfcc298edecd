//! Fellegi-Sunter scoring over frozen parameters.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::compare::ComparisonVector;
use crate::diagnostics::{Diagnostics, Stage};
use crate::error::LinkError;
use crate::frame::ComparisonFrame;
use crate::model::{CandidatePair, ColumnContribution, ComparisonLevel, MatchResult};
use crate::params::{clamp_probability, ColumnParameters, ModelParameters};

/// Logistic transform of a log2 weight.
pub fn probability_from_weight(weight: f64) -> f64 {
    // 2^w / (1 + 2^w) without overflowing for large w
    1.0 / (1.0 + (-weight).exp2())
}

/// Weight of one observed level. `Null` is neutral; `Else` can only count
/// against a match.
pub fn level_weight(
    column: &ColumnParameters,
    level: ComparisonLevel,
    term_frequency: Option<f64>,
) -> f64 {
    let Some(i) = level.index() else {
        return 0.0;
    };
    let u = match (level, term_frequency) {
        (ComparisonLevel::Exact, Some(tf)) => clamp_probability(tf),
        _ => column.u[i],
    };
    let weight = (column.m[i] / u).log2();
    if level == ComparisonLevel::Else {
        weight.min(0.0)
    } else {
        weight
    }
}

/// Score every pair and keep those with probability >= `threshold`, sorted by
/// probability descending (ties keep input pair order).
pub fn predict(
    frame: &ComparisonFrame,
    pairs: &[CandidatePair],
    vectors: &[ComparisonVector],
    params: &ModelParameters,
    threshold: f64,
    diagnostics: &dyn Diagnostics,
) -> Result<Vec<MatchResult>, LinkError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(LinkError::Configuration(format!(
            "match threshold must be in [0, 1], got {threshold}"
        )));
    }
    if pairs.len() != vectors.len() {
        return Err(LinkError::Configuration(format!(
            "{} pairs but {} comparison vectors",
            pairs.len(),
            vectors.len()
        )));
    }
    if params.columns.len() != frame.column_count() {
        return Err(LinkError::Configuration(format!(
            "parameters cover {} columns, schema has {}",
            params.columns.len(),
            frame.column_count()
        )));
    }

    let frequencies: Vec<Option<HashMap<String, f64>>> = frame
        .schema
        .columns
        .iter()
        .enumerate()
        .map(|(c, column)| column.term_frequency.then(|| frame.term_frequencies(c)))
        .collect();
    let prior_weight = params.prior_weight();

    let mut results: Vec<MatchResult> = pairs
        .par_iter()
        .zip(vectors.par_iter())
        .filter_map(|(&pair, vector)| {
            let result = score_pair(frame, pair, vector, params, &frequencies, prior_weight);
            (result.match_probability >= threshold).then_some(result)
        })
        .collect();
    results.sort_by(|a, b| b.match_probability.total_cmp(&a.match_probability));

    diagnostics.info(
        Stage::Scoring,
        &format!(
            "{} of {} candidate pairs at or above {threshold}",
            results.len(),
            pairs.len()
        ),
    );
    Ok(results)
}

fn score_pair(
    frame: &ComparisonFrame,
    pair: CandidatePair,
    vector: &ComparisonVector,
    params: &ModelParameters,
    frequencies: &[Option<HashMap<String, f64>>],
    prior_weight: f64,
) -> MatchResult {
    let mut total = prior_weight;
    let contributions = vector
        .iter()
        .enumerate()
        .map(|(c, &level)| {
            let tf = match (&frequencies[c], level) {
                (Some(map), ComparisonLevel::Exact) => frame
                    .left_value(c, pair.left)
                    .and_then(|value| map.get(value).copied()),
                _ => None,
            };
            let weight = level_weight(&params.columns[c], level, tf);
            total += weight;
            ColumnContribution {
                column: params.columns[c].name.clone(),
                level,
                weight,
            }
        })
        .collect();

    MatchResult {
        left_id: frame.left_id(pair.left).to_string(),
        right_id: frame.right_id(pair.right).to_string(),
        match_probability: probability_from_weight(total),
        match_weight: total,
        contributions,
    }
}
