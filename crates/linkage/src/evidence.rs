use std::collections::BTreeMap;

use crate::blocking::Candidates;
use crate::compare::ComparisonVector;
use crate::frame::ComparisonFrame;
use crate::model::{ComparisonLevel, LinkSummary, MatchResult};

/// Compute summary statistics for one linkage run.
pub fn compute_summary(
    frame: &ComparisonFrame,
    candidates: &Candidates,
    vectors: &[ComparisonVector],
    matches: &[MatchResult],
    match_threshold: f64,
) -> LinkSummary {
    let mut level_counts: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
    for (c, column) in frame.schema.columns.iter().enumerate() {
        let counts = level_counts.entry(column.name.clone()).or_default();
        for vector in vectors {
            let level = vector.get(c).copied().unwrap_or(ComparisonLevel::Null);
            *counts.entry(level.to_string()).or_insert(0) += 1;
        }
    }

    let mean_match_probability = if matches.is_empty() {
        None
    } else {
        Some(matches.iter().map(|m| m.match_probability).sum::<f64>() / matches.len() as f64)
    };

    LinkSummary {
        left_records: frame.left_len(),
        right_records: frame.right_len(),
        comparison_columns: frame.column_count(),
        candidate_pairs: candidates.len(),
        matches: matches.len(),
        match_threshold,
        mean_match_probability,
        level_counts,
        blocking: candidates.stats.clone(),
    }
}
