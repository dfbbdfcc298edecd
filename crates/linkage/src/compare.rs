//! Comparison levels.
//!
//! Each (pair, column) resolves to exactly one level, checked most specific
//! first: exact, token-set Jaro-Winkler >= high, >= low, Levenshtein within
//! `max_edits`, else. Null on either side is `Null`.

use std::collections::BTreeSet;

use rayon::prelude::*;
use strsim::{jaro_winkler, levenshtein};

use crate::config::ComparisonKind;
use crate::frame::ComparisonFrame;
use crate::model::{CandidatePair, ComparisonLevel};
use crate::projector::ComparisonColumn;

/// Levels for one pair, one entry per schema column.
pub type ComparisonVector = Vec<ComparisonLevel>;

/// Compare two normalized values under one column's ladder.
pub fn compare_values(
    column: &ComparisonColumn,
    left: Option<&str>,
    right: Option<&str>,
) -> ComparisonLevel {
    let (Some(a), Some(b)) = (left, right) else {
        return ComparisonLevel::Null;
    };
    if a.is_empty() || b.is_empty() {
        return ComparisonLevel::Null;
    }
    if a == b {
        return ComparisonLevel::Exact;
    }
    if column.kind == ComparisonKind::ExactOnly {
        return ComparisonLevel::Else;
    }

    let similarity = token_set_similarity(a, b);
    if similarity >= column.high_similarity {
        return ComparisonLevel::FuzzyHigh;
    }
    if similarity >= column.low_similarity {
        return ComparisonLevel::FuzzyLow;
    }
    if levenshtein(a, b) <= column.max_edits {
        return ComparisonLevel::EditDistance;
    }
    ComparisonLevel::Else
}

/// Jaro-Winkler over the sorted, deduplicated token sets. Inputs are put in
/// canonical order first so the result does not depend on argument order.
pub fn token_set_similarity(a: &str, b: &str) -> f64 {
    let a = token_set(a);
    let b = token_set(b);
    if a == b {
        return 1.0;
    }
    let (first, second) = if a <= b { (&a, &b) } else { (&b, &a) };
    jaro_winkler(first, second)
}

fn token_set(s: &str) -> String {
    let tokens: BTreeSet<&str> = s.split_whitespace().collect();
    tokens.into_iter().collect::<Vec<_>>().join(" ")
}

/// Levels for every column of one pair.
pub fn compare_pair(frame: &ComparisonFrame, pair: CandidatePair) -> ComparisonVector {
    frame
        .schema
        .columns
        .iter()
        .enumerate()
        .map(|(c, column)| {
            compare_values(
                column,
                frame.left_value(c, pair.left),
                frame.right_value(c, pair.right),
            )
        })
        .collect()
}

/// Comparison vectors for every pair, in input order.
pub fn comparison_vectors(
    frame: &ComparisonFrame,
    pairs: &[CandidatePair],
) -> Vec<ComparisonVector> {
    pairs
        .par_iter()
        .map(|&pair| compare_pair(frame, pair))
        .collect()
}
