//! One-shot estimates: u from random unlinked pairs, the match prior (and an
//! m seed) from deterministic rules.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::blocking::pairs_for_rule;
use crate::compare::{comparison_vectors, ComparisonVector};
use crate::config::BlockingRule;
use crate::diagnostics::{Diagnostics, Stage};
use crate::error::LinkError;
use crate::frame::ComparisonFrame;
use crate::model::{CandidatePair, LEVEL_COUNT};
use crate::params::{clamp_probability, normalize_levels, LevelVector, ModelParameters};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UEstimate {
    pub sampled_pairs: usize,
    pub exhaustive: bool,
    /// Columns with no non-null comparison in the sample; u left unchanged.
    pub columns_without_evidence: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriorEstimate {
    pub rule_pairs: usize,
    pub expected_recall: f64,
    pub prior: f64,
}

/// Estimate u from pairs drawn independently from each side (not from the
/// candidate set). Uses the full cross product when it fits in `max_pairs`.
pub fn estimate_u(
    frame: &ComparisonFrame,
    params: &mut ModelParameters,
    max_pairs: usize,
    seed: u64,
    diagnostics: &dyn Diagnostics,
) -> Result<UEstimate, LinkError> {
    let (n_left, n_right) = (frame.left_len(), frame.right_len());
    if n_left == 0 || n_right == 0 {
        return Err(LinkError::training(
            "estimate_u",
            format!("cannot sample pairs from {n_left} x {n_right} records"),
        ));
    }

    let total = n_left.saturating_mul(n_right);
    let exhaustive = total <= max_pairs;
    let pairs: Vec<CandidatePair> = if exhaustive {
        (0..n_left)
            .flat_map(|left| (0..n_right).map(move |right| CandidatePair { left, right }))
            .collect()
    } else {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..max_pairs)
            .map(|_| CandidatePair {
                left: rng.gen_range(0..n_left),
                right: rng.gen_range(0..n_right),
            })
            .collect()
    };

    let vectors = comparison_vectors(frame, &pairs);
    let masses = level_counts(&vectors, frame.column_count());

    let mut columns_without_evidence = Vec::new();
    for (column, mass) in params.columns.iter_mut().zip(&masses) {
        match normalize_levels(mass) {
            Some(u) => column.u = u,
            None => {
                diagnostics.warn(
                    Stage::Estimation,
                    &format!(
                        "column '{}': no non-null comparisons among sampled pairs; u unchanged",
                        column.name
                    ),
                );
                columns_without_evidence.push(column.name.clone());
            }
        }
    }
    params.u_estimated = true;

    diagnostics.info(
        Stage::Estimation,
        &format!(
            "estimated u from {} {} pairs",
            pairs.len(),
            if exhaustive { "exhaustive" } else { "sampled" }
        ),
    );

    Ok(UEstimate {
        sampled_pairs: pairs.len(),
        exhaustive,
        columns_without_evidence,
    })
}

/// Prior = pairs matching any deterministic rule, scaled up by
/// `expected_recall`, over every possible pair. The rule pairs are presumed
/// matches, so their level frequencies also seed m.
pub fn estimate_prior(
    frame: &ComparisonFrame,
    rules: &[BlockingRule],
    expected_recall: f64,
    params: &mut ModelParameters,
    diagnostics: &dyn Diagnostics,
) -> Result<PriorEstimate, LinkError> {
    let pass = "deterministic_rules";
    if rules.is_empty() {
        return Err(LinkError::training(pass, "no deterministic rules given"));
    }
    if !(expected_recall > 0.0 && expected_recall <= 1.0) {
        return Err(LinkError::Configuration(format!(
            "expected_recall must be in (0, 1], got {expected_recall}"
        )));
    }

    let mut union = BTreeSet::new();
    for rule in rules {
        union.extend(pairs_for_rule(frame, rule)?);
    }
    if union.is_empty() {
        let names: Vec<String> = rules.iter().map(BlockingRule::name).collect();
        return Err(LinkError::training(
            pass,
            format!("no pair satisfies any of [{}]", names.join(", ")),
        ));
    }

    let total = (frame.left_len() as f64) * (frame.right_len() as f64);
    let prior = clamp_probability(union.len() as f64 / expected_recall / total);
    params.prior = prior;

    let pairs: Vec<CandidatePair> = union.into_iter().collect();
    let vectors = comparison_vectors(frame, &pairs);
    let masses = level_counts(&vectors, frame.column_count());
    for (column, mass) in params.columns.iter_mut().zip(&masses) {
        if let Some(m) = normalize_levels(mass) {
            column.m = m;
        }
    }

    diagnostics.info(
        Stage::Estimation,
        &format!(
            "{} pairs satisfy deterministic rules; prior match probability {prior:.3e}",
            pairs.len()
        ),
    );

    Ok(PriorEstimate {
        rule_pairs: pairs.len(),
        expected_recall,
        prior,
    })
}

/// Per-column counts of each scored level. `Null` is not counted.
pub(crate) fn level_counts(vectors: &[ComparisonVector], columns: usize) -> Vec<LevelVector> {
    let mut counts = vec![[0.0; LEVEL_COUNT]; columns];
    for vector in vectors {
        for (c, level) in vector.iter().enumerate() {
            if let Some(i) = level.index() {
                counts[c][i] += 1.0;
            }
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnSpec, LinkConfig};
    use crate::diagnostics::{MemoryDiagnostics, NullDiagnostics};
    use crate::model::{RecordSet, Value};
    use crate::params::PROB_FLOOR;
    use crate::projector::{project, ComparisonSchema};

    fn frame(left: &[(&str, &str)], right: &[(&str, &str)]) -> ComparisonFrame {
        let build = |source: &str, names: [&str; 2], rows: &[(&str, &str)]| {
            let mut set = RecordSet::new(
                source,
                vec![names[0].into(), names[1].into(), "unique_id".into()],
            );
            for (i, (a, b)) in rows.iter().enumerate() {
                let cell = |s: &str| if s.is_empty() { Value::Null } else { Value::from(s) };
                set.push(vec![cell(a), cell(b), Value::Number(i as f64 + 1.0)]);
            }
            set
        };
        let left = build("sba", ["jobid", "clntname"], left);
        let right = build("gl", ["desc1", "desc2"], right);
        let mut config = LinkConfig::new("t");
        for (name, l, r) in [("job", "jobid", "desc1"), ("name", "clntname", "desc2")] {
            config.columns.push(ColumnSpec {
                name: name.into(),
                left: Some(l.into()),
                right: Some(r.into()),
                ..Default::default()
            });
        }
        let schema = ComparisonSchema::resolve(&config, &left, &right).unwrap();
        let (l, r) = project(&schema, &left, &right, "unique_id", &NullDiagnostics).unwrap();
        ComparisonFrame::build(&schema, &l, &r, "unique_id").unwrap()
    }

    fn sample_frame() -> ComparisonFrame {
        frame(
            &[("j1", "acme"), ("j2", "globex"), ("j3", "initech")],
            &[("j1", "acme"), ("j2", "globex inc"), ("x9", "")],
        )
    }

    #[test]
    fn exhaustive_u_estimate() {
        let f = sample_frame();
        let mut params = ModelParameters::new(&f.schema, 1e-4);
        let est = estimate_u(&f, &mut params, 100, 1, &NullDiagnostics).unwrap();
        assert!(est.exhaustive);
        assert_eq!(est.sampled_pairs, 9);
        assert!(params.u_estimated);

        // job column: 2 exact out of 9 comparisons
        let job = params.column("job").unwrap();
        assert!((job.u[0] - 2.0 / 9.0).abs() < 1e-5);
        assert!(params.normalization_error() < 1e-9);
        assert!(job.u.iter().all(|&p| p > 0.0 && p < 1.0));
    }

    #[test]
    fn sampled_u_estimate_is_seeded() {
        let f = sample_frame();
        let mut a = ModelParameters::new(&f.schema, 1e-4);
        let mut b = ModelParameters::new(&f.schema, 1e-4);
        let est = estimate_u(&f, &mut a, 5, 42, &NullDiagnostics).unwrap();
        estimate_u(&f, &mut b, 5, 42, &NullDiagnostics).unwrap();
        assert!(!est.exhaustive);
        assert_eq!(est.sampled_pairs, 5);
        assert_eq!(a, b);
    }

    #[test]
    fn all_null_column_keeps_u_and_warns() {
        let f = frame(&[("j1", "")], &[("j1", "acme")]);
        let mut params = ModelParameters::new(&f.schema, 1e-4);
        let diag = MemoryDiagnostics::new();
        let est = estimate_u(&f, &mut params, 10, 1, &diag).unwrap();
        assert_eq!(est.columns_without_evidence, vec!["name"]);
        assert_eq!(params.column("name").unwrap().u, crate::params::uniform_levels());
        assert_eq!(diag.warnings().len(), 1);
    }

    #[test]
    fn prior_from_rules() {
        let f = sample_frame();
        let mut params = ModelParameters::new(&f.schema, 1e-4);
        let est = estimate_prior(&f, &[BlockingRule::on("job")], 0.5, &mut params, &NullDiagnostics)
            .unwrap();
        assert_eq!(est.rule_pairs, 2);
        // 2 / 0.5 / 9
        assert!((params.prior - 4.0 / 9.0).abs() < 1e-12);
        // both rule pairs are exact on job
        assert!(params.column("job").unwrap().m[0] > 0.99);
    }

    #[test]
    fn prior_without_rule_pairs_fails() {
        let f = frame(&[("j1", "a")], &[("j2", "b")]);
        let mut params = ModelParameters::new(&f.schema, 1e-4);
        let before = params.clone();
        let err = estimate_prior(&f, &[BlockingRule::on("job")], 1.0, &mut params, &NullDiagnostics)
            .unwrap_err();
        assert!(matches!(err, LinkError::Training { .. }));
        assert_eq!(params, before);
    }

    #[test]
    fn prior_never_reaches_one() {
        let f = frame(&[("j1", "a")], &[("j1", "a")]);
        let mut params = ModelParameters::new(&f.schema, 1e-4);
        estimate_prior(&f, &[BlockingRule::on("job")], 1.0, &mut params, &NullDiagnostics)
            .unwrap();
        assert_eq!(params.prior, 1.0 - PROB_FLOOR);
    }
}
