// Property-based tests for comparison, blocking, training and scoring.
// CI: 128 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use proptest::prelude::*;
use reclink_linkage::blocking::generate_candidates;
use reclink_linkage::compare::{compare_values, comparison_vectors};
use reclink_linkage::config::{BlockingRule, ColumnSpec, ComparisonKind, LinkConfig};
use reclink_linkage::diagnostics::NullDiagnostics;
use reclink_linkage::em::{train_em, EmSettings};
use reclink_linkage::estimate::estimate_u;
use reclink_linkage::frame::ComparisonFrame;
use reclink_linkage::model::{RecordSet, Value};
use reclink_linkage::params::ModelParameters;
use reclink_linkage::projector::{project, ComparisonColumn, ComparisonSchema};
use reclink_linkage::scorer::predict;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config_128() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(128),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Short words from a small alphabet so that exact and fuzzy agreement both
/// happen often.
fn arb_word() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => r"[abc]{1,4}( [abc]{1,3})?",
        1 => r"[a-z]{3,8}",
        1 => Just(String::new()),
    ]
}

fn arb_rows(max: usize) -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec((arb_word(), arb_word()), 1..=max)
}

fn column() -> ComparisonColumn {
    ComparisonColumn {
        name: "c".into(),
        left_field: "a".into(),
        right_field: "b".into(),
        kind: ComparisonKind::Ladder,
        high_similarity: 0.9,
        low_similarity: 0.8,
        max_edits: 3,
        term_frequency: false,
    }
}

fn record_set(source: &str, names: [&str; 2], rows: &[(String, String)]) -> RecordSet {
    let columns = vec![names[0].into(), names[1].into(), "unique_id".into()];
    let mut set = RecordSet::new(source, columns);
    for (i, (a, b)) in rows.iter().enumerate() {
        let cell = |s: &String| {
            if s.is_empty() {
                Value::Null
            } else {
                Value::from(s.as_str())
            }
        };
        set.push(vec![cell(a), cell(b), Value::Number(i as f64 + 1.0)]);
    }
    set
}

fn frame(left: &[(String, String)], right: &[(String, String)]) -> ComparisonFrame {
    let left = record_set("sba", ["jobid", "clntname"], left);
    let right = record_set("gl", ["desc1", "desc2"], right);
    let mut config = LinkConfig::new("prop");
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

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_128())]
    #[test]
    fn comparison_is_symmetric(a in arb_word(), b in arb_word()) {
        let c = column();
        let a = (!a.is_empty()).then_some(a.as_str());
        let b = (!b.is_empty()).then_some(b.as_str());
        prop_assert_eq!(compare_values(&c, a, b), compare_values(&c, b, a));
    }
}

proptest! {
    #![proptest_config(config_128())]
    #[test]
    fn candidates_ignore_rule_order(left in arb_rows(12), right in arb_rows(12)) {
        let f = frame(&left, &right);
        let forward = [BlockingRule::on("job"), BlockingRule::on("name")];
        let backward = [BlockingRule::on("name"), BlockingRule::on("job")];
        let a = generate_candidates(&f, &forward, &NullDiagnostics).unwrap();
        let b = generate_candidates(&f, &backward, &NullDiagnostics).unwrap();
        let again = generate_candidates(&f, &forward, &NullDiagnostics).unwrap();
        prop_assert_eq!(&a.pairs, &b.pairs);
        prop_assert_eq!(&a.pairs, &again.pairs);
        for w in a.pairs.windows(2) {
            prop_assert!(w[0] < w[1]);
        }
    }
}

proptest! {
    #![proptest_config(config_128())]
    #[test]
    fn em_keeps_parameters_valid(left in arb_rows(10), right in arb_rows(10)) {
        let f = frame(&left, &right);
        let mut params = ModelParameters::new(&f.schema, 0.05);
        estimate_u(&f, &mut params, 10_000, 7, &NullDiagnostics).unwrap();
        let before = params.clone();

        let settings = EmSettings::default();
        match train_em(&f, &BlockingRule::on("job"), &mut params, &settings, &NullDiagnostics) {
            Ok(_) => prop_assert_eq!(params.history.len(), 1),
            // no pairs share a job value
            Err(_) => prop_assert_eq!(&params, &before),
        }
        prop_assert!(params.normalization_error() < 1e-9);
        for c in &params.columns {
            prop_assert!(c.m.iter().chain(&c.u).all(|&p| p > 0.0 && p < 1.0));
        }
    }
}

proptest! {
    #![proptest_config(config_128())]
    #[test]
    fn raising_threshold_only_removes_results(
        left in arb_rows(10),
        right in arb_rows(10),
        t1 in 0.0..1.0f64,
        gap in 0.0..1.0f64,
    ) {
        let t2 = (t1 + gap).min(1.0);
        let f = frame(&left, &right);
        let mut params = ModelParameters::new(&f.schema, 0.05);
        estimate_u(&f, &mut params, 10_000, 7, &NullDiagnostics).unwrap();
        let settings = EmSettings::default();
        let _ = train_em(&f, &BlockingRule::on("job"), &mut params, &settings, &NullDiagnostics);

        let rules = [BlockingRule::on("job"), BlockingRule::on("name")];
        let candidates = generate_candidates(&f, &rules, &NullDiagnostics).unwrap();
        let vectors = comparison_vectors(&f, &candidates.pairs);
        let low = predict(&f, &candidates.pairs, &vectors, &params, t1, &NullDiagnostics).unwrap();
        let high = predict(&f, &candidates.pairs, &vectors, &params, t2, &NullDiagnostics).unwrap();
        let all = predict(&f, &candidates.pairs, &vectors, &params, 0.0, &NullDiagnostics).unwrap();

        prop_assert!(high.len() <= low.len());
        prop_assert_eq!(all.len(), candidates.len());
        for r in &high {
            prop_assert!(low.iter().any(|l| l.left_id == r.left_id && l.right_id == r.right_id));
        }
    }
}
