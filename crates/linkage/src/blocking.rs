use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::config::BlockingRule;
use crate::diagnostics::{Diagnostics, Stage};
use crate::error::LinkError;
use crate::frame::ComparisonFrame;
use crate::model::CandidatePair;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockingStats {
    pub rule: String,
    /// Bucket values present on both sides.
    pub shared_buckets: usize,
    /// Pairs this rule produced, before deduplication against other rules.
    pub pairs: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Candidates {
    /// Sorted, deduplicated.
    pub pairs: Vec<CandidatePair>,
    pub stats: Vec<BlockingStats>,
}

impl Candidates {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Union of same-bucket pairs over every rule. Rules referring to unknown
/// columns are skipped; if none is usable the call fails.
pub fn generate_candidates(
    frame: &ComparisonFrame,
    rules: &[BlockingRule],
    diagnostics: &dyn Diagnostics,
) -> Result<Candidates, LinkError> {
    let mut union: BTreeSet<CandidatePair> = BTreeSet::new();
    let mut stats = Vec::with_capacity(rules.len());
    let mut usable = 0usize;

    for rule in rules {
        let Some(columns) = resolve_rule(frame, rule) else {
            diagnostics.warn(
                Stage::Blocking,
                &format!("blocking key '{rule}' names an unknown column; skipped"),
            );
            continue;
        };
        usable += 1;

        let rule_stats = block_on(frame, &columns, rule, &mut union);
        diagnostics.debug(
            Stage::Blocking,
            &format!(
                "'{}': {} shared buckets, {} pairs",
                rule_stats.rule, rule_stats.shared_buckets, rule_stats.pairs
            ),
        );
        stats.push(rule_stats);
    }

    if usable == 0 {
        let names: Vec<String> = rules.iter().map(BlockingRule::name).collect();
        return Err(LinkError::CandidateGeneration(format!(
            "no usable blocking key among [{}]",
            names.join(", ")
        )));
    }

    diagnostics.info(
        Stage::Blocking,
        &format!("{} candidate pairs from {usable} blocking keys", union.len()),
    );

    Ok(Candidates {
        pairs: union.into_iter().collect(),
        stats,
    })
}

/// Pairs satisfying one rule, sorted.
pub fn pairs_for_rule(
    frame: &ComparisonFrame,
    rule: &BlockingRule,
) -> Result<Vec<CandidatePair>, LinkError> {
    let columns = resolve_rule(frame, rule).ok_or_else(|| {
        LinkError::CandidateGeneration(format!("blocking key '{rule}' names an unknown column"))
    })?;
    let mut set = BTreeSet::new();
    block_on(frame, &columns, rule, &mut set);
    Ok(set.into_iter().collect())
}

fn resolve_rule(frame: &ComparisonFrame, rule: &BlockingRule) -> Option<Vec<usize>> {
    if rule.columns.is_empty() {
        return None;
    }
    rule.columns
        .iter()
        .map(|name| frame.schema.index_of(name))
        .collect()
}

/// Key over every rule column, one part per column; `None` if any part is null.
fn bucket_key<'a>(parts: impl Iterator<Item = Option<&'a str>>) -> Option<Vec<&'a str>> {
    parts.collect()
}

fn block_on(
    frame: &ComparisonFrame,
    columns: &[usize],
    rule: &BlockingRule,
    out: &mut BTreeSet<CandidatePair>,
) -> BlockingStats {
    let mut left_buckets: HashMap<Vec<&str>, Vec<usize>> = HashMap::new();
    for row in 0..frame.left_len() {
        if let Some(k) = bucket_key(columns.iter().map(|&c| frame.left_value(c, row))) {
            left_buckets.entry(k).or_default().push(row);
        }
    }

    let mut right_buckets: HashMap<Vec<&str>, Vec<usize>> = HashMap::new();
    for row in 0..frame.right_len() {
        if let Some(k) = bucket_key(columns.iter().map(|&c| frame.right_value(c, row))) {
            right_buckets.entry(k).or_default().push(row);
        }
    }

    let mut shared_buckets = 0;
    let mut pairs = 0;
    for (value, left_rows) in &left_buckets {
        let Some(right_rows) = right_buckets.get(value) else {
            continue;
        };
        shared_buckets += 1;
        for &left in left_rows {
            for &right in right_rows {
                out.insert(CandidatePair { left, right });
                pairs += 1;
            }
        }
    }

    BlockingStats {
        rule: rule.name(),
        shared_buckets,
        pairs,
    }
}
