use std::collections::BTreeMap;

use serde::Serialize;

use crate::em::TrainingReport;
use crate::model::{ComparisonLevel, LEVEL_COUNT};
use crate::projector::ComparisonSchema;

/// Probabilities are kept inside [PROB_FLOOR, 1 - PROB_FLOOR] before renormalizing.
pub const PROB_FLOOR: f64 = 1e-6;

pub type LevelVector = [f64; LEVEL_COUNT];

pub fn clamp_probability(p: f64) -> f64 {
    p.clamp(PROB_FLOOR, 1.0 - PROB_FLOOR)
}

/// Turn non-negative level masses into a distribution with every entry in (0, 1).
/// Returns `None` when there is no mass to normalize.
pub fn normalize_levels(mass: &LevelVector) -> Option<LevelVector> {
    let total: f64 = mass.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return None;
    }
    let mut clamped = [0.0; LEVEL_COUNT];
    for (out, &m) in clamped.iter_mut().zip(mass) {
        *out = clamp_probability(m / total);
    }
    let sum: f64 = clamped.iter().sum();
    for p in clamped.iter_mut() {
        *p /= sum;
    }
    Some(clamped)
}

pub fn uniform_levels() -> LevelVector {
    [1.0 / LEVEL_COUNT as f64; LEVEL_COUNT]
}

/// m and u distributions for one comparison column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnParameters {
    pub name: String,
    pub m: LevelVector,
    pub u: LevelVector,
}

impl ColumnParameters {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            m: uniform_levels(),
            u: uniform_levels(),
        }
    }

    /// log2(m / u); 0 for `Null`.
    pub fn log2_bayes_factor(&self, level: ComparisonLevel) -> f64 {
        match level.index() {
            Some(i) => (self.m[i] / self.u[i]).log2(),
            None => 0.0,
        }
    }
}

/// Training accumulator. Owned by the orchestrator and refined in place by
/// each estimation and EM pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParameters {
    /// Probability that two random records (one per side) match.
    pub prior: f64,
    pub columns: Vec<ColumnParameters>,
    pub u_estimated: bool,
    pub history: Vec<TrainingReport>,
}

impl ModelParameters {
    pub fn new(schema: &ComparisonSchema, prior: f64) -> Self {
        Self {
            prior: clamp_probability(prior),
            columns: schema
                .columns
                .iter()
                .map(|c| ColumnParameters::new(c.name.clone()))
                .collect(),
            u_estimated: false,
            history: Vec::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnParameters> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// log2 prior odds.
    pub fn prior_weight(&self) -> f64 {
        (self.prior / (1.0 - self.prior)).log2()
    }

    /// Max |sum - 1| over every m and u vector.
    pub fn normalization_error(&self) -> f64 {
        self.columns
            .iter()
            .flat_map(|c| [c.m.iter().sum::<f64>(), c.u.iter().sum::<f64>()])
            .map(|s| (s - 1.0).abs())
            .fold(0.0, f64::max)
    }

    pub fn snapshot(&self) -> ParameterSnapshot {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let levels = ComparisonLevel::SCORED
                    .iter()
                    .enumerate()
                    .map(|(i, level)| {
                        (
                            level.to_string(),
                            LevelSnapshot {
                                m: c.m[i],
                                u: c.u[i],
                                weight: c.log2_bayes_factor(*level),
                            },
                        )
                    })
                    .collect();
                (c.name.clone(), levels)
            })
            .collect();
        ParameterSnapshot {
            prior: self.prior,
            prior_weight: self.prior_weight(),
            columns,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelSnapshot {
    pub m: f64,
    pub u: f64,
    pub weight: f64,
}

/// Frozen, serializable view of the trained parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSnapshot {
    pub prior: f64,
    pub prior_weight: f64,
    pub columns: BTreeMap<String, BTreeMap<String, LevelSnapshot>>,
}
