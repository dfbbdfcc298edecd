use serde::{Deserialize, Serialize};

use crate::error::LinkError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkConfig {
    pub name: String,
    #[serde(default = "default_id_field")]
    pub id_field: String,
    #[serde(default)]
    pub sources: Option<SourcesConfig>,
    #[serde(default)]
    pub projection: Option<ProjectionConfig>,
    #[serde(default)]
    pub comparison: ComparisonDefaults,
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
    /// Empty means "block on every comparison column".
    #[serde(default)]
    pub blocking_keys: Vec<BlockingRule>,
    #[serde(default)]
    pub deterministic_rules: Vec<BlockingRule>,
    #[serde(default = "default_expected_recall")]
    pub expected_recall: f64,
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
    #[serde(default)]
    pub training: TrainingConfig,
}

fn default_id_field() -> String {
    "unique_id".into()
}

fn default_expected_recall() -> f64 {
    1.0
}

fn default_match_threshold() -> f64 {
    0.9
}

// ---------------------------------------------------------------------------
// Sources (CLI only; the engine receives record sets)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourcesConfig {
    pub left: SourceConfig,
    pub right: SourceConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub name: String,
    pub file: String,
}

// ---------------------------------------------------------------------------
// Projection + comparison columns
// ---------------------------------------------------------------------------

/// Hybrid projection: every identity field on the left is compared against
/// every description field on the right.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectionConfig {
    #[serde(default)]
    pub identity_fields: Vec<String>,
    #[serde(default = "default_description_prefix")]
    pub description_prefix: String,
    /// Explicit description fields. Takes precedence over prefix discovery.
    #[serde(default)]
    pub description_fields: Vec<String>,
}

fn default_description_prefix() -> String {
    "desc".into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonKind {
    /// exact / fuzzy-high / fuzzy-low / edit-distance / else
    #[default]
    Ladder,
    /// exact / else
    ExactOnly,
}

impl std::fmt::Display for ComparisonKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ladder => write!(f, "ladder"),
            Self::ExactOnly => write!(f, "exact_only"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComparisonDefaults {
    #[serde(default)]
    pub kind: ComparisonKind,
    #[serde(default = "default_high_similarity")]
    pub high_similarity: f64,
    #[serde(default = "default_low_similarity")]
    pub low_similarity: f64,
    #[serde(default = "default_max_edits")]
    pub max_edits: usize,
    #[serde(default)]
    pub term_frequency: bool,
}

fn default_high_similarity() -> f64 {
    0.9
}

fn default_low_similarity() -> f64 {
    0.8
}

fn default_max_edits() -> usize {
    3
}

impl Default for ComparisonDefaults {
    fn default() -> Self {
        Self {
            kind: ComparisonKind::Ladder,
            high_similarity: default_high_similarity(),
            low_similarity: default_low_similarity(),
            max_edits: default_max_edits(),
            term_frequency: false,
        }
    }
}

/// Per-column entry. When `name` matches a projected hybrid column it only
/// overrides that column's ladder; otherwise `left` and `right` are required
/// and it declares an additional column.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(default)]
    pub left: Option<String>,
    #[serde(default)]
    pub right: Option<String>,
    #[serde(default)]
    pub kind: Option<ComparisonKind>,
    #[serde(default)]
    pub high_similarity: Option<f64>,
    #[serde(default)]
    pub low_similarity: Option<f64>,
    #[serde(default)]
    pub max_edits: Option<usize>,
    #[serde(default)]
    pub term_frequency: Option<bool>,
}

// ---------------------------------------------------------------------------
// Blocking rules
// ---------------------------------------------------------------------------

/// Equi-join on one or more comparison columns. Written in TOML either as a
/// column name or as a list of names (all must be equal).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "RuleRepr")]
pub struct BlockingRule {
    pub columns: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RuleRepr {
    Single(String),
    Composite(Vec<String>),
}

impl From<RuleRepr> for BlockingRule {
    fn from(repr: RuleRepr) -> Self {
        match repr {
            RuleRepr::Single(c) => Self { columns: vec![c] },
            RuleRepr::Composite(columns) => Self { columns },
        }
    }
}

impl BlockingRule {
    pub fn on(column: impl Into<String>) -> Self {
        Self {
            columns: vec![column.into()],
        }
    }

    pub fn on_all<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> String {
        self.columns.join(" & ")
    }
}

impl std::fmt::Display for BlockingRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

// ---------------------------------------------------------------------------
// Training
// ---------------------------------------------------------------------------

/// Which blocking rules feed EM passes. Prediction always uses the full
/// blocking-key union regardless of this choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingPolicy {
    /// Estimate u only; m stays at its seeded values.
    None,
    /// One EM pass per blocking key, in order.
    #[default]
    AllBlockingKeys,
    /// One EM pass per entry in `training.keys`.
    Explicit,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainingConfig {
    #[serde(default)]
    pub policy: TrainingPolicy,
    #[serde(default)]
    pub keys: Vec<BlockingRule>,
    #[serde(default = "default_em_iteration_limit")]
    pub em_iteration_limit: usize,
    #[serde(default = "default_em_tolerance")]
    pub em_tolerance: f64,
    #[serde(default)]
    pub em_time_budget_ms: Option<u64>,
    #[serde(default = "default_max_random_sample_pairs")]
    pub max_random_sample_pairs: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Prior used when no deterministic rules are configured.
    #[serde(default = "default_prior_match_probability")]
    pub prior_match_probability: f64,
}

fn default_em_iteration_limit() -> usize {
    25
}

fn default_em_tolerance() -> f64 {
    1e-4
}

fn default_max_random_sample_pairs() -> usize {
    1_000_000
}

fn default_seed() -> u64 {
    1
}

fn default_prior_match_probability() -> f64 {
    1e-4
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            policy: TrainingPolicy::default(),
            keys: Vec::new(),
            em_iteration_limit: default_em_iteration_limit(),
            em_tolerance: default_em_tolerance(),
            em_time_budget_ms: None,
            max_random_sample_pairs: default_max_random_sample_pairs(),
            seed: default_seed(),
            prior_match_probability: default_prior_match_probability(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl LinkConfig {
    /// Minimal config with every option at its default.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_field: default_id_field(),
            sources: None,
            projection: None,
            comparison: ComparisonDefaults::default(),
            columns: Vec::new(),
            blocking_keys: Vec::new(),
            deterministic_rules: Vec::new(),
            expected_recall: default_expected_recall(),
            match_threshold: default_match_threshold(),
            training: TrainingConfig::default(),
        }
    }

    pub fn from_toml(input: &str) -> Result<Self, LinkError> {
        let config: LinkConfig =
            toml::from_str(input).map_err(|e| LinkError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LinkError> {
        let bad = |msg: String| Err(LinkError::Configuration(msg));

        if self.id_field.trim().is_empty() {
            return bad("id_field must not be empty".into());
        }

        if !(0.0..=1.0).contains(&self.match_threshold) {
            return bad(format!(
                "match_threshold must be in [0, 1], got {}",
                self.match_threshold
            ));
        }

        if !(self.expected_recall > 0.0 && self.expected_recall <= 1.0) {
            return bad(format!(
                "expected_recall must be in (0, 1], got {}",
                self.expected_recall
            ));
        }

        let has_projection = self
            .projection
            .as_ref()
            .is_some_and(|p| !p.identity_fields.is_empty());
        let has_explicit = self
            .columns
            .iter()
            .any(|c| c.left.is_some() && c.right.is_some());
        if !has_projection && !has_explicit {
            return bad(
                "no comparison columns: set projection.identity_fields \
                 or declare [[columns]] with left/right"
                    .into(),
            );
        }

        validate_ladder(
            "comparison",
            self.comparison.high_similarity,
            self.comparison.low_similarity,
        )?;
        for spec in &self.columns {
            if spec.name.trim().is_empty() {
                return bad("[[columns]] entry with empty name".into());
            }
            let high = spec.high_similarity.unwrap_or(self.comparison.high_similarity);
            let low = spec.low_similarity.unwrap_or(self.comparison.low_similarity);
            validate_ladder(&format!("column '{}'", spec.name), high, low)?;
        }

        for (label, rules) in [
            ("blocking_keys", &self.blocking_keys),
            ("deterministic_rules", &self.deterministic_rules),
            ("training.keys", &self.training.keys),
        ] {
            if let Some(rule) = rules.iter().find(|r| r.columns.is_empty()) {
                return bad(format!("{label}: empty rule '{rule}'"));
            }
        }

        let t = &self.training;
        if t.em_iteration_limit == 0 {
            return bad("training.em_iteration_limit must be at least 1".into());
        }
        if !(t.em_tolerance > 0.0 && t.em_tolerance.is_finite()) {
            return bad(format!(
                "training.em_tolerance must be positive, got {}",
                t.em_tolerance
            ));
        }
        if t.max_random_sample_pairs == 0 {
            return bad("training.max_random_sample_pairs must be at least 1".into());
        }
        if !(t.prior_match_probability > 0.0 && t.prior_match_probability < 1.0) {
            return bad(format!(
                "training.prior_match_probability must be in (0, 1), got {}",
                t.prior_match_probability
            ));
        }
        if t.policy == TrainingPolicy::Explicit && t.keys.is_empty() {
            return bad("training.policy = \"explicit\" requires training.keys".into());
        }

        Ok(())
    }

    /// Rules that feed EM passes under the configured policy. `all_columns`
    /// stands in for an empty `blocking_keys`.
    pub fn training_rules(&self, all_columns: &[String]) -> Vec<BlockingRule> {
        match self.training.policy {
            TrainingPolicy::None => Vec::new(),
            TrainingPolicy::AllBlockingKeys => self.effective_blocking_keys(all_columns),
            TrainingPolicy::Explicit => self.training.keys.clone(),
        }
    }

    pub fn effective_blocking_keys(&self, all_columns: &[String]) -> Vec<BlockingRule> {
        if self.blocking_keys.is_empty() {
            all_columns.iter().map(BlockingRule::on).collect()
        } else {
            self.blocking_keys.clone()
        }
    }
}

fn validate_ladder(label: &str, high: f64, low: f64) -> Result<(), LinkError> {
    if !(0.0..=1.0).contains(&high) || !(0.0..=1.0).contains(&low) {
        return Err(LinkError::Configuration(format!(
            "{label}: similarity thresholds must be in [0, 1] (high={high}, low={low})"
        )));
    }
    if low > high {
        return Err(LinkError::Configuration(format!(
            "{label}: low_similarity {low} exceeds high_similarity {high}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
