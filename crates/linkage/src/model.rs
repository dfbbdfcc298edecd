use std::collections::BTreeMap;

use serde::Serialize;

use crate::blocking::BlockingStats;
use crate::params::ParameterSnapshot;
use crate::em::TrainingReport;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Number(f64),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Render as text; `None` for nulls. Integral numbers print without a fraction.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s.clone()),
            Self::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
                Some(format!("{}", *n as i64))
            }
            Self::Number(n) => Some(n.to_string()),
            Self::Null => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// One row, values positionally aligned with its set's `columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub values: Vec<Value>,
}

/// Rows from one source. Every record shares the set's schema.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSet {
    pub source: String,
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl RecordSet {
    pub fn new(source: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            source: source.into(),
            columns,
            records: Vec::new(),
        }
    }

    /// Append a row. Short rows are padded with nulls, long rows truncated.
    pub fn push(&mut self, values: Vec<Value>) {
        let mut values = values;
        values.resize(self.columns.len(), Value::Null);
        self.records.push(Record { values });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn value(&self, row: usize, column: usize) -> &Value {
        self.records
            .get(row)
            .and_then(|r| r.values.get(column))
            .unwrap_or(&Value::Null)
    }
}

// ---------------------------------------------------------------------------
// Pairs + levels
// ---------------------------------------------------------------------------

/// Row positions into the left and right projected sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CandidatePair {
    pub left: usize,
    pub right: usize,
}

/// Number of levels that carry m/u probabilities (`Null` excluded).
pub const LEVEL_COUNT: usize = 5;

/// Outcome of comparing one column of one pair, most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonLevel {
    Exact,
    FuzzyHigh,
    FuzzyLow,
    EditDistance,
    Else,
    /// Null on either side; carries no evidence.
    Null,
}

impl ComparisonLevel {
    /// Scored levels in parameter-vector order.
    pub const SCORED: [ComparisonLevel; LEVEL_COUNT] = [
        Self::Exact,
        Self::FuzzyHigh,
        Self::FuzzyLow,
        Self::EditDistance,
        Self::Else,
    ];

    /// Index into m/u vectors; `None` for `Null`.
    pub fn index(self) -> Option<usize> {
        match self {
            Self::Exact => Some(0),
            Self::FuzzyHigh => Some(1),
            Self::FuzzyLow => Some(2),
            Self::EditDistance => Some(3),
            Self::Else => Some(4),
            Self::Null => None,
        }
    }
}

impl std::fmt::Display for ComparisonLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::FuzzyHigh => write!(f, "fuzzy_high"),
            Self::FuzzyLow => write!(f, "fuzzy_low"),
            Self::EditDistance => write!(f, "edit_distance"),
            Self::Else => write!(f, "else"),
            Self::Null => write!(f, "null"),
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnContribution {
    pub column: String,
    pub level: ComparisonLevel,
    /// log2 Bayes factor; 0.0 for `Null`.
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub left_id: String,
    pub right_id: String,
    pub match_probability: f64,
    pub match_weight: f64,
    pub contributions: Vec<ColumnContribution>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkSummary {
    pub left_records: usize,
    pub right_records: usize,
    pub comparison_columns: usize,
    pub candidate_pairs: usize,
    pub matches: usize,
    pub match_threshold: f64,
    pub mean_match_probability: Option<f64>,
    /// column -> level -> count, over every candidate pair.
    pub level_counts: BTreeMap<String, BTreeMap<String, usize>>,
    pub blocking: Vec<BlockingStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkMeta {
    pub config_name: String,
    pub left_source: String,
    pub right_source: String,
    pub engine_version: String,
    pub run_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkResult {
    pub meta: LinkMeta,
    pub summary: LinkSummary,
    pub parameters: ParameterSnapshot,
    pub training: Vec<TrainingReport>,
    pub matches: Vec<MatchResult>,
}
