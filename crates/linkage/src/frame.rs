use std::collections::HashMap;

use crate::error::LinkError;
use crate::model::RecordSet;
use crate::projector::ComparisonSchema;

/// Trim, lowercase, collapse internal whitespace. Empty -> `None`.
pub fn normalize_value(raw: &str) -> Option<String> {
    let joined = raw
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// Normalized, column-major view of the two projected sets. Read-only once
/// built; shared by blocking, comparison, estimation and scoring.
#[derive(Debug, Clone)]
pub struct ComparisonFrame {
    pub schema: ComparisonSchema,
    left_ids: Vec<String>,
    right_ids: Vec<String>,
    /// [column][row]
    left: Vec<Vec<Option<String>>>,
    right: Vec<Vec<Option<String>>>,
}

impl ComparisonFrame {
    pub fn build(
        schema: &ComparisonSchema,
        left: &RecordSet,
        right: &RecordSet,
        id_field: &str,
    ) -> Result<Self, LinkError> {
        if left.columns != right.columns {
            return Err(LinkError::schema(
                &right.source,
                format!(
                    "projected columns differ from '{}' ({} columns here, {} there)",
                    left.source,
                    right.columns.len(),
                    left.columns.len()
                ),
            ));
        }
        let (left_ids, left_cols) = extract(schema, left, id_field)?;
        let (right_ids, right_cols) = extract(schema, right, id_field)?;
        Ok(Self {
            schema: schema.clone(),
            left_ids,
            right_ids,
            left: left_cols,
            right: right_cols,
        })
    }

    pub fn left_len(&self) -> usize {
        self.left_ids.len()
    }

    pub fn right_len(&self) -> usize {
        self.right_ids.len()
    }

    pub fn column_count(&self) -> usize {
        self.schema.len()
    }

    pub fn left_id(&self, row: usize) -> &str {
        self.left_ids.get(row).map(String::as_str).unwrap_or("")
    }

    pub fn right_id(&self, row: usize) -> &str {
        self.right_ids.get(row).map(String::as_str).unwrap_or("")
    }

    pub fn left_value(&self, column: usize, row: usize) -> Option<&str> {
        self.left.get(column)?.get(row)?.as_deref()
    }

    pub fn right_value(&self, column: usize, row: usize) -> Option<&str> {
        self.right.get(column)?.get(row)?.as_deref()
    }

    /// Relative frequency of each value in a column over both sides, non-null only.
    pub fn term_frequencies(&self, column: usize) -> HashMap<String, f64> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut total = 0usize;
        let cells = self
            .left
            .get(column)
            .into_iter()
            .chain(self.right.get(column))
            .flatten()
            .flatten();
        for value in cells {
            *counts.entry(value.clone()).or_insert(0) += 1;
            total += 1;
        }
        counts
            .into_iter()
            .map(|(k, n)| (k, n as f64 / total as f64))
            .collect()
    }
}

#[allow(clippy::type_complexity)]
fn extract(
    schema: &ComparisonSchema,
    set: &RecordSet,
    id_field: &str,
) -> Result<(Vec<String>, Vec<Vec<Option<String>>>), LinkError> {
    let id_idx = set.column_index(id_field).ok_or_else(|| {
        LinkError::schema(&set.source, format!("missing identifier field '{id_field}'"))
    })?;
    let ids = (0..set.len())
        .map(|row| set.value(row, id_idx).as_text().unwrap_or_default())
        .collect();

    let mut columns = Vec::with_capacity(schema.len());
    for c in &schema.columns {
        let idx = set.column_index(&c.name).ok_or_else(|| {
            LinkError::schema(&set.source, format!("missing projected column '{}'", c.name))
        })?;
        columns.push(
            (0..set.len())
                .map(|row| set.value(row, idx).as_text().and_then(|t| normalize_value(&t)))
                .collect(),
        );
    }
    Ok((ids, columns))
}
