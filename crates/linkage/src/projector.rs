//! Hybrid field projection.
//!
//! The two sources share no field names. Each comparison column pairs one
//! left (identity) field with one right (description) field; projecting both
//! sets through the schema yields identically named, comparable columns.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::config::{ColumnSpec, ComparisonKind, LinkConfig};
use crate::diagnostics::{Diagnostics, Stage};
use crate::error::LinkError;
use crate::model::{RecordSet, Value};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonColumn {
    pub name: String,
    pub left_field: String,
    pub right_field: String,
    pub kind: ComparisonKind,
    pub high_similarity: f64,
    pub low_similarity: f64,
    pub max_edits: usize,
    pub term_frequency: bool,
}

/// Ordered, name-unique list of comparison columns. Built once per run and
/// checked against both input schemas before any pairing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonSchema {
    pub columns: Vec<ComparisonColumn>,
}

impl ComparisonSchema {
    /// Expand the projection (identity x description) and apply `[[columns]]`.
    pub fn resolve(
        config: &LinkConfig,
        left: &RecordSet,
        right: &RecordSet,
    ) -> Result<Self, LinkError> {
        let defaults = &config.comparison;
        let mut columns: Vec<ComparisonColumn> = Vec::new();

        if let Some(ref projection) = config.projection {
            let descriptions: Vec<String> = if projection.description_fields.is_empty() {
                right
                    .columns
                    .iter()
                    .filter(|c| c.starts_with(&projection.description_prefix))
                    .filter(|c| **c != config.id_field)
                    .cloned()
                    .collect()
            } else {
                projection.description_fields.clone()
            };

            for identity in &projection.identity_fields {
                for description in &descriptions {
                    columns.push(ComparisonColumn {
                        name: format!("{identity}_{description}"),
                        left_field: identity.clone(),
                        right_field: description.clone(),
                        kind: defaults.kind,
                        high_similarity: defaults.high_similarity,
                        low_similarity: defaults.low_similarity,
                        max_edits: defaults.max_edits,
                        term_frequency: defaults.term_frequency,
                    });
                }
            }
        }

        for spec in &config.columns {
            if let Some(existing) = columns.iter_mut().find(|c| c.name == spec.name) {
                if spec.left.as_ref().is_some_and(|l| *l != existing.left_field)
                    || spec.right.as_ref().is_some_and(|r| *r != existing.right_field)
                {
                    return Err(LinkError::Configuration(format!(
                        "column '{}' redefines the fields of a projected column",
                        spec.name
                    )));
                }
                apply_overrides(existing, spec);
                continue;
            }

            let (Some(left_field), Some(right_field)) = (&spec.left, &spec.right) else {
                return Err(LinkError::Configuration(format!(
                    "column '{}' is not a projected column and needs both left and right",
                    spec.name
                )));
            };
            let mut column = ComparisonColumn {
                name: spec.name.clone(),
                left_field: left_field.clone(),
                right_field: right_field.clone(),
                kind: defaults.kind,
                high_similarity: defaults.high_similarity,
                low_similarity: defaults.low_similarity,
                max_edits: defaults.max_edits,
                term_frequency: defaults.term_frequency,
            };
            apply_overrides(&mut column, spec);
            columns.push(column);
        }

        if columns.is_empty() {
            return Err(LinkError::Configuration(format!(
                "comparison column list is empty (no description fields in '{}'?)",
                right.source
            )));
        }

        let mut names = HashSet::new();
        for c in &columns {
            if c.name == config.id_field {
                return Err(LinkError::Configuration(format!(
                    "comparison column '{}' collides with id_field",
                    c.name
                )));
            }
            if !names.insert(c.name.as_str()) {
                return Err(LinkError::Configuration(format!(
                    "duplicate comparison column '{}'",
                    c.name
                )));
            }
        }

        let schema = Self { columns };
        schema.validate(left, right)?;
        Ok(schema)
    }

    /// Every left field must exist on the left, every right field on the right.
    pub fn validate(&self, left: &RecordSet, right: &RecordSet) -> Result<(), LinkError> {
        for c in &self.columns {
            if left.column_index(&c.left_field).is_none() {
                return Err(LinkError::schema(
                    &left.source,
                    format!("missing field '{}' (column '{}')", c.left_field, c.name),
                ));
            }
            if right.column_index(&c.right_field).is_none() {
                return Err(LinkError::schema(
                    &right.source,
                    format!("missing field '{}' (column '{}')", c.right_field, c.name),
                ));
            }
        }
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

fn apply_overrides(column: &mut ComparisonColumn, spec: &ColumnSpec) {
    if let Some(kind) = spec.kind {
        column.kind = kind;
    }
    if let Some(high) = spec.high_similarity {
        column.high_similarity = high;
    }
    if let Some(low) = spec.low_similarity {
        column.low_similarity = low;
    }
    if let Some(max_edits) = spec.max_edits {
        column.max_edits = max_edits;
    }
    if let Some(tf) = spec.term_frequency {
        column.term_frequency = tf;
    }
}

#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
}

/// Project both sets onto `[id_field, column_1 .. column_n]`. Left cells hold
/// the identity value, right cells the description value.
pub fn project(
    schema: &ComparisonSchema,
    left: &RecordSet,
    right: &RecordSet,
    id_field: &str,
    diagnostics: &dyn Diagnostics,
) -> Result<(RecordSet, RecordSet), LinkError> {
    schema.validate(left, right)?;
    let left_out = project_side(schema, left, id_field, Side::Left)?;
    let right_out = project_side(schema, right, id_field, Side::Right)?;

    diagnostics.info(
        Stage::Projection,
        &format!(
            "projected {} comparison columns ({} x {} rows)",
            schema.len(),
            left_out.len(),
            right_out.len()
        ),
    );
    Ok((left_out, right_out))
}

fn project_side(
    schema: &ComparisonSchema,
    input: &RecordSet,
    id_field: &str,
    side: Side,
) -> Result<RecordSet, LinkError> {
    let id_idx = input.column_index(id_field).ok_or_else(|| {
        LinkError::schema(&input.source, format!("missing identifier field '{id_field}'"))
    })?;

    let field_indices: Vec<usize> = schema
        .columns
        .iter()
        .map(|c| {
            let field = match side {
                Side::Left => &c.left_field,
                Side::Right => &c.right_field,
            };
            input.column_index(field).ok_or_else(|| {
                LinkError::schema(&input.source, format!("missing field '{field}'"))
            })
        })
        .collect::<Result<_, _>>()?;

    let mut columns = Vec::with_capacity(schema.len() + 1);
    columns.push(id_field.to_string());
    columns.extend(schema.names());

    let mut seen: HashMap<String, usize> = HashMap::with_capacity(input.len());
    let mut out = RecordSet::new(input.source.clone(), columns);
    for (row, record) in input.records.iter().enumerate() {
        let id = input.value(row, id_idx);
        let Some(id_text) = id.as_text() else {
            return Err(LinkError::schema(
                &input.source,
                format!("row {} has a null '{id_field}'", row + 1),
            ));
        };
        if let Some(first) = seen.insert(id_text.clone(), row) {
            return Err(LinkError::schema(
                &input.source,
                format!(
                    "duplicate '{id_field}' value '{id_text}' (rows {} and {})",
                    first + 1,
                    row + 1
                ),
            ));
        }

        let mut values = Vec::with_capacity(field_indices.len() + 1);
        values.push(id.clone());
        values.extend(
            field_indices
                .iter()
                .map(|&i| record.values.get(i).cloned().unwrap_or(Value::Null)),
        );
        out.push(values);
    }
    Ok(out)
}
