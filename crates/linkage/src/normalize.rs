//! Input boundary: CSV text -> `RecordSet` with canonical column names and a
//! 1-based row identifier.

use std::collections::HashSet;

use crate::diagnostics::{Diagnostics, Stage};
use crate::error::LinkError;
use crate::model::{RecordSet, Value};

/// Lowercase, spaces to `_`, drop anything outside `[a-z0-9_]`, collapse `__+`.
pub fn standardize_column_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().chars() {
        let c = if c == ' ' { '_' } else { c.to_ascii_lowercase() };
        if !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
            continue;
        }
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out
}

/// Parse CSV text into a record set. Empty cells become `Null`; `id_field`
/// is appended and numbered from 1.
pub fn load_csv(
    source: &str,
    csv_data: &str,
    id_field: &str,
    diagnostics: &dyn Diagnostics,
) -> Result<RecordSet, LinkError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_data.as_bytes());

    let raw_headers: Vec<String> = reader
        .headers()
        .map_err(|e| LinkError::Io(format!("{source}: {e}")))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut columns = Vec::with_capacity(raw_headers.len() + 1);
    let mut seen = HashSet::new();
    for raw in &raw_headers {
        let name = standardize_column_name(raw);
        if name.is_empty() {
            return Err(LinkError::schema(
                source,
                format!("column '{raw}' is empty after standardization"),
            ));
        }
        if !seen.insert(name.clone()) {
            return Err(LinkError::schema(
                source,
                format!("column '{raw}' collides with another column as '{name}'"),
            ));
        }
        columns.push(name);
    }
    if seen.contains(id_field) {
        return Err(LinkError::schema(
            source,
            format!("input already has a '{id_field}' column"),
        ));
    }
    columns.push(id_field.to_string());

    let width = raw_headers.len();
    let mut set = RecordSet::new(source, columns);
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| LinkError::Io(format!("{source}: {e}")))?;
        let mut values: Vec<Value> = (0..width)
            .map(|c| match record.get(c).map(str::trim) {
                Some(v) if !v.is_empty() => Value::Text(v.to_string()),
                _ => Value::Null,
            })
            .collect();
        values.push(Value::Number((i + 1) as f64));
        set.push(values);
    }

    diagnostics.info(
        Stage::Normalize,
        &format!(
            "imported {} rows x {} columns from '{source}'",
            set.len(),
            width
        ),
    );
    Ok(set)
}
