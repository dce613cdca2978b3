//! Table normalization: name cleaning, type conversion, imputation and
//! format standardization, applied in that order.
//!
//! Normalizing an already-normalized table returns it unchanged.

use std::{collections::HashSet, sync::Arc};

use log::{debug, info};
use serde::Serialize;

use crate::{
    data::{Value, clean_column_name, parse_number, parse_temporal},
    dataset::{Column, Table},
    error::ProfileError,
    frequency::ValueCounts,
    inference::{ColumnClassification, ColumnKind, classify},
    journal::{
        EntryKind, JournalEntry, NullJournal, TableSnapshot, TransformationLog,
        TransformationMetadata,
    },
    stats,
};

const TRANSFORMATIONS_APPLIED: &[&str] = &[
    "column_name_cleaning",
    "data_type_conversion",
    "missing_value_handling",
    "format_standardization",
];

/// Original label to cleaned name, one pair per column in column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NameMapping {
    pairs: Vec<(String, String)>,
}

impl NameMapping {
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn cleaned_names(&self) -> Vec<String> {
        self.pairs.iter().map(|(_, cleaned)| cleaned.clone()).collect()
    }

    pub fn original_for(&self, cleaned: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(_, c)| c == cleaned)
            .map(|(original, _)| original.as_str())
    }
}

/// Cleans every label and disambiguates collisions with `_2`, `_3`, ...
/// suffixes. A label with no alphanumeric characters becomes
/// `column_<position>`.
pub fn clean_column_names(labels: &[String]) -> NameMapping {
    let mut used: HashSet<String> = HashSet::new();
    let pairs = labels
        .iter()
        .enumerate()
        .map(|(idx, label)| {
            let mut base = clean_column_name(label);
            if base.is_empty() {
                base = format!("column_{}", idx + 1);
            }
            let mut candidate = base.clone();
            let mut suffix = 2;
            while used.contains(&candidate) {
                candidate = format!("{base}_{suffix}");
                suffix += 1;
            }
            used.insert(candidate.clone());
            (label.clone(), candidate)
        })
        .collect();
    NameMapping { pairs }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTable {
    pub table: Table,
    pub classification: ColumnClassification,
    pub name_mapping: NameMapping,
}

/// Runs the normalization pipeline and reports each run to a journal.
pub struct Normalizer {
    journal: Arc<dyn TransformationLog>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(Arc::new(NullJournal))
    }
}

impl Normalizer {
    pub fn new(journal: Arc<dyn TransformationLog>) -> Self {
        Self { journal }
    }

    pub fn normalize(
        &self,
        table: &Table,
        source: Option<&str>,
    ) -> Result<NormalizedTable, ProfileError> {
        let input = TableSnapshot::capture(table, source);
        let normalized = normalize_table(table)?;
        let output = TableSnapshot::capture(&normalized.table, source)
            .with_classification(&normalized.classification);
        self.journal.append(&JournalEntry::new(EntryKind::Transformation {
            operation: "normalize".to_string(),
            input,
            output,
            metadata: TransformationMetadata {
                column_mappings: normalized.name_mapping.pairs().to_vec(),
                transformations_applied: TRANSFORMATIONS_APPLIED
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            },
        }));
        info!(
            "Normalized {} row(s) x {} column(s)",
            normalized.table.row_count(),
            normalized.table.column_count()
        );
        Ok(normalized)
    }
}

/// Normalization without journaling.
pub fn normalize_table(table: &Table) -> Result<NormalizedTable, ProfileError> {
    let name_mapping = clean_column_names(&table.headers());
    let renamed = table
        .columns()
        .iter()
        .zip(name_mapping.cleaned_names())
        .map(|(column, name)| Column::new(name, column.values.clone()))
        .collect::<Vec<_>>();
    let renamed = Table::new(renamed)?;

    let classification = classify(&renamed);
    let mut columns = Vec::with_capacity(renamed.column_count());
    for column in renamed.into_columns() {
        let kind = classification
            .kind_of(&column.name)
            .unwrap_or(ColumnKind::Text);
        debug!("Column '{}' classified as {kind}", column.name);
        let converted = convert_column(column, kind);
        let imputed = impute_column(converted, kind)?;
        columns.push(standardize_column(imputed, kind));
    }

    Ok(NormalizedTable {
        table: Table::new(columns)?,
        classification,
        name_mapping,
    })
}

fn convert_column(mut column: Column, kind: ColumnKind) -> Column {
    match kind {
        ColumnKind::Numeric => {
            for cell in column.values.iter_mut() {
                *cell = cell.take().and_then(coerce_numeric).map(Value::Number);
            }
        }
        ColumnKind::Temporal => {
            for cell in column.values.iter_mut() {
                *cell = cell.take().and_then(coerce_temporal).map(Value::DateTime);
            }
        }
        ColumnKind::Categorical | ColumnKind::Text => {}
    }
    column
}

fn coerce_numeric(value: Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(n),
        Value::Text(text) => parse_number(&text),
        Value::Boolean(b) => Some(if b { 1.0 } else { 0.0 }),
        Value::DateTime(_) => None,
    }
}

fn coerce_temporal(value: Value) -> Option<chrono::NaiveDateTime> {
    match value {
        Value::DateTime(dt) => Some(dt),
        Value::Text(text) => parse_temporal(&text),
        Value::Number(_) | Value::Boolean(_) => None,
    }
}

fn impute_column(mut column: Column, kind: ColumnKind) -> Result<Column, ProfileError> {
    if column.missing_count() == 0 {
        return Ok(column);
    }
    match kind {
        ColumnKind::Numeric => {
            let fill = stats::median(&column.numeric_values()).ok_or_else(|| {
                ProfileError::Imputation {
                    column: column.name.clone(),
                    bucket: "numeric",
                }
            })?;
            fill_missing(&mut column, &Value::Number(fill));
        }
        ColumnKind::Categorical => {
            let fill = ValueCounts::from_column(&column)
                .mode()
                .cloned()
                .ok_or_else(|| ProfileError::Imputation {
                    column: column.name.clone(),
                    bucket: "categorical",
                })?;
            fill_missing(&mut column, &fill);
        }
        // A leading run of missing values has nothing to carry forward and
        // stays missing.
        ColumnKind::Temporal => {
            let mut last: Option<Value> = None;
            for cell in column.values.iter_mut() {
                match cell {
                    Some(value) => last = Some(value.clone()),
                    None => *cell = last.clone(),
                }
            }
        }
        ColumnKind::Text => {}
    }
    Ok(column)
}

fn fill_missing(column: &mut Column, fill: &Value) {
    for cell in column.values.iter_mut().filter(|cell| cell.is_none()) {
        *cell = Some(fill.clone());
    }
}

fn standardize_column(mut column: Column, kind: ColumnKind) -> Column {
    if kind == ColumnKind::Categorical {
        for cell in column.values.iter_mut().flatten() {
            if !matches!(cell, Value::Text(_)) {
                *cell = Value::Text(cell.as_display());
            }
        }
    }
    column
}
