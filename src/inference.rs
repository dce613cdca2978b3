//! Column type inference.
//!
//! [`classify`] assigns every column of a table to exactly one
//! [`ColumnKind`]. The rules are applied in order and the first match wins:
//!
//! 1. numeric representation → numeric
//! 2. distinct values below half the row count → categorical; for a column
//!    of dates the distinct count is taken over parsed instants
//! 3. every present value is or parses as a date or date-time → temporal
//! 4. anything else → text
//!
//! Classification is a value returned per call; nothing is cached between
//! tables.

use std::{collections::HashSet, fmt};

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::{
    data::{Value, parse_temporal},
    dataset::{Column, Representation, Table},
};

pub const CATEGORICAL_DISTINCT_RATIO: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Categorical,
    Temporal,
    Text,
}

impl ColumnKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnKind::Numeric => "numeric",
            ColumnKind::Categorical => "categorical",
            ColumnKind::Temporal => "temporal",
            ColumnKind::Text => "text",
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column name to kind, in table column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnClassification {
    entries: Vec<(String, ColumnKind)>,
}

impl ColumnClassification {
    pub fn kind_of(&self, column: &str) -> Option<ColumnKind> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, kind)| *kind)
    }

    pub fn columns_of(&self, kind: ColumnKind) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, k)| *k == kind)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn numeric(&self) -> Vec<&str> {
        self.columns_of(ColumnKind::Numeric)
    }

    pub fn categorical(&self) -> Vec<&str> {
        self.columns_of(ColumnKind::Categorical)
    }

    pub fn temporal(&self) -> Vec<&str> {
        self.columns_of(ColumnKind::Temporal)
    }

    pub fn text(&self) -> Vec<&str> {
        self.columns_of(ColumnKind::Text)
    }

    pub fn count(&self, kind: ColumnKind) -> usize {
        self.entries.iter().filter(|(_, k)| *k == kind).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ColumnKind)> {
        self.entries.iter().map(|(name, kind)| (name.as_str(), *kind))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn classify(table: &Table) -> ColumnClassification {
    let row_count = table.row_count();
    let entries = table
        .columns()
        .iter()
        .map(|column| (column.name.clone(), classify_column(column, row_count)))
        .collect();
    ColumnClassification { entries }
}

pub fn classify_column(column: &Column, row_count: usize) -> ColumnKind {
    if column.representation() == Representation::Numeric {
        return ColumnKind::Numeric;
    }
    // Date columns count distinct instants so spellings of the same
    // timestamp collapse the same way they do after normalization.
    let instants = temporal_instants(column);
    let distinct = instants
        .as_ref()
        .map_or_else(|| column.distinct_count(), HashSet::len);
    if (distinct as f64) < row_count as f64 * CATEGORICAL_DISTINCT_RATIO {
        return ColumnKind::Categorical;
    }
    if instants.is_some() {
        return ColumnKind::Temporal;
    }
    ColumnKind::Text
}

/// The distinct timestamps of a column whose present values are all dates
/// or date-times, `None` otherwise.
fn temporal_instants(column: &Column) -> Option<HashSet<NaiveDateTime>> {
    column
        .present()
        .map(|value| match value {
            Value::DateTime(dt) => Some(*dt),
            Value::Text(text) => parse_temporal(text),
            Value::Number(_) | Value::Boolean(_) => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Column;

    fn table(columns: Vec<Column>) -> Table {
        Table::new(columns).expect("aligned columns")
    }

    #[test]
    fn classifies_each_bucket() {
        let t = table(vec![
            Column::numbers("amount", &[1.0, 2.0, 3.0, 4.0, 5.0]),
            Column::texts("region", &["n", "n", "s", "n", "n"]),
            Column::texts(
                "ordered_at",
                &[
                    "2024-01-01",
                    "2024-01-02",
                    "2024-01-03",
                    "2024-01-04",
                    "2024-01-05",
                ],
            ),
            Column::texts("comment", &["alpha", "beta", "gamma", "delta", "eps"]),
        ]);
        let classes = classify(&t);
        assert_eq!(classes.numeric(), vec!["amount"]);
        assert_eq!(classes.categorical(), vec!["region"]);
        assert_eq!(classes.temporal(), vec!["ordered_at"]);
        assert_eq!(classes.text(), vec!["comment"]);
        assert_eq!(classes.len(), 4);
    }

    #[test]
    fn numeric_rule_wins_over_cardinality() {
        let t = table(vec![Column::numbers("flag", &[1.0, 1.0, 1.0, 1.0])]);
        assert_eq!(classify(&t).kind_of("flag"), Some(ColumnKind::Numeric));
    }

    #[test]
    fn cardinality_is_checked_before_dates() {
        let t = table(vec![Column::texts(
            "day",
            &[
                "2024-01-01",
                "2024-01-01",
                "2024-01-01",
                "2024-01-02",
                "2024-01-02",
            ],
        )]);
        assert_eq!(classify(&t).kind_of("day"), Some(ColumnKind::Categorical));
    }

    #[test]
    fn date_spellings_of_one_instant_count_once() {
        let t = table(vec![Column::texts(
            "stamp",
            &[
                "2024-01-01",
                "2024-01-01 00:00:00",
                "2024-01-01T00:00:00",
                "2024-01-02",
                "2024-01-02 00:00",
                "2024/01/02",
            ],
        )]);
        assert_eq!(t.column("stamp").unwrap().distinct_count(), 6);
        assert_eq!(classify(&t).kind_of("stamp"), Some(ColumnKind::Categorical));
    }

    #[test]
    fn a_single_unparseable_value_keeps_column_as_text() {
        let t = table(vec![Column::texts(
            "when",
            &["2024-01-01", "2024-01-02", "soon", "2024-01-04"],
        )]);
        assert_eq!(classify(&t).kind_of("when"), Some(ColumnKind::Text));
    }

    #[test]
    fn missing_values_do_not_block_temporal_detection() {
        let t = table(vec![Column::new(
            "when",
            vec![
                None,
                Some(Value::Text("2024-01-02".into())),
                Some(Value::Text("2024-01-03".into())),
                Some(Value::Text("2024-01-04".into())),
            ],
        )]);
        assert_eq!(classify(&t).kind_of("when"), Some(ColumnKind::Temporal));
    }

    #[test]
    fn buckets_are_disjoint_and_exhaustive() {
        let t = table(vec![
            Column::numbers("a", &[1.0, 2.0]),
            Column::texts("b", &["x", "y"]),
            Column::new("c", vec![None, None]),
        ]);
        let classes = classify(&t);
        let total = [
            ColumnKind::Numeric,
            ColumnKind::Categorical,
            ColumnKind::Temporal,
            ColumnKind::Text,
        ]
        .iter()
        .map(|k| classes.count(*k))
        .sum::<usize>();
        assert_eq!(total, t.column_count());
    }
}
