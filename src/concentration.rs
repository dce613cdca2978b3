//! Concentration metrics: how much of a column's mass or frequency sits in a
//! few values.
//!
//! Numeric columns get descriptive statistics, the share of the total held
//! by the N largest values and the Gini coefficient. Categorical columns get
//! their N most frequent values, the share of rows those cover and the
//! Herfindahl-Hirschman Index.

use std::collections::BTreeMap;

use log::debug;
use serde::{Serialize, ser::SerializeMap};

use crate::{
    dataset::{Column, ColumnMap, Table},
    error::ProfileError,
    frequency::ValueCounts,
    inference::{ColumnKind, classify},
    stats::{self, ColumnStats},
};

#[derive(Debug, Clone, PartialEq)]
pub struct NumericConcentration {
    pub top_n: usize,
    pub top_n_percentage: f64,
    pub gini_coefficient: f64,
}

impl Serialize for NumericConcentration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(&top_n_key(self.top_n), &self.top_n_percentage)?;
        map.serialize_entry("gini_coefficient", &self.gini_coefficient)?;
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericColumnReport {
    pub statistics: ColumnStats,
    pub concentration: NumericConcentration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalConcentration {
    pub top_n: usize,
    pub top_n_percentage: f64,
    pub hhi: f64,
}

impl Serialize for CategoricalConcentration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(&top_n_key(self.top_n), &self.top_n_percentage)?;
        map.serialize_entry("hhi", &self.hhi)?;
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueShare {
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoricalColumnReport {
    /// Most frequent values first, keyed by their display form.
    pub top_values: ColumnMap<ValueShare>,
    pub concentration: CategoricalConcentration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConcentrationSummary {
    pub total_rows: usize,
    pub total_columns: usize,
    pub numeric_columns: usize,
    pub categorical_columns: usize,
    pub temporal_columns: usize,
    pub text_columns: usize,
    pub missing_values: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConcentrationReport {
    pub numeric_concentration: ColumnMap<NumericColumnReport>,
    pub categorical_concentration: ColumnMap<CategoricalColumnReport>,
    pub summary: ConcentrationSummary,
}

fn top_n_key(top_n: usize) -> String {
    format!("top_{top_n}_percentage")
}

/// Computes the concentration report for every numeric and categorical
/// column of `table`. Temporal and text columns only appear in the summary.
pub fn analyze_concentration(
    table: &Table,
    top_n: usize,
) -> Result<ConcentrationReport, ProfileError> {
    if top_n == 0 {
        return Err(ProfileError::invalid_parameter(
            "top_n",
            top_n,
            "must be at least 1",
        ));
    }
    let classification = classify(table);

    let mut numeric_concentration = ColumnMap::new();
    let mut categorical_concentration = ColumnMap::new();
    for column in table.columns() {
        match classification.kind_of(&column.name) {
            Some(ColumnKind::Numeric) => {
                numeric_concentration.insert(column.name.clone(), numeric_report(column, top_n)?);
            }
            Some(ColumnKind::Categorical) => {
                categorical_concentration
                    .insert(column.name.clone(), categorical_report(column, top_n));
            }
            _ => debug!("Skipping column '{}' for concentration", column.name),
        }
    }

    Ok(ConcentrationReport {
        numeric_concentration,
        categorical_concentration,
        summary: ConcentrationSummary {
            total_rows: table.row_count(),
            total_columns: table.column_count(),
            numeric_columns: classification.count(ColumnKind::Numeric),
            categorical_columns: classification.count(ColumnKind::Categorical),
            temporal_columns: classification.count(ColumnKind::Temporal),
            text_columns: classification.count(ColumnKind::Text),
            missing_values: table.missing_counts(),
        },
    })
}

fn numeric_report(column: &Column, top_n: usize) -> Result<NumericColumnReport, ProfileError> {
    let values = column.numeric_values();
    Ok(NumericColumnReport {
        statistics: ColumnStats::from_values(&values),
        concentration: NumericConcentration {
            top_n,
            top_n_percentage: top_n_share(&values, top_n),
            gini_coefficient: gini_coefficient(&column.name, &values)?,
        },
    })
}

fn categorical_report(column: &Column, top_n: usize) -> CategoricalColumnReport {
    let counts = ValueCounts::from_column(column);
    let top = counts.top(top_n);
    let top_values = top
        .iter()
        .map(|(value, count)| {
            (
                value.as_display(),
                ValueShare {
                    count: *count,
                    percentage: counts.share(*count) * 100.0,
                },
            )
        })
        .collect();
    let covered = top.iter().map(|(_, count)| *count).sum::<usize>();
    CategoricalColumnReport {
        top_values,
        concentration: CategoricalConcentration {
            top_n,
            top_n_percentage: counts.share(covered) * 100.0,
            hhi: herfindahl_index(&counts),
        },
    }
}

/// Sum of the `top_n` largest values as a percentage of the column total.
/// A column summing to exactly zero reports 0.
pub fn top_n_share(values: &[f64], top_n: usize) -> f64 {
    let total = stats::sum(values);
    if total == 0.0 {
        return 0.0;
    }
    let mut descending = stats::sorted_ascending(values);
    descending.reverse();
    let head = &descending[..top_n.min(descending.len())];
    stats::sum(head) / total * 100.0
}

/// Gini coefficient over the values sorted ascending:
/// `Σ((2·rank − n − 1)·value) / (n·Σvalue)`, ranks starting at 1.
pub fn gini_coefficient(column: &str, values: &[f64]) -> Result<f64, ProfileError> {
    let sorted = stats::sorted_ascending(values);
    if let (Some(first), Some(last)) = (sorted.first(), sorted.last())
        && first == last
    {
        return Ok(0.0);
    }
    let total = stats::sum(&sorted);
    if total == 0.0 {
        let reason = if sorted.is_empty() {
            "column has no values"
        } else {
            "values sum to zero"
        };
        return Err(ProfileError::UndefinedMetric {
            column: column.to_string(),
            metric: "gini_coefficient",
            reason: reason.to_string(),
        });
    }
    let n = sorted.len() as f64;
    let weighted = sorted
        .iter()
        .enumerate()
        .map(|(idx, value)| (2.0 * (idx as f64 + 1.0) - n - 1.0) * value)
        .collect::<Vec<_>>();
    Ok(stats::sum(&weighted) / (n * total))
}

/// Sum of squared shares over every distinct value. Shares are relative to
/// the row count, so missing cells dilute the index.
pub fn herfindahl_index(counts: &ValueCounts) -> f64 {
    counts
        .items()
        .iter()
        .map(|(_, count)| counts.share(*count).powi(2))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn top_one_share_of_skewed_column() {
        let share = top_n_share(&[1.0, 2.0, 3.0, 4.0, 100.0], 1);
        assert!(close(share, 100.0 / 110.0 * 100.0));
    }

    #[test]
    fn top_n_share_is_monotone_and_saturates() {
        let values = [5.0, 1.0, 7.0, 3.0, 2.0];
        let shares = (1..=7).map(|n| top_n_share(&values, n)).collect::<Vec<_>>();
        assert!(shares.windows(2).all(|w| w[0] <= w[1]));
        assert!(close(shares[4], 100.0));
        assert!(close(shares[6], 100.0));
    }

    #[test]
    fn zero_total_share_is_zero() {
        assert_eq!(top_n_share(&[0.0, 0.0], 1), 0.0);
    }

    #[test]
    fn gini_of_equal_values_is_zero() {
        assert_eq!(gini_coefficient("c", &[4.0, 4.0, 4.0]).unwrap(), 0.0);
        assert_eq!(gini_coefficient("c", &[0.0, 0.0]).unwrap(), 0.0);
    }

    #[test]
    fn gini_of_single_holder_is_n_minus_one_over_n() {
        let gini = gini_coefficient("c", &[0.0, 0.0, 0.0, 1.0]).unwrap();
        assert!(close(gini, 0.75));
    }

    #[test]
    fn gini_with_zero_sum_is_undefined() {
        let err = gini_coefficient("delta", &[-1.0, 1.0]).unwrap_err();
        assert!(matches!(
            err,
            ProfileError::UndefinedMetric {
                metric: "gini_coefficient",
                ..
            }
        ));
        assert!(gini_coefficient("empty", &[]).is_err());
    }

    #[test]
    fn categorical_metrics() {
        let table = Table::new(vec![Column::texts("c", &["a", "a", "a", "b", "c"])]).unwrap();
        let counts = ValueCounts::from_column(table.column("c").unwrap());
        assert!(close(herfindahl_index(&counts), 0.44));

        let report = categorical_report(table.column("c").unwrap(), 1);
        assert!(close(report.concentration.top_n_percentage, 60.0));
        assert_eq!(report.top_values.get("a").map(|s| s.count), Some(3));
    }

    #[test]
    fn hhi_bounds() {
        let single = ValueCounts::from_column(&Column::texts("c", &["x", "x", "x"]));
        assert!(close(herfindahl_index(&single), 1.0));
        let spread = ValueCounts::from_column(&Column::texts("c", &["w", "x", "y", "z"]));
        assert!(close(herfindahl_index(&spread), 0.25));
        let empty = ValueCounts::from_column(&Column::new("c", vec![]));
        assert_eq!(herfindahl_index(&empty), 0.0);
    }

    #[test]
    fn zero_top_n_is_rejected() {
        let table = Table::new(vec![Column::numbers("a", &[1.0])]).unwrap();
        let err = analyze_concentration(&table, 0).unwrap_err();
        assert!(matches!(err, ProfileError::InvalidParameter { ref name, .. } if name == "top_n"));
    }

    #[test]
    fn report_serializes_dynamic_keys() {
        let table = Table::new(vec![
            Column::numbers("amount", &[1.0, 2.0, 3.0, 4.0, 100.0]),
            Column::texts("tier", &["a", "a", "a", "b", "a"]),
            Column::texts("note", &["p", "q", "r", "s", "t"]),
        ])
        .unwrap();
        let report = analyze_concentration(&table, 3).unwrap();
        let value = serde_json::to_value(&report).unwrap();

        let amount = &value["numeric_concentration"]["amount"];
        assert!(amount["concentration"]["top_3_percentage"].is_number());
        assert!(amount["concentration"]["gini_coefficient"].is_number());
        assert_eq!(amount["statistics"]["median"], json!(3.0));
        assert!(amount["statistics"].get("count").is_none());

        let tier = &value["categorical_concentration"]["tier"];
        assert_eq!(tier["top_values"]["a"]["count"], json!(4));
        assert_eq!(tier["concentration"]["top_3_percentage"], json!(100.0));

        assert_eq!(value["summary"]["text_columns"], json!(1));
        assert_eq!(value["summary"]["total_rows"], json!(5));
        assert!(value["numeric_concentration"].get("note").is_none());
    }
}
