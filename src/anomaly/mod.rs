//! Row-level anomaly detection over the numeric columns of a table.
//!
//! Numeric columns are standardized with statistics from the table itself,
//! then every configured [`OutlierScorer`] scores each row independently.
//! Each scorer is thresholded at its own `(1 - contamination)` quantile and
//! the results are kept side by side, keyed by [`DetectionMethod`]. Nothing
//! is fused into a consensus verdict.

pub mod forest;
pub mod knn;
pub mod scaler;

use std::{fmt, str::FromStr};

use clap::ValueEnum;
use itertools::Itertools;
use log::{debug, info};
use serde::{Deserialize, Serialize, ser::SerializeMap};

use crate::{
    config::AnomalyConfig,
    data::Value,
    dataset::{Column, ColumnMap, Table},
    error::ProfileError,
    inference::classify,
    stats,
};

pub use forest::IsolationForestScorer;
pub use knn::KnnScorer;
pub use scaler::StandardScaler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Knn,
    #[value(name = "isolation_forest", alias = "isolation-forest")]
    IsolationForest,
}

impl DetectionMethod {
    pub const ALL: [DetectionMethod; 2] = [DetectionMethod::Knn, DetectionMethod::IsolationForest];

    pub fn as_str(self) -> &'static str {
        match self {
            DetectionMethod::Knn => "knn",
            DetectionMethod::IsolationForest => "isolation_forest",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionMethod {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DetectionMethod::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ProfileError::UnknownMethod {
                method: s.to_string(),
                available: available_list(DetectionMethod::ALL.iter().copied()),
            })
    }
}

fn available_list(methods: impl Iterator<Item = DetectionMethod>) -> String {
    let mut methods = methods.peekable();
    if methods.peek().is_none() {
        return "none".to_string();
    }
    methods.map(DetectionMethod::as_str).join(", ")
}

/// An unsupervised scorer producing one continuous score per row; higher
/// means more anomalous.
pub trait OutlierScorer: Send + Sync {
    fn method(&self) -> DetectionMethod;

    /// Expected share of anomalous rows, used to place the threshold.
    fn contamination(&self) -> f64;

    fn score(&self, matrix: &[Vec<f64>]) -> Result<Vec<f64>, ProfileError>;
}

/// Flagged rows for one method.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedAnomalies {
    pub indices: Vec<usize>,
    pub count: usize,
    pub percentage: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodOutcome {
    pub method: DetectionMethod,
    pub scores: Vec<f64>,
    pub detected: DetectedAnomalies,
}

/// One per-row score vector presented under every numeric column name. The
/// score belongs to the row; repeating it per column keeps the report keyed
/// by column like the rest of the output.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastScores<'a> {
    pub columns: &'a [String],
    pub scores: &'a [f64],
}

impl Serialize for BroadcastScores<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for column in self.columns {
            map.serialize_entry(column, self.scores)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodSummary {
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalySummary {
    pub total_rows: usize,
    pub numeric_columns_analyzed: usize,
    pub methods_applied: Vec<DetectionMethod>,
    /// `<method>_anomalies` entries.
    #[serde(flatten)]
    pub per_method: ColumnMap<MethodSummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyDetection {
    pub total_rows: usize,
    pub numeric_columns: Vec<String>,
    pub outcomes: Vec<MethodOutcome>,
}

impl AnomalyDetection {
    pub fn methods(&self) -> impl Iterator<Item = DetectionMethod> + '_ {
        self.outcomes.iter().map(|outcome| outcome.method)
    }

    pub fn outcome(&self, method: DetectionMethod) -> Option<&MethodOutcome> {
        self.outcomes.iter().find(|outcome| outcome.method == method)
    }

    pub fn broadcast_scores(&self, method: DetectionMethod) -> Option<BroadcastScores<'_>> {
        self.outcome(method).map(|outcome| BroadcastScores {
            columns: &self.numeric_columns,
            scores: &outcome.scores,
        })
    }

    pub fn summary(&self) -> AnomalySummary {
        AnomalySummary {
            total_rows: self.total_rows,
            numeric_columns_analyzed: self.numeric_columns.len(),
            methods_applied: self.methods().collect(),
            per_method: self
                .outcomes
                .iter()
                .map(|outcome| {
                    (
                        format!("{}_anomalies", outcome.method),
                        MethodSummary {
                            count: outcome.detected.count,
                            percentage: outcome.detected.percentage,
                        },
                    )
                })
                .collect(),
        }
    }
}

impl Serialize for AnomalyDetection {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let scores = self
            .outcomes
            .iter()
            .filter_map(|outcome| {
                self.broadcast_scores(outcome.method)
                    .map(|scores| (outcome.method.as_str().to_string(), scores))
            })
            .collect::<ColumnMap<_>>();
        let detected = self
            .outcomes
            .iter()
            .map(|outcome| (outcome.method.as_str().to_string(), &outcome.detected))
            .collect::<ColumnMap<_>>();
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("anomaly_scores", &scores)?;
        map.serialize_entry("detected_anomalies", &detected)?;
        map.serialize_entry("summary", &self.summary())?;
        map.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyCondition {
    NoNumericColumns,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnomalyReport {
    Detected(AnomalyDetection),
    Skipped { condition: AnomalyCondition },
}

impl AnomalyReport {
    pub fn detection(&self) -> Option<&AnomalyDetection> {
        match self {
            AnomalyReport::Detected(detection) => Some(detection),
            AnomalyReport::Skipped { .. } => None,
        }
    }

    pub fn condition(&self) -> Option<AnomalyCondition> {
        match self {
            AnomalyReport::Detected(_) => None,
            AnomalyReport::Skipped { condition } => Some(*condition),
        }
    }
}

/// The configured set of scorers.
pub struct AnomalyEnsemble {
    scorers: Vec<Box<dyn OutlierScorer>>,
}

impl Default for AnomalyEnsemble {
    fn default() -> Self {
        Self::from_config(&AnomalyConfig::default())
    }
}

impl AnomalyEnsemble {
    pub fn new(scorers: Vec<Box<dyn OutlierScorer>>) -> Self {
        Self { scorers }
    }

    pub fn from_config(config: &AnomalyConfig) -> Self {
        let scorers = config
            .methods
            .iter()
            .unique()
            .map(|method| -> Box<dyn OutlierScorer> {
                match method {
                    DetectionMethod::Knn => {
                        Box::new(KnnScorer::new(config.knn_neighbors, config.contamination))
                    }
                    DetectionMethod::IsolationForest => Box::new(IsolationForestScorer::new(
                        config.forest_estimators,
                        config.forest_max_samples,
                        config.seed,
                        config.contamination,
                    )),
                }
            })
            .collect();
        Self::new(scorers)
    }

    pub fn methods(&self) -> Vec<DetectionMethod> {
        self.scorers.iter().map(|scorer| scorer.method()).collect()
    }

    /// Scores every row of `table` with each scorer. A table without numeric
    /// columns yields [`AnomalyCondition::NoNumericColumns`] rather than an
    /// error.
    pub fn detect_anomalies(&self, table: &Table) -> Result<AnomalyReport, ProfileError> {
        let classification = classify(table);
        let numeric = classification
            .numeric()
            .into_iter()
            .filter_map(|name| table.column(name))
            .collect::<Vec<_>>();
        if numeric.is_empty() {
            info!("No numeric columns; skipping anomaly detection");
            return Ok(AnomalyReport::Skipped {
                condition: AnomalyCondition::NoNumericColumns,
            });
        }
        let total_rows = table.row_count();
        if total_rows < 2 {
            return Err(ProfileError::InsufficientData {
                min_required: 2,
                actual: total_rows,
            });
        }

        let columns = numeric
            .iter()
            .map(|column| complete_numbers(column).map(|values| (column.name.as_str(), values)))
            .collect::<Result<Vec<_>, _>>()?;
        let borrowed = columns
            .iter()
            .map(|(name, values)| (*name, values.as_slice()))
            .collect::<Vec<_>>();
        let matrix = StandardScaler::fit_transform(&borrowed)?;

        let mut outcomes = Vec::with_capacity(self.scorers.len());
        for scorer in &self.scorers {
            let scores = scorer.score(&matrix)?;
            let detected = flag_rows(&scores, scorer.contamination())?;
            debug!(
                "{} flagged {} of {} row(s) at threshold {:.6}",
                scorer.method(),
                detected.count,
                total_rows,
                detected.threshold
            );
            outcomes.push(MethodOutcome {
                method: scorer.method(),
                scores,
                detected,
            });
        }

        Ok(AnomalyReport::Detected(AnomalyDetection {
            total_rows,
            numeric_columns: numeric.iter().map(|column| column.name.clone()).collect(),
            outcomes,
        }))
    }
}

fn complete_numbers(column: &Column) -> Result<Vec<f64>, ProfileError> {
    let values = column
        .values
        .iter()
        .map(|cell| cell.as_ref().and_then(Value::as_number).filter(|n| n.is_finite()))
        .collect::<Vec<_>>();
    let missing = values.iter().filter(|value| value.is_none()).count();
    if missing > 0 {
        return Err(ProfileError::MissingValues {
            column: column.name.clone(),
            count: missing,
        });
    }
    Ok(values.into_iter().flatten().collect())
}

/// Flags rows scoring at or above the `(1 - contamination)` quantile.
pub fn flag_rows(scores: &[f64], contamination: f64) -> Result<DetectedAnomalies, ProfileError> {
    let threshold = stats::quantile(scores, 1.0 - contamination).ok_or_else(|| {
        ProfileError::invalid_parameter("contamination", contamination, "must be in [0, 1]")
    })?;
    let indices = scores
        .iter()
        .enumerate()
        .filter(|(_, score)| **score >= threshold)
        .map(|(idx, _)| idx)
        .collect::<Vec<_>>();
    let count = indices.len();
    Ok(DetectedAnomalies {
        indices,
        count,
        percentage: count as f64 / scores.len() as f64 * 100.0,
        threshold,
    })
}

/// The table with one `<column>_anomaly_score` column per analysed numeric
/// column, all carrying `method`'s per-row score, and a boolean
/// `is_anomaly` column.
pub fn get_anomaly_details(
    table: &Table,
    report: &AnomalyReport,
    method: DetectionMethod,
) -> Result<Table, ProfileError> {
    let unknown = |available: String| ProfileError::UnknownMethod {
        method: method.as_str().to_string(),
        available,
    };
    let detection = report
        .detection()
        .ok_or_else(|| unknown(available_list(std::iter::empty::<DetectionMethod>())))?;
    let outcome = detection
        .outcome(method)
        .ok_or_else(|| unknown(available_list(detection.methods())))?;
    if table.row_count() != detection.total_rows {
        return Err(ProfileError::DimensionMismatch {
            expected: detection.total_rows,
            actual: table.row_count(),
        });
    }

    let mut details = table.clone();
    for column in &detection.numeric_columns {
        details.push_column(Column::numbers(
            format!("{column}_anomaly_score"),
            &outcome.scores,
        ))?;
    }
    let mut flags = vec![false; detection.total_rows];
    for idx in &outcome.detected.indices {
        if let Some(flag) = flags.get_mut(*idx) {
            *flag = true;
        }
    }
    details.push_column(Column::new(
        "is_anomaly",
        flags.into_iter().map(|f| Some(Value::Boolean(f))).collect(),
    ))?;
    Ok(details)
}
