//! Advisory text for a profiling run.
//!
//! An [`InsightGenerator`] asks a [`TextGenerator`] for three numbered items
//! per category and keeps the ones that read like findings. When generation
//! is unavailable or yields fewer than three usable items, the category is
//! filled from deterministic templates driven by the computed metrics.

use std::{fmt::Write as _, sync::OnceLock};

use itertools::Itertools;
use log::debug;
use regex::Regex;
use serde::Serialize;

use crate::{
    anomaly::AnomalyReport,
    concentration::ConcentrationReport,
    dataset::Table,
    error::GenerationUnavailable,
    frequency::ValueCounts,
    inference::classify,
    stats::{self, ColumnStats},
};

pub const MAX_ITEMS: usize = 3;
const MIN_ITEM_LEN: usize = 10;
const INSTRUCTION_WORDS: &[&str] = &[
    "write", "include", "should", "must", "need", "provide", "analyze",
];
const SKEW_LIMIT: f64 = 1.0;
const ANOMALY_SHARE_LIMIT: f64 = 5.0;

/// Free-text generation backend.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, GenerationUnavailable>;
}

/// Backend used when no model is configured; every request is unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledGenerator;

impl TextGenerator for DisabledGenerator {
    fn generate(&self, _prompt: &str) -> Result<String, GenerationUnavailable> {
        Err(GenerationUnavailable::new("no text generator configured"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Insights {
    pub concentration_insights: Vec<String>,
    pub anomaly_insights: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Metric lines fed to the generator and reused by the templates.
#[derive(Debug, Clone, Default, PartialEq)]
struct Metrics {
    /// (column, 0.9 quantile, 0.1 quantile)
    quantiles: Vec<(String, f64, f64)>,
    /// (column, count of most common value, share of rows in percent)
    top_values: Vec<(String, usize, f64)>,
    /// (column, skewness)
    skewness: Vec<(String, f64)>,
    /// (method, count, percentage)
    anomalies: Vec<(String, usize, f64)>,
}

impl Metrics {
    fn collect(
        table: &Table,
        concentration: &ConcentrationReport,
        anomalies: &AnomalyReport,
    ) -> Self {
        let mut metrics = Metrics::default();
        for name in concentration.numeric_concentration.keys() {
            let Some(column) = table.column(name) else {
                continue;
            };
            let values = column.numeric_values();
            if let (Some(high), Some(low)) =
                (stats::quantile(&values, 0.9), stats::quantile(&values, 0.1))
            {
                metrics.quantiles.push((name.to_string(), high, low));
            }
            if let Some(skew) = stats::skewness(&values) {
                metrics.skewness.push((name.to_string(), skew));
            }
        }
        for name in concentration.categorical_concentration.keys() {
            let Some(column) = table.column(name) else {
                continue;
            };
            let counts = ValueCounts::from_column(column);
            if let Some((_, count)) = counts.items().first() {
                metrics
                    .top_values
                    .push((name.to_string(), *count, counts.share(*count) * 100.0));
            }
        }
        if let Some(detection) = anomalies.detection() {
            for outcome in &detection.outcomes {
                metrics.anomalies.push((
                    outcome.method.to_string(),
                    outcome.detected.count,
                    outcome.detected.percentage,
                ));
            }
        }
        metrics
    }

    fn concentration_lines(&self) -> String {
        let mut lines = Vec::new();
        for (column, high, low) in &self.quantiles {
            lines.push(format!("{column}: Top 10% > {high:.2}, Bottom 10% < {low:.2}"));
        }
        for (column, count, share) in &self.top_values {
            lines.push(format!(
                "{column}: Most common value appears {count} times ({share:.1}%)"
            ));
        }
        lines.join("\n")
    }

    fn anomaly_lines(&self) -> String {
        self.anomalies
            .iter()
            .map(|(method, count, pct)| format!("{method}: {count} anomalies ({pct:.1}%)"))
            .join("\n")
    }

    fn recommendation_lines(&self) -> String {
        let skew = self
            .skewness
            .iter()
            .map(|(column, skew)| format!("{column}: Skewness = {skew:.2}"));
        let anomalies = self
            .anomalies
            .iter()
            .map(|(method, count, pct)| format!("Anomalies ({method}): {count} ({pct:.1}%)"));
        skew.chain(anomalies).join("\n")
    }

    fn fallback_concentration(&self) -> Vec<String> {
        let numeric = self.quantiles.iter().map(|(column, high, low)| {
            format!(
                "Column '{column}' shows high concentration: top 10% values are above {high:.2}, while bottom 10% are below {low:.2}"
            )
        });
        let categorical = self.top_values.iter().map(|(column, count, share)| {
            format!(
                "Column '{column}' has high concentration: most common value appears {count} times ({share:.1}% of total)"
            )
        });
        numeric.chain(categorical).take(MAX_ITEMS).collect()
    }

    fn fallback_anomalies(&self) -> Vec<String> {
        self.anomalies
            .iter()
            .map(|(method, count, pct)| {
                format!(
                    "Anomaly detection method '{method}' identified {count} anomalies ({pct:.1}% of total data)"
                )
            })
            .take(MAX_ITEMS)
            .collect()
    }

    fn fallback_recommendations(&self) -> Vec<String> {
        let skewed = self
            .skewness
            .iter()
            .filter(|(_, skew)| skew.abs() > SKEW_LIMIT)
            .map(|(column, skew)| {
                format!(
                    "Consider normalizing or transforming column '{column}' due to high skewness ({skew:.2})"
                )
            });
        let flagged = self
            .anomalies
            .iter()
            .filter(|(_, _, pct)| *pct > ANOMALY_SHARE_LIMIT)
            .map(|(method, count, pct)| {
                format!(
                    "Investigate the {count} anomalies detected by {method} ({pct:.1}% of data)"
                )
            });
        skewed.chain(flagged).take(MAX_ITEMS).collect()
    }
}

pub struct InsightGenerator {
    generator: Box<dyn TextGenerator>,
}

impl Default for InsightGenerator {
    fn default() -> Self {
        Self::new(Box::new(DisabledGenerator))
    }
}

impl InsightGenerator {
    pub fn new(generator: Box<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub fn generate_insights(
        &self,
        table: &Table,
        concentration: &ConcentrationReport,
        anomalies: &AnomalyReport,
    ) -> Insights {
        let digest = build_digest(table, concentration, anomalies);
        let metrics = Metrics::collect(table, concentration, anomalies);

        let concentration_prompt = format!(
            "Analyze this data and provide exactly 3 insights about data concentration patterns.\n\
             Each insight should be specific and include actual numbers from the data.\n\n\
             Data:\n{digest}\n\
             Specific Concentration Metrics:\n{}\n\n\
             Write 3 numbered insights (1., 2., 3.) that describe the concentration patterns in the data.",
            metrics.concentration_lines()
        );
        let anomaly_prompt = format!(
            "Analyze this data and provide exactly 3 insights about detected anomalies.\n\
             Each insight should be specific and include actual numbers from the data.\n\n\
             Data:\n{digest}\n\
             Specific Anomaly Metrics:\n{}\n\n\
             Write 3 numbered insights (1., 2., 3.) that describe the anomalies found in the data.",
            metrics.anomaly_lines()
        );
        let recommendation_prompt = format!(
            "Analyze this data and provide exactly 3 recommendations.\n\
             Each recommendation should be specific and include actual numbers from the data.\n\n\
             Data:\n{digest}\n\
             Specific Metrics:\n{}\n\n\
             Write 3 numbered recommendations (1., 2., 3.) that address the issues found in the data.",
            metrics.recommendation_lines()
        );

        Insights {
            concentration_insights: self.category("concentration", &concentration_prompt, || {
                metrics.fallback_concentration()
            }),
            anomaly_insights: self.category("anomaly", &anomaly_prompt, || {
                metrics.fallback_anomalies()
            }),
            recommendations: self.category("recommendation", &recommendation_prompt, || {
                metrics.fallback_recommendations()
            }),
        }
    }

    fn category(
        &self,
        label: &str,
        prompt: &str,
        fallback: impl FnOnce() -> Vec<String>,
    ) -> Vec<String> {
        match self.generator.generate(prompt) {
            Ok(text) => {
                let items = parse_insights(&text);
                if items.len() >= MAX_ITEMS {
                    items
                } else {
                    debug!(
                        "Generator returned {} usable {label} item(s); using templates",
                        items.len()
                    );
                    fallback()
                }
            }
            Err(err) => {
                debug!("{label} insights: {err}; using templates");
                fallback()
            }
        }
    }
}

fn numbered_item() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^\d+\.\s*(.+)$").ok())
        .as_ref()
}

/// Extracts up to three numbered items (`1. ...`) from generated text,
/// dropping short items and items that echo prompt instructions.
pub fn parse_insights(text: &str) -> Vec<String> {
    let Some(pattern) = numbered_item() else {
        return Vec::new();
    };
    text.lines()
        .filter_map(|line| {
            pattern
                .captures(line.trim())
                .and_then(|caps| caps.get(1))
                .map(|item| item.as_str().trim().to_string())
        })
        .filter(|item| item.chars().count() > MIN_ITEM_LEN)
        .filter(|item| {
            let lowered = item.to_lowercase();
            !INSTRUCTION_WORDS.iter().any(|word| lowered.contains(word))
        })
        .take(MAX_ITEMS)
        .collect()
}

/// Plain-text summary of the table and both reports used as prompt context.
pub fn build_digest(
    table: &Table,
    concentration: &ConcentrationReport,
    anomalies: &AnomalyReport,
) -> String {
    let classification = classify(table);
    let summary = &concentration.summary;
    let mut digest = String::new();
    let _ = writeln!(digest, "Dataset Summary:");
    let _ = writeln!(digest, "- Total rows: {}", table.row_count());
    let _ = writeln!(digest, "- Total columns: {}", table.column_count());
    let _ = writeln!(digest, "- Numeric columns: {}", summary.numeric_columns);
    let _ = writeln!(digest, "- Categorical columns: {}", summary.categorical_columns);
    let _ = writeln!(digest, "\nColumn Names and Types:");
    for (name, kind) in classification.iter() {
        let _ = writeln!(digest, "- {name}: {kind}");
    }

    let _ = writeln!(digest, "\nNumeric Statistics:");
    for name in concentration.numeric_concentration.keys() {
        if let Some(column) = table.column(name) {
            let stats = ColumnStats::from_values(&column.numeric_values());
            let _ = writeln!(
                digest,
                "- {name}: count={} mean={} std={} min={} median={} max={}",
                stats.count,
                fmt_opt(stats.mean),
                fmt_opt(stats.std),
                fmt_opt(stats.min),
                fmt_opt(stats.median),
                fmt_opt(stats.max)
            );
        }
    }

    let _ = writeln!(digest, "\nTop 3 Values in Categorical Columns:");
    for name in concentration.categorical_concentration.keys() {
        if let Some(column) = table.column(name) {
            let counts = ValueCounts::from_column(column);
            let shares = counts
                .top(3)
                .iter()
                .map(|(value, count)| format!("{} ({:.1}%)", value, counts.share(*count) * 100.0))
                .join(", ");
            let _ = writeln!(digest, "- {name}: {shares}");
        }
    }

    let _ = writeln!(digest, "\nConcentration Analysis:");
    let _ = writeln!(digest, "{}", to_json(summary));
    let _ = writeln!(digest, "\nAnomaly Detection:");
    match anomalies.detection() {
        Some(detection) => {
            let _ = writeln!(digest, "{}", to_json(&detection.summary()));
        }
        None => {
            let _ = writeln!(digest, "{}", to_json(anomalies));
        }
    }
    digest
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.4}")).unwrap_or_else(|| "n/a".to_string())
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|err| format!("<unserializable: {err}>"))
}
