//! Descriptive statistics over numeric columns.
//!
//! Mean and variance use two passes over the data (mean first, then squared
//! deviations), which keeps the variance non-negative and avoids the
//! cancellation a running sum of squares suffers on large offsets.

use std::cmp::Ordering;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStats {
    #[serde(skip)]
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub median: Option<f64>,
}

impl ColumnStats {
    pub fn from_values(values: &[f64]) -> Self {
        let sorted = sorted_ascending(values);
        Self {
            count: values.len(),
            mean: mean(values),
            std: std_dev(values),
            min: sorted.first().copied(),
            max: sorted.last().copied(),
            median: median_of_sorted(&sorted),
        }
    }
}

pub fn sorted_ascending(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    sorted
}

pub fn sum(values: &[f64]) -> f64 {
    // Neumaier compensated summation
    let mut total = 0.0_f64;
    let mut compensation = 0.0_f64;
    for &value in values {
        let t = total + value;
        if total.abs() >= value.abs() {
            compensation += (total - t) + value;
        } else {
            compensation += (value - t) + total;
        }
        total = t;
    }
    total + compensation
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(sum(values) / values.len() as f64)
    }
}

fn squared_deviations(values: &[f64], center: f64) -> f64 {
    let deviations = values
        .iter()
        .map(|v| (v - center) * (v - center))
        .collect::<Vec<_>>();
    sum(&deviations)
}

/// Sample standard deviation (n - 1 denominator); `None` below two values.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let center = mean(values)?;
    let variance = squared_deviations(values, center) / (values.len() as f64 - 1.0);
    Some(variance.max(0.0).sqrt())
}

/// Population standard deviation (n denominator).
pub fn population_std_dev(values: &[f64]) -> Option<f64> {
    let center = mean(values)?;
    let variance = squared_deviations(values, center) / values.len() as f64;
    Some(variance.max(0.0).sqrt())
}

pub fn median(values: &[f64]) -> Option<f64> {
    median_of_sorted(&sorted_ascending(values))
}

fn median_of_sorted(sorted: &[f64]) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let mid = sorted.len() / 2;
    if sorted.len().is_multiple_of(2) {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Quantile with linear interpolation between closest ranks, `q` in [0, 1].
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    quantile_of_sorted(&sorted_ascending(values), q)
}

pub fn quantile_of_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Adjusted Fisher-Pearson sample skewness (G1). `None` below three values
/// and 0 for a constant column.
pub fn skewness(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 3 {
        return None;
    }
    let center = mean(values)?;
    let n_f = n as f64;
    let m2 = squared_deviations(values, center) / n_f;
    if m2 == 0.0 {
        return Some(0.0);
    }
    let cubes = values
        .iter()
        .map(|v| (v - center).powi(3))
        .collect::<Vec<_>>();
    let m3 = sum(&cubes) / n_f;
    let g1 = m3 / m2.powf(1.5);
    Some(g1 * (n_f * (n_f - 1.0)).sqrt() / (n_f - 2.0))
}
