//! Column standardization to zero mean and unit population variance.

use crate::{error::ProfileError, stats};

/// Per-column location and scale fitted on one table.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    /// Fits one mean and population standard deviation per column. A column
    /// with zero variance cannot be standardized and is reported by name.
    pub fn fit(columns: &[(&str, &[f64])]) -> Result<Self, ProfileError> {
        let mut means = Vec::with_capacity(columns.len());
        let mut scales = Vec::with_capacity(columns.len());
        for (name, values) in columns {
            let (Some(mean), Some(scale)) =
                (stats::mean(values), stats::population_std_dev(values))
            else {
                return Err(ProfileError::InsufficientData {
                    min_required: 1,
                    actual: values.len(),
                });
            };
            if scale == 0.0 || !scale.is_finite() {
                return Err(ProfileError::DegenerateColumn {
                    column: name.to_string(),
                });
            }
            means.push(mean);
            scales.push(scale);
        }
        Ok(Self { means, scales })
    }

    /// Row-major matrix of standardized values.
    pub fn transform(&self, columns: &[(&str, &[f64])]) -> Result<Vec<Vec<f64>>, ProfileError> {
        if columns.len() != self.means.len() {
            return Err(ProfileError::DimensionMismatch {
                expected: self.means.len(),
                actual: columns.len(),
            });
        }
        let rows = columns.first().map(|(_, values)| values.len()).unwrap_or(0);
        let mut matrix = vec![Vec::with_capacity(columns.len()); rows];
        for (col_idx, (_, values)) in columns.iter().enumerate() {
            if values.len() != rows {
                return Err(ProfileError::DimensionMismatch {
                    expected: rows,
                    actual: values.len(),
                });
            }
            for (row, value) in matrix.iter_mut().zip(values.iter()) {
                row.push((value - self.means[col_idx]) / self.scales[col_idx]);
            }
        }
        Ok(matrix)
    }

    pub fn fit_transform(columns: &[(&str, &[f64])]) -> Result<Vec<Vec<f64>>, ProfileError> {
        Self::fit(columns)?.transform(columns)
    }
}
