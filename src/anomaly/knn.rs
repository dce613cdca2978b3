//! Nearest-neighbour distance scorer.
//!
//! A row's score is its Euclidean distance to the k-th nearest other row.
//! Points far from every neighbourhood score high. Neighbours are found by
//! brute force, which is quadratic in the row count.

use std::cmp::Ordering;

use super::{DetectionMethod, OutlierScorer};
use crate::error::ProfileError;

#[derive(Debug, Clone, PartialEq)]
pub struct KnnScorer {
    k: usize,
    contamination: f64,
}

impl KnnScorer {
    pub fn new(k: usize, contamination: f64) -> Self {
        Self { k, contamination }
    }
}

impl OutlierScorer for KnnScorer {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::Knn
    }

    fn contamination(&self) -> f64 {
        self.contamination
    }

    fn score(&self, matrix: &[Vec<f64>]) -> Result<Vec<f64>, ProfileError> {
        let n = matrix.len();
        if n < 2 {
            return Err(ProfileError::InsufficientData {
                min_required: 2,
                actual: n,
            });
        }
        // k is clamped so every row has enough neighbours
        let k = self.k.clamp(1, n - 1);
        let mut scores = Vec::with_capacity(n);
        let mut distances = Vec::with_capacity(n - 1);
        for (i, point) in matrix.iter().enumerate() {
            distances.clear();
            distances.extend(
                matrix
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, other)| euclidean(point, other)),
            );
            distances.select_nth_unstable_by(k - 1, |a, b| {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            });
            scores.push(distances[k - 1]);
        }
        Ok(scores)
    }
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolated_point_scores_highest() {
        let mut matrix = (0..20)
            .map(|i| vec![(i % 5) as f64 * 0.1, (i % 4) as f64 * 0.1])
            .collect::<Vec<_>>();
        matrix.push(vec![10.0, 10.0]);
        let scores = KnnScorer::new(5, 0.1).score(&matrix).unwrap();
        let max_idx = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert_eq!(max_idx, 20);
    }

    #[test]
    fn k_is_clamped_to_available_neighbours() {
        let matrix = vec![vec![0.0], vec![1.0], vec![3.0]];
        let scores = KnnScorer::new(5, 0.1).score(&matrix).unwrap();
        assert_eq!(scores, vec![3.0, 2.0, 3.0]);
    }

    #[test]
    fn single_row_is_insufficient() {
        let err = KnnScorer::new(5, 0.1).score(&[vec![1.0]]).unwrap_err();
        assert!(matches!(err, ProfileError::InsufficientData { .. }));
    }
}
