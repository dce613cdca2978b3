//! Isolation forest scorer.
//!
//! Each tree recursively splits a random subsample on a random feature at a
//! random threshold. Outliers are isolated after few splits, so a short
//! average path length maps to a high score:
//!
//! `s(x) = 2^(-E[h(x)] / c(ψ))`, with `c(n) = 2H(n-1) - 2(n-1)/n`.
//!
//! Scores lie in (0, 1]; values near 1 are anomalous, values around 0.5 are
//! unremarkable. The generator is seeded, so a given table always scores the
//! same way.

use rand::{Rng, SeedableRng, seq::index};
use rand_chacha::ChaCha8Rng;

use super::{DetectionMethod, OutlierScorer};
use crate::error::ProfileError;

const EULER_GAMMA: f64 = 0.577_215_664_9;

#[derive(Debug, Clone, PartialEq)]
pub struct IsolationForestScorer {
    n_estimators: usize,
    max_samples: usize,
    seed: u64,
    contamination: f64,
}

impl IsolationForestScorer {
    pub fn new(n_estimators: usize, max_samples: usize, seed: u64, contamination: f64) -> Self {
        Self {
            n_estimators,
            max_samples,
            seed,
            contamination,
        }
    }
}

impl OutlierScorer for IsolationForestScorer {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::IsolationForest
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
        let features = matrix[0].len();
        if features == 0 {
            return Err(ProfileError::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }
        if self.n_estimators == 0 {
            return Err(ProfileError::invalid_parameter(
                "forest_estimators",
                self.n_estimators,
                "must be at least 1",
            ));
        }

        let sample_size = self.max_samples.max(2).min(n);
        let max_depth = (sample_size as f64).log2().ceil() as usize;
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let trees = (0..self.n_estimators)
            .map(|_| {
                let subsample = index::sample(&mut rng, n, sample_size)
                    .into_iter()
                    .map(|idx| matrix[idx].as_slice())
                    .collect::<Vec<_>>();
                IsolationTree::grow(&subsample, features, max_depth, &mut rng)
            })
            .collect::<Vec<_>>();

        let normalizer = average_path_length(sample_size);
        let scores = matrix
            .iter()
            .map(|point| {
                let mean_path = trees
                    .iter()
                    .map(|tree| tree.path_length(point, 0))
                    .sum::<f64>()
                    / trees.len() as f64;
                if normalizer > 0.0 {
                    2f64.powf(-mean_path / normalizer)
                } else {
                    0.5
                }
            })
            .collect();
        Ok(scores)
    }
}

enum IsolationTree {
    Split {
        feature: usize,
        threshold: f64,
        left: Box<IsolationTree>,
        right: Box<IsolationTree>,
    },
    Leaf {
        size: usize,
    },
}

impl IsolationTree {
    fn grow(points: &[&[f64]], features: usize, depth_left: usize, rng: &mut ChaCha8Rng) -> Self {
        if points.len() <= 1 || depth_left == 0 {
            return Self::Leaf { size: points.len() };
        }
        let feature = rng.gen_range(0..features);
        let (min, max) = points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |acc, p| {
            (acc.0.min(p[feature]), acc.1.max(p[feature]))
        });
        if max <= min {
            return Self::Leaf { size: points.len() };
        }
        let threshold = rng.gen_range(min..max);
        let (left, right): (Vec<&[f64]>, Vec<&[f64]>) =
            points.iter().copied().partition(|p| p[feature] < threshold);
        if left.is_empty() || right.is_empty() {
            return Self::Leaf { size: points.len() };
        }
        Self::Split {
            feature,
            threshold,
            left: Box::new(Self::grow(&left, features, depth_left - 1, rng)),
            right: Box::new(Self::grow(&right, features, depth_left - 1, rng)),
        }
    }

    fn path_length(&self, point: &[f64], depth: usize) -> f64 {
        match self {
            Self::Leaf { size } => depth as f64 + average_path_length(*size),
            Self::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if point[*feature] < *threshold {
                    left.path_length(point, depth + 1)
                } else {
                    right.path_length(point, depth + 1)
                }
            }
        }
    }
}

/// Average path length of an unsuccessful binary search tree lookup over
/// `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}
