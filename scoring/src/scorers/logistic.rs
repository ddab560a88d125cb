//! Supervised pipeline: per-column standardisation followed by an
//! L2-regularised, class-balanced logistic regression.

use crate::{
    error::ScoringError,
    model::{FEATURE_COUNT, FeatureVector, ModelDescriptor},
    scorers::{Scorer, sigmoid},
};

pub const TRAINED_MODEL_NAME: &str = "diabetes_risk";

const GRADIENT_TOLERANCE: f64 = 1e-6;

/// Column-wise zero-mean / unit-variance transform. Columns without variance
/// keep a scale of 1 so they centre to zero instead of dividing by zero.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl StandardScaler {
    /// Population mean and standard deviation per column.
    pub fn fit(rows: &[&[f64]]) -> Result<Self, ScoringError> {
        let Some(first) = rows.first() else {
            return Err(ScoringError::EmptyInput);
        };
        let width = first.len();
        if rows.iter().any(|row| row.len() != width) {
            return Err(ScoringError::LengthMismatch);
        }

        let n = rows.len() as f64;
        let mut means = vec![0.0; width];
        for row in rows {
            for (mean, value) in means.iter_mut().zip(row.iter()) {
                *mean += value;
            }
        }
        means.iter_mut().for_each(|m| *m /= n);

        let mut scales = vec![0.0; width];
        for row in rows {
            for ((var, value), mean) in scales.iter_mut().zip(row.iter()).zip(means.iter()) {
                let d = value - mean;
                *var += d * d;
            }
        }
        for scale in scales.iter_mut() {
            let std = (*scale / n).sqrt();
            *scale = if std > 0.0 && std.is_finite() { std } else { 1.0 };
        }

        Ok(Self { means, scales })
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(self.scales.iter()))
            .map(|(x, (mean, scale))| (x - mean) / scale)
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LogisticRegressionParams {
    pub max_iter: usize,
    pub learning_rate: f64,
    /// Inverse regularisation strength.
    pub c: f64,
}

impl Default for LogisticRegressionParams {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            learning_rate: 0.1,
            c: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogisticRegression {
    pub weights: Vec<f64>,
    pub intercept: f64,
    pub iterations: usize,
}

impl LogisticRegression {
    /// Full-batch gradient descent on the weighted log-loss.
    ///
    /// Each sample is weighted `n / (2 * n_class)` so both classes contribute
    /// equally; the intercept is not regularised.
    pub fn fit(rows: &[Vec<f64>], labels: &[bool], params: LogisticRegressionParams) -> Result<Self, ScoringError> {
        if rows.is_empty() {
            return Err(ScoringError::EmptyInput);
        }
        if rows.len() != labels.len() {
            return Err(ScoringError::LengthMismatch);
        }
        let positives = labels.iter().filter(|l| **l).count();
        let negatives = labels.len() - positives;
        if positives == 0 || negatives == 0 {
            return Err(ScoringError::SingleClass);
        }

        let n = rows.len() as f64;
        let width = rows[0].len();
        let positive_weight = n / (2.0 * positives as f64);
        let negative_weight = n / (2.0 * negatives as f64);

        let mut weights = vec![0.0; width];
        let mut intercept = 0.0;
        let mut iterations = 0;

        for _ in 0..params.max_iter {
            iterations += 1;
            let mut grad_w = vec![0.0; width];
            let mut grad_b = 0.0;

            for (row, &label) in rows.iter().zip(labels.iter()) {
                let z = intercept + dot(&weights, row);
                let (target, sample_weight) = if label {
                    (1.0, positive_weight)
                } else {
                    (0.0, negative_weight)
                };
                let diff = sample_weight * (sigmoid(z) - target);
                for (g, x) in grad_w.iter_mut().zip(row.iter()) {
                    *g += diff * x;
                }
                grad_b += diff;
            }

            for (g, w) in grad_w.iter_mut().zip(weights.iter()) {
                *g = *g / n + w / (params.c * n);
            }
            grad_b /= n;

            for (w, g) in weights.iter_mut().zip(grad_w.iter()) {
                *w -= params.learning_rate * g;
            }
            intercept -= params.learning_rate * grad_b;

            let norm = (grad_w.iter().map(|g| g * g).sum::<f64>() + grad_b * grad_b).sqrt();
            if norm < GRADIENT_TOLERANCE {
                break;
            }
        }

        Ok(Self {
            weights,
            intercept,
            iterations,
        })
    }

    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        sigmoid(self.intercept + dot(&self.weights, row))
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// A fitted standardise-then-classify pipeline, immutable once built.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub scaler: StandardScaler,
    pub classifier: LogisticRegression,
    /// Successful trainings in this process, starting at 1.
    pub generation: u64,
    pub training_rows: usize,
}

impl TrainedModel {
    pub fn fit(
        samples: &[(FeatureVector, bool)],
        params: LogisticRegressionParams,
        generation: u64,
    ) -> Result<Self, ScoringError> {
        let raw: Vec<&[f64]> = samples.iter().map(|(v, _)| v.as_slice()).collect();
        let scaler = StandardScaler::fit(&raw)?;
        let rows: Vec<Vec<f64>> = raw.iter().map(|row| scaler.transform(row)).collect();
        let labels: Vec<bool> = samples.iter().map(|(_, label)| *label).collect();
        let classifier = LogisticRegression::fit(&rows, &labels, params)?;
        debug_assert_eq!(classifier.weights.len(), FEATURE_COUNT);

        Ok(Self {
            scaler,
            classifier,
            generation,
            training_rows: samples.len(),
        })
    }
}

impl Scorer for TrainedModel {
    fn predict_proba(&self, features: &FeatureVector) -> f64 {
        self.classifier.predict_proba(&self.scaler.transform(features.as_slice()))
    }

    fn descriptor(&self) -> ModelDescriptor {
        ModelDescriptor::new(TRAINED_MODEL_NAME, &format!("v1.{}", self.generation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaler_centres_and_scales() {
        let rows: Vec<&[f64]> = vec![&[1.0, 5.0], &[3.0, 5.0]];
        let scaler = StandardScaler::fit(&rows).unwrap();
        assert_eq!(scaler.means, vec![2.0, 5.0]);
        assert_eq!(scaler.scales, vec![1.0, 1.0]);
        assert_eq!(scaler.transform(&[3.0, 5.0]), vec![1.0, 0.0]);

        let rows: Vec<&[f64]> = vec![&[0.0], &[4.0]];
        let scaler = StandardScaler::fit(&rows).unwrap();
        assert_eq!(scaler.scales, vec![2.0]);
    }

    #[test]
    fn separable_data_is_learned() {
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![if i % 2 == 0 { -1.0 } else { 1.0 } + (i as f64) * 0.001])
            .collect();
        let labels: Vec<bool> = (0..40).map(|i| i % 2 == 1).collect();
        let model = LogisticRegression::fit(&rows, &labels, LogisticRegressionParams::default()).unwrap();
        assert!(model.weights[0] > 0.0);
        assert!(model.predict_proba(&[1.0]) > 0.8);
        assert!(model.predict_proba(&[-1.0]) < 0.2);
    }

    #[test]
    fn class_balance_keeps_minority_visible() {
        // 45 negatives around -0.2, 5 positives around +1.
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..45 {
            rows.push(vec![-0.2 + (i as f64) * 0.001]);
            labels.push(false);
        }
        for i in 0..5 {
            rows.push(vec![1.0 + (i as f64) * 0.01]);
            labels.push(true);
        }
        let model = LogisticRegression::fit(&rows, &labels, LogisticRegressionParams::default()).unwrap();
        assert!(model.predict_proba(&[1.0]) > 0.5);
    }

    #[test]
    fn single_class_is_rejected() {
        let rows = vec![vec![1.0], vec![2.0]];
        let result = LogisticRegression::fit(&rows, &[true, true], LogisticRegressionParams::default());
        assert!(matches!(result, Err(ScoringError::SingleClass)));
    }

    #[test]
    fn descriptor_carries_generation() {
        let samples: Vec<(FeatureVector, bool)> = (0..10)
            .map(|i| {
                let mut fields = [1.0; FEATURE_COUNT];
                fields[1] = 20.0 + i as f64;
                (FeatureVector(fields), i >= 5)
            })
            .collect();
        let model = TrainedModel::fit(&samples, LogisticRegressionParams::default(), 3).unwrap();
        assert_eq!(model.descriptor().version, "v1.3");
        assert_eq!(model.training_rows, 10);
        let high = model.predict_proba(&samples[9].0);
        let low = model.predict_proba(&samples[0].0);
        assert!(high > low);
    }
}
