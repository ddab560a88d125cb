use crate::{
    model::{FeatureColumn, FeatureVector, ModelDescriptor},
    scorers::{Scorer, sigmoid},
};

pub const RULE_BASED_MODEL_NAME: &str = "rule_based";
pub const RULE_BASED_MODEL_VERSION: &str = "v1";

/// Keeps a probability strictly inside (0, 1) when the logistic saturates.
const PROBABILITY_FLOOR: f64 = 1e-12;

/// (column, weight, normalisation denominator). Weights sum to 1.0.
pub const RULE_WEIGHTS: [(FeatureColumn, f64, f64); 8] = [
    (FeatureColumn::Bmi, 0.15, 30.0),
    (FeatureColumn::SystolicBp, 0.15, 140.0),
    (FeatureColumn::DiastolicBp, 0.10, 90.0),
    (FeatureColumn::CholHdlRatio, 0.15, 5.0),
    (FeatureColumn::Triglycerides, 0.10, 200.0),
    (FeatureColumn::Smoker, 0.20, 1.0),
    (FeatureColumn::BpStage, 0.05, 4.0),
    (FeatureColumn::BmiCategory, 0.10, 3.0),
];

/// Fixed weighted heuristic used whenever no trained model is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedScorer;

impl RuleBasedScorer {
    pub fn new() -> Self {
        Self
    }

    /// Weighted sum before the logistic squash. Terms are accumulated in
    /// table order so the result is bit-reproducible.
    pub fn linear_term(&self, features: &FeatureVector) -> f64 {
        RULE_WEIGHTS
            .iter()
            .fold(0.0, |acc, (column, weight, denominator)| {
                acc + weight * (features.get(*column) / denominator)
            })
    }
}

impl Scorer for RuleBasedScorer {
    fn predict_proba(&self, features: &FeatureVector) -> f64 {
        sigmoid(self.linear_term(features)).clamp(PROBABILITY_FLOOR, 1.0 - PROBABILITY_FLOOR)
    }

    fn descriptor(&self) -> ModelDescriptor {
        ModelDescriptor::new(RULE_BASED_MODEL_NAME, RULE_BASED_MODEL_VERSION)
    }
}
