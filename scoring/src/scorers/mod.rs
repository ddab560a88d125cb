pub mod logistic;
pub mod rule_based;

pub use logistic::*;
pub use rule_based::*;

use std::sync::Arc;

use crate::model::{FeatureVector, ModelDescriptor};

/// Shared scoring contract: feature vector in, probability out.
pub trait Scorer: Send + Sync {
    fn predict_proba(&self, features: &FeatureVector) -> f64;

    fn descriptor(&self) -> ModelDescriptor;
}

/// The strategy picked for one online scoring call.
///
/// Chosen once per call from the cache lookup, never by inspecting types.
#[derive(Debug, Clone)]
pub enum ScoringStrategy {
    Learned(Arc<TrainedModel>),
    RuleBased(RuleBasedScorer),
}

impl ScoringStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            ScoringStrategy::Learned(_) => "learned",
            ScoringStrategy::RuleBased(_) => "rule_based",
        }
    }
}

impl Scorer for ScoringStrategy {
    fn predict_proba(&self, features: &FeatureVector) -> f64 {
        match self {
            ScoringStrategy::Learned(model) => model.predict_proba(features),
            ScoringStrategy::RuleBased(scorer) => scorer.predict_proba(features),
        }
    }

    fn descriptor(&self) -> ModelDescriptor {
        match self {
            ScoringStrategy::Learned(model) => model.descriptor(),
            ScoringStrategy::RuleBased(scorer) => scorer.descriptor(),
        }
    }
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}
