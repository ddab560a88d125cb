use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::{
    features::FeatureExtractor,
    model::*,
    model_cache::{ModelCache, ModelLookup},
    scorers::{RuleBasedScorer, Scorer, ScoringStrategy},
    storage::CommonStorage,
};

/// Scores one patient from their latest observation and appends the record.
pub struct OnlineScoringService {
    storage: Arc<dyn CommonStorage>,
    cache: Arc<ModelCache>,
    extractor: FeatureExtractor,
    fallback: RuleBasedScorer,
}

impl OnlineScoringService {
    pub fn new(storage: Arc<dyn CommonStorage>, cache: Arc<ModelCache>) -> Self {
        info!("Initializing online scoring service");
        Self {
            storage,
            cache,
            extractor: FeatureExtractor::new(),
            fallback: RuleBasedScorer::new(),
        }
    }

    pub fn cache(&self) -> &Arc<ModelCache> {
        &self.cache
    }

    /// Learned model when one can be trained, rule-based otherwise.
    pub async fn strategy(&self) -> Result<ScoringStrategy, GenericError> {
        Ok(match self.cache.get_or_train().await? {
            ModelLookup::Trained(model) => ScoringStrategy::Learned(model),
            ModelLookup::Untrainable { .. } => ScoringStrategy::RuleBased(self.fallback),
        })
    }

    /// Returns `None` without writing anything when the patient has no observation.
    ///
    /// Each call appends a fresh record; earlier records are never touched.
    pub async fn score_patient(&self, patient_id: ModelId) -> Result<Option<RiskScoreRecord>, GenericError> {
        let Some((observation, patient)) = self.storage.latest_observation(patient_id).await? else {
            debug!(patient_id, "No observation, skipping online scoring");
            return Ok(None);
        };

        let features = self.extractor.extract_now(&observation, &patient);
        let strategy = self.strategy().await?;
        let score = strategy.predict_proba(&features);
        let band = RiskBand::from_score(score);

        let new_score = NewRiskScore::new(
            patient_id,
            score,
            band == RiskBand::High,
            Some(strategy.descriptor()),
            Utc::now(),
        );
        let record = self.storage.append_score(&new_score).await?;

        metrics::counter!("risk_online_scores_total", "strategy" => strategy.label()).increment(1);
        info!(
            patient_id,
            observation_id = observation.id,
            score,
            band = %band,
            strategy = strategy.label(),
            "Scored patient"
        );
        Ok(Some(record))
    }
}
