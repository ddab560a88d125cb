use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Local, NaiveDate};
use common::config::ScoringConfig;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    features::FeatureExtractor,
    model::*,
    scorers::{LogisticRegressionParams, TrainedModel},
    storage::CommonStorage,
};

/// Result of [`ModelCache::get_or_train`].
#[derive(Debug, Clone)]
pub enum ModelLookup {
    Trained(Arc<TrainedModel>),
    /// Too few pairs or a single class; callers fall back to the rule-based scorer.
    Untrainable { pairs: usize, positives: usize },
}

/// Pairs every patient's latest observation with that patient's label.
///
/// With several labels per patient the latest reference date wins, undated
/// labels rank oldest and ties go to the highest label id. Patients without
/// a label are left out.
pub fn join_training_pairs(
    extractor: &FeatureExtractor,
    latest: &[(Observation, Patient)],
    labels: &[OutcomeLabel],
    today: NaiveDate,
) -> Vec<(FeatureVector, bool)> {
    let mut chosen: HashMap<ModelId, &OutcomeLabel> = HashMap::new();
    for label in labels {
        let replace = chosen.get(&label.patient_id).map_or(true, |current| {
            (current.reference_date, current.id) < (label.reference_date, label.id)
        });
        if replace {
            chosen.insert(label.patient_id, label);
        }
    }

    latest
        .iter()
        .filter_map(|(observation, patient)| {
            chosen
                .get(&patient.id)
                .map(|label| (extractor.extract(observation, patient, today), label.label))
        })
        .collect()
}

/// Lazily trained classifier shared by every online scoring call.
///
/// The slot lock is held for the whole training run, so `invalidate` waits for
/// an in-flight training and a half-trained model is never installed.
pub struct ModelCache {
    storage: Arc<dyn CommonStorage>,
    extractor: FeatureExtractor,
    config: ScoringConfig,
    slot: Mutex<Option<Arc<TrainedModel>>>,
    generation: AtomicU64,
}

impl ModelCache {
    pub fn new(storage: Arc<dyn CommonStorage>, config: ScoringConfig) -> Self {
        Self {
            storage,
            extractor: FeatureExtractor::new(),
            config,
            slot: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    fn params(&self) -> LogisticRegressionParams {
        LogisticRegressionParams {
            max_iter: self.config.max_iter,
            learning_rate: self.config.learning_rate,
            c: self.config.l2_penalty,
        }
    }

    pub async fn get_or_train(&self) -> Result<ModelLookup, GenericError> {
        let mut slot = self.slot.lock().await;
        if let Some(model) = slot.as_ref() {
            return Ok(ModelLookup::Trained(Arc::clone(model)));
        }

        let snapshot = self.storage.training_snapshot().await?;
        let samples = join_training_pairs(
            &self.extractor,
            &snapshot.latest,
            &snapshot.labels,
            Local::now().date_naive(),
        );

        let positives = samples.iter().filter(|(_, label)| *label).count();
        if samples.len() < self.config.min_training_labels || positives == 0 || positives == samples.len() {
            debug!(
                pairs = samples.len(),
                positives,
                min = self.config.min_training_labels,
                "Training preconditions not met"
            );
            return Ok(ModelLookup::Untrainable {
                pairs: samples.len(),
                positives,
            });
        }

        let generation = self.generation.load(Ordering::SeqCst) + 1;
        let params = self.params();
        let pairs = samples.len();
        let trained =
            tokio::task::spawn_blocking(move || TrainedModel::fit(&samples, params, generation)).await??;
        let model = Arc::new(trained);
        self.generation.store(generation, Ordering::SeqCst);
        *slot = Some(Arc::clone(&model));

        metrics::counter!("risk_model_trainings_total").increment(1);
        info!(
            generation,
            pairs,
            positives,
            iterations = model.classifier.iterations,
            "Trained risk model"
        );
        Ok(ModelLookup::Trained(model))
    }

    /// Drops the cached model. A no-op when nothing is cached.
    pub async fn invalidate(&self) {
        let mut slot = self.slot.lock().await;
        match slot.take() {
            Some(model) => {
                metrics::counter!("risk_model_invalidations_total").increment(1);
                info!(generation = model.generation, "Invalidated cached risk model");
            }
            None => debug!("Invalidate called with no cached model"),
        }
    }

    pub async fn is_cached(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Number of successful trainings so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dated(id: ModelId, patient_id: ModelId, label: bool, date: Option<NaiveDate>) -> OutcomeLabel {
        OutcomeLabel {
            reference_date: date,
            ..OutcomeLabel::new(id, patient_id, label)
        }
    }

    #[test]
    fn latest_reference_date_wins() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let latest = vec![
            (Observation::empty(10, 1), Patient::new(1, "A", "A")),
            (Observation::empty(11, 2), Patient::new(2, "B", "B")),
            (Observation::empty(12, 3), Patient::new(3, "C", "C")),
        ];
        let labels = vec![
            dated(1, 1, true, NaiveDate::from_ymd_opt(2024, 1, 1)),
            dated(2, 1, false, NaiveDate::from_ymd_opt(2023, 1, 1)),
            dated(3, 2, true, None),
            dated(4, 2, false, None),
        ];

        let pairs = join_training_pairs(&FeatureExtractor::new(), &latest, &labels, today);
        assert_eq!(pairs.len(), 2);
        assert!(pairs[0].1, "dated 2024 label should beat 2023");
        assert!(!pairs[1].1, "undated tie should go to the highest id");
    }

    #[test]
    fn undated_label_ranks_oldest() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let latest = vec![(Observation::empty(1, 1), Patient::new(1, "A", "A"))];
        let labels = vec![
            dated(9, 1, false, None),
            dated(2, 1, true, NaiveDate::from_ymd_opt(2020, 1, 1)),
        ];
        let pairs = join_training_pairs(&FeatureExtractor::new(), &latest, &labels, today);
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].1);
    }
}
