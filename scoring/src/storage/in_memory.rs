use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::error::ScoringError;
use crate::model::*;
use crate::storage::{CommonStorage, RecordStorage};

#[derive(Debug, Default)]
struct State {
    patients: HashMap<ModelId, Patient>,
    observations: BTreeMap<ModelId, Observation>,
    labels: BTreeMap<ModelId, OutcomeLabel>,
    scores: Vec<RiskScoreRecord>,
    next_patient_id: ModelId,
    next_observation_id: ModelId,
    next_label_id: ModelId,
    next_score_id: ModelId,
}

impl State {
    fn next_id(counter: &mut ModelId) -> ModelId {
        *counter += 1;
        *counter
    }

    fn latest_observation(&self, patient_id: ModelId) -> Option<&Observation> {
        self.observations
            .values()
            .rev()
            .find(|observation| observation.patient_id == patient_id)
    }

    fn latest_observations(&self) -> Result<Vec<(Observation, Patient)>, GenericError> {
        let mut latest: BTreeMap<ModelId, &Observation> = BTreeMap::new();
        for observation in self.observations.values() {
            latest.insert(observation.patient_id, observation);
        }
        latest
            .into_iter()
            .map(|(patient_id, observation)| -> Result<(Observation, Patient), GenericError> {
                let patient = self
                    .patients
                    .get(&patient_id)
                    .ok_or(ScoringError::PatientNotFound(patient_id))?;
                Ok((observation.clone(), patient.clone()))
            })
            .collect()
    }
}

/// Process-local store. Every call takes the lock once, so each call sees one
/// consistent snapshot and every append is atomic.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    state: RwLock<State>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn score_count(&self) -> usize {
        self.state.read().await.scores.len()
    }
}

#[async_trait]
impl CommonStorage for InMemoryStorage {
    async fn latest_observation(
        &self,
        patient_id: ModelId,
    ) -> Result<Option<(Observation, Patient)>, GenericError> {
        let state = self.state.read().await;
        let Some(observation) = state.latest_observation(patient_id) else {
            return Ok(None);
        };
        let patient = state
            .patients
            .get(&patient_id)
            .ok_or(ScoringError::PatientNotFound(patient_id))?;
        Ok(Some((observation.clone(), patient.clone())))
    }

    async fn latest_observations(&self) -> Result<Vec<(Observation, Patient)>, GenericError> {
        self.state.read().await.latest_observations()
    }

    async fn get_labels(&self) -> Result<Vec<OutcomeLabel>, GenericError> {
        Ok(self.state.read().await.labels.values().cloned().collect())
    }

    async fn training_snapshot(&self) -> Result<TrainingSnapshot, GenericError> {
        let state = self.state.read().await;
        Ok(TrainingSnapshot {
            latest: state.latest_observations()?,
            labels: state.labels.values().cloned().collect(),
        })
    }

    async fn append_score(&self, score: &NewRiskScore) -> Result<RiskScoreRecord, GenericError> {
        let mut state = self.state.write().await;
        if !state.patients.contains_key(&score.patient_id) {
            return Err(ScoringError::PatientNotFound(score.patient_id).into());
        }
        let id = State::next_id(&mut state.next_score_id);
        let record = RiskScoreRecord::from_new(id, score);
        state.scores.push(record.clone());
        Ok(record)
    }

    async fn append_scores(&self, scores: &[NewRiskScore]) -> Result<usize, GenericError> {
        let mut state = self.state.write().await;
        if let Some(missing) = scores.iter().find(|s| !state.patients.contains_key(&s.patient_id)) {
            return Err(ScoringError::PatientNotFound(missing.patient_id).into());
        }
        for score in scores {
            let id = State::next_id(&mut state.next_score_id);
            state.scores.push(RiskScoreRecord::from_new(id, score));
        }
        Ok(scores.len())
    }

    async fn risk_queue(&self, filter: &RiskQueueFilter) -> Result<RiskQueuePage, GenericError> {
        let state = self.state.read().await;
        Ok(filter.apply(state.scores.iter().cloned(), &state.patients))
    }

    async fn score_history(&self, patient_id: ModelId) -> Result<Vec<RiskScoreRecord>, GenericError> {
        let state = self.state.read().await;
        Ok(state
            .scores
            .iter()
            .filter(|record| record.patient_id == patient_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RecordStorage for InMemoryStorage {
    async fn save_patient(&self, patient: &Patient) -> Result<ModelId, GenericError> {
        let mut state = self.state.write().await;
        let id = if patient.id == 0 {
            loop {
                let candidate = State::next_id(&mut state.next_patient_id);
                if !state.patients.contains_key(&candidate) {
                    break candidate;
                }
            }
        } else {
            patient.id
        };
        state.patients.insert(id, Patient { id, ..patient.clone() });
        Ok(id)
    }

    async fn save_observation(&self, observation: &Observation) -> Result<ModelId, GenericError> {
        let mut state = self.state.write().await;
        if !state.patients.contains_key(&observation.patient_id) {
            return Err(ScoringError::PatientNotFound(observation.patient_id).into());
        }
        let id = State::next_id(&mut state.next_observation_id);
        state.observations.insert(id, Observation { id, ..observation.clone() });
        Ok(id)
    }

    async fn save_label(&self, label: &OutcomeLabel) -> Result<ModelId, GenericError> {
        let mut state = self.state.write().await;
        if !state.patients.contains_key(&label.patient_id) {
            return Err(ScoringError::PatientNotFound(label.patient_id).into());
        }
        let existing = state
            .labels
            .values()
            .find(|stored| stored.key() == label.key())
            .map(|stored| stored.id);
        let id = match existing {
            Some(id) => id,
            None => State::next_id(&mut state.next_label_id),
        };
        state.labels.insert(id, OutcomeLabel { id, ..label.clone() });
        Ok(id)
    }
}
