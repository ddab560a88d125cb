use crate::model::*;
use async_trait::async_trait;

/// Read side plus score appends, as consumed by the scoring engine.
///
/// Implementations must give a consistent point-in-time view inside each call
/// and make `append_scores` all-or-nothing.
#[async_trait]
pub trait CommonStorage: Send + Sync {
    /// The observation with the highest id for `patient_id`, with its patient.
    async fn latest_observation(
        &self,
        patient_id: ModelId,
    ) -> Result<Option<(Observation, Patient)>, GenericError>;

    /// Latest observation of every patient that has one, ordered by patient id.
    async fn latest_observations(&self) -> Result<Vec<(Observation, Patient)>, GenericError>;

    async fn get_labels(&self) -> Result<Vec<OutcomeLabel>, GenericError>;

    /// `latest_observations` and `get_labels` from the same point in time.
    async fn training_snapshot(&self) -> Result<TrainingSnapshot, GenericError>;

    async fn append_score(&self, score: &NewRiskScore) -> Result<RiskScoreRecord, GenericError>;

    /// Appends every score or none of them. Returns the number written.
    async fn append_scores(&self, scores: &[NewRiskScore]) -> Result<usize, GenericError>;

    async fn risk_queue(&self, filter: &RiskQueueFilter) -> Result<RiskQueuePage, GenericError>;

    /// Every record of a patient, oldest first.
    async fn score_history(&self, patient_id: ModelId) -> Result<Vec<RiskScoreRecord>, GenericError>;
}

/// Write side used by the record collaborators (intake, labelling).
#[async_trait]
pub trait RecordStorage: Send + Sync {
    /// Stores a patient; an id of 0 asks the store to assign one.
    async fn save_patient(&self, patient: &Patient) -> Result<ModelId, GenericError>;

    /// Stores a new observation. The provided id is ignored.
    async fn save_observation(&self, observation: &Observation) -> Result<ModelId, GenericError>;

    /// Creates the label or updates the one with the same
    /// (patient, reference date, horizon). Returns the label id.
    async fn save_label(&self, label: &OutcomeLabel) -> Result<ModelId, GenericError>;
}
