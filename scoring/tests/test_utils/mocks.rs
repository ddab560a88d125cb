use async_trait::async_trait;
use mockall::mock;

use scoring::{
    model::*,
    queue::QueueService,
    storage::CommonStorage,
};

mock! {
    pub CommonStorage {}

    #[async_trait]
    impl CommonStorage for CommonStorage {
        async fn latest_observation(&self, patient_id: ModelId) -> Result<Option<(Observation, Patient)>, GenericError>;
        async fn latest_observations(&self) -> Result<Vec<(Observation, Patient)>, GenericError>;
        async fn get_labels(&self) -> Result<Vec<OutcomeLabel>, GenericError>;
        async fn training_snapshot(&self) -> Result<TrainingSnapshot, GenericError>;
        async fn append_score(&self, score: &NewRiskScore) -> Result<RiskScoreRecord, GenericError>;
        async fn append_scores(&self, scores: &[NewRiskScore]) -> Result<usize, GenericError>;
        async fn risk_queue(&self, filter: &RiskQueueFilter) -> Result<RiskQueuePage, GenericError>;
        async fn score_history(&self, patient_id: ModelId) -> Result<Vec<RiskScoreRecord>, GenericError>;
    }
}

mock! {
    pub Queue {}

    #[async_trait]
    impl QueueService for Queue {
        async fn enqueue(&self, event: CommitEvent) -> Result<(), GenericError>;
        async fn fetch_next(&self, number: usize) -> Result<Vec<CommitEvent>, GenericError>;
        async fn len(&self) -> Result<usize, GenericError>;
    }
}

/// Storage that serves one patient with `observation` and rejects every write.
pub fn failing_writes(observation: Observation, patient: Patient) -> MockCommonStorage {
    let mut storage = MockCommonStorage::new();
    storage
        .expect_latest_observation()
        .returning(move |_| Ok(Some((observation.clone(), patient.clone()))));
    storage.expect_latest_observations().returning(|| Ok(Vec::new()));
    storage.expect_get_labels().returning(|| Ok(Vec::new()));
    storage
        .expect_training_snapshot()
        .returning(|| Ok(TrainingSnapshot::default()));
    storage
        .expect_append_score()
        .returning(|_| Err("risk_scores table unavailable".into()));
    storage
        .expect_append_scores()
        .returning(|_| Err("risk_scores table unavailable".into()));
    storage
}
