use std::sync::Arc;

use crate::{
    model::*,
    queue::QueueService,
    storage::RecordStorage,
};

/// Write side: persists records and only then announces the commit.
///
/// A failed enqueue is logged and counted; the write it follows still succeeds.
#[derive(Clone)]
pub struct Importer {
    storage: Arc<dyn RecordStorage>,
    queue: Arc<dyn QueueService>,
}

impl Importer {
    pub fn new(storage: Arc<dyn RecordStorage>, queue: Arc<dyn QueueService>) -> Self {
        tracing::info!("Initializing new Importer");
        Self { storage, queue }
    }

    pub async fn register_patient(&self, patient: &Patient) -> Result<ModelId, GenericError> {
        let id = self.storage.save_patient(patient).await?;
        tracing::debug!("Registered patient {}", id);
        Ok(id)
    }

    pub async fn import_observation(&self, observation: &Observation) -> Result<ModelId, GenericError> {
        let observation_id = self.storage.save_observation(observation).await?;
        self.announce(CommitEvent::ObservationCommitted {
            patient_id: observation.patient_id,
            observation_id,
        })
        .await;
        Ok(observation_id)
    }

    /// Creates or updates the label for its (patient, reference date, horizon).
    pub async fn import_label(&self, label: &OutcomeLabel) -> Result<ModelId, GenericError> {
        let label_id = self.storage.save_label(label).await?;
        self.announce(CommitEvent::LabelCommitted {
            patient_id: label.patient_id,
            label_id,
        })
        .await;
        Ok(label_id)
    }

    async fn announce(&self, event: CommitEvent) {
        match self.queue.enqueue(event).await {
            Ok(()) => tracing::info!(?event, "Queued commit event"),
            Err(e) => {
                metrics::counter!("risk_enqueue_failures_total").increment(1);
                tracing::warn!(?event, error = %e, "Failed to queue commit event");
            }
        }
    }
}
