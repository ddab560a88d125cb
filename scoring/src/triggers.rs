use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    model::*,
    model_cache::ModelCache,
    online::OnlineScoringService,
};

/// Invalidates the cached model after a label commit. Does nothing else.
#[derive(Clone)]
pub struct InvalidationTrigger {
    cache: Arc<ModelCache>,
}

impl InvalidationTrigger {
    pub fn new(cache: Arc<ModelCache>) -> Self {
        Self { cache }
    }

    pub async fn on_label_committed(&self, patient_id: ModelId, label_id: ModelId) {
        debug!(patient_id, label_id, "Label committed, invalidating model");
        self.cache.invalidate().await;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Scored(Option<RiskScoreRecord>),
    Invalidated,
    /// The side effect failed; the commit that raised the event stands.
    Failed(String),
}

/// Routes commit events to the two write-side entry points and contains
/// their failures.
#[derive(Clone)]
pub struct TriggerDispatcher {
    online: Arc<OnlineScoringService>,
    invalidation: InvalidationTrigger,
}

impl TriggerDispatcher {
    pub fn new(online: Arc<OnlineScoringService>, invalidation: InvalidationTrigger) -> Self {
        Self { online, invalidation }
    }

    pub async fn dispatch(&self, event: CommitEvent) -> DispatchOutcome {
        match event {
            CommitEvent::ObservationCommitted {
                patient_id,
                observation_id,
            } => match self.online.score_patient(patient_id).await {
                Ok(record) => DispatchOutcome::Scored(record),
                Err(e) => {
                    metrics::counter!("risk_trigger_failures_total", "event" => "observation").increment(1);
                    warn!(patient_id, observation_id, error = %e, "Online scoring after commit failed");
                    DispatchOutcome::Failed(e.to_string())
                }
            },
            CommitEvent::LabelCommitted { patient_id, label_id } => {
                self.invalidation.on_label_committed(patient_id, label_id).await;
                DispatchOutcome::Invalidated
            }
        }
    }
}
