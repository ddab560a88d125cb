#![allow(dead_code)]

pub mod mocks;

use std::sync::Arc;

use chrono::NaiveDate;
use common::config::Config;
use scoring::{
    importer::Importer,
    model::*,
    model_cache::ModelCache,
    online::OnlineScoringService,
    processor::{CycleSummary, Processor},
    queue::InMemoryQueue,
    storage::{InMemoryStorage, RecordStorage},
    triggers::{InvalidationTrigger, TriggerDispatcher},
};

/// Every engine component wired over one in-memory store and queue.
pub struct Engine {
    pub storage: Arc<InMemoryStorage>,
    pub queue: Arc<InMemoryQueue>,
    pub cache: Arc<ModelCache>,
    pub online: Arc<OnlineScoringService>,
    pub importer: Importer,
    pub processor: Processor,
}

pub fn engine(config: &Config) -> Engine {
    let storage = Arc::new(InMemoryStorage::new());
    let queue = Arc::new(InMemoryQueue::new());
    let cache = Arc::new(ModelCache::new(storage.clone(), config.scoring.clone()));
    let online = Arc::new(OnlineScoringService::new(storage.clone(), cache.clone()));
    let dispatcher = Arc::new(TriggerDispatcher::new(
        online.clone(),
        InvalidationTrigger::new(cache.clone()),
    ));
    Engine {
        importer: Importer::new(storage.clone(), queue.clone()),
        processor: Processor::new(config.processor.clone(), dispatcher, queue.clone()),
        storage,
        queue,
        cache,
        online,
    }
}

pub fn patient(id: ModelId) -> Patient {
    Patient::new(id, "Test", &format!("Patient{}", id))
        .with_date_of_birth(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap())
}

/// A full panel whose values drift with `i`, so cohorts have variance.
pub fn varied_observation(patient_id: ModelId, i: usize) -> Observation {
    Observation {
        age: Some(30 + (i % 40) as i32),
        bmi: Some(20.0 + ((i * 7) % 15) as f64),
        systolic_bp: Some(110.0 + ((i * 11) % 40) as f64),
        diastolic_bp: Some(70.0 + ((i * 3) % 20) as f64),
        total_cholesterol: Some(160.0 + ((i * 13) % 80) as f64),
        hdl_cholesterol: Some(40.0 + ((i * 5) % 25) as f64),
        ldl_cholesterol: Some(90.0 + ((i * 17) % 60) as f64),
        triglycerides: Some(100.0 + ((i * 19) % 120) as f64),
        smoker: Some(i % 4 == 0),
        physical_activity: Some(["sedentary", "low", "moderate", "high"][i % 4].to_string()),
        ..Observation::empty(0, patient_id)
    }
}

/// BMI 35, 150/95, smoker; everything else missing.
pub fn at_risk_observation(patient_id: ModelId) -> Observation {
    Observation {
        bmi: Some(35.0),
        systolic_bp: Some(150.0),
        diastolic_bp: Some(95.0),
        smoker: Some(true),
        ..Observation::empty(0, patient_id)
    }
}

/// Stores patients `1..=n`, each with one varied observation.
pub async fn seed_population(storage: &dyn RecordStorage, n: usize) {
    for i in 1..=n {
        let id = i as ModelId;
        storage.save_patient(&patient(id)).await.unwrap();
        storage.save_observation(&varied_observation(id, i)).await.unwrap();
    }
}

/// Runs processing cycles until the queue is empty and sums them up.
pub async fn drain(processor: &Processor) -> CycleSummary {
    let mut total = CycleSummary::default();
    loop {
        let cycle = processor.process().await.unwrap();
        if cycle.events == 0 {
            return total;
        }
        total.events += cycle.events;
        total.scored += cycle.scored;
        total.skipped += cycle.skipped;
        total.invalidated += cycle.invalidated;
        total.failed += cycle.failed;
    }
}
