mod test_utils;

use std::sync::Arc;

use common::test_helpers::{init_test_tracing, test_config};
use scoring::{
    importer::Importer,
    model::*,
    model_cache::ModelCache,
    online::OnlineScoringService,
    processor::{CycleSummary, Processor},
    queue::{InMemoryQueue, QueueService},
    storage::{CommonStorage, InMemoryStorage, RecordStorage},
    triggers::{InvalidationTrigger, TriggerDispatcher},
};
use test_utils::{
    at_risk_observation, drain, engine,
    mocks::{MockQueue, failing_writes},
    patient,
};

#[tokio::test]
async fn observation_commit_is_scored_by_the_worker() {
    init_test_tracing();
    let engine = engine(&test_config());
    engine.importer.register_patient(&patient(1)).await.unwrap();

    let observation_id = engine.importer.import_observation(&at_risk_observation(1)).await.unwrap();
    assert_eq!(engine.queue.len().await.unwrap(), 1);
    assert_eq!(engine.storage.score_count().await, 0);

    let summary = engine.processor.process().await.unwrap();
    assert_eq!(
        summary,
        CycleSummary {
            events: 1,
            scored: 1,
            ..Default::default()
        }
    );
    let (latest, _) = engine.storage.latest_observation(1).await.unwrap().unwrap();
    assert_eq!(latest.id, observation_id);
    assert_eq!(engine.storage.score_history(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn label_commit_only_invalidates() {
    init_test_tracing();
    let engine = engine(&test_config());
    engine.importer.register_patient(&patient(1)).await.unwrap();
    engine.importer.import_label(&OutcomeLabel::new(0, 1, true)).await.unwrap();

    let summary = engine.processor.process().await.unwrap();
    assert_eq!(summary.invalidated, 1);
    assert_eq!(summary.scored, 0);
    assert_eq!(engine.storage.score_count().await, 0);
}

#[tokio::test]
async fn cycle_is_bounded_by_batch_size() {
    init_test_tracing();
    let mut config = test_config();
    config.processor.batch_size = 2;
    let engine = engine(&config);
    for id in 1..=5 {
        engine.importer.register_patient(&patient(id)).await.unwrap();
        engine.importer.import_observation(&at_risk_observation(id)).await.unwrap();
    }

    assert_eq!(engine.processor.process().await.unwrap().events, 2);
    assert_eq!(engine.queue.len().await.unwrap(), 3);
    let rest = drain(&engine.processor).await;
    assert_eq!(rest.scored, 3);
    assert_eq!(engine.storage.score_count().await, 5);
}

#[tokio::test]
async fn empty_queue_is_an_idle_cycle() {
    init_test_tracing();
    let engine = engine(&test_config());
    assert_eq!(engine.processor.process().await.unwrap(), CycleSummary::default());
}

#[tokio::test]
async fn scoring_failure_does_not_undo_the_observation() {
    init_test_tracing();
    let records = Arc::new(InMemoryStorage::new());
    let queue = Arc::new(InMemoryQueue::new());
    let importer = Importer::new(records.clone(), queue.clone());

    let scoring_storage: Arc<dyn CommonStorage> =
        Arc::new(failing_writes(at_risk_observation(1), patient(1)));
    let cache = Arc::new(ModelCache::new(scoring_storage.clone(), test_config().scoring));
    let online = Arc::new(OnlineScoringService::new(scoring_storage, cache.clone()));
    let dispatcher = Arc::new(TriggerDispatcher::new(online, InvalidationTrigger::new(cache)));
    let processor = Processor::new(test_config().processor, dispatcher, queue.clone());

    importer.register_patient(&patient(1)).await.unwrap();
    let observation_id = importer.import_observation(&at_risk_observation(1)).await.unwrap();
    importer.import_label(&OutcomeLabel::new(0, 1, false)).await.unwrap();

    let summary = processor.process().await.unwrap();
    assert_eq!(summary.events, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.invalidated, 1);

    let (stored, _) = records.latest_observation(1).await.unwrap().unwrap();
    assert_eq!(stored.id, observation_id);
    assert_eq!(records.get_labels().await.unwrap().len(), 1);
}

#[tokio::test]
async fn enqueue_failure_does_not_fail_the_write() {
    init_test_tracing();
    let storage = Arc::new(InMemoryStorage::new());
    let mut queue = MockQueue::new();
    queue
        .expect_enqueue()
        .times(2)
        .returning(|_| Err("queue unavailable".into()));
    let importer = Importer::new(storage.clone(), Arc::new(queue));

    storage.save_patient(&patient(1)).await.unwrap();
    let observation_id = importer.import_observation(&at_risk_observation(1)).await.unwrap();
    let label_id = importer.import_label(&OutcomeLabel::new(0, 1, true)).await.unwrap();

    let (stored, _) = storage.latest_observation(1).await.unwrap().unwrap();
    assert_eq!(stored.id, observation_id);
    assert_eq!(storage.get_labels().await.unwrap()[0].id, label_id);
}

#[tokio::test]
async fn rejected_write_is_not_announced() {
    init_test_tracing();
    let storage = Arc::new(InMemoryStorage::new());
    let mut queue = MockQueue::new();
    queue.expect_enqueue().never();
    let importer = Importer::new(storage, Arc::new(queue));

    // Unknown patient: the store refuses the observation.
    assert!(importer.import_observation(&at_risk_observation(42)).await.is_err());
}

#[tokio::test]
async fn queue_error_aborts_only_the_cycle() {
    init_test_tracing();
    let engine = engine(&test_config());
    let mut queue = MockQueue::new();
    queue
        .expect_fetch_next()
        .returning(|_| Err("broker down".into()));

    let dispatcher = Arc::new(TriggerDispatcher::new(
        engine.online.clone(),
        InvalidationTrigger::new(engine.cache.clone()),
    ));
    let processor = Processor::new(test_config().processor, dispatcher, Arc::new(queue));
    assert!(processor.process().await.is_err());
}
