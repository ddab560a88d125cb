mod test_utils;

use std::sync::Arc;

use common::test_helpers::{init_test_tracing, test_config};
use scoring::{
    model::*,
    model_cache::{ModelCache, ModelLookup},
    storage::{InMemoryStorage, RecordStorage},
};
use test_utils::{mocks::MockCommonStorage, patient, seed_population, varied_observation};

async fn labelled_store(n: usize, positive_every: usize) -> Arc<InMemoryStorage> {
    let storage = Arc::new(InMemoryStorage::new());
    seed_population(storage.as_ref(), n).await;
    for id in 1..=n as ModelId {
        let label = positive_every > 0 && id as usize % positive_every == 0;
        storage.save_label(&OutcomeLabel::new(0, id, label)).await.unwrap();
    }
    storage
}

#[tokio::test]
async fn too_few_labels_is_untrainable_every_time() {
    init_test_tracing();
    let storage = labelled_store(9, 3).await;
    let cache = ModelCache::new(storage, test_config().scoring);

    for _ in 0..3 {
        let lookup = cache.get_or_train().await.unwrap();
        assert!(matches!(lookup, ModelLookup::Untrainable { pairs: 9, positives: 3 }));
    }
    assert_eq!(cache.generation(), 0);
    assert!(!cache.is_cached().await);
}

#[tokio::test]
async fn exactly_the_minimum_trains() {
    init_test_tracing();
    let config = test_config().scoring;
    assert_eq!(config.min_training_labels, 10);

    let storage = labelled_store(10, 3).await;
    let cache = ModelCache::new(storage, config);
    let ModelLookup::Trained(model) = cache.get_or_train().await.unwrap() else {
        panic!("expected a trained model");
    };
    assert_eq!(model.training_rows, 10);
}

#[tokio::test]
async fn single_class_is_untrainable_every_time() {
    init_test_tracing();
    let storage = labelled_store(30, 0).await;
    let cache = ModelCache::new(storage, test_config().scoring);

    for _ in 0..3 {
        let lookup = cache.get_or_train().await.unwrap();
        assert!(matches!(lookup, ModelLookup::Untrainable { pairs: 30, positives: 0 }));
    }
}

#[tokio::test]
async fn labels_without_observations_do_not_count() {
    init_test_tracing();
    let storage = labelled_store(9, 3).await;
    for id in 100..110 {
        storage.save_patient(&patient(id)).await.unwrap();
        storage.save_label(&OutcomeLabel::new(0, id, true)).await.unwrap();
    }
    let cache = ModelCache::new(storage, test_config().scoring);
    assert!(matches!(
        cache.get_or_train().await.unwrap(),
        ModelLookup::Untrainable { pairs: 9, .. }
    ));
}

#[tokio::test]
async fn trained_model_is_reused() {
    init_test_tracing();
    let storage = labelled_store(20, 4).await;
    let cache = ModelCache::new(storage, test_config().scoring);

    let ModelLookup::Trained(first) = cache.get_or_train().await.unwrap() else {
        panic!("expected a trained model");
    };
    let ModelLookup::Trained(second) = cache.get_or_train().await.unwrap() else {
        panic!("expected a trained model");
    };
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.generation, 1);
    assert_eq!(first.training_rows, 20);
}

#[tokio::test]
async fn store_is_read_once_while_cached() {
    init_test_tracing();
    let population: Vec<(Observation, Patient)> = (1..=12)
        .map(|id| {
            let mut observation = varied_observation(id, id as usize);
            observation.id = id;
            (observation, patient(id))
        })
        .collect();
    let labels: Vec<OutcomeLabel> = (1..=12).map(|id| OutcomeLabel::new(id, id, id % 2 == 0)).collect();

    let mut storage = MockCommonStorage::new();
    storage.expect_training_snapshot().times(1).returning(move || {
        Ok(TrainingSnapshot {
            latest: population.clone(),
            labels: labels.clone(),
        })
    });
    storage.expect_latest_observations().never();
    storage.expect_get_labels().never();

    let cache = ModelCache::new(Arc::new(storage), test_config().scoring);
    for _ in 0..4 {
        assert!(matches!(cache.get_or_train().await.unwrap(), ModelLookup::Trained(_)));
    }
}

#[tokio::test]
async fn storage_error_is_propagated() {
    init_test_tracing();
    let mut storage = MockCommonStorage::new();
    storage
        .expect_training_snapshot()
        .returning(|| Err("connection reset".into()));

    let cache = ModelCache::new(Arc::new(storage), test_config().scoring);
    let err = cache.get_or_train().await.unwrap_err();
    assert!(err.to_string().contains("connection reset"));
}

#[tokio::test]
async fn invalidate_is_idempotent() {
    init_test_tracing();
    let storage = labelled_store(20, 4).await;
    let cache = ModelCache::new(storage, test_config().scoring);

    cache.invalidate().await;
    cache.invalidate().await;
    assert!(!cache.is_cached().await);

    cache.get_or_train().await.unwrap();
    assert!(cache.is_cached().await);
    cache.invalidate().await;
    cache.invalidate().await;
    assert!(!cache.is_cached().await);

    let ModelLookup::Trained(model) = cache.get_or_train().await.unwrap() else {
        panic!("expected a trained model");
    };
    assert_eq!(model.generation, 2);
}

#[tokio::test]
async fn invalidation_racing_training_leaves_no_partial_model() {
    init_test_tracing();
    let storage = labelled_store(40, 5).await;
    let cache = Arc::new(ModelCache::new(storage, test_config().scoring));

    let trainer = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.get_or_train().await.map_err(|e| e.to_string()) })
    };
    let invalidator = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.invalidate().await })
    };
    let lookup = trainer.await.unwrap().unwrap();
    invalidator.await.unwrap();

    let ModelLookup::Trained(model) = lookup else {
        panic!("expected a trained model");
    };
    assert_eq!(model.classifier.weights.len(), FEATURE_COUNT);
    assert_eq!(model.training_rows, 40);

    // Whatever the interleaving, the next lookup yields a complete model.
    let ModelLookup::Trained(next) = cache.get_or_train().await.unwrap() else {
        panic!("expected a trained model");
    };
    assert_eq!(next.generation, cache.generation());
    assert_eq!(next.classifier.weights.len(), FEATURE_COUNT);
}
