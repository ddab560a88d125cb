use std::error::Error;
use std::sync::Arc;

use clap::Parser;
use scoring::{
    executable_utils::{Args, initialize_executable, install_metrics_exporter},
    model_cache::ModelCache,
    online::OnlineScoringService,
    processor::Processor,
    queue::ProdQueue,
    storage::ProdStorage,
    triggers::{InvalidationTrigger, TriggerDispatcher},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let args = Args::parse();
    let config = initialize_executable(&args.config)?;
    install_metrics_exporter(config.processor.metrics_address.as_deref())?;

    let storage = Arc::new(ProdStorage::new(&config.common.database_url).await?);
    let cache = Arc::new(ModelCache::new(storage.clone(), config.scoring.clone()));
    let online = Arc::new(OnlineScoringService::new(storage, cache.clone()));
    let dispatcher = Arc::new(TriggerDispatcher::new(online, InvalidationTrigger::new(cache)));

    let queue = Arc::new(ProdQueue::new(&config.common.database_url).await?);
    let processor = Processor::new(config.processor, dispatcher, queue);

    processor.start_processing_worker().await?;

    Ok(())
}
