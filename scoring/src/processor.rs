use crate::{
    model::GenericError,
    queue::QueueService,
    triggers::{DispatchOutcome, TriggerDispatcher},
};
use common::config::ProcessorConfig;
use futures::future::join_all;
#[cfg(not(test))]
use tracing::{debug, info, trace, warn};
#[cfg(test)]
use {println as debug, println as info, println as trace, println as warn};
use std::{sync::Arc, time::Duration};

/// Counts for one drained batch of commit events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub events: usize,
    pub scored: usize,
    pub skipped: usize,
    pub invalidated: usize,
    pub failed: usize,
}

pub struct Processor {
    config: ProcessorConfig,
    dispatcher: Arc<TriggerDispatcher>,
    queue: Arc<dyn QueueService>,
}

impl Processor {
    pub fn new(
        config: ProcessorConfig,
        dispatcher: Arc<TriggerDispatcher>,
        queue: Arc<dyn QueueService>,
    ) -> Self {
        info!("Initializing new Processor");
        Self {
            config,
            dispatcher,
            queue,
        }
    }

    /// Drains up to `batch_size` events and dispatches them concurrently.
    /// Dispatch failures are counted, never returned.
    pub async fn process(&self) -> Result<CycleSummary, GenericError> {
        trace!("Starting processing cycle");

        let events = self.queue.fetch_next(self.config.batch_size).await?;
        if events.is_empty() {
            trace!("No commit events in queue");
            return Ok(CycleSummary::default());
        }
        debug!("Dispatching {} commit events", events.len());

        let outcomes = join_all(events.iter().map(|event| self.dispatcher.dispatch(*event))).await;

        let mut summary = CycleSummary {
            events: events.len(),
            ..Default::default()
        };
        for (event, outcome) in events.iter().zip(outcomes) {
            match outcome {
                DispatchOutcome::Scored(Some(_)) => summary.scored += 1,
                DispatchOutcome::Scored(None) => summary.skipped += 1,
                DispatchOutcome::Invalidated => summary.invalidated += 1,
                DispatchOutcome::Failed(reason) => {
                    warn!("Commit event {:?} failed: {}", event, reason);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Processed {} events: {} scored, {} skipped, {} invalidations, {} failed",
            summary.events, summary.scored, summary.skipped, summary.invalidated, summary.failed
        );
        Ok(summary)
    }

    pub async fn start_processing_worker(&self) -> Result<(), GenericError> {
        info!("Starting processing worker, batch size {}", self.config.batch_size);
        let idle = Duration::from_millis(self.config.sleep_ms);
        loop {
            match self.process().await {
                Ok(summary) if summary.events > 0 => continue,
                Ok(_) => tokio::time::sleep(idle).await,
                Err(e) => {
                    warn!("Processing cycle failed: {}", e);
                    tokio::time::sleep(idle).await;
                }
            }
        }
    }
}
