//! Startup ordering: recovery to completion, then live consumption

use super::cancel::CancellationToken;
use super::consumer::{ConsumerOrchestrator, ConsumerStats, EventSource};
use super::handler::{Extractor, IndexingHandler, RecordEventHandler};
use super::limiter::AdmissionLimiter;
use super::recovery::{ReadinessProbe, RecoveryReport, RecoveryScanner};
use crate::config::Config;
use crate::storage::{GraphStore, StorageError};
use std::sync::Arc;
use tracing::info;

/// What a service run did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceReport {
    /// `None` when recovery is disabled
    pub recovery: Option<RecoveryReport>,
    pub consumer: ConsumerStats,
}

/// The indexing service: a recovery barrier in front of the consumer
pub struct IndexingService {
    recovery: Option<RecoveryScanner>,
    orchestrator: ConsumerOrchestrator,
}

impl IndexingService {
    pub fn new(recovery: Option<RecoveryScanner>, orchestrator: ConsumerOrchestrator) -> Self {
        Self { recovery, orchestrator }
    }

    /// Wire the default handler, recovery scanner and orchestrator from config
    pub fn from_config(
        config: &Config,
        store: Arc<dyn GraphStore>,
        extractor: Arc<dyn Extractor>,
        readiness: Option<Arc<dyn ReadinessProbe>>,
    ) -> Self {
        let handler: Arc<dyn RecordEventHandler> = Arc::new(IndexingHandler::new(store.clone(), extractor));

        let recovery = config
            .recovery
            .enabled
            .then(|| RecoveryScanner::from_config(config, store, handler.clone(), readiness));

        let limiter = AdmissionLimiter::new(config.consumer.admission_rate_per_sec, config.consumer.admission_burst);
        let orchestrator = ConsumerOrchestrator::new(handler, limiter)
            .with_max_concurrency(config.consumer.max_concurrency)
            .with_task_timeout(config.consumer.task_timeout());

        Self::new(recovery, orchestrator)
    }

    /// Run recovery to completion, then consume `source` until it is
    /// exhausted or `token` is cancelled
    pub async fn run<S>(&self, source: &mut S, token: &CancellationToken) -> Result<ServiceReport, StorageError>
    where
        S: EventSource + ?Sized,
    {
        let recovery = match &self.recovery {
            Some(scanner) => Some(scanner.run().await?),
            None => {
                info!("recovery disabled");
                None
            }
        };

        if token.is_cancelled() {
            info!("cancelled during recovery, not starting consumer");
            return Ok(ServiceReport {
                recovery,
                consumer: ConsumerStats::default(),
            });
        }

        let consumer = self.orchestrator.run(source, token).await;
        Ok(ServiceReport { recovery, consumer })
    }
}
