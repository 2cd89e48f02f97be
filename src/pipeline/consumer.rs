//! Consumer orchestration: bounded, rate-limited dispatch of live events

use super::cancel::CancellationToken;
use super::event::RecordEvent;
use super::handler::{HandlerError, HandlerOutcome, RecordEventHandler};
use super::limiter::AdmissionLimiter;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// Errors from an event source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("undecodable event at line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl SourceError {
    /// A bad message can be skipped; anything else stops consumption
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

/// Port to the queue client that delivers change events
#[async_trait]
pub trait EventSource: Send {
    /// Next event, or `None` once the source is exhausted
    async fn next_event(&mut self) -> Option<Result<RecordEvent, SourceError>>;
}

/// Totals for one orchestrator run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Events dispatched to the handler
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    /// Events the source could not decode
    pub skipped: usize,
}

enum TaskOutcome {
    Succeeded,
    Failed,
    TimedOut,
}

impl ConsumerStats {
    fn record(&mut self, joined: Result<TaskOutcome, JoinError>) {
        match joined {
            Ok(TaskOutcome::Succeeded) => self.succeeded += 1,
            Ok(TaskOutcome::Failed) => self.failed += 1,
            Ok(TaskOutcome::TimedOut) => self.timed_out += 1,
            Err(e) => {
                error!(error = %e, "handler task panicked");
                self.failed += 1;
            }
        }
    }
}

/// Pulls events and dispatches each to the handler on its own task.
///
/// Each dispatch takes a concurrency permit, then an admission slot from the
/// limiter, and runs under a per-task deadline. A task that misses its
/// deadline is dropped, which rolls back any open transaction.
pub struct ConsumerOrchestrator {
    handler: Arc<dyn RecordEventHandler>,
    limiter: Arc<AdmissionLimiter>,
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
    task_timeout: Duration,
}

impl ConsumerOrchestrator {
    pub fn new(handler: Arc<dyn RecordEventHandler>, limiter: AdmissionLimiter) -> Self {
        Self {
            handler,
            limiter: Arc::new(limiter),
            semaphore: Arc::new(Semaphore::new(8)),
            max_concurrency: 8,
            task_timeout: Duration::from_secs(300),
        }
    }

    /// Set the maximum number of in-flight handler tasks
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        let limit = limit.max(1);
        self.semaphore = Arc::new(Semaphore::new(limit));
        self.max_concurrency = limit;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Consume until the source is exhausted or `token` is cancelled, then
    /// wait for in-flight tasks.
    pub async fn run<S>(&self, source: &mut S, token: &CancellationToken) -> ConsumerStats
    where
        S: EventSource + ?Sized,
    {
        let mut tasks = JoinSet::new();
        let mut stats = ConsumerStats::default();
        info!(
            max_concurrency = self.max_concurrency,
            task_timeout_secs = self.task_timeout.as_secs(),
            "consumer started"
        );

        loop {
            while let Some(joined) = tasks.try_join_next() {
                stats.record(joined);
            }

            let next = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!("cancellation requested, no longer pulling events");
                    break;
                }
                next = source.next_event() => next,
            };

            let event = match next {
                None => {
                    debug!("event source exhausted");
                    break;
                }
                Some(Ok(event)) => event,
                Some(Err(e)) if e.is_skippable() => {
                    warn!(error = %e, "skipping undecodable event");
                    stats.skipped += 1;
                    continue;
                }
                Some(Err(e)) => {
                    error!(error = %e, "event source failed, stopping consumer");
                    break;
                }
            };

            let permit = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                permit = self.semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = self.limiter.acquire() => {}
            }

            stats.processed += 1;
            let handler = self.handler.clone();
            let timeout = self.task_timeout;
            tasks.spawn(async move {
                let _permit = permit;
                dispatch(handler.as_ref(), &event, timeout).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            stats.record(joined);
        }

        info!(
            processed = stats.processed,
            succeeded = stats.succeeded,
            failed = stats.failed,
            timed_out = stats.timed_out,
            skipped = stats.skipped,
            "consumer stopped"
        );
        stats
    }
}

async fn dispatch(handler: &dyn RecordEventHandler, event: &RecordEvent, timeout: Duration) -> TaskOutcome {
    let target = event.target();
    match tokio::time::timeout(timeout, handler.handle(event)).await {
        Ok(Ok(outcome)) => {
            match outcome {
                HandlerOutcome::Indexed(report) => debug!(
                    record_id = %target,
                    event_type = %event.event_type,
                    graph_writes = report.graph_writes(),
                    "event handled"
                ),
                other => debug!(record_id = %target, event_type = %event.event_type, outcome = ?other, "event handled"),
            }
            TaskOutcome::Succeeded
        }
        Ok(Err(HandlerError::RecordNotFound(id))) => {
            warn!(record_id = %id, event_type = %event.event_type, "record not found, dropping event");
            TaskOutcome::Failed
        }
        Ok(Err(e)) => {
            error!(
                record_id = %target,
                event_type = %event.event_type,
                retryable = e.is_retryable(),
                error = %e,
                "event handling failed"
            );
            TaskOutcome::Failed
        }
        Err(_) => {
            error!(
                record_id = %target,
                event_type = %event.event_type,
                timeout_secs = timeout.as_secs(),
                "handler timed out, transaction rolled back"
            );
            TaskOutcome::TimedOut
        }
    }
}
