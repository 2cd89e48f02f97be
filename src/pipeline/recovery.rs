//! Startup recovery of records left IN_PROGRESS by a previous run
//!
//! Runs once, sequentially, before live consumption starts, so a replay can
//! never race a live delivery for the same record.

use super::event::RecordEvent;
use super::handler::RecordEventHandler;
use crate::config::Config;
use crate::graph::IndexingStatus;
use crate::storage::{GraphStore, RecordFilter, StorageError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Outcome of one recovery scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub scanned: usize,
    pub recovered: usize,
    pub failed: usize,
}

/// Readiness check for a dependency the handler needs before replaying
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn check(&self) -> Result<(), String>;
}

/// Exponential backoff schedule for readiness polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(200),
            max: Duration::from_secs(5),
            max_attempts: 5,
        }
    }
}

impl Backoff {
    /// Delay after the given zero-based failed attempt
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

/// Poll `probe` until it reports ready or attempts run out.
///
/// Returns whether the dependency became ready.
pub async fn wait_until_ready(probe: &dyn ReadinessProbe, backoff: &Backoff) -> bool {
    for attempt in 0..backoff.max_attempts {
        match probe.check().await {
            Ok(()) => {
                debug!(attempt, "dependency ready");
                return true;
            }
            Err(reason) => {
                let delay = backoff.delay(attempt);
                warn!(attempt, reason = %reason, delay_ms = delay.as_millis() as u64, "dependency not ready");
                if attempt + 1 < backoff.max_attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    false
}

/// Replays every IN_PROGRESS record through the record event handler
pub struct RecoveryScanner {
    store: Arc<dyn GraphStore>,
    handler: Arc<dyn RecordEventHandler>,
    startup_delay: Duration,
    readiness: Option<(Arc<dyn ReadinessProbe>, Backoff)>,
    task_timeout: Duration,
}

impl RecoveryScanner {
    pub fn new(store: Arc<dyn GraphStore>, handler: Arc<dyn RecordEventHandler>) -> Self {
        Self {
            store,
            handler,
            startup_delay: Duration::ZERO,
            readiness: None,
            task_timeout: Duration::from_secs(300),
        }
    }

    /// Scanner with the startup delay, readiness backoff and per-replay
    /// deadline taken from config
    pub fn from_config(
        config: &Config,
        store: Arc<dyn GraphStore>,
        handler: Arc<dyn RecordEventHandler>,
        readiness: Option<Arc<dyn ReadinessProbe>>,
    ) -> Self {
        let scanner = Self::new(store, handler)
            .with_startup_delay(config.recovery.startup_delay())
            .with_task_timeout(config.consumer.task_timeout());
        match readiness {
            Some(probe) => scanner.with_readiness(probe, config.recovery.readiness.backoff()),
            None => scanner,
        }
    }

    /// Fixed wait before recovery starts
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    pub fn with_readiness(mut self, probe: Arc<dyn ReadinessProbe>, backoff: Backoff) -> Self {
        self.readiness = Some((probe, backoff));
        self
    }

    /// Deadline for each replay; a replay that misses it is rolled back
    /// and counted as failed
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Wait for the startup delay and readiness, then scan
    pub async fn run(&self) -> Result<RecoveryReport, StorageError> {
        if !self.startup_delay.is_zero() {
            info!(delay_secs = self.startup_delay.as_secs(), "waiting before recovery");
            tokio::time::sleep(self.startup_delay).await;
        }

        if let Some((probe, backoff)) = &self.readiness {
            if !wait_until_ready(probe.as_ref(), backoff).await {
                warn!(attempts = backoff.max_attempts, "dependency never became ready, recovering anyway");
            }
        }

        self.scan().await
    }

    /// Replay every IN_PROGRESS record, one at a time.
    ///
    /// A failing record is logged and counted; it never stops the scan.
    pub async fn scan(&self) -> Result<RecoveryReport, StorageError> {
        let stuck = self
            .store
            .find_records(&RecordFilter::new().with_status(IndexingStatus::InProgress))
            .await?;

        let mut report = RecoveryReport {
            scanned: stuck.len(),
            ..Default::default()
        };
        if stuck.is_empty() {
            info!("no in-progress records to recover");
            return Ok(report);
        }

        info!(count = stuck.len(), "recovering in-progress records");
        for record in &stuck {
            let event = RecordEvent::replay(record);
            match tokio::time::timeout(self.task_timeout, self.handler.handle(&event)).await {
                Ok(Ok(_)) => {
                    debug!(record_id = %record.id, event_type = %event.event_type, "recovered record");
                    report.recovered += 1;
                }
                Ok(Err(e)) => {
                    error!(record_id = %record.id, event_type = %event.event_type, error = %e, "recovery failed");
                    report.failed += 1;
                }
                Err(_) => {
                    error!(
                        record_id = %record.id,
                        event_type = %event.event_type,
                        timeout_secs = self.task_timeout.as_secs(),
                        "recovery timed out, transaction rolled back"
                    );
                    report.failed += 1;
                }
            }
        }

        info!(recovered = report.recovered, failed = report.failed, "recovery finished");
        Ok(report)
    }
}
