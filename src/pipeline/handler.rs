//! Record event handling: classify, then reconcile

use super::event::{EventType, RecordEvent};
use crate::graph::{Classification, Collection, IndexingStatus, Record, RecordId};
use crate::reconcile::{GraphReconciler, ReconcileError, ReconcileReport, ReconcileRequest};
use crate::storage::{GraphStore, RecordFilter, StorageError};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Output of the external extraction step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub classification: Classification,
    /// Content was recovered through OCR
    pub is_ocr: bool,
}

impl Extraction {
    pub fn new(classification: Classification) -> Self {
        Self {
            classification,
            is_ocr: false,
        }
    }

    pub fn with_ocr(mut self) -> Self {
        self.is_ocr = true;
        self
    }
}

/// Extraction failure reported by an `Extractor`
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ExtractionError(pub String);

/// Port to the parsing and classification step that produces a record's
/// classification
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn classify(&self, record: &Record) -> Result<Extraction, ExtractionError>;
}

/// Errors surfaced by a record event handler
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0} event has no recordId")]
    MissingRecordId(EventType),

    #[error("record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("extraction failed for {record_id}: {source}")]
    Extraction {
        record_id: RecordId,
        #[source]
        source: ExtractionError,
    },

    #[error("store error: {0}")]
    Store(#[from] StorageError),
}

impl HandlerError {
    /// Whether a later replay might succeed. Non-retryable failures are
    /// either recorded as FAILED or dropped.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

impl From<ReconcileError> for HandlerError {
    fn from(e: ReconcileError) -> Self {
        match e {
            ReconcileError::RecordNotFound(id) => Self::RecordNotFound(id),
            ReconcileError::Store(e) => Self::Store(e),
        }
    }
}

/// What a handled event did
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    Indexed(ReconcileReport),
    /// Number of records actually removed
    Deleted(usize),
    Replayed { recovered: usize, failed: usize },
}

/// Handles one decoded event end to end
#[async_trait]
pub trait RecordEventHandler: Send + Sync {
    async fn handle(&self, event: &RecordEvent) -> Result<HandlerOutcome, HandlerError>;
}

/// Default handler: extraction through an `Extractor`, graph writes through
/// a `GraphReconciler`
pub struct IndexingHandler {
    reconciler: GraphReconciler,
    extractor: Arc<dyn Extractor>,
}

impl IndexingHandler {
    pub fn new(store: Arc<dyn GraphStore>, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            reconciler: GraphReconciler::new(store),
            extractor,
        }
    }

    async fn index(&self, event: &RecordEvent) -> Result<ReconcileReport, HandlerError> {
        let record_id = event
            .record_id()
            .ok_or(HandlerError::MissingRecordId(event.event_type))?;

        let record = self.transition(record_id, Record::mark_in_progress).await?;
        debug!(record_id = %record_id, event_type = %event.event_type, "record in progress");

        let extraction = match self.extractor.classify(&record).await {
            Ok(extraction) => extraction,
            Err(source) => {
                warn!(record_id = %record_id, error = %source, "extraction failed, marking record FAILED");
                self.transition(record_id, Record::mark_failed).await?;
                return Err(HandlerError::Extraction {
                    record_id: record_id.clone(),
                    source,
                });
            }
        };

        let request = ReconcileRequest {
            record_id: record_id.clone(),
            classification: extraction.classification,
            virtual_record_id: event
                .payload
                .virtual_record_id
                .clone()
                .or(record.virtual_record_id),
            is_ocr: extraction.is_ocr,
        };
        Ok(self.reconciler.reconcile(&request).await?)
    }

    /// Apply a status change to the record in its own small transaction
    async fn transition(&self, record_id: &RecordId, change: fn(&mut Record)) -> Result<Record, HandlerError> {
        let mut tx = self.reconciler.store().begin(&[Collection::Records]).await?;
        let Some(mut record) = tx.get_record(record_id).await? else {
            tx.abort().await?;
            return Err(HandlerError::RecordNotFound(record_id.clone()));
        };
        change(&mut record);
        tx.upsert_record(&record).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn delete(&self, record_id: &RecordId) -> Result<usize, HandlerError> {
        match self.reconciler.remove(record_id).await? {
            Some(_) => Ok(1),
            None => {
                info!(record_id = %record_id, "record already gone, nothing to delete");
                Ok(0)
            }
        }
    }

    async fn reindex_failed(&self, event: &RecordEvent) -> Result<HandlerOutcome, HandlerError> {
        if event.payload.connector_name.is_empty() {
            warn!("reindex_failed event has no connectorName, ignoring");
            return Ok(HandlerOutcome::Replayed { recovered: 0, failed: 0 });
        }

        let mut filter = RecordFilter::new()
            .with_status(IndexingStatus::Failed)
            .with_connector(event.payload.connector_name.clone());
        if !event.payload.org_id.is_empty() {
            filter = filter.with_org(event.payload.org_id.clone());
        }

        let failed_records = self.reconciler.store().find_records(&filter).await?;
        info!(
            connector = %event.payload.connector_name,
            count = failed_records.len(),
            "reindexing failed records"
        );

        let (mut recovered, mut failed) = (0, 0);
        for record in &failed_records {
            let replay = RecordEvent::from_record(EventType::ReindexRecord, record);
            match self.index(&replay).await {
                Ok(_) => recovered += 1,
                Err(e) => {
                    error!(record_id = %record.id, error = %e, "reindex of failed record did not succeed");
                    failed += 1;
                }
            }
        }
        Ok(HandlerOutcome::Replayed { recovered, failed })
    }
}

#[async_trait]
impl RecordEventHandler for IndexingHandler {
    async fn handle(&self, event: &RecordEvent) -> Result<HandlerOutcome, HandlerError> {
        match event.event_type {
            EventType::NewRecord | EventType::UpdateRecord | EventType::ReindexRecord => {
                Ok(HandlerOutcome::Indexed(self.index(event).await?))
            }
            EventType::DeleteRecord => {
                let record_id = event
                    .record_id()
                    .ok_or(HandlerError::MissingRecordId(event.event_type))?;
                Ok(HandlerOutcome::Deleted(self.delete(record_id).await?))
            }
            EventType::BulkDeleteRecords => {
                let (mut deleted, mut failed) = (0, 0);
                for record_id in &event.payload.record_ids {
                    match self.delete(record_id).await {
                        Ok(n) => deleted += n,
                        Err(e) => {
                            error!(record_id = %record_id, error = %e, "bulk delete of record failed");
                            failed += 1;
                        }
                    }
                }
                info!(requested = event.payload.record_ids.len(), deleted, failed, "bulk delete finished");
                Ok(HandlerOutcome::Deleted(deleted))
            }
            EventType::ReindexFailed => self.reindex_failed(event).await,
        }
    }
}
