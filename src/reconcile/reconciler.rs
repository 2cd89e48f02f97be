//! GraphReconciler: makes a record's graph edges match its classification

use super::report::{EdgeDiff, ReconcileReport};
use crate::graph::{
    Classification, Collection, Edge, EdgeCollection, NodeCollection, RecordId, VertexId,
};
use crate::storage::{GraphStore, GraphTransaction, StorageError};
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised by reconciliation
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The record no longer exists; fatal for this invocation
    #[error("record not found: {0}")]
    RecordNotFound(RecordId),

    /// Transaction or network failure; the whole reconciliation was aborted
    #[error("store error: {0}")]
    Store(#[from] StorageError),
}

impl ReconcileError {
    /// Store failures may succeed on a later attempt; a missing record won't
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

/// Input for one reconciliation
#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    pub record_id: RecordId,
    pub classification: Classification,
    pub virtual_record_id: Option<String>,
    /// Record content was produced by OCR
    pub is_ocr: bool,
}

impl ReconcileRequest {
    pub fn new(record_id: impl Into<RecordId>, classification: Classification) -> Self {
        Self {
            record_id: record_id.into(),
            classification,
            virtual_record_id: None,
            is_ocr: false,
        }
    }

    pub fn with_virtual_record_id(mut self, id: impl Into<String>) -> Self {
        self.virtual_record_id = Some(id.into());
        self
    }

    pub fn with_ocr(mut self, is_ocr: bool) -> Self {
        self.is_ocr = is_ocr;
        self
    }
}

/// Reconciles taxonomy nodes and edges for one record per call.
///
/// Every call runs in a single transaction over the records collection, all
/// taxonomy node collections and all edge collections. Any error aborts the
/// transaction, so a failed call leaves no partial edge state behind.
#[derive(Clone)]
pub struct GraphReconciler {
    store: Arc<dyn GraphStore>,
}

impl GraphReconciler {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Collections a reconciliation writes
    pub fn scope() -> Vec<Collection> {
        let mut scope = vec![Collection::Records];
        scope.extend(NodeCollection::ALL.into_iter().map(Collection::Nodes));
        scope.extend(EdgeCollection::ALL.into_iter().map(Collection::Edges));
        scope
    }

    /// Reconcile the record's edges against `request.classification` and
    /// finalize its status.
    pub async fn reconcile(&self, request: &ReconcileRequest) -> Result<ReconcileReport, ReconcileError> {
        debug!(record_id = %request.record_id, "reconciling record");
        let mut tx = self.store.begin(&Self::scope()).await?;

        match Self::apply(tx.as_mut(), request).await {
            Ok(report) => {
                tx.commit().await?;
                info!(
                    record_id = %request.record_id,
                    nodes_created = report.nodes_created,
                    edges_created = report.edges_created,
                    edges_deleted = report.edges_deleted,
                    "reconciled record"
                );
                Ok(report)
            }
            Err(e) => {
                Self::abort(tx, &request.record_id).await;
                Err(e)
            }
        }
    }

    /// Remove every membership edge of the record and delete the record.
    ///
    /// Returns `Ok(None)` when the record did not exist.
    pub async fn remove(&self, record_id: &RecordId) -> Result<Option<ReconcileReport>, ReconcileError> {
        let mut scope = vec![Collection::Records];
        scope.extend(EdgeCollection::MEMBERSHIP.into_iter().map(Collection::Edges));
        let mut tx = self.store.begin(&scope).await?;

        let result: Result<Option<ReconcileReport>, ReconcileError> = async {
            if tx.get_record(record_id).await?.is_none() {
                return Ok(None);
            }
            let from = VertexId::record(record_id);
            let mut report = ReconcileReport::new(record_id.clone());
            for collection in EdgeCollection::MEMBERSHIP {
                Self::reconcile_edges(tx.as_mut(), collection, &from, Vec::new(), &mut report).await?;
            }
            tx.delete_record(record_id).await?;
            Ok(Some(report))
        }
        .await;

        match result {
            Ok(report) => {
                tx.commit().await?;
                if let Some(ref report) = report {
                    info!(record_id = %record_id, edges_deleted = report.edges_deleted, "removed record");
                }
                Ok(report)
            }
            Err(e) => {
                Self::abort(tx, record_id).await;
                Err(e)
            }
        }
    }

    async fn abort(tx: Box<dyn GraphTransaction>, record_id: &RecordId) {
        if let Err(e) = tx.abort().await {
            warn!(record_id = %record_id, error = %e, "transaction abort failed");
        }
    }

    async fn apply(
        tx: &mut dyn GraphTransaction,
        request: &ReconcileRequest,
    ) -> Result<ReconcileReport, ReconcileError> {
        let mut record = tx
            .get_record(&request.record_id)
            .await?
            .ok_or_else(|| ReconcileError::RecordNotFound(request.record_id.clone()))?;

        let classification = &request.classification;
        let from = VertexId::record(&record.id);
        let mut report = ReconcileReport::new(record.id.clone());

        // Departments resolve against existing nodes only
        let mut departments = Vec::new();
        for name in classification.department_names() {
            match tx.find_node(NodeCollection::Departments, &name).await? {
                Some(node) => departments.push(VertexId::of(&node)),
                None => {
                    warn!(record_id = %record.id, department = %name, "unknown department, skipping edge");
                    report.unresolved_departments.push(name);
                }
            }
        }
        Self::reconcile_edges(tx, EdgeCollection::BelongsToDepartment, &from, departments, &mut report).await?;

        // Category chain: each level hangs off the one above it
        let mut categories = Vec::new();
        let mut parent: Option<(NodeCollection, VertexId)> = None;
        for (collection, name) in classification.category_chain() {
            let vertex = Self::resolve(tx, collection, &name, &mut report).await?;
            if let Some((parent_collection, parent_vertex)) = parent.take() {
                if collection.hierarchy_parent() == Some(parent_collection) {
                    let hierarchy = Edge::new(vertex.clone(), parent_vertex);
                    if tx.upsert_edge(EdgeCollection::InterCategoryRelations, &hierarchy).await? {
                        report.hierarchy_edges_created += 1;
                    }
                }
            }
            categories.push(vertex.clone());
            parent = Some((collection, vertex));
        }
        Self::reconcile_edges(tx, EdgeCollection::BelongsToCategory, &from, categories, &mut report).await?;

        let mut languages = Vec::new();
        for name in classification.language_names() {
            languages.push(Self::resolve(tx, NodeCollection::Languages, &name, &mut report).await?);
        }
        Self::reconcile_edges(tx, EdgeCollection::BelongsToLanguage, &from, languages, &mut report).await?;

        let mut topics = Vec::new();
        for name in classification.topic_names() {
            topics.push(Self::resolve(tx, NodeCollection::Topics, &name, &mut report).await?);
        }
        Self::reconcile_edges(tx, EdgeCollection::BelongsToTopic, &from, topics, &mut report).await?;

        record.mark_completed(request.virtual_record_id.clone(), request.is_ocr, Utc::now());
        if !classification.summary.trim().is_empty() {
            record.summary = Some(classification.summary.clone());
        }
        tx.upsert_record(&record).await?;

        Ok(report)
    }

    /// Find-or-create a node and return its vertex id
    async fn resolve(
        tx: &mut dyn GraphTransaction,
        collection: NodeCollection,
        name: &str,
        report: &mut ReconcileReport,
    ) -> Result<VertexId, ReconcileError> {
        let (node, created) = tx.find_or_create_node(collection, name).await?;
        if created {
            debug!(collection = %collection, name = %name, node_id = %node.id, "created taxonomy node");
            report.nodes_created += 1;
        }
        Ok(VertexId::of(&node))
    }

    /// Apply the difference between the record's current and desired targets
    async fn reconcile_edges(
        tx: &mut dyn GraphTransaction,
        collection: EdgeCollection,
        from: &VertexId,
        desired: Vec<VertexId>,
        report: &mut ReconcileReport,
    ) -> Result<(), ReconcileError> {
        let existing: BTreeSet<VertexId> = tx
            .edges_from(collection, from)
            .await?
            .into_iter()
            .map(|e| e.to)
            .collect();
        let diff = EdgeDiff::plan(&existing, &desired.into_iter().collect());

        if !diff.create.is_empty() {
            let edges: Vec<Edge> = diff
                .create
                .iter()
                .map(|to| Edge::new(from.clone(), to.clone()))
                .collect();
            report.edges_created += tx.insert_edges(collection, &edges).await?;
        }

        for to in &diff.delete {
            if tx.delete_edge(collection, from, to).await? {
                report.edges_deleted += 1;
            }
        }

        Ok(())
    }
}
