//! Storage trait definitions: the transaction port

use crate::graph::{
    Collection, Edge, EdgeCollection, IndexingStatus, NodeCollection, Record, RecordId, TaxonomyNode, VertexId,
};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Collection '{0}' is not in the transaction scope")]
    CollectionNotInScope(Collection),

    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Filter criteria for querying records
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Filter by indexing status
    pub status: Option<IndexingStatus>,
    /// Filter by connector name
    pub connector_name: Option<String>,
    /// Filter by organization
    pub org_id: Option<String>,
    /// Maximum number of results
    pub limit: Option<usize>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: IndexingStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_connector(mut self, connector_name: impl Into<String>) -> Self {
        self.connector_name = Some(connector_name.into());
        self
    }

    pub fn with_org(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.status.map_or(true, |s| record.indexing_status == s)
            && self
                .connector_name
                .as_deref()
                .map_or(true, |c| record.connector_name == c)
            && self.org_id.as_deref().map_or(true, |o| record.org_id == o)
    }
}

/// The set of collections a transaction was opened over.
///
/// Every read and write checks its collection against the scope, so a
/// transaction can never touch something it did not declare at `begin`.
#[derive(Debug, Clone)]
pub struct TransactionScope(BTreeSet<Collection>);

impl TransactionScope {
    pub fn new(collections: &[Collection]) -> Self {
        Self(collections.iter().copied().collect())
    }

    pub fn check(&self, collection: impl Into<Collection>) -> StorageResult<()> {
        let collection = collection.into();
        if self.0.contains(&collection) {
            Ok(())
        } else {
            Err(StorageError::CollectionNotInScope(collection))
        }
    }

    /// Collections in the global lock order
    pub fn iter(&self) -> impl Iterator<Item = &Collection> {
        self.0.iter()
    }
}

/// An open transaction over a fixed set of collections.
///
/// Writes become visible to others only on `commit`. Dropping a transaction
/// without committing aborts it.
#[async_trait]
pub trait GraphTransaction: Send {
    // === Records ===

    async fn get_record(&mut self, id: &RecordId) -> StorageResult<Option<Record>>;

    /// Insert or replace a record document
    async fn upsert_record(&mut self, record: &Record) -> StorageResult<()>;

    async fn delete_record(&mut self, id: &RecordId) -> StorageResult<bool>;

    // === Taxonomy nodes ===

    /// Look up a node by exact name
    async fn find_node(&mut self, collection: NodeCollection, name: &str) -> StorageResult<Option<TaxonomyNode>>;

    /// Insert a node, or return the existing one on a `(collection, name)` conflict.
    ///
    /// The boolean is true when the node was created by this call.
    async fn find_or_create_node(
        &mut self,
        collection: NodeCollection,
        name: &str,
    ) -> StorageResult<(TaxonomyNode, bool)>;

    // === Edges ===

    /// Outgoing edges of `from` in one edge collection
    async fn edges_from(&mut self, collection: EdgeCollection, from: &VertexId) -> StorageResult<Vec<Edge>>;

    /// Insert a batch of edges; returns how many were new
    async fn insert_edges(&mut self, collection: EdgeCollection, edges: &[Edge]) -> StorageResult<usize>;

    /// Insert an edge unless the same `(from, to)` pair exists; true if inserted
    async fn upsert_edge(&mut self, collection: EdgeCollection, edge: &Edge) -> StorageResult<bool>;

    /// Delete the edge matching the exact `(from, to)` pair
    async fn delete_edge(&mut self, collection: EdgeCollection, from: &VertexId, to: &VertexId)
        -> StorageResult<bool>;

    // === Completion ===

    async fn commit(self: Box<Self>) -> StorageResult<()>;

    async fn abort(self: Box<Self>) -> StorageResult<()>;
}

/// Trait for graph storage backends
///
/// Implementations must be thread-safe (Send + Sync) so reconciliations for
/// different records can run concurrently.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Begin a transaction touching the named collections
    async fn begin(&self, scope: &[Collection]) -> StorageResult<Box<dyn GraphTransaction>>;

    // === Committed-state reads and single-document writes ===

    async fn get_record(&self, id: &RecordId) -> StorageResult<Option<Record>>;

    async fn save_record(&self, record: &Record) -> StorageResult<()>;

    async fn find_records(&self, filter: &RecordFilter) -> StorageResult<Vec<Record>>;

    /// Number of records per indexing status (statuses with zero omitted)
    async fn status_counts(&self) -> StorageResult<Vec<(IndexingStatus, usize)>>;

    async fn edges_from(&self, collection: EdgeCollection, from: &VertexId) -> StorageResult<Vec<Edge>>;

    /// All nodes with this exact name (more than one would break uniqueness)
    async fn nodes_named(&self, collection: NodeCollection, name: &str) -> StorageResult<Vec<TaxonomyNode>>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: GraphStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
