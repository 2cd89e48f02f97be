//! Store wrapper that injects failures or stalls at chosen transaction steps

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use taxograph::{
    Collection, Edge, EdgeCollection, GraphStore, GraphTransaction, IndexingStatus, MemoryStore, NodeCollection,
    Record, RecordFilter, RecordId, StorageError, StorageResult, TaxonomyNode, VertexId,
};

/// Transaction step a fault can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    FindOrCreate(NodeCollection),
    EdgesFrom(EdgeCollection),
    InsertEdges(EdgeCollection),
    Commit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultAction {
    /// Return `StorageError::Unavailable`
    Fail,
    /// Never complete
    Stall,
}

#[derive(Default)]
struct Faults {
    armed: Mutex<Vec<(FaultPoint, FaultAction, usize)>>,
    tripped: AtomicUsize,
}

impl Faults {
    async fn trip(&self, point: FaultPoint) -> StorageResult<()> {
        let action = {
            let mut armed = self.armed.lock().unwrap();
            armed
                .iter_mut()
                .find(|(p, _, remaining)| *p == point && *remaining > 0)
                .map(|entry| {
                    entry.2 -= 1;
                    entry.1
                })
        };
        match action {
            None => Ok(()),
            Some(FaultAction::Fail) => {
                self.tripped.fetch_add(1, Ordering::SeqCst);
                Err(StorageError::Unavailable(format!("injected fault at {:?}", point)))
            }
            Some(FaultAction::Stall) => {
                self.tripped.fetch_add(1, Ordering::SeqCst);
                std::future::pending::<StorageResult<()>>().await
            }
        }
    }
}

/// Any `GraphStore` with armable faults; a `MemoryStore` unless wrapped
pub struct FaultyStore<S = MemoryStore> {
    inner: Arc<S>,
    faults: Arc<Faults>,
}

impl FaultyStore<MemoryStore> {
    pub fn new() -> Self {
        Self::wrap(MemoryStore::new())
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.inner
    }
}

impl<S: GraphStore> FaultyStore<S> {
    pub fn wrap(inner: S) -> Self {
        Self {
            inner: Arc::new(inner),
            faults: Arc::new(Faults::default()),
        }
    }

    /// Trigger `action` the next `times` times `point` is reached
    pub fn arm(&self, point: FaultPoint, action: FaultAction, times: usize) {
        self.faults.armed.lock().unwrap().push((point, action, times));
    }

    pub fn tripped(&self) -> usize {
        self.faults.tripped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: GraphStore> GraphStore for FaultyStore<S> {
    async fn begin(&self, scope: &[Collection]) -> StorageResult<Box<dyn GraphTransaction>> {
        let inner = self.inner.begin(scope).await?;
        Ok(Box::new(FaultyTransaction {
            inner,
            faults: self.faults.clone(),
        }))
    }

    async fn get_record(&self, id: &RecordId) -> StorageResult<Option<Record>> {
        self.inner.get_record(id).await
    }

    async fn save_record(&self, record: &Record) -> StorageResult<()> {
        self.inner.save_record(record).await
    }

    async fn find_records(&self, filter: &RecordFilter) -> StorageResult<Vec<Record>> {
        self.inner.find_records(filter).await
    }

    async fn status_counts(&self) -> StorageResult<Vec<(IndexingStatus, usize)>> {
        self.inner.status_counts().await
    }

    async fn edges_from(&self, collection: EdgeCollection, from: &VertexId) -> StorageResult<Vec<Edge>> {
        self.inner.edges_from(collection, from).await
    }

    async fn nodes_named(&self, collection: NodeCollection, name: &str) -> StorageResult<Vec<TaxonomyNode>> {
        self.inner.nodes_named(collection, name).await
    }
}

struct FaultyTransaction {
    inner: Box<dyn GraphTransaction>,
    faults: Arc<Faults>,
}

#[async_trait]
impl GraphTransaction for FaultyTransaction {
    async fn get_record(&mut self, id: &RecordId) -> StorageResult<Option<Record>> {
        self.inner.get_record(id).await
    }

    async fn upsert_record(&mut self, record: &Record) -> StorageResult<()> {
        self.inner.upsert_record(record).await
    }

    async fn delete_record(&mut self, id: &RecordId) -> StorageResult<bool> {
        self.inner.delete_record(id).await
    }

    async fn find_node(&mut self, collection: NodeCollection, name: &str) -> StorageResult<Option<TaxonomyNode>> {
        self.inner.find_node(collection, name).await
    }

    async fn find_or_create_node(
        &mut self,
        collection: NodeCollection,
        name: &str,
    ) -> StorageResult<(TaxonomyNode, bool)> {
        self.faults.trip(FaultPoint::FindOrCreate(collection)).await?;
        self.inner.find_or_create_node(collection, name).await
    }

    async fn edges_from(&mut self, collection: EdgeCollection, from: &VertexId) -> StorageResult<Vec<Edge>> {
        self.faults.trip(FaultPoint::EdgesFrom(collection)).await?;
        self.inner.edges_from(collection, from).await
    }

    async fn insert_edges(&mut self, collection: EdgeCollection, edges: &[Edge]) -> StorageResult<usize> {
        self.faults.trip(FaultPoint::InsertEdges(collection)).await?;
        self.inner.insert_edges(collection, edges).await
    }

    async fn upsert_edge(&mut self, collection: EdgeCollection, edge: &Edge) -> StorageResult<bool> {
        self.inner.upsert_edge(collection, edge).await
    }

    async fn delete_edge(&mut self, collection: EdgeCollection, from: &VertexId, to: &VertexId) -> StorageResult<bool> {
        self.inner.delete_edge(collection, from, to).await
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let this = *self;
        this.faults.trip(FaultPoint::Commit).await?;
        this.inner.commit().await
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        let this = *self;
        this.inner.abort().await
    }
}
