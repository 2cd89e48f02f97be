//! In-memory graph store
//!
//! Implements the same transaction contract as `SqliteStore`:
//! - Each collection has its own async lock. `begin` takes the locks of the
//!   declared collections in a fixed global order and holds them until the
//!   transaction finishes, so disjoint transactions run concurrently and
//!   writers of the same collection serialize.
//! - Writes are buffered per transaction and applied under one mutex at
//!   commit; dropping the transaction discards them.

use super::traits::{GraphStore, GraphTransaction, RecordFilter, StorageResult, TransactionScope};
use crate::graph::{
    Collection, Edge, EdgeCollection, IndexingStatus, NodeCollection, Record, RecordId, TaxonomyNode, VertexId,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

type EdgeKey = (VertexId, VertexId);

/// Committed state
#[derive(Debug, Default)]
struct State {
    records: BTreeMap<RecordId, Record>,
    /// Keyed by name: the map itself enforces `(collection, name)` uniqueness
    nodes: HashMap<NodeCollection, BTreeMap<String, TaxonomyNode>>,
    edges: HashMap<EdgeCollection, BTreeMap<EdgeKey, Edge>>,
}

/// In-memory store honouring the `GraphStore` transaction contract
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    locks: HashMap<Collection, Arc<tokio::sync::Mutex<()>>>,
    graph_writes: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            locks: Collection::all()
                .into_iter()
                .map(|c| (c, Arc::new(tokio::sync::Mutex::new(()))))
                .collect(),
            graph_writes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Total committed node inserts, edge inserts and edge deletes
    pub fn graph_write_count(&self) -> u64 {
        self.graph_writes.load(Ordering::SeqCst)
    }

    /// Number of nodes in a collection
    pub fn node_count(&self, collection: NodeCollection) -> usize {
        let state = self.state.lock().unwrap();
        state.nodes.get(&collection).map_or(0, |m| m.len())
    }

    /// Number of edges in a collection
    pub fn edge_count(&self, collection: EdgeCollection) -> usize {
        let state = self.state.lock().unwrap();
        state.edges.get(&collection).map_or(0, |m| m.len())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn begin(&self, scope: &[Collection]) -> StorageResult<Box<dyn GraphTransaction>> {
        let scope = TransactionScope::new(scope);

        // BTreeSet iteration gives the global order, so lock acquisition
        // cannot deadlock between overlapping scopes.
        let mut guards = Vec::new();
        for collection in scope.iter() {
            if let Some(lock) = self.locks.get(collection) {
                guards.push(lock.clone().lock_owned().await);
            }
        }

        Ok(Box::new(MemoryTransaction {
            state: self.state.clone(),
            graph_writes: self.graph_writes.clone(),
            scope,
            _guards: guards,
            pending: Pending::default(),
        }))
    }

    async fn get_record(&self, id: &RecordId) -> StorageResult<Option<Record>> {
        let state = self.state.lock().unwrap();
        Ok(state.records.get(id).cloned())
    }

    async fn save_record(&self, record: &Record) -> StorageResult<()> {
        let _guard = self.locks[&Collection::Records].lock().await;
        let mut state = self.state.lock().unwrap();
        state.records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn find_records(&self, filter: &RecordFilter) -> StorageResult<Vec<Record>> {
        let state = self.state.lock().unwrap();
        let matching = state.records.values().filter(|r| filter.matches(r)).cloned();
        Ok(match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn status_counts(&self) -> StorageResult<Vec<(IndexingStatus, usize)>> {
        let state = self.state.lock().unwrap();
        Ok(IndexingStatus::ALL
            .into_iter()
            .map(|s| (s, state.records.values().filter(|r| r.indexing_status == s).count()))
            .filter(|(_, n)| *n > 0)
            .collect())
    }

    async fn edges_from(&self, collection: EdgeCollection, from: &VertexId) -> StorageResult<Vec<Edge>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .edges
            .get(&collection)
            .map(|m| m.values().filter(|e| &e.from == from).cloned().collect())
            .unwrap_or_default())
    }

    async fn nodes_named(&self, collection: NodeCollection, name: &str) -> StorageResult<Vec<TaxonomyNode>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .nodes
            .get(&collection)
            .and_then(|m| m.get(name))
            .cloned()
            .into_iter()
            .collect())
    }
}

/// Buffered writes of one transaction
#[derive(Debug, Default)]
struct Pending {
    /// `None` marks a deletion
    records: BTreeMap<RecordId, Option<Record>>,
    nodes: BTreeMap<(NodeCollection, String), TaxonomyNode>,
    /// `None` marks a deletion
    edges: BTreeMap<(EdgeCollection, VertexId, VertexId), Option<Edge>>,
}

pub struct MemoryTransaction {
    state: Arc<Mutex<State>>,
    graph_writes: Arc<AtomicU64>,
    scope: TransactionScope,
    _guards: Vec<OwnedMutexGuard<()>>,
    pending: Pending,
}

impl MemoryTransaction {
    fn committed_edge(&self, collection: EdgeCollection, from: &VertexId, to: &VertexId) -> bool {
        let state = self.state.lock().unwrap();
        state
            .edges
            .get(&collection)
            .is_some_and(|m| m.contains_key(&(from.clone(), to.clone())))
    }

    fn edge_exists(&self, collection: EdgeCollection, from: &VertexId, to: &VertexId) -> bool {
        match self.pending.edges.get(&(collection, from.clone(), to.clone())) {
            Some(pending) => pending.is_some(),
            None => self.committed_edge(collection, from, to),
        }
    }
}

#[async_trait]
impl GraphTransaction for MemoryTransaction {
    async fn get_record(&mut self, id: &RecordId) -> StorageResult<Option<Record>> {
        self.scope.check(Collection::Records)?;
        if let Some(pending) = self.pending.records.get(id) {
            return Ok(pending.clone());
        }
        let state = self.state.lock().unwrap();
        Ok(state.records.get(id).cloned())
    }

    async fn upsert_record(&mut self, record: &Record) -> StorageResult<()> {
        self.scope.check(Collection::Records)?;
        self.pending.records.insert(record.id.clone(), Some(record.clone()));
        Ok(())
    }

    async fn delete_record(&mut self, id: &RecordId) -> StorageResult<bool> {
        let existed = self.get_record(id).await?.is_some();
        self.pending.records.insert(id.clone(), None);
        Ok(existed)
    }

    async fn find_node(&mut self, collection: NodeCollection, name: &str) -> StorageResult<Option<TaxonomyNode>> {
        self.scope.check(collection)?;
        if let Some(node) = self.pending.nodes.get(&(collection, name.to_string())) {
            return Ok(Some(node.clone()));
        }
        let state = self.state.lock().unwrap();
        Ok(state.nodes.get(&collection).and_then(|m| m.get(name)).cloned())
    }

    async fn find_or_create_node(
        &mut self,
        collection: NodeCollection,
        name: &str,
    ) -> StorageResult<(TaxonomyNode, bool)> {
        // The collection lock is held for the whole transaction, so this
        // lookup and the insert below cannot interleave with another writer.
        if let Some(existing) = self.find_node(collection, name).await? {
            return Ok((existing, false));
        }
        let node = TaxonomyNode::new(collection, name);
        self.pending.nodes.insert((collection, name.to_string()), node.clone());
        Ok((node, true))
    }

    async fn edges_from(&mut self, collection: EdgeCollection, from: &VertexId) -> StorageResult<Vec<Edge>> {
        self.scope.check(collection)?;
        let mut edges: BTreeMap<EdgeKey, Edge> = {
            let state = self.state.lock().unwrap();
            state
                .edges
                .get(&collection)
                .map(|m| {
                    m.iter()
                        .filter(|((f, _), _)| f == from)
                        .map(|(k, e)| (k.clone(), e.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };
        for ((c, f, t), pending) in &self.pending.edges {
            if *c != collection || f != from {
                continue;
            }
            match pending {
                Some(edge) => edges.insert((f.clone(), t.clone()), edge.clone()),
                None => edges.remove(&(f.clone(), t.clone())),
            };
        }
        Ok(edges.into_values().collect())
    }

    async fn insert_edges(&mut self, collection: EdgeCollection, edges: &[Edge]) -> StorageResult<usize> {
        self.scope.check(collection)?;
        let mut inserted = 0;
        for edge in edges {
            if !self.edge_exists(collection, &edge.from, &edge.to) {
                self.pending
                    .edges
                    .insert((collection, edge.from.clone(), edge.to.clone()), Some(edge.clone()));
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn upsert_edge(&mut self, collection: EdgeCollection, edge: &Edge) -> StorageResult<bool> {
        Ok(self.insert_edges(collection, std::slice::from_ref(edge)).await? == 1)
    }

    async fn delete_edge(
        &mut self,
        collection: EdgeCollection,
        from: &VertexId,
        to: &VertexId,
    ) -> StorageResult<bool> {
        self.scope.check(collection)?;
        if !self.edge_exists(collection, from, to) {
            return Ok(false);
        }
        let key = (collection, from.clone(), to.clone());
        if self.committed_edge(collection, from, to) {
            self.pending.edges.insert(key, None);
        } else {
            // Inserted earlier in this transaction: just forget it
            self.pending.edges.remove(&key);
        }
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let MemoryTransaction {
            state,
            graph_writes,
            pending,
            _guards,
            ..
        } = *self;

        let mut state = state.lock().unwrap();
        let mut writes = 0u64;

        for (id, record) in pending.records {
            match record {
                Some(record) => state.records.insert(id, record),
                None => state.records.remove(&id),
            };
        }
        for ((collection, name), node) in pending.nodes {
            state.nodes.entry(collection).or_default().insert(name, node);
            writes += 1;
        }
        for ((collection, from, to), edge) in pending.edges {
            let edges = state.edges.entry(collection).or_default();
            match edge {
                Some(edge) => {
                    edges.insert((from, to), edge);
                }
                None => {
                    edges.remove(&(from, to));
                }
            }
            writes += 1;
        }

        graph_writes.fetch_add(writes, Ordering::SeqCst);
        Ok(())
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        // Pending writes and collection locks are released with `self`
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;

    fn scope_all() -> Vec<Collection> {
        Collection::all()
    }

    #[tokio::test]
    async fn uncommitted_writes_are_invisible() {
        let store = MemoryStore::new();
        let mut tx = store.begin(&scope_all()).await.unwrap();
        tx.upsert_record(&Record::new("r1", "a.txt")).await.unwrap();
        tx.find_or_create_node(NodeCollection::Topics, "Tax").await.unwrap();

        assert!(store.get_record(&RecordId::from("r1")).await.unwrap().is_none());
        assert_eq!(store.node_count(NodeCollection::Topics), 0);

        tx.commit().await.unwrap();
        assert!(store.get_record(&RecordId::from("r1")).await.unwrap().is_some());
        assert_eq!(store.node_count(NodeCollection::Topics), 1);
    }

    #[tokio::test]
    async fn abort_discards_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin(&scope_all()).await.unwrap();
        tx.upsert_record(&Record::new("r1", "a.txt")).await.unwrap();
        tx.abort().await.unwrap();
        assert!(store.get_record(&RecordId::from("r1")).await.unwrap().is_none());
        assert_eq!(store.graph_write_count(), 0);
    }

    #[tokio::test]
    async fn dropped_transaction_releases_locks() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin(&[Collection::Records]).await.unwrap();
            tx.upsert_record(&Record::new("r1", "a.txt")).await.unwrap();
        }
        // Would hang if the records lock were still held
        let tx = store.begin(&[Collection::Records]).await.unwrap();
        tx.commit().await.unwrap();
        assert!(store.get_record(&RecordId::from("r1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn out_of_scope_access_fails() {
        let store = MemoryStore::new();
        let mut tx = store.begin(&[Collection::Records]).await.unwrap();
        let err = tx.find_node(NodeCollection::Categories, "Legal").await.unwrap_err();
        assert!(matches!(err, StorageError::CollectionNotInScope(_)));
    }

    #[tokio::test]
    async fn find_or_create_returns_existing_node() {
        let store = MemoryStore::new();
        let mut tx = store.begin(&scope_all()).await.unwrap();
        let (first, created) = tx.find_or_create_node(NodeCollection::Categories, "Legal").await.unwrap();
        assert!(created);
        let (second, created) = tx.find_or_create_node(NodeCollection::Categories, "Legal").await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        tx.commit().await.unwrap();

        let mut tx = store.begin(&scope_all()).await.unwrap();
        let (third, created) = tx.find_or_create_node(NodeCollection::Categories, "Legal").await.unwrap();
        assert!(!created);
        assert_eq!(first.id, third.id);
    }

    #[tokio::test]
    async fn edges_overlay_pending_inserts_and_deletes() {
        let store = MemoryStore::new();
        let from = VertexId::from_string("records/r1");
        let a = VertexId::from_string("topics/a");
        let b = VertexId::from_string("topics/b");

        let mut tx = store.begin(&scope_all()).await.unwrap();
        let n = tx
            .insert_edges(
                EdgeCollection::BelongsToTopic,
                &[Edge::new(from.clone(), a.clone()), Edge::new(from.clone(), a.clone())],
            )
            .await
            .unwrap();
        assert_eq!(n, 1);
        tx.commit().await.unwrap();

        let mut tx = store.begin(&scope_all()).await.unwrap();
        assert!(tx.upsert_edge(EdgeCollection::BelongsToTopic, &Edge::new(from.clone(), b.clone())).await.unwrap());
        assert!(tx.delete_edge(EdgeCollection::BelongsToTopic, &from, &a).await.unwrap());
        let visible: Vec<_> = tx
            .edges_from(EdgeCollection::BelongsToTopic, &from)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.to)
            .collect();
        assert_eq!(visible, vec![b.clone()]);

        // Committed view is unchanged until commit
        let committed = store.edges_from(EdgeCollection::BelongsToTopic, &from).await.unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].to, a);
        tx.commit().await.unwrap();

        let committed = store.edges_from(EdgeCollection::BelongsToTopic, &from).await.unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].to, b);
    }

    #[tokio::test]
    async fn status_counts_omit_empty_statuses() {
        let store = MemoryStore::new();
        store.save_record(&Record::new("a", "a").with_status(IndexingStatus::InProgress)).await.unwrap();
        store.save_record(&Record::new("b", "b").with_status(IndexingStatus::InProgress)).await.unwrap();
        store.save_record(&Record::new("c", "c").with_status(IndexingStatus::Completed)).await.unwrap();
        let counts = store.status_counts().await.unwrap();
        assert_eq!(counts, vec![(IndexingStatus::InProgress, 2), (IndexingStatus::Completed, 1)]);
    }
}
