//! Scripted collaborators and seeding helpers

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taxograph::pipeline::SourceError;
use taxograph::{
    CancellationToken, Classification, Collection, EdgeCollection, EventSource, EventType, Extraction,
    ExtractionError, Extractor, GraphStore, IndexingStatus, NodeCollection, Record, RecordEvent, RecordId, VertexId,
};

/// Extractor that answers from a per-record script and records every call
#[derive(Default)]
pub struct ScriptedExtractor {
    script: HashMap<RecordId, Result<Extraction, ExtractionError>>,
    delay: Duration,
    calls: Mutex<Vec<RecordId>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: AtomicUsize,
}

struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: &str, classification: Classification) -> Self {
        self.script.insert(RecordId::from(id), Ok(Extraction::new(classification)));
        self
    }

    pub fn failing(mut self, id: &str, message: &str) -> Self {
        self.script
            .insert(RecordId::from(id), Err(ExtractionError(message.to_string())));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Record ids in the order they were classified
    pub fn calls(&self) -> Vec<RecordId> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn classify(&self, record: &Record) -> Result<Extraction, ExtractionError> {
        self.calls.lock().unwrap().push(record.id.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(self.in_flight.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.script
            .get(&record.id)
            .cloned()
            .unwrap_or_else(|| Ok(Extraction::default()))
    }
}

/// Event source over a fixed list, optionally cancelling a token on the Nth pull
#[derive(Default)]
pub struct VecEventSource {
    events: VecDeque<Result<RecordEvent, SourceError>>,
    pulled: usize,
    cancel_on_pull: Option<(usize, CancellationToken)>,
}

impl VecEventSource {
    pub fn new(events: impl IntoIterator<Item = RecordEvent>) -> Self {
        Self {
            events: events.into_iter().map(Ok).collect(),
            ..Default::default()
        }
    }

    pub fn push_event(&mut self, event: RecordEvent) {
        self.events.push_back(Ok(event));
    }

    pub fn push_error(&mut self, error: SourceError) {
        self.events.push_back(Err(error));
    }

    pub fn cancel_on_pull(mut self, pull: usize, token: CancellationToken) -> Self {
        self.cancel_on_pull = Some((pull, token));
        self
    }

    pub fn pulled(&self) -> usize {
        self.pulled
    }

    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

#[async_trait]
impl EventSource for VecEventSource {
    async fn next_event(&mut self) -> Option<Result<RecordEvent, SourceError>> {
        let next = self.events.pop_front()?;
        self.pulled += 1;
        if let Some((pull, token)) = &self.cancel_on_pull {
            if self.pulled == *pull {
                token.cancel();
            }
        }
        Some(next)
    }
}

pub fn new_record_events(ids: &[&str]) -> Vec<RecordEvent> {
    ids.iter()
        .map(|id| RecordEvent::for_id(EventType::NewRecord, *id))
        .collect()
}

pub async fn seed_records(store: &dyn GraphStore, ids: &[&str], status: IndexingStatus) {
    for id in ids {
        store
            .save_record(&Record::new(*id, format!("{id}.pdf")).with_status(status))
            .await
            .unwrap();
    }
}

pub async fn seed_departments(store: &dyn GraphStore, names: &[&str]) {
    let mut tx = store
        .begin(&[Collection::Nodes(NodeCollection::Departments)])
        .await
        .unwrap();
    for name in names {
        tx.find_or_create_node(NodeCollection::Departments, name).await.unwrap();
    }
    tx.commit().await.unwrap();
}

/// Membership edge targets of a record, per edge collection
pub async fn edge_snapshot(store: &dyn GraphStore, record: &str) -> BTreeMap<EdgeCollection, BTreeSet<VertexId>> {
    let from = VertexId::record(&RecordId::from(record));
    let mut snapshot = BTreeMap::new();
    for collection in EdgeCollection::MEMBERSHIP {
        let targets = store
            .edges_from(collection, &from)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.to)
            .collect();
        snapshot.insert(collection, targets);
    }
    snapshot
}

pub async fn status_of(store: &dyn GraphStore, id: &str) -> Option<IndexingStatus> {
    store
        .get_record(&RecordId::from(id))
        .await
        .unwrap()
        .map(|r| r.indexing_status)
}

/// Vertex id of the single node with this name
pub async fn vertex(store: &dyn GraphStore, collection: NodeCollection, name: &str) -> VertexId {
    let nodes = store.nodes_named(collection, name).await.unwrap();
    assert_eq!(nodes.len(), 1, "expected one {collection} node named {name}");
    VertexId::of(&nodes[0])
}
