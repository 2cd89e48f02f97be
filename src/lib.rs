//! Taxograph: recoverable taxonomy-graph reconciliation
//!
//! Turns per-record document classifications (departments, categories,
//! languages, topics) into a consistent graph of taxonomy nodes and
//! membership edges, without losing work across crashes and without letting
//! bursts of events overwhelm the store.
//!
//! # Core Concepts
//!
//! - **Records**: documents synced by upstream connectors, each with an indexing status
//! - **Classification**: the per-attempt taxonomy assignment for a record
//! - **Reconciliation**: diff-and-apply of a record's edges against its classification,
//!   inside one transaction
//! - **Recovery**: a startup replay of records left `IN_PROGRESS`
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use taxograph::{Classification, GraphReconciler, GraphStore, MemoryStore, Record, ReconcileRequest};
//!
//! # tokio_test_block(async {
//! let store = Arc::new(MemoryStore::new());
//! store.save_record(&Record::new("r1", "nda.pdf")).await.unwrap();
//!
//! let reconciler = GraphReconciler::new(store.clone());
//! let classification = Classification::new().with_category("Contracts").with_topics(["nda"]);
//! let report = reconciler.reconcile(&ReconcileRequest::new("r1", classification)).await.unwrap();
//! assert_eq!(report.edges_created, 2);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

pub mod config;
pub mod graph;
pub mod pipeline;
pub mod reconcile;
pub mod source;
pub mod storage;

pub use config::{Config, ConfigError};
pub use graph::{
    Classification, Collection, Edge, EdgeCollection, IndexingStatus, NodeCollection, NodeId, Record, RecordId,
    TaxonomyNode, VertexId,
};
pub use pipeline::{
    AdmissionLimiter, CancellationToken, ConsumerOrchestrator, ConsumerStats, EventPayload, EventSource, EventType,
    Extraction, ExtractionError, Extractor, HandlerError, HandlerOutcome, IndexingHandler, IndexingService,
    RecordEvent, RecordEventHandler, RecoveryReport, RecoveryScanner,
};
pub use reconcile::{GraphReconciler, ReconcileError, ReconcileReport, ReconcileRequest};
pub use storage::{
    GraphStore, GraphTransaction, MemoryStore, OpenStore, RecordFilter, SqliteStore, StorageError, StorageResult,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
