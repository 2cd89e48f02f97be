//! Event pipeline
//!
//! Flow: `ConsumerOrchestrator` → `AdmissionLimiter` → `RecordEventHandler`
//! → `GraphReconciler`. `RecoveryScanner` replays stuck records through the
//! same handler before the orchestrator starts.

mod cancel;
mod consumer;
mod event;
mod handler;
mod limiter;
mod recovery;
mod service;

pub use cancel::CancellationToken;
pub use consumer::{ConsumerOrchestrator, ConsumerStats, EventSource, SourceError};
pub use event::{EventPayload, EventType, RecordEvent};
pub use handler::{
    Extraction, ExtractionError, Extractor, HandlerError, HandlerOutcome, IndexingHandler, RecordEventHandler,
};
pub use limiter::AdmissionLimiter;
pub use recovery::{wait_until_ready, Backoff, ReadinessProbe, RecoveryReport, RecoveryScanner};
pub use service::{IndexingService, ServiceReport};
