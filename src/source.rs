//! File-backed stand-ins for the queue client and the classifier
//!
//! - `JsonlEventSource`: one `RecordEvent` JSON object per line
//! - `ClassificationFileExtractor`: a JSON map of record id to classification
//! - `load_records`: record documents, one JSON object per line

use crate::graph::{Classification, Record, RecordId};
use crate::pipeline::{EventSource, Extraction, ExtractionError, Extractor, ReadinessProbe, RecordEvent, SourceError};
use crate::storage::GraphStore;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};

/// Reads events from newline-delimited JSON
pub struct JsonlEventSource<R> {
    lines: Lines<BufReader<R>>,
    line: usize,
}

impl JsonlEventSource<tokio::fs::File> {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::new(file))
    }
}

impl<R: AsyncRead + Unpin + Send> JsonlEventSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            line: 0,
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> EventSource for JsonlEventSource<R> {
    async fn next_event(&mut self) -> Option<Result<RecordEvent, SourceError>> {
        loop {
            let text = match self.lines.next_line().await {
                Ok(Some(text)) => text,
                Ok(None) => return None,
                Err(e) => return Some(Err(e.into())),
            };
            self.line += 1;
            if text.trim().is_empty() {
                continue;
            }
            return Some(serde_json::from_str(&text).map_err(|source| SourceError::Decode {
                line: self.line,
                source,
            }));
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClassificationEntry {
    #[serde(flatten)]
    classification: Classification,
    #[serde(default)]
    is_ocr: bool,
}

/// Serves classifications from a JSON file keyed by record id
#[derive(Debug, Clone, Default)]
pub struct ClassificationFileExtractor {
    entries: HashMap<RecordId, ClassificationEntry>,
}

impl ClassificationFileExtractor {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, SourceError> {
        let entries = serde_json::from_str(text).map_err(|source| SourceError::Decode { line: 0, source })?;
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Extractor for ClassificationFileExtractor {
    async fn classify(&self, record: &Record) -> Result<Extraction, ExtractionError> {
        let entry = self
            .entries
            .get(&record.id)
            .ok_or_else(|| ExtractionError(format!("no classification available for {}", record.id)))?;
        Ok(Extraction {
            classification: entry.classification.clone(),
            is_ocr: entry.is_ocr,
        })
    }
}

/// Read record documents from newline-delimited JSON
pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<Record>, SourceError> {
    let text = std::fs::read_to_string(path)?;
    let mut records = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(line).map_err(|source| SourceError::Decode {
            line: index + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Readiness probe that succeeds once the store answers a read
pub struct StoreProbe(pub Arc<dyn GraphStore>);

#[async_trait]
impl ReadinessProbe for StoreProbe {
    async fn check(&self) -> Result<(), String> {
        self.0.status_counts().await.map(|_| ()).map_err(|e| e.to_string())
    }
}
