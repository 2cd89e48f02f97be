//! Record: the persisted document entity being indexed

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a record (assigned upstream by the connector sync)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Processing status, used for both the extraction and the indexing field.
///
/// `QUEUED → IN_PROGRESS → COMPLETED`, or `FAILED` when the handler
/// classifies an error as non-retryable. `COMPLETED` and `FAILED` are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexingStatus {
    #[default]
    NotStarted,
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl IndexingStatus {
    pub const ALL: [IndexingStatus; 5] = [
        Self::NotStarted,
        Self::Queued,
        Self::InProgress,
        Self::Completed,
        Self::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::Queued => "QUEUED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for IndexingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted document record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: RecordId,
    #[serde(default)]
    pub record_name: String,
    #[serde(default)]
    pub org_id: String,
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub connector_name: String,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub record_type: String,
    /// Groups near-duplicate representations of the same content
    #[serde(default)]
    pub virtual_record_id: Option<String>,
    #[serde(default)]
    pub extraction_status: IndexingStatus,
    #[serde(default)]
    pub indexing_status: IndexingStatus,
    #[serde(default)]
    pub is_dirty: bool,
    #[serde(default)]
    pub is_ocr: bool,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub last_extraction_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_index_at: Option<DateTime<Utc>>,
}

impl Record {
    /// Create a record in `NOT_STARTED` state
    pub fn new(id: impl Into<RecordId>, record_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            record_name: record_name.into(),
            org_id: String::new(),
            version: 0,
            connector_name: String::new(),
            extension: None,
            mime_type: None,
            origin: String::new(),
            record_type: String::new(),
            virtual_record_id: None,
            extraction_status: IndexingStatus::NotStarted,
            indexing_status: IndexingStatus::NotStarted,
            is_dirty: false,
            is_ocr: false,
            summary: None,
            last_extraction_at: None,
            last_index_at: None,
        }
    }

    pub fn with_org(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = org_id.into();
        self
    }

    pub fn with_connector(mut self, connector_name: impl Into<String>) -> Self {
        self.connector_name = connector_name.into();
        self
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    pub fn with_status(mut self, status: IndexingStatus) -> Self {
        self.indexing_status = status;
        self
    }

    /// Mark processing as started (handler transition, outside reconciliation)
    pub fn mark_in_progress(&mut self) {
        self.indexing_status = IndexingStatus::InProgress;
        self.extraction_status = IndexingStatus::InProgress;
    }

    /// Mark the record as permanently failed; not picked up by recovery
    pub fn mark_failed(&mut self) {
        self.indexing_status = IndexingStatus::Failed;
        self.extraction_status = IndexingStatus::Failed;
    }

    /// Finalize status fields after a successful reconciliation
    pub fn mark_completed(&mut self, virtual_record_id: Option<String>, is_ocr: bool, now: DateTime<Utc>) {
        self.extraction_status = IndexingStatus::Completed;
        self.indexing_status = IndexingStatus::Completed;
        self.is_dirty = false;
        self.last_extraction_at = Some(now);
        self.last_index_at = Some(now);
        if virtual_record_id.is_some() {
            self.virtual_record_id = virtual_record_id;
        }
        if is_ocr {
            self.is_ocr = true;
        }
    }
}
