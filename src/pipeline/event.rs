//! Change events delivered by connectors

use crate::graph::{Record, RecordId};
use serde::{Deserialize, Serialize};

/// What happened to a record upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    NewRecord,
    UpdateRecord,
    DeleteRecord,
    ReindexRecord,
    ReindexFailed,
    BulkDeleteRecords,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewRecord => "new_record",
            Self::UpdateRecord => "update_record",
            Self::DeleteRecord => "delete_record",
            Self::ReindexRecord => "reindex_record",
            Self::ReindexFailed => "reindex_failed",
            Self::BulkDeleteRecords => "bulk_delete_records",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record metadata carried with an event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventPayload {
    pub record_id: Option<RecordId>,
    /// Targets of `bulk_delete_records`
    pub record_ids: Vec<RecordId>,
    pub record_name: String,
    pub org_id: String,
    pub version: i64,
    pub connector_name: String,
    pub extension: Option<String>,
    pub mime_type: Option<String>,
    pub origin: String,
    pub record_type: String,
    pub virtual_record_id: Option<String>,
}

/// One decoded change event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEvent {
    pub event_type: EventType,
    #[serde(default)]
    pub payload: EventPayload,
}

impl RecordEvent {
    pub fn new(event_type: EventType, payload: EventPayload) -> Self {
        Self { event_type, payload }
    }

    /// Event targeting a single record id with an otherwise empty payload
    pub fn for_id(event_type: EventType, record_id: impl Into<RecordId>) -> Self {
        Self::new(
            event_type,
            EventPayload {
                record_id: Some(record_id.into()),
                ..Default::default()
            },
        )
    }

    /// Rebuild the event the live path would have delivered for `record`
    pub fn from_record(event_type: EventType, record: &Record) -> Self {
        Self::new(
            event_type,
            EventPayload {
                record_id: Some(record.id.clone()),
                record_ids: Vec::new(),
                record_name: record.record_name.clone(),
                org_id: record.org_id.clone(),
                version: record.version,
                connector_name: record.connector_name.clone(),
                extension: record.extension.clone(),
                mime_type: record.mime_type.clone(),
                origin: record.origin.clone(),
                record_type: record.record_type.clone(),
                virtual_record_id: record.virtual_record_id.clone(),
            },
        )
    }

    /// Replay event for a record found stuck in progress.
    ///
    /// Version 0 was never indexed, so it replays as `new_record`; anything
    /// later replays as `reindex_record`.
    pub fn replay(record: &Record) -> Self {
        let event_type = if record.version == 0 {
            EventType::NewRecord
        } else {
            EventType::ReindexRecord
        };
        Self::from_record(event_type, record)
    }

    pub fn record_id(&self) -> Option<&RecordId> {
        self.payload.record_id.as_ref()
    }

    /// Short label for log fields
    pub fn target(&self) -> String {
        match (&self.payload.record_id, self.payload.record_ids.len()) {
            (Some(id), _) => id.to_string(),
            (None, 0) => self.payload.connector_name.clone(),
            (None, n) => format!("{n} records"),
        }
    }
}
