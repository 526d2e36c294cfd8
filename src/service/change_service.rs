//! Query operations over recorded schema change events.
//!
//! This is the outward surface the (external) API layer consumes; it
//! reads the append-only event log and decorates each row with the
//! human-readable message stored in its payload.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::ChangeType;
use crate::error::SentinelError;
use crate::persistence::EventStore;
use crate::persistence::models::SchemaChangeEvent;

/// Fallback message when a stored payload carries no readable summary.
const FALLBACK_MESSAGE: &str = "Schema change detected";

/// One schema change event as exposed to API consumers.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaChangeView {
    /// Event row id.
    pub id: i64,
    /// Pipeline the change was observed for.
    pub pipeline_id: i32,
    /// Receipt time.
    pub event_time: DateTime<Utc>,
    /// Breaking/non-breaking classification.
    pub change_type: ChangeType,
    /// Full stored payload.
    pub payload: serde_json::Value,
    /// Summary sentence extracted from the payload.
    pub human_readable_message: String,
}

impl From<SchemaChangeEvent> for SchemaChangeView {
    fn from(event: SchemaChangeEvent) -> Self {
        let human_readable_message = extract_message(&event.payload);
        Self {
            id: event.id,
            pipeline_id: event.pipeline_id,
            event_time: event.event_time,
            change_type: event.change_type,
            payload: event.payload,
            human_readable_message,
        }
    }
}

/// Read-only query operations over the schema change event log.
#[derive(Debug, Clone)]
pub struct ChangeDetectionService {
    events: Arc<EventStore>,
}

impl ChangeDetectionService {
    /// Creates a new service over the event store.
    #[must_use]
    pub fn new(events: Arc<EventStore>) -> Self {
        Self { events }
    }

    /// All recorded changes for a pipeline, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::Persistence`] on database failure.
    pub async fn changes_for_pipeline(
        &self,
        pipeline_id: i32,
    ) -> Result<Vec<SchemaChangeView>, SentinelError> {
        let events = self.events.events_for_pipeline(pipeline_id).await?;
        Ok(events.into_iter().map(SchemaChangeView::from).collect())
    }

    /// Only the breaking changes for a pipeline, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::Persistence`] on database failure.
    pub async fn breaking_changes_for_pipeline(
        &self,
        pipeline_id: i32,
    ) -> Result<Vec<SchemaChangeView>, SentinelError> {
        let events = self.events.breaking_events_for_pipeline(pipeline_id).await?;
        Ok(events.into_iter().map(SchemaChangeView::from).collect())
    }

    /// All recorded changes across every pipeline, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::Persistence`] on database failure.
    pub async fn all_changes(&self) -> Result<Vec<SchemaChangeView>, SentinelError> {
        let events = self.events.all_events().await?;
        Ok(events.into_iter().map(SchemaChangeView::from).collect())
    }
}

/// Pulls `human_readable_message` out of a stored payload, falling back
/// to a generic sentence for absent or malformed payloads.
fn extract_message(payload: &serde_json::Value) -> String {
    payload
        .get("human_readable_message")
        .and_then(serde_json::Value::as_str)
        .unwrap_or(FALLBACK_MESSAGE)
        .to_string()
}
