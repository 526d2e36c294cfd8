//! Append-only store for classified schema change events.

use sqlx::PgPool;

use super::models::SchemaChangeEvent;
use crate::domain::ChangeType;
use crate::error::SentinelError;

type EventRow = (
    i64,
    i32,
    chrono::DateTime<chrono::Utc>,
    String,
    serde_json::Value,
);

/// PostgreSQL-backed event log for the `schema_change` table.
///
/// Insert-only: no update or delete operations exist. All queries are
/// ordered by event time (then id) so results are deterministic.
#[derive(Debug, Clone)]
pub struct EventStore {
    pool: PgPool,
}

impl EventStore {
    /// Creates a new event store on the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts one event and returns the stored row with its generated
    /// id and receipt timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::Persistence`] on database failure.
    pub async fn add_event(
        &self,
        pipeline_id: i32,
        change_type: ChangeType,
        payload: &serde_json::Value,
    ) -> Result<SchemaChangeEvent, SentinelError> {
        let row = sqlx::query_as::<_, EventRow>(
            "INSERT INTO schema_change (pipeline_id, change_type, payload) \
             VALUES ($1, $2, $3) \
             RETURNING id, pipeline_id, event_time, change_type, payload",
        )
        .bind(pipeline_id)
        .bind(change_type.as_str())
        .bind(payload)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| SentinelError::persistence(&e))?;

        into_event(row)
    }

    /// Returns every event recorded for the pipeline, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::Persistence`] on database failure.
    pub async fn events_for_pipeline(
        &self,
        pipeline_id: i32,
    ) -> Result<Vec<SchemaChangeEvent>, SentinelError> {
        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT id, pipeline_id, event_time, change_type, payload \
             FROM schema_change WHERE pipeline_id = $1 \
             ORDER BY event_time, id",
        )
        .bind(pipeline_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SentinelError::persistence(&e))?;

        rows.into_iter().map(into_event).collect()
    }

    /// Returns only the breaking events recorded for the pipeline,
    /// oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::Persistence`] on database failure.
    pub async fn breaking_events_for_pipeline(
        &self,
        pipeline_id: i32,
    ) -> Result<Vec<SchemaChangeEvent>, SentinelError> {
        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT id, pipeline_id, event_time, change_type, payload \
             FROM schema_change WHERE pipeline_id = $1 AND change_type = $2 \
             ORDER BY event_time, id",
        )
        .bind(pipeline_id)
        .bind(ChangeType::Breaking.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SentinelError::persistence(&e))?;

        rows.into_iter().map(into_event).collect()
    }

    /// Returns every recorded event across all pipelines, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::Persistence`] on database failure.
    pub async fn all_events(&self) -> Result<Vec<SchemaChangeEvent>, SentinelError> {
        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT id, pipeline_id, event_time, change_type, payload \
             FROM schema_change ORDER BY event_time, id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SentinelError::persistence(&e))?;

        rows.into_iter().map(into_event).collect()
    }
}

fn into_event(row: EventRow) -> Result<SchemaChangeEvent, SentinelError> {
    let (id, pipeline_id, event_time, change_type, payload) = row;
    Ok(SchemaChangeEvent {
        id,
        pipeline_id,
        event_time,
        change_type: change_type.parse()?,
        payload,
    })
}
