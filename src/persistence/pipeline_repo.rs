//! Pipeline reads and the one write this subsystem performs: marking a
//! pipeline broken.

use sqlx::PgPool;

use super::models::{Pipeline, PipelineStatus};
use crate::error::SentinelError;

type PipelineRow = (
    i32,
    String,
    Option<String>,
    String,
    i32,
    chrono::DateTime<chrono::Utc>,
    chrono::DateTime<chrono::Utc>,
);

/// Read access to the `pipelines` table, plus `mark_broken`.
#[derive(Debug, Clone)]
pub struct PipelineRepository {
    pool: PgPool,
}

impl PipelineRepository {
    /// Creates a new repository on the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetches a non-deleted pipeline by id.
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::PipelineNotFound`] when no such row
    /// exists and [`SentinelError::Persistence`] on database failure.
    pub async fn get_pipeline(&self, pipeline_id: i32) -> Result<Pipeline, SentinelError> {
        let row = sqlx::query_as::<_, PipelineRow>(
            "SELECT pipeline_id, name, description, status, created_by, created_at, updated_at \
             FROM pipelines WHERE pipeline_id = $1 AND is_deleted = FALSE",
        )
        .bind(pipeline_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SentinelError::persistence(&e))?
        .ok_or(SentinelError::PipelineNotFound(pipeline_id))?;

        into_pipeline(row)
    }

    /// Ids of every pipeline eligible for monitoring: not deleted and
    /// not already broken.
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::Persistence`] on database failure.
    pub async fn monitorable_pipeline_ids(&self) -> Result<Vec<i32>, SentinelError> {
        sqlx::query_scalar::<_, i32>(
            "SELECT pipeline_id FROM pipelines \
             WHERE is_deleted = FALSE AND status <> $1 \
             ORDER BY pipeline_id",
        )
        .bind(PipelineStatus::Broken.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SentinelError::persistence(&e))
    }

    /// Sets the pipeline's status to broken, taking it out of scheduling
    /// and out of listener restoration on subsequent boots.
    ///
    /// Returns `false` when no matching pipeline exists.
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::Persistence`] on database failure.
    pub async fn mark_broken(&self, pipeline_id: i32) -> Result<bool, SentinelError> {
        let result = sqlx::query(
            "UPDATE pipelines SET status = $1, updated_at = NOW() \
             WHERE pipeline_id = $2 AND is_deleted = FALSE",
        )
        .bind(PipelineStatus::Broken.as_str())
        .bind(pipeline_id)
        .execute(&self.pool)
        .await
        .map_err(|e| SentinelError::persistence(&e))?;

        Ok(result.rows_affected() > 0)
    }
}

fn into_pipeline(row: PipelineRow) -> Result<Pipeline, SentinelError> {
    let (pipeline_id, name, description, status, created_by, created_at, updated_at) = row;
    Ok(Pipeline {
        pipeline_id,
        name,
        description,
        status: status.parse()?,
        created_by,
        created_at,
        updated_at,
    })
}
