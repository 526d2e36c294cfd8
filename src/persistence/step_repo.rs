//! Ordered step reads used to derive monitoring configuration.

use sqlx::PgPool;

use super::models::Step;
use crate::error::SentinelError;

/// Read access to the `pipeline_steps` table.
#[derive(Debug, Clone)]
pub struct StepRepository {
    pool: PgPool,
}

impl StepRepository {
    /// Creates a new repository on the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetches a pipeline's steps in execution order.
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::Persistence`] on database failure.
    pub async fn steps_for_pipeline(&self, pipeline_id: i32) -> Result<Vec<Step>, SentinelError> {
        let rows = sqlx::query_as::<_, (i32, i32, i32, serde_json::Value)>(
            "SELECT step_id, pipeline_id, step_order, step_config \
             FROM pipeline_steps WHERE pipeline_id = $1 \
             ORDER BY step_order",
        )
        .bind(pipeline_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SentinelError::persistence(&e))?;

        Ok(rows
            .into_iter()
            .map(|(step_id, pipeline_id, step_order, step_config)| Step {
                step_id,
                pipeline_id,
                step_order,
                step_config,
            })
            .collect())
    }
}
