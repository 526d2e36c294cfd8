//! Recipient resolution reads: admin users and per-pipeline grants.

use sqlx::PgPool;

use crate::error::SentinelError;

/// Read access to the `users` table.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Creates a new repository on the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Emails of every active user with the admin role.
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::Persistence`] on database failure.
    pub async fn active_admin_emails(&self) -> Result<Vec<String>, SentinelError> {
        sqlx::query_scalar::<_, String>(
            "SELECT email FROM users \
             WHERE role = 'admin' AND is_deleted = FALSE \
             ORDER BY email",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SentinelError::persistence(&e))
    }
}

/// Read access to the `user_pipeline_access` grant table.
#[derive(Debug, Clone)]
pub struct AccessRepository {
    pool: PgPool,
}

impl AccessRepository {
    /// Creates a new repository on the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Emails of every active user holding any grant (owner or viewer)
    /// on the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::Persistence`] on database failure.
    pub async fn grantee_emails(&self, pipeline_id: i32) -> Result<Vec<String>, SentinelError> {
        sqlx::query_scalar::<_, String>(
            "SELECT u.email FROM users u \
             JOIN user_pipeline_access a ON a.user_id = u.user_id \
             WHERE a.pipeline_id = $1 AND u.is_deleted = FALSE \
             ORDER BY u.email",
        )
        .bind(pipeline_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SentinelError::persistence(&e))
    }
}
